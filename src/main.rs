use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chat_widget_engine::cli::{image_data_url, read_input, Args, Command};
use chat_widget_engine::config::WidgetConfig;
use chat_widget_engine::error::{Result, WidgetError};
use chat_widget_engine::highlight::Language;
use chat_widget_engine::markdown::{MarkdownRenderer, RenderOptions};
use chat_widget_engine::protocol::{
    ChatMessage, ChatSession, HttpChatService, MessageKind, Phase, Role, SessionEvent, WsConnector,
};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Some(config) = args.command.widget_config() {
        let config = config?;
        if let Command::Chat { image, .. } = &args.command {
            chat(config, image).await?;
        }
        return Ok(());
    }

    match args.command {
        Command::Render {
            file,
            no_highlight,
            typing,
        } => {
            let text = read_input(file.as_deref())?;
            let opts = RenderOptions {
                typing_cursor: typing,
                highlight_code: !no_highlight,
            };
            println!("{}", MarkdownRenderer::new().render(&text, opts));
        }
        Command::Highlight { lang, file } => {
            let language = Language::from_name(&lang)
                .ok_or_else(|| WidgetError::Config(format!("unknown language: {lang}")))?;
            let code = read_input(file.as_deref())?;
            let renderer = MarkdownRenderer::new();
            println!("{}", renderer.highlighter().highlight_as(language, &code));
        }
        Command::Chat { .. } => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Terminal chat
// ---------------------------------------------------------------------------

enum Step {
    Line(Option<String>),
    Pumped(bool),
}

async fn chat(config: WidgetConfig, images: &[PathBuf]) -> Result<()> {
    let mut pending_images = images.iter().map(|p| image_data_url(p)).collect::<Result<Vec<_>>>()?;
    let caption = config.caption.clone().unwrap_or_else(|| "chat".to_string());

    let service = HttpChatService::new(config.clone());
    let renderer = Arc::new(MarkdownRenderer::new());
    let mut session = ChatSession::new(config, service, WsConnector, renderer);
    let mut events = session.subscribe();

    session.bootstrap().await?;
    println!(
        "{} {}",
        caption.bold(),
        "(/clear, /reset, empty line stops an answer, Ctrl-D quits)".dimmed()
    );
    for msg in session.transcript() {
        print_message(msg);
    }
    let mut echo = Echo::default();
    // Connect eagerly so a welcome message can arrive before the first question.
    if let Err(e) = session.connect().await {
        eprintln!("{} {e}", "warning:".yellow());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let step = if session.is_connected() {
            tokio::select! {
                line = lines.next_line() => Step::Line(line?),
                alive = session.pump() => Step::Pumped(alive),
            }
        } else {
            Step::Line(lines.next_line().await?)
        };

        match step {
            Step::Line(None) => break,
            Step::Line(Some(line)) => {
                let outcome = session.ask_question(&line, std::mem::take(&mut pending_images)).await?;
                debug!(?outcome, "input handled");
            }
            Step::Pumped(alive) => {
                if !alive {
                    debug!("channel closed; reconnecting on next question");
                }
            }
        }
        drain(&mut events, &session, &mut echo);
    }

    session.stop().await;
    Ok(())
}

/// Prints a streaming answer incrementally as plain text.
#[derive(Default)]
struct Echo {
    printed: usize,
    welcomed: bool,
}

impl Echo {
    fn stream<S, C>(&mut self, session: &ChatSession<S, C>)
    where
        S: chat_widget_engine::protocol::ChatService,
        C: chat_widget_engine::protocol::Connector,
    {
        let Some(last) = session.transcript().last() else {
            return;
        };
        if last.kind == MessageKind::Welcome && !self.welcomed {
            self.welcomed = true;
            print_message(last);
            return;
        }
        if session.phase() != Phase::Typing || last.role != Role::Ai || last.kind != MessageKind::Message {
            return;
        }
        if let Some(fresh) = last.text.get(self.printed..) {
            if self.printed == 0 {
                print!("{} ", "bot>".cyan().bold());
            }
            print!("{fresh}");
            let _ = std::io::stdout().flush();
            self.printed = last.text.len();
        }
    }

    fn finish<S, C>(&mut self, session: &ChatSession<S, C>)
    where
        S: chat_widget_engine::protocol::ChatService,
        C: chat_widget_engine::protocol::Connector,
    {
        if let Some(last) = session.transcript().last().filter(|m| m.role == Role::Ai) {
            match last.kind {
                MessageKind::Message => {
                    if self.printed == 0 {
                        print!("{} ", "bot>".cyan().bold());
                    }
                    println!("{}", last.text.get(self.printed..).unwrap_or(""));
                    for reference in &last.references {
                        let source = reference.metadata.source.as_deref().unwrap_or("reference");
                        println!("  {} {}", "↳".dimmed(), source.dimmed());
                    }
                    for question in &last.related_questions {
                        println!("  {} {}", "?".dimmed(), question.italic());
                    }
                }
                MessageKind::Error => println!("{} {}", "bot>".red().bold(), last.text.red()),
                _ => {}
            }
        }
        self.printed = 0;
    }
}

fn print_message(msg: &ChatMessage) {
    match msg.role {
        Role::Human => println!("{} {}", "you>".green().bold(), msg.text),
        Role::Ai => println!("{} {}", "bot>".cyan().bold(), msg.text),
    }
}

fn drain<S, C>(events: &mut broadcast::Receiver<SessionEvent>, session: &ChatSession<S, C>, echo: &mut Echo)
where
    S: chat_widget_engine::protocol::ChatService,
    C: chat_widget_engine::protocol::Connector,
{
    loop {
        match events.try_recv() {
            Ok(SessionEvent::TranscriptChanged) => echo.stream(session),
            Ok(SessionEvent::PhaseChanged(Phase::Waiting)) => println!("{}", "thinking...".dimmed()),
            Ok(SessionEvent::PhaseChanged(Phase::Idle)) => echo.finish(session),
            Ok(SessionEvent::Clearing { hard }) => {
                let note = if hard { "-- chat reset --" } else { "-- history cleared --" };
                println!("{}", note.dimmed());
            }
            Ok(SessionEvent::Warning(detail)) => eprintln!("{} {detail}", "warning:".yellow()),
            Ok(SessionEvent::Fatal(detail)) => eprintln!("{} {detail}", "fatal:".red().bold()),
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "event receiver lagged"),
            Err(_) => break,
        }
    }
}
