use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use clap::{Parser, Subcommand};

use crate::config::WidgetConfig;
use crate::error::{Result, WidgetError};

#[derive(Parser, Debug)]
#[command(name = "chat-widget")]
#[command(version)]
#[command(about = "Render, highlight and chat through the chat widget text engine")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Render Markdown from FILE (or stdin) to sanitized HTML
    Render {
        file: Option<PathBuf>,

        /// Leave fenced code blocks unhighlighted
        #[arg(long)]
        no_highlight: bool,

        /// Render as a streaming answer, typing cursor included
        #[arg(long)]
        typing: bool,
    },

    /// Syntax-highlight FILE (or stdin)
    Highlight {
        /// Language name or alias (js, py, rust, yaml, ...)
        #[arg(long, short)]
        lang: String,

        file: Option<PathBuf>,
    },

    /// Interactive terminal chat against a running service
    Chat {
        /// Service root, e.g. https://bots.example.com
        #[arg(long)]
        base_url: String,

        /// Widget session id
        #[arg(long)]
        session: String,

        /// Image to attach to the first question (repeatable)
        #[arg(long)]
        image: Vec<PathBuf>,

        /// Hide references on answers
        #[arg(long)]
        no_references: bool,
    },
}

impl Command {
    /// Widget configuration for the `chat` subcommand.
    pub fn widget_config(&self) -> Option<Result<WidgetConfig>> {
        match self {
            Command::Chat {
                base_url,
                session,
                no_references,
                ..
            } => Some(
                WidgetConfig::builder(base_url.as_str(), session.as_str())
                    .disable_references(*no_references)
                    .build(),
            ),
            _ => None,
        }
    }
}

/// Read FILE, or all of stdin when no file is given.
pub fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn image_mime(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        _ => Err(WidgetError::Config(format!(
            "unsupported image type: {}",
            path.display()
        ))),
    }
}

/// Load an image as a `data:` URL the service accepts as an attachment.
pub fn image_data_url(path: &Path) -> Result<String> {
    let mime = image_mime(path)?;
    let bytes = std::fs::read(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}
