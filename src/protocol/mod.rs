//! Streaming chat protocol.
//!
//! ## Responsibility
//! [`ChatSession`] turns user actions (ask, stop, vote, clear) into requests
//! and turns the chunked frames coming back into a transcript whose last
//! answer is re-rendered on every chunk.
//!
//! ## Guarantees
//! - At most one exchange is in flight. Asking while one is running stops it
//!   instead of queueing a second question.
//! - A `thinking` placeholder is in the transcript from the moment a question
//!   is sent until the first chunk, error or close.
//! - A natural `stop`, an explicit stop and a dropped channel all end in the
//!   same teardown and leave the session [`Phase::Idle`].
//! - Malformed frames are logged and dropped without touching state.
//! - Vote and clear failures are broadcast as [`SessionEvent::Warning`]; they
//!   never surface as errors.
//!
//! ## NOT Responsible For
//! - Reordering or de-duplicating frames; they are applied in delivery order.
//! - Timeouts. A silent channel leaves the session waiting until the caller
//!   stops it.

pub mod channel;
pub mod frames;
pub mod service;
pub mod transcript;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub use channel::{
    Channel, ChannelEvent, Connector, MemoryChannel, MemoryConnector, MemoryRemote, WsChannel, WsConnector,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
pub use frames::{FrameKind, InboundFrame, OutboundFrame, Reference, Timestamp};
pub use service::{ChatService, HttpChatService, MemoryService, ServiceCall, VoteRequest};
pub use transcript::{ChatMessage, HistoryEntry, MessageKind, Role};

use crate::config::WidgetConfig;
use crate::error::{Result, WidgetError};
use crate::markdown::{MarkdownRenderer, RenderOptions};
use crate::tokenizer::escape_html;

const EVENT_CAPACITY: usize = 256;
const ERROR_FALLBACK: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    /// Question sent, no chunk yet.
    Waiting,
    /// Chunks are arriving.
    Typing,
}

/// Notifications for whatever paints the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QuestionIssued { message_id: String, text: String },
    PhaseChanged(Phase),
    TranscriptChanged,
    /// A clear or reset request is in flight.
    Clearing { hard: bool },
    Warning(String),
    /// The session could not be created; nothing further will work.
    Fatal(String),
}

/// What [`ChatSession::ask_question`] did with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskOutcome {
    Sent,
    /// Blank input.
    Ignored,
    /// An exchange was running; it was stopped instead.
    Stopped,
    /// `/clear` or `/reset`.
    Cleared,
    /// The question could not be delivered; the error is in the transcript.
    Failed,
}

/// The single in-flight exchange.
#[derive(Debug)]
struct Exchange {
    placeholder: String,
    chunks: String,
    streaming: bool,
}

fn preview(raw: &str) -> String {
    raw.chars().take(120).collect()
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

pub struct ChatSession<S, C: Connector> {
    config: WidgetConfig,
    service: S,
    connector: C,
    channel: Option<C::Channel>,
    renderer: Arc<MarkdownRenderer>,
    chat_id: Option<String>,
    transcript: Vec<ChatMessage>,
    phase: Phase,
    exchange: Option<Exchange>,
    events: broadcast::Sender<SessionEvent>,
    unavailable: bool,
}

impl<S: ChatService, C: Connector> ChatSession<S, C> {
    pub fn new(config: WidgetConfig, service: S, connector: C, renderer: Arc<MarkdownRenderer>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            service,
            connector,
            channel: None,
            renderer,
            chat_id: None,
            transcript: Vec::new(),
            phase: Phase::Idle,
            exchange: None,
            events,
            unavailable: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn warn(&self, detail: String) {
        warn!(chat_id = ?self.chat_id, %detail, "chat warning");
        self.emit(SessionEvent::Warning(detail));
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "phase changed");
            self.phase = phase;
            self.emit(SessionEvent::PhaseChanged(phase));
        }
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.transcript.iter_mut().rev().find(|m| m.id == id)
    }

    // -- bootstrap ----------------------------------------------------------

    /// Fetch or create the chat id, then load history.
    ///
    /// # Errors
    /// [`WidgetError::Bootstrap`] when no chat id can be obtained. The session
    /// is then permanently unavailable and a [`SessionEvent::Fatal`] is sent.
    /// A history failure is only a warning.
    pub async fn bootstrap(&mut self) -> Result<()> {
        if self.unavailable {
            return Err(WidgetError::Unavailable);
        }
        let chat_id = match self.service.chat_id().await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, session = %self.config.session_id, "chat session bootstrap failed");
                self.unavailable = true;
                self.emit(SessionEvent::Fatal(e.to_string()));
                return Err(WidgetError::Bootstrap(e.to_string()));
            }
        };
        info!(chat_id = %chat_id, "chat session ready");
        self.chat_id = Some(chat_id.clone());

        match self.service.history(&chat_id).await {
            Ok(entries) => {
                let mut restored: Vec<ChatMessage> = entries.into_iter().map(|e| self.history_message(e)).collect();
                if !restored.is_empty() {
                    debug!(chat_id = %chat_id, count = restored.len(), "history restored");
                    // History goes ahead of anything already on screen.
                    restored.append(&mut self.transcript);
                    self.transcript = restored;
                    self.emit(SessionEvent::TranscriptChanged);
                }
            }
            Err(e) => self.warn(format!("could not load chat history: {e}")),
        }
        Ok(())
    }

    fn history_message(&self, entry: HistoryEntry) -> ChatMessage {
        let mut msg = match entry.role {
            Role::Human => ChatMessage::human(&entry.text, Vec::new()),
            Role::Ai => {
                let html = self.renderer.render(&entry.text, RenderOptions::FINAL);
                let mut msg = ChatMessage::ai(MessageKind::Message, &entry.text, html);
                msg.feedback = !self.config.disable_feedback;
                msg.speakable = !self.config.disable_speech_playback;
                if !self.config.disable_references {
                    msg.references = entry.references;
                }
                msg
            }
        };
        if let Some(id) = entry.id {
            msg.id = id;
        }
        if entry.timestamp.is_some() {
            msg.timestamp = entry.timestamp;
        }
        msg.upvote = entry.upvote;
        msg.downvote = entry.downvote;
        msg
    }

    async fn ensure_chat_id(&mut self) -> Result<String> {
        if let Some(id) = &self.chat_id {
            return Ok(id.clone());
        }
        self.bootstrap().await?;
        self.chat_id
            .clone()
            .ok_or_else(|| WidgetError::Bootstrap("no chat id after bootstrap".into()))
    }

    /// Open the streaming channel now instead of on the first question, so
    /// a welcome frame can arrive while the transcript is empty.
    pub async fn connect(&mut self) -> Result<()> {
        if self.unavailable {
            return Err(WidgetError::Unavailable);
        }
        self.ensure_channel().await.map(|_| ())
    }

    async fn ensure_channel(&mut self) -> Result<&mut C::Channel> {
        if self.channel.is_none() {
            let chat_id = self.ensure_chat_id().await?;
            let url = self.config.socket_url(&chat_id);
            let channel = self.connector.connect(&url).await?;
            info!(chat_id = %chat_id, "channel connected");
            self.channel = Some(channel);
        }
        self.channel.as_mut().ok_or(WidgetError::Unavailable)
    }

    async fn send_frame(&mut self, frame: &OutboundFrame) -> Result<()> {
        let json = frame.to_json()?;
        let channel = self.ensure_channel().await?;
        if let Err(e) = channel.send(json).await {
            self.channel = None;
            return Err(e);
        }
        Ok(())
    }

    // -- user actions -------------------------------------------------------

    /// Send a question, or run `/clear` / `/reset`.
    ///
    /// While an exchange is running any input, blank or not, acts as a stop.
    ///
    /// # Errors
    /// Only [`WidgetError::Unavailable`]; delivery failures are rendered into
    /// the transcript and reported as [`AskOutcome::Failed`].
    pub async fn ask_question(&mut self, text: &str, images: Vec<String>) -> Result<AskOutcome> {
        if self.unavailable {
            return Err(WidgetError::Unavailable);
        }
        if self.phase != Phase::Idle {
            info!(phase = ?self.phase, "question while busy; stopping the current answer");
            self.stop().await;
            return Ok(AskOutcome::Stopped);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(AskOutcome::Ignored);
        }
        match text {
            "/clear" => {
                self.clear(false).await;
                return Ok(AskOutcome::Cleared);
            }
            "/reset" => {
                self.clear(true).await;
                return Ok(AskOutcome::Cleared);
            }
            _ => {}
        }

        // Load history before the new exchange is on screen.
        if let Err(e) = self.ensure_chat_id().await {
            debug!(error = %e, "lazy bootstrap failed");
            return Err(WidgetError::Unavailable);
        }

        let images = if self.config.disable_image_upload && !images.is_empty() {
            self.warn(format!("image upload is disabled; dropped {} attachment(s)", images.len()));
            Vec::new()
        } else {
            images
        };

        let human = ChatMessage::human(text, images.clone());
        let human_id = human.id.clone();
        let placeholder = ChatMessage::thinking();
        self.exchange = Some(Exchange {
            placeholder: placeholder.id.clone(),
            chunks: String::new(),
            streaming: false,
        });
        self.transcript.push(human);
        self.transcript.push(placeholder);
        self.emit(SessionEvent::TranscriptChanged);
        self.set_phase(Phase::Waiting);

        match self.send_frame(&OutboundFrame::question(text, &images)).await {
            Ok(()) => {
                debug!(chat_id = ?self.chat_id, images = images.len(), "question sent");
                self.emit(SessionEvent::QuestionIssued {
                    message_id: human_id,
                    text: text.to_string(),
                });
                Ok(AskOutcome::Sent)
            }
            Err(e) => {
                warn!(error = %e, "question could not be sent");
                self.finish_with_error(&e.to_string());
                Ok(AskOutcome::Failed)
            }
        }
    }

    /// Cancel the running exchange by closing the channel normally.
    pub async fn stop(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close(NORMAL_CLOSURE).await {
                warn!(error = %e, "channel close failed");
            }
        }
        self.handle_close(NORMAL_CLOSURE);
    }

    /// Record a vote. Re-sending the current vote state is a no-op.
    pub async fn vote(&mut self, message_id: &str, upvote: bool, downvote: bool) {
        let Some(msg) = self.transcript.iter().find(|m| m.id == message_id) else {
            self.warn(format!("no message {message_id} to vote on"));
            return;
        };
        if msg.upvote == upvote && msg.downvote == downvote {
            debug!(message_id, "vote unchanged");
            return;
        }
        match self.service.vote(message_id, upvote, downvote).await {
            Ok(()) => {
                if let Some(msg) = self.message_mut(message_id) {
                    msg.upvote = upvote;
                    msg.downvote = downvote;
                }
                self.emit(SessionEvent::TranscriptChanged);
            }
            Err(e) => self.warn(format!("vote failed: {e}")),
        }
    }

    /// Clear the history (`hard == false`) or reset the chat entirely.
    pub async fn clear(&mut self, hard: bool) {
        self.emit(SessionEvent::Clearing { hard });
        let chat_id = match self.ensure_chat_id().await {
            Ok(id) => id,
            Err(e) => {
                self.warn(format!("clear failed: {e}"));
                return;
            }
        };
        if let Err(e) = self.service.clear(&chat_id, hard).await {
            self.warn(format!("clear failed: {e}"));
            return;
        }
        info!(chat_id = %chat_id, hard, "history cleared");
        self.transcript.clear();
        self.exchange = None;
        self.emit(SessionEvent::TranscriptChanged);

        if hard {
            if let Some(mut channel) = self.channel.take() {
                if let Err(e) = channel.close(NORMAL_CLOSURE).await {
                    debug!(error = %e, "close during reset failed");
                }
            }
            self.chat_id = None;
            if let Err(e) = self.bootstrap().await {
                debug!(error = %e, "bootstrap after reset failed");
            }
        }
    }

    /// Push out-of-band context to the bot.
    pub async fn sync_context(&mut self, value: serde_json::Value) -> Result<()> {
        if self.unavailable {
            return Err(WidgetError::Unavailable);
        }
        self.send_frame(&OutboundFrame::context(value)).await
    }

    // -- channel events -----------------------------------------------------

    /// Wait for one channel event and apply it. Returns false when there is
    /// no open channel.
    pub async fn pump(&mut self) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };
        match channel.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => {
                self.handle_close(ABNORMAL_CLOSURE);
                false
            }
        }
    }

    /// Pump until the current exchange ends or the channel goes away.
    pub async fn run_until_idle(&mut self) {
        while self.phase != Phase::Idle && self.pump().await {}
    }

    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(raw) => self.handle_frame(&raw),
            ChannelEvent::Closed { code } => self.handle_close(code),
        }
    }

    pub fn handle_frame(&mut self, raw: &str) {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, frame = %preview(raw), "dropping malformed frame");
                return;
            }
        };
        debug!(kind = ?frame.kind, "frame received");
        match frame.kind {
            FrameKind::Welcome => self.on_welcome(frame),
            FrameKind::Start => {
                if let Some(exchange) = self.exchange.as_mut() {
                    exchange.chunks.clear();
                }
            }
            FrameKind::Message => self.on_chunk(frame.data()),
            FrameKind::Stop => self.on_stop(frame),
            FrameKind::Error => self.finish_with_error(frame.data()),
        }
    }

    /// Same teardown whatever closed the channel.
    pub fn handle_close(&mut self, code: u16) {
        self.channel = None;
        let Some(exchange) = self.exchange.take() else {
            self.set_phase(Phase::Idle);
            return;
        };
        info!(code, streamed = exchange.streaming, "channel closed during an exchange");
        if exchange.chunks.is_empty() {
            self.transcript.retain(|m| m.id != exchange.placeholder);
            self.emit(SessionEvent::TranscriptChanged);
            self.set_phase(Phase::Idle);
        } else {
            self.complete(&exchange.placeholder, exchange.chunks, None);
        }
    }

    fn on_welcome(&mut self, frame: InboundFrame) {
        if !self.transcript.is_empty() {
            debug!("welcome ignored; transcript not empty");
            return;
        }
        let html = self.renderer.render(frame.data(), RenderOptions::FINAL);
        let mut msg = ChatMessage::ai(MessageKind::Welcome, frame.data(), html);
        msg.related_questions = frame.related_question;
        msg.related_question_prompt = frame.related_question_prompt;
        if frame.timestamp.is_some() {
            msg.timestamp = frame.timestamp;
        }
        self.transcript.push(msg);
        self.emit(SessionEvent::TranscriptChanged);
    }

    fn on_chunk(&mut self, chunk: &str) {
        let Some(exchange) = self.exchange.as_mut() else {
            debug!("chunk outside an exchange; dropped");
            return;
        };
        exchange.chunks.push_str(chunk);
        let first = !exchange.streaming;
        exchange.streaming = true;
        let text = exchange.chunks.clone();
        let id = exchange.placeholder.clone();

        let html = self.renderer.render(&text, RenderOptions::STREAMING);
        if let Some(msg) = self.message_mut(&id) {
            msg.kind = MessageKind::Message;
            msg.text = text;
            msg.html = html;
        }
        if first {
            self.set_phase(Phase::Typing);
        }
        self.emit(SessionEvent::TranscriptChanged);
    }

    fn on_stop(&mut self, frame: InboundFrame) {
        let Some(exchange) = self.exchange.take() else {
            debug!("stop outside an exchange; ignored");
            return;
        };
        let text = if exchange.chunks.is_empty() {
            frame.data().to_string()
        } else {
            exchange.chunks
        };
        self.complete(&exchange.placeholder, text, Some(frame));
    }

    /// Final render plus affordances, then back to idle.
    fn complete(&mut self, placeholder: &str, text: String, stop: Option<InboundFrame>) {
        let html = self.renderer.render(&text, RenderOptions::FINAL);
        let feedback = !self.config.disable_feedback;
        let speakable = !self.config.disable_speech_playback;
        let with_references = !self.config.disable_references;

        if let Some(msg) = self.message_mut(placeholder) {
            msg.kind = MessageKind::Message;
            msg.text = text;
            msg.html = html;
            msg.feedback = feedback;
            msg.speakable = speakable;
            if let Some(stop) = stop {
                if let Some(id) = stop.id {
                    msg.id = id;
                }
                if stop.timestamp.is_some() {
                    msg.timestamp = stop.timestamp;
                }
                if with_references {
                    msg.references = stop.references;
                    msg.urls = stop.urls;
                }
                msg.related_questions = stop.related_question;
                msg.related_question_prompt = stop.related_question_prompt;
            }
        }
        self.emit(SessionEvent::TranscriptChanged);
        self.set_phase(Phase::Idle);
    }

    fn finish_with_error(&mut self, text: &str) {
        let Some(exchange) = self.exchange.take() else {
            warn!(detail = %text, "error frame outside an exchange");
            return;
        };
        let text = if text.trim().is_empty() { ERROR_FALLBACK } else { text };
        if let Some(msg) = self.message_mut(&exchange.placeholder) {
            msg.kind = MessageKind::Error;
            msg.text = text.to_string();
            msg.html = escape_html(text);
        }
        self.emit(SessionEvent::TranscriptChanged);
        self.set_phase(Phase::Idle);
    }
}

impl<S, C: Connector> std::fmt::Debug for ChatSession<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("session_id", &self.config.session_id)
            .field("chat_id", &self.chat_id)
            .field("phase", &self.phase)
            .field("messages", &self.transcript.len())
            .field("connected", &self.channel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type TestSession = ChatSession<MemoryService, MemoryConnector>;

    fn session_with(config: WidgetConfig) -> (TestSession, MemoryService, MemoryRemote) {
        let service = MemoryService::new();
        let (connector, remote) = MemoryConnector::pair();
        let session = ChatSession::new(config, service.clone(), connector, Arc::new(MarkdownRenderer::new()));
        (session, service, remote)
    }

    fn session() -> (TestSession, MemoryService, MemoryRemote) {
        session_with(WidgetConfig::builder("http://bots.test", "s1").build().unwrap())
    }

    #[tokio::test]
    async fn test_blank_question_is_ignored() {
        let (mut s, _svc, remote) = session();
        assert_eq!(s.ask_question("   ", Vec::new()).await.unwrap(), AskOutcome::Ignored);
        assert!(s.transcript().is_empty());
        assert!(remote.sent().is_empty());
    }

    #[tokio::test]
    async fn test_question_adds_human_and_placeholder() {
        let (mut s, _svc, remote) = session();
        assert_eq!(s.ask_question("hi", Vec::new()).await.unwrap(), AskOutcome::Sent);
        assert_eq!(s.phase(), Phase::Waiting);
        assert_eq!(s.transcript().len(), 2);
        assert_eq!(s.transcript()[0].role, Role::Human);
        assert!(s.transcript()[1].is_placeholder());
        assert_eq!(remote.sent()[0]["data"], "hi");
        assert_eq!(remote.connected_urls(), vec!["ws://bots.test/api/chat/s1/chat-1/ws".to_string()]);
    }

    #[tokio::test]
    async fn test_first_chunk_switches_to_typing() {
        let (mut s, _svc, _remote) = session();
        s.ask_question("hi", Vec::new()).await.unwrap();
        s.handle_frame(r#"{"type":"start"}"#);
        assert_eq!(s.phase(), Phase::Waiting);
        s.handle_frame(r#"{"type":"message","data":"Hel"}"#);
        assert_eq!(s.phase(), Phase::Typing);
        let last = s.transcript().last().unwrap();
        assert_eq!(last.kind, MessageKind::Message);
        assert!(last.html.ends_with(crate::markdown::TYPING_CURSOR));
    }

    #[tokio::test]
    async fn test_malformed_frame_changes_nothing() {
        let (mut s, _svc, _remote) = session();
        s.ask_question("hi", Vec::new()).await.unwrap();
        s.handle_frame("not json");
        s.handle_frame(r#"{"type":"mystery"}"#);
        assert_eq!(s.phase(), Phase::Waiting);
        assert!(s.transcript()[1].is_placeholder());
    }

    #[tokio::test]
    async fn test_stop_attaches_affordances_and_references() {
        let (mut s, _svc, _remote) = session();
        s.ask_question("hi", Vec::new()).await.unwrap();
        s.handle_frame(r#"{"type":"message","data":"answer"}"#);
        s.handle_frame(
            &json!({
                "type": "stop",
                "id": "srv-1",
                "references": [{"text": "doc"}],
                "related_question": ["more?"]
            })
            .to_string(),
        );
        let last = s.transcript().last().unwrap();
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(last.id, "srv-1");
        assert_eq!(last.html, "answer");
        assert!(last.feedback && last.speakable);
        assert_eq!(last.references.len(), 1);
        assert_eq!(last.related_questions, vec!["more?"]);
    }

    #[tokio::test]
    async fn test_disabled_references_and_feedback() {
        let config = WidgetConfig::builder("http://bots.test", "s1")
            .disable_references(true)
            .disable_feedback(true)
            .build()
            .unwrap();
        let (mut s, _svc, _remote) = session_with(config);
        s.ask_question("hi", Vec::new()).await.unwrap();
        s.handle_frame(r#"{"type":"stop","data":"done","references":[{"text":"doc"}]}"#);
        let last = s.transcript().last().unwrap();
        assert!(last.references.is_empty());
        assert!(!last.feedback);
        assert_eq!(last.text, "done");
    }

    #[tokio::test]
    async fn test_welcome_only_when_transcript_empty() {
        let (mut s, _svc, _remote) = session();
        s.handle_frame(r#"{"type":"welcome","data":"**Hi!**","related_question":["a?"]}"#);
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript()[0].kind, MessageKind::Welcome);
        assert_eq!(s.transcript()[0].html, "<strong>Hi!</strong>");
        s.handle_frame(r#"{"type":"welcome","data":"again"}"#);
        assert_eq!(s.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_close_strips_placeholder() {
        let (mut s, _svc, remote) = session();
        s.ask_question("hi", Vec::new()).await.unwrap();
        assert!(remote.close(1011));
        assert!(s.pump().await);
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.transcript().len(), 1);
        assert!(!s.is_connected());
    }

    #[tokio::test]
    async fn test_image_upload_disabled_drops_images() {
        let config = WidgetConfig::builder("http://bots.test", "s1")
            .disable_image_upload(true)
            .build()
            .unwrap();
        let (mut s, _svc, remote) = session_with(config);
        let mut rx = s.subscribe();
        s.ask_question("look", vec!["data:image/png;base64,AA".into()]).await.unwrap();
        assert_eq!(remote.sent()[0]["data"], "look");
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Warning(_))));
    }

    #[tokio::test]
    async fn test_connect_failure_renders_error() {
        let (mut s, _svc, remote) = session();
        remote.refuse_connections(true);
        assert_eq!(s.ask_question("hi", Vec::new()).await.unwrap(), AskOutcome::Failed);
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.transcript()[1].kind, MessageKind::Error);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_fatal() {
        let (mut s, svc, _remote) = session();
        svc.set_unavailable(true);
        let mut rx = s.subscribe();
        assert!(matches!(s.bootstrap().await, Err(WidgetError::Bootstrap(_))));
        assert!(s.is_unavailable());
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Fatal(_))));
        assert!(matches!(s.ask_question("hi", Vec::new()).await, Err(WidgetError::Unavailable)));
    }

    #[tokio::test]
    async fn test_history_goes_ahead_of_existing_messages() {
        let service = MemoryService::new().with_history(vec![HistoryEntry {
            role: Role::Ai,
            text: "earlier".into(),
            id: Some("a0".into()),
            timestamp: None,
            references: Vec::new(),
            upvote: false,
            downvote: false,
        }]);
        let (connector, _remote) = MemoryConnector::pair();
        let config = WidgetConfig::builder("http://bots.test", "s1").build().unwrap();
        let mut s = ChatSession::new(config, service, connector, Arc::new(MarkdownRenderer::new()));
        s.handle_frame(r#"{"type":"welcome","data":"hello"}"#);
        s.bootstrap().await.unwrap();
        let texts: Vec<_> = s.transcript().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["earlier", "hello"]);
    }

    #[tokio::test]
    async fn test_sync_context_sends_bot_context() {
        let (mut s, _svc, remote) = session();
        s.sync_context(json!({"page": "/docs"})).await.unwrap();
        let sent = remote.sent();
        assert_eq!(sent[0]["type"], "bot_context");
        assert_eq!(sent[0]["data"]["page"], "/docs");
    }
}
