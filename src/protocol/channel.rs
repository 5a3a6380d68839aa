//! Bidirectional message channel abstraction.
//!
//! [`Channel`] is the only thing the session knows about the transport.
//! [`WsChannel`] speaks WebSocket through `tokio-tungstenite`;
//! [`MemoryChannel`] is an in-process pair for tests and demos.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Result, WidgetError};

/// Close code for a deliberate, clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
const NO_STATUS: u16 = 1005;

/// What a channel delivers to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One text frame, not yet parsed.
    Frame(String),
    Closed { code: u16 },
}

#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Next event, or `None` once the channel is exhausted.
    async fn recv(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self, code: u16) -> Result<()>;
}

/// Opens channels on demand; the session connects lazily.
#[async_trait]
pub trait Connector: Send + Sync {
    type Channel: Channel;

    async fn connect(&self, url: &str) -> Result<Self::Channel>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Channel = WsChannel;

    async fn connect(&self, url: &str) -> Result<WsChannel> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| WidgetError::Connect {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
        debug!(url, "websocket connected");
        Ok(WsChannel { stream })
    }
}

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| WidgetError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Some(ChannelEvent::Frame(text)),
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(NO_STATUS);
                    return Some(ChannelEvent::Closed { code });
                }
                Some(Ok(_)) => {} // binary / ping / pong
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    return Some(ChannelEvent::Closed { code: ABNORMAL_CLOSURE });
                }
                None => return None,
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| WidgetError::Close(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Shared {
    /// Feeds the most recently connected channel.
    inbound: Option<mpsc::UnboundedSender<ChannelEvent>>,
    sent: Vec<String>,
    urls: Vec<String>,
    closed: Vec<u16>,
    refuse: bool,
}

/// Hands out [`MemoryChannel`]s wired to one [`MemoryRemote`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

/// The far end of every channel a [`MemoryConnector`] opens.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    shared: Arc<Mutex<Shared>>,
}

pub struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryRemote) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            MemoryConnector {
                shared: Arc::clone(&shared),
            },
            MemoryRemote { shared },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Channel = MemoryChannel;

    async fn connect(&self, url: &str) -> Result<MemoryChannel> {
        let mut guard = self
            .shared
            .lock()
            .map_err(|_| WidgetError::Connect {
                url: url.to_string(),
                detail: "memory channel poisoned".into(),
            })?;
        if guard.refuse {
            return Err(WidgetError::Connect {
                url: url.to_string(),
                detail: "connection refused".into(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        guard.inbound = Some(tx);
        guard.urls.push(url.to_string());
        Ok(MemoryChannel {
            inbound: rx,
            shared: Arc::clone(&self.shared),
        })
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, frame: String) -> Result<()> {
        match self.shared.lock() {
            Ok(mut guard) => {
                guard.sent.push(frame);
                Ok(())
            }
            Err(_) => Err(WidgetError::Send("memory channel poisoned".into())),
        }
    }

    async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        if let Ok(mut guard) = self.shared.lock() {
            guard.closed.push(code);
            guard.inbound = None;
        }
        self.inbound.close();
        Ok(())
    }
}

impl MemoryRemote {
    fn push(&self, event: ChannelEvent) -> bool {
        match self.shared.lock() {
            Ok(guard) => guard.inbound.as_ref().is_some_and(|tx| tx.send(event).is_ok()),
            Err(_) => false,
        }
    }

    /// Deliver one JSON frame. Returns false if no channel is open.
    pub fn push_frame(&self, frame: serde_json::Value) -> bool {
        self.push(ChannelEvent::Frame(frame.to_string()))
    }

    /// Deliver text verbatim, malformed or not.
    pub fn push_raw(&self, text: &str) -> bool {
        self.push(ChannelEvent::Frame(text.to_string()))
    }

    /// Close from the server side.
    pub fn close(&self, code: u16) -> bool {
        self.push(ChannelEvent::Closed { code })
    }

    /// Make later connection attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        if let Ok(mut guard) = self.shared.lock() {
            guard.refuse = refuse;
        }
    }

    /// Every frame the client sent, parsed.
    pub fn sent(&self) -> Vec<serde_json::Value> {
        match self.shared.lock() {
            Ok(guard) => guard
                .sent
                .iter()
                .filter_map(|s| serde_json::from_str(s).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn connected_urls(&self) -> Vec<String> {
        self.shared.lock().map(|g| g.urls.clone()).unwrap_or_default()
    }

    /// Close codes the client sent, oldest first.
    pub fn close_codes(&self) -> Vec<u16> {
        self.shared.lock().map(|g| g.closed.clone()).unwrap_or_default()
    }
}
