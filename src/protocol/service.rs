//! Side-channel operations outside the stream: chat id, history, clear, vote.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transcript::HistoryEntry;
use crate::config::WidgetConfig;
use crate::error::{Result, WidgetError};

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Fetch the chat id for this session, creating the chat if needed.
    async fn chat_id(&self) -> Result<String>;

    async fn history(&self, chat_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Soft clear when `hard` is false; full reset otherwise.
    async fn clear(&self, chat_id: &str, hard: bool) -> Result<()>;

    async fn vote(&self, message_id: &str, upvote: bool, downvote: bool) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub messageid: String,
    pub upvote: bool,
    pub downvote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatIdResponse {
    chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClearRequest {
    reset: bool,
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// [`ChatService`] over the service's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpChatService {
    config: WidgetConfig,
    client: reqwest::Client,
}

impl HttpChatService {
    /// Connect timeout 5 s, request timeout 30 s.
    pub fn new(config: WidgetConfig) -> Self {
        // Client::builder() only fails in broken TLS environments; fall back
        // to the default client rather than panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn check(url: &str, resp: reqwest::Result<reqwest::Response>) -> Result<reqwest::Response> {
        let resp = resp.map_err(|e| WidgetError::Request {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(WidgetError::Http {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, url: &str) -> Result<T> {
        let resp = Self::check(url, self.client.get(url).send().await)?;
        let bytes = resp.bytes().await.map_err(|e| WidgetError::Request {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_json<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<()> {
        Self::check(url, self.client.post(url).json(body).send().await)?;
        Ok(())
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn chat_id(&self) -> Result<String> {
        let url = self.config.chat_id_url();
        let resp: ChatIdResponse = self.get_json(&url).await?;
        debug!(chat_id = %resp.chat_id, "chat id resolved");
        Ok(resp.chat_id)
    }

    async fn history(&self, chat_id: &str) -> Result<Vec<HistoryEntry>> {
        self.get_json(&self.config.history_url(chat_id)).await
    }

    async fn clear(&self, chat_id: &str, hard: bool) -> Result<()> {
        self.post_json(&self.config.clear_url(chat_id), &ClearRequest { reset: hard }).await
    }

    async fn vote(&self, message_id: &str, upvote: bool, downvote: bool) -> Result<()> {
        let body = VoteRequest {
            messageid: message_id.to_string(),
            upvote,
            downvote,
        };
        self.post_json(&self.config.vote_url(), &body).await
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// One recorded side-channel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    ChatId,
    History(String),
    Clear { chat_id: String, hard: bool },
    Vote(VoteRequest),
}

#[derive(Debug, Default)]
struct MemoryState {
    issued: usize,
    history: Vec<HistoryEntry>,
    calls: Vec<ServiceCall>,
    unavailable: bool,
    fail_side_requests: bool,
}

/// Records every request and answers from canned state.
#[derive(Debug, Clone, Default)]
pub struct MemoryService {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// History returned for every chat id.
    pub fn with_history(self, history: Vec<HistoryEntry>) -> Self {
        if let Ok(mut guard) = self.state.lock() {
            guard.history = history;
        }
        self
    }

    /// Make `chat_id` fail, as if the session cannot be created.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut guard) = self.state.lock() {
            guard.unavailable = unavailable;
        }
    }

    /// Make clear and vote fail with HTTP 500.
    pub fn fail_side_requests(&self, fail: bool) {
        if let Ok(mut guard) = self.state.lock() {
            guard.fail_side_requests = fail;
        }
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state.lock().map(|g| g.calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: ServiceCall) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| WidgetError::Request {
                url: "memory://".into(),
                detail: "state poisoned".into(),
            })?;
        guard.calls.push(call);
        Ok(guard)
    }

    fn side_result(failing: bool, path: &str) -> Result<()> {
        if failing {
            return Err(WidgetError::Http {
                status: 500,
                url: format!("memory://{path}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatService for MemoryService {
    async fn chat_id(&self) -> Result<String> {
        let mut guard = self.record(ServiceCall::ChatId)?;
        if guard.unavailable {
            return Err(WidgetError::Http {
                status: 503,
                url: "memory://id".into(),
            });
        }
        guard.issued += 1;
        Ok(format!("chat-{}", guard.issued))
    }

    async fn history(&self, chat_id: &str) -> Result<Vec<HistoryEntry>> {
        let guard = self.record(ServiceCall::History(chat_id.to_string()))?;
        Ok(guard.history.clone())
    }

    async fn clear(&self, chat_id: &str, hard: bool) -> Result<()> {
        let mut guard = self.record(ServiceCall::Clear {
            chat_id: chat_id.to_string(),
            hard,
        })?;
        let result = Self::side_result(guard.fail_side_requests, "clear");
        if result.is_ok() {
            guard.history.clear();
        }
        result
    }

    async fn vote(&self, message_id: &str, upvote: bool, downvote: bool) -> Result<()> {
        let guard = self.record(ServiceCall::Vote(VoteRequest {
            messageid: message_id.to_string(),
            upvote,
            downvote,
        }))?;
        Self::side_result(guard.fail_side_requests, "vote")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_service_issues_fresh_ids() {
        let svc = MemoryService::new();
        assert_eq!(svc.chat_id().await.unwrap(), "chat-1");
        assert_eq!(svc.chat_id().await.unwrap(), "chat-2");
        assert_eq!(svc.calls(), vec![ServiceCall::ChatId, ServiceCall::ChatId]);
    }

    #[tokio::test]
    async fn test_memory_service_unavailable() {
        let svc = MemoryService::new();
        svc.set_unavailable(true);
        assert!(matches!(svc.chat_id().await, Err(WidgetError::Http { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_memory_service_clear_empties_history() {
        let entry = HistoryEntry {
            role: super::super::transcript::Role::Human,
            text: "hi".into(),
            id: None,
            timestamp: None,
            references: Vec::new(),
            upvote: false,
            downvote: false,
        };
        let svc = MemoryService::new().with_history(vec![entry]);
        assert_eq!(svc.history("c").await.unwrap().len(), 1);
        svc.clear("c", false).await.unwrap();
        assert!(svc.history("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_service_failing_vote_is_recorded() {
        let svc = MemoryService::new();
        svc.fail_side_requests(true);
        assert!(svc.vote("m", true, false).await.is_err());
        assert_eq!(
            svc.calls(),
            vec![ServiceCall::Vote(VoteRequest {
                messageid: "m".into(),
                upvote: true,
                downvote: false
            })]
        );
    }

    #[test]
    fn test_vote_request_shape() {
        let v = serde_json::to_value(VoteRequest {
            messageid: "m1".into(),
            upvote: false,
            downvote: true,
        })
        .unwrap();
        assert_eq!(v, serde_json::json!({"messageid": "m1", "upvote": false, "downvote": true}));
    }

    #[test]
    fn test_http_service_builds() {
        let config = WidgetConfig::builder("http://localhost:1", "s").build().unwrap();
        let svc = HttpChatService::new(config);
        assert_eq!(svc.config.vote_url(), "http://localhost:1/api/chat/vote");
    }
}
