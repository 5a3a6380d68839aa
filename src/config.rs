//! Widget configuration: the endpoint, the session and the feature toggles.
//!
//! Options are plain named fields. Nothing is read from the environment or
//! from files; the embedding application (or the CLI) fills them in.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WidgetError};

/// Options for one widget instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Base URL of the chat service (e.g. `https://bots.example.com`).
    pub base_url: String,
    pub session_id: String,
    pub disable_references: bool,
    pub disable_feedback: bool,
    pub disable_speech_playback: bool,
    pub disable_speech_input: bool,
    pub disable_image_upload: bool,
    /// Replaces the default header caption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl WidgetConfig {
    /// Start building a config for `session_id` on `base_url`.
    pub fn builder(base_url: impl Into<String>, session_id: impl Into<String>) -> WidgetConfigBuilder {
        WidgetConfigBuilder::new(base_url, session_id)
    }

    fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `GET` here returns `{"chat_id": "..."}`, creating the chat if needed.
    pub fn chat_id_url(&self) -> String {
        format!("{}/api/chat/{}/id", self.root(), self.session_id)
    }

    pub fn history_url(&self, chat_id: &str) -> String {
        format!("{}/api/chat/{}/{chat_id}/history", self.root(), self.session_id)
    }

    pub fn clear_url(&self, chat_id: &str) -> String {
        format!("{}/api/chat/{}/{chat_id}/clear", self.root(), self.session_id)
    }

    pub fn vote_url(&self) -> String {
        format!("{}/api/chat/vote", self.root())
    }

    /// Streaming endpoint; `http` becomes `ws` and `https` becomes `wss`.
    pub fn socket_url(&self, chat_id: &str) -> String {
        let root = self.root();
        let ws_root = if let Some(rest) = root.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = root.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            root.to_string()
        };
        format!("{ws_root}/api/chat/{}/{chat_id}/ws", self.session_id)
    }

    /// Check the invariants [`WidgetConfigBuilder::build`] enforces.
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        match url.strip_prefix("https://").or_else(|| url.strip_prefix("http://")) {
            None => {
                return Err(WidgetError::Config(format!(
                    "base_url must start with http:// or https://, got {url:?}"
                )))
            }
            Some(host) if host.trim_matches('/').is_empty() => {
                return Err(WidgetError::Config("base_url has no host".into()))
            }
            Some(_) => {}
        }
        let session = self.session_id.trim();
        if session.is_empty() {
            return Err(WidgetError::Config("session_id must not be empty".into()));
        }
        if session.contains('/') || session.contains(char::is_whitespace) {
            return Err(WidgetError::Config(format!(
                "session_id must be a single path segment, got {session:?}"
            )));
        }
        Ok(())
    }
}

/// Builder for [`WidgetConfig`].
///
/// # Example
/// ```rust,ignore
/// let config = WidgetConfig::builder("https://bots.example.com", "support")
///     .disable_feedback(true)
///     .caption("Ask us anything")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct WidgetConfigBuilder {
    config: WidgetConfig,
}

impl WidgetConfigBuilder {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            config: WidgetConfig {
                base_url: base_url.into(),
                session_id: session_id.into(),
                ..WidgetConfig::default()
            },
        }
    }

    pub fn disable_references(mut self, on: bool) -> Self {
        self.config.disable_references = on;
        self
    }

    pub fn disable_feedback(mut self, on: bool) -> Self {
        self.config.disable_feedback = on;
        self
    }

    pub fn disable_speech_playback(mut self, on: bool) -> Self {
        self.config.disable_speech_playback = on;
        self
    }

    pub fn disable_speech_input(mut self, on: bool) -> Self {
        self.config.disable_speech_input = on;
        self
    }

    pub fn disable_image_upload(mut self, on: bool) -> Self {
        self.config.disable_image_upload = on;
        self
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.config.caption = Some(caption.into());
        self
    }

    /// # Errors
    /// [`WidgetError::Config`] when the base URL is not `http(s)://` or the
    /// session id is empty or not a single path segment.
    pub fn build(self) -> Result<WidgetConfig> {
        let mut config = self.config;
        config.base_url = config.base_url.trim().to_string();
        config.session_id = config.session_id.trim().to_string();
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WidgetConfig {
        WidgetConfig::builder("https://bots.example.com/", "support").build().unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let c = config();
        assert!(!c.disable_feedback);
        assert!(!c.disable_image_upload);
        assert!(c.caption.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let c = WidgetConfig::builder("http://localhost:8080", "s1")
            .disable_references(true)
            .disable_feedback(true)
            .disable_speech_playback(true)
            .disable_speech_input(true)
            .disable_image_upload(true)
            .caption("Hi")
            .build()
            .unwrap();
        assert!(c.disable_references && c.disable_feedback && c.disable_image_upload);
        assert!(c.disable_speech_playback && c.disable_speech_input);
        assert_eq!(c.caption.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = WidgetConfig::builder("ftp://x", "s").build().unwrap_err();
        assert!(matches!(err, WidgetError::Config(_)));
    }

    #[test]
    fn test_rejects_empty_session() {
        assert!(WidgetConfig::builder("http://x", "  ").build().is_err());
        assert!(WidgetConfig::builder("http://x", "a/b").build().is_err());
    }

    #[test]
    fn test_endpoint_urls() {
        let c = config();
        assert_eq!(c.chat_id_url(), "https://bots.example.com/api/chat/support/id");
        assert_eq!(c.history_url("c1"), "https://bots.example.com/api/chat/support/c1/history");
        assert_eq!(c.clear_url("c1"), "https://bots.example.com/api/chat/support/c1/clear");
        assert_eq!(c.vote_url(), "https://bots.example.com/api/chat/vote");
    }

    #[test]
    fn test_socket_url_scheme() {
        assert_eq!(config().socket_url("c1"), "wss://bots.example.com/api/chat/support/c1/ws");
        let plain = WidgetConfig::builder("http://localhost:8080", "s").build().unwrap();
        assert_eq!(plain.socket_url("c"), "ws://localhost:8080/api/chat/s/c/ws");
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let c: WidgetConfig =
            serde_json::from_str(r#"{"base_url":"http://x","session_id":"s","disable_feedback":true}"#).unwrap();
        assert!(c.disable_feedback);
        assert!(!c.disable_references);
        assert!(c.validate().is_ok());
    }
}
