//! Crate-level error type.

use thiserror::Error;

/// Everything the widget can fail with.
///
/// Each variant carries enough context to diagnose the failure without the
/// originating error.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// No chat id could be obtained; the widget instance is unusable.
    #[error("session bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("channel connect to {url} failed: {detail}")]
    Connect { url: String, detail: String },

    #[error("channel send failed: {0}")]
    Send(String),

    #[error("channel close failed: {0}")]
    Close(String),

    /// A side-channel request reached the server but was refused.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A side-channel request never got a response.
    #[error("request to {url} failed: {detail}")]
    Request { url: String, detail: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The session was torn down after a bootstrap failure.
    #[error("chat session is unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, WidgetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let e = WidgetError::Http {
            status: 502,
            url: "http://x/api".into(),
        };
        assert_eq!(e.to_string(), "HTTP 502 from http://x/api");
    }

    #[test]
    fn test_json_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: WidgetError = parse.into();
        assert!(matches!(e, WidgetError::Json(_)));
        assert!(e.to_string().starts_with("JSON error"));
    }
}
