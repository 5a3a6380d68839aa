//! Wire frames exchanged over the streaming channel.
//!
//! Inbound frames are JSON envelopes discriminated by `type`; every payload
//! field is optional. Outbound frames carry a question or a context sync.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Welcome,
    Start,
    Message,
    Stop,
    Error,
}

/// Servers send either epoch milliseconds or a preformatted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(u64),
    Text(String),
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timestamp::Millis(ms) => write!(f, "{ms}"),
            Timestamp::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMetadata {
    #[serde(default)]
    pub source: Option<String>,
}

/// A retrieved passage the answer was grounded on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: ReferenceMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub related_question: Vec<String>,
    #[serde(default)]
    pub related_question_prompt: Option<String>,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn data(&self) -> &str {
        self.data.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundData {
    Text(String),
    Parts(Vec<ContentPart>),
    Value(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub role: &'static str,
    pub data: OutboundData,
    pub timestamp: u64,
}

impl OutboundFrame {
    /// A human question. With images attached the data becomes a list of
    /// content parts, text first.
    pub fn question(text: &str, images: &[String]) -> Self {
        let data = if images.is_empty() {
            OutboundData::Text(text.to_string())
        } else {
            let mut parts = vec![ContentPart::Text { text: text.to_string() }];
            parts.extend(images.iter().map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            }));
            OutboundData::Parts(parts)
        };
        Self {
            kind: "message",
            role: "human",
            data,
            timestamp: now_ms(),
        }
    }

    /// Out-of-band context for the bot.
    pub fn context(value: serde_json::Value) -> Self {
        Self {
            kind: "bot_context",
            role: "bot",
            data: OutboundData::Value(value),
            timestamp: now_ms(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_frame() {
        let f = InboundFrame::parse(r#"{"type":"start"}"#).unwrap();
        assert_eq!(f.kind, FrameKind::Start);
        assert_eq!(f.data(), "");
        assert!(f.references.is_empty());
    }

    #[test]
    fn test_parse_stop_frame_with_extras() {
        let raw = json!({
            "type": "stop",
            "id": "m-1",
            "timestamp": 1700000000000u64,
            "references": [{"text": "doc", "score": 0.9, "metadata": {"source": "a.pdf"}}],
            "urls": ["https://x"],
            "related_question": ["why?"],
            "related_question_prompt": "More:"
        })
        .to_string();
        let f = InboundFrame::parse(&raw).unwrap();
        assert_eq!(f.kind, FrameKind::Stop);
        assert_eq!(f.id.as_deref(), Some("m-1"));
        assert_eq!(f.timestamp, Some(Timestamp::Millis(1_700_000_000_000)));
        assert_eq!(f.references[0].metadata.source.as_deref(), Some("a.pdf"));
        assert_eq!(f.related_question, vec!["why?"]);
    }

    #[test]
    fn test_string_timestamp() {
        let f = InboundFrame::parse(r#"{"type":"message","data":"x","timestamp":"10:42"}"#).unwrap();
        assert_eq!(f.timestamp.map(|t| t.to_string()).as_deref(), Some("10:42"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(InboundFrame::parse(r#"{"type":"bogus"}"#).is_err());
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_question_without_images_is_plain_text() {
        let v: serde_json::Value = serde_json::from_str(&OutboundFrame::question("hi", &[]).to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["role"], "human");
        assert_eq!(v["data"], "hi");
        assert!(v["timestamp"].is_u64());
    }

    #[test]
    fn test_question_with_images_uses_parts() {
        let frame = OutboundFrame::question("look", &["data:image/png;base64,AA".to_string()]);
        let v: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(v["data"][0], json!({"type": "text", "text": "look"}));
        assert_eq!(
            v["data"][1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AA"}})
        );
    }

    #[test]
    fn test_context_frame() {
        let v: serde_json::Value =
            serde_json::from_str(&OutboundFrame::context(json!({"page": "/pricing"})).to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "bot_context");
        assert_eq!(v["role"], "bot");
        assert_eq!(v["data"]["page"], "/pricing");
    }
}
