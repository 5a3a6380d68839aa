//! Transcript entries.

use serde::{Deserialize, Serialize};

use super::frames::{now_ms, Reference, Timestamp};
use crate::tokenizer::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    /// Placeholder shown between send and the first chunk.
    Thinking,
    Welcome,
    Error,
}

/// One line of the conversation.
///
/// `html` is always the sanitized rendering of `text`. Once an answer is
/// final only `upvote`/`downvote` change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub kind: MessageKind,
    pub text: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_question_prompt: Option<String>,
    pub upvote: bool,
    pub downvote: bool,
    /// Vote buttons are offered.
    pub feedback: bool,
    /// Speech playback is offered.
    pub speakable: bool,
}

impl ChatMessage {
    fn new(role: Role, kind: MessageKind, text: String, html: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            kind,
            text,
            html,
            timestamp: Some(Timestamp::Millis(now_ms())),
            images: Vec::new(),
            references: Vec::new(),
            urls: Vec::new(),
            related_questions: Vec::new(),
            related_question_prompt: None,
            upvote: false,
            downvote: false,
            feedback: false,
            speakable: false,
        }
    }

    /// Human text is shown escaped, never as Markdown.
    pub fn human(text: &str, images: Vec<String>) -> Self {
        Self {
            images,
            ..Self::new(Role::Human, MessageKind::Message, text.to_string(), escape_html(text))
        }
    }

    pub fn thinking() -> Self {
        Self::new(Role::Ai, MessageKind::Thinking, String::new(), String::new())
    }

    pub fn ai(kind: MessageKind, text: &str, html: String) -> Self {
        Self::new(Role::Ai, kind, text.to_string(), html)
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == MessageKind::Thinking
    }
}

/// One entry of the chat history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub upvote: bool,
    #[serde(default)]
    pub downvote: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_message_is_escaped() {
        let m = ChatMessage::human("<b>hi</b>", Vec::new());
        assert_eq!(m.role, Role::Human);
        assert_eq!(m.html, "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(m.text, "<b>hi</b>");
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ChatMessage::thinking().id, ChatMessage::thinking().id);
    }

    #[test]
    fn test_thinking_is_placeholder() {
        let m = ChatMessage::thinking();
        assert!(m.is_placeholder());
        assert_eq!(m.role, Role::Ai);
        assert!(m.text.is_empty());
    }

    #[test]
    fn test_history_entry_defaults() {
        let e: HistoryEntry = serde_json::from_str(r#"{"role":"ai","text":"hello"}"#).unwrap();
        assert_eq!(e.role, Role::Ai);
        assert!(!e.upvote && !e.downvote);
        assert!(e.id.is_none());
    }

    #[test]
    fn test_serialized_roles_are_lowercase() {
        let v = serde_json::to_value(ChatMessage::human("x", Vec::new())).unwrap();
        assert_eq!(v["role"], "human");
        assert_eq!(v["kind"], "message");
    }
}
