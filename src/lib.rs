//! Text engine for an embeddable chat widget.
//!
//! - [`tokenizer`]: a generic table-driven character state machine.
//! - [`highlight`]: rule tables for a dozen programming languages.
//! - [`markdown`]: a two-pass Markdown renderer built on the tokenizer.
//! - [`protocol`]: the streaming chat session that ties them together.
//!
//! ```
//! use chat_widget_engine::markdown::{MarkdownRenderer, RenderOptions};
//!
//! let html = MarkdownRenderer::new().render("Hello **world**", RenderOptions::FINAL);
//! assert_eq!(html, "Hello <strong>world</strong>");
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod highlight;
pub mod markdown;
pub mod protocol;
pub mod tokenizer;

pub use config::{WidgetConfig, WidgetConfigBuilder};
pub use error::{Result, WidgetError};
pub use highlight::{Highlighter, Language};
pub use markdown::{MarkdownRenderer, RenderOptions, TYPING_CURSOR};
pub use protocol::{AskOutcome, ChatMessage, ChatSession, Phase, SessionEvent};
pub use tokenizer::{escape_html, RuleTable};
