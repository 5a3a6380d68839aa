//! Markdown to sanitized HTML.
//!
//! ## Responsibility
//! Two cooperating tokenizer passes: the block scanner classifies lines and
//! the inline scanner marks up the text inside each block. Fenced code is
//! dispatched to the [`Highlighter`].
//!
//! ## Guarantees
//! - All user text is HTML-escaped (`&`, `<`, `>` only) before any markup is
//!   added. This is the only XSS defence; nothing else strips input.
//! - Any input, including a half-streamed answer, renders without panicking
//!   and with every opened tag closed.
//! - Rendering is pure; a [`MarkdownRenderer`] can be shared across sessions
//!   and threads.
//!
//! ## NOT Responsible For
//! - Full CommonMark/GFM compliance.
//! - Persisting the typing cursor; it is re-added on every render.

mod block;
pub mod inline;

use std::sync::Arc;

use crate::highlight::Highlighter;
use crate::tokenizer::RuleTable;

/// Transient caret appended while an answer is still streaming.
pub const TYPING_CURSOR: &str = "<span class=\"typing-cursor\"></span>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub typing_cursor: bool,
    pub highlight_code: bool,
}

impl RenderOptions {
    /// While chunks are still arriving.
    pub const STREAMING: RenderOptions = RenderOptions {
        typing_cursor: true,
        highlight_code: false,
    };

    /// Once the answer is complete.
    pub const FINAL: RenderOptions = RenderOptions {
        typing_cursor: false,
        highlight_code: true,
    };
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::FINAL
    }
}

/// Owns the rule tables for both passes. Build once, render many times.
pub struct MarkdownRenderer {
    inline: Arc<RuleTable>,
    plain: RuleTable,
    highlighted: RuleTable,
    highlighter: Arc<Highlighter>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::with_highlighter(Arc::new(Highlighter::new()))
    }

    /// Share an existing language registry.
    pub fn with_highlighter(highlighter: Arc<Highlighter>) -> Self {
        let inline = Arc::new(inline::table());
        Self {
            plain: block::table(Arc::clone(&inline), None),
            highlighted: block::table(Arc::clone(&inline), Some(Arc::clone(&highlighter))),
            inline,
            highlighter,
        }
    }

    /// Render the whole of `text`. Streaming callers pass the full answer so
    /// far on every chunk.
    pub fn render(&self, text: &str, opts: RenderOptions) -> String {
        let table = if opts.highlight_code { &self.highlighted } else { &self.plain };
        let normalized;
        let text = if text.contains('\r') {
            normalized = text.replace("\r\n", "\n");
            normalized.as_str()
        } else {
            text
        };
        let mut out = table.run(text.trim_end_matches('\n'));
        if opts.typing_cursor {
            trim_trailing_breaks(&mut out);
            out.push_str(TYPING_CURSOR);
        }
        out
    }

    /// Inline markup only, for single-line text such as suggestions.
    pub fn render_inline(&self, text: &str) -> String {
        inline::render(&self.inline, text)
    }

    pub fn highlighter(&self) -> &Highlighter {
        &self.highlighter
    }
}

impl std::fmt::Debug for MarkdownRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownRenderer")
            .field("highlighter", &self.highlighter)
            .finish_non_exhaustive()
    }
}

fn trim_trailing_breaks(out: &mut String) {
    loop {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        if !out.ends_with("<br>") {
            break;
        }
        let len = out.len() - "<br>".len();
        out.truncate(len);
    }
}
