//! Inline scanner: code spans, strikethrough, strong, emphasis, then a regex
//! pass for links and images.
//!
//! Emphasis only opens when its delimiter follows whitespace (or starts the
//! text) and precedes a non-space character, so `snake_case_names` stay
//! literal. Strong-inside-emphasis and emphasis-inside-strong are separate
//! states so each one closes on its own delimiter.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::tokenizer::{Placement, RuleTable, ScanContext, StateId, StateRules, Transition};

const TEXT: StateId = "text";
const CODE: StateId = "code";
const STRIKE: StateId = "strike";
const STRONG: StateId = "strong";
const EM: StateId = "em";
const STRONG_IN_EM: StateId = "strong-in-em";
const EM_IN_STRONG: StateId = "em-in-strong";

/// A finished code span, or `![alt](url)` / `[text](url)`. One pass so
/// generated markup is never re-scanned; code spans match as a whole and are
/// copied through untouched.
static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<code>.*?</code>|(!?)\[([^\]]*)\]\(([^()\s"<>\x00-\x1f\x7f]+)\)"#)
        .expect("link regex is valid")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));

fn is_blank(c: Option<char>) -> bool {
    c.map_or(true, char::is_whitespace)
}

fn is_emphasis_char(c: char) -> bool {
    c == '*' || c == '_'
}

fn opens_strong(c: &ScanContext<'_>) -> bool {
    is_emphasis_char(c.ch) && c.next == Some(c.ch) && !is_blank(c.peek(1))
}

fn opens_em(c: &ScanContext<'_>) -> bool {
    is_emphasis_char(c.ch) && is_blank(c.prev) && !is_blank(c.next)
}

fn closes_strong(c: &ScanContext<'_>) -> bool {
    c.pair == Some(c.ch) && c.next == Some(c.ch)
}

fn code_open() -> Transition {
    Transition::to(CODE).when(|c| c.ch == '`').nested().placement(Placement::Drop)
}

fn strike_open() -> Transition {
    Transition::to(STRIKE)
        .when(|c| c.starts_with("~~") && !is_blank(c.peek(1)))
        .step(1)
        .nested()
        .placement(Placement::Drop)
}

fn strong_open(state: StateId) -> Transition {
    Transition::to(state)
        .when(opens_strong)
        .step(1)
        .nested()
        .pair_trigger()
        .placement(Placement::Drop)
}

fn em_open(state: StateId) -> Transition {
    Transition::to(state).when(opens_em).nested().pair_trigger().placement(Placement::Drop)
}

fn strong_close() -> Transition {
    Transition::pop().when(closes_strong).step(1).placement(Placement::Drop)
}

fn em_close() -> Transition {
    Transition::pop().when(|c| c.pair == Some(c.ch)).placement(Placement::Drop)
}

fn wrapped(tag: &str) -> StateRules {
    StateRules::new().entry(format!("<{tag}>")).exit(format!("</{tag}>"))
}

/// The inline rule table. Its default char processor escapes HTML.
pub fn table() -> RuleTable {
    RuleTable::new("markdown-inline", TEXT)
        .state(
            TEXT,
            StateRules::new()
                .on(code_open())
                .on(strike_open())
                .on(strong_open(STRONG))
                .on(em_open(EM)),
        )
        .state(
            CODE,
            wrapped("code").on(Transition::pop().when(|c| c.ch == '`').placement(Placement::Drop)),
        )
        .state(
            STRIKE,
            wrapped("del")
                .on(code_open())
                .on(Transition::pop().when(|c| c.starts_with("~~")).step(1).placement(Placement::Drop))
                .on(strong_open(STRONG))
                .on(em_open(EM)),
        )
        .state(
            STRONG,
            wrapped("strong")
                .on(code_open())
                .on(strong_close())
                .on(strike_open())
                .on(em_open(EM_IN_STRONG)),
        )
        .state(
            EM,
            wrapped("em")
                .on(code_open())
                .on(strong_open(STRONG_IN_EM))
                .on(em_close())
                .on(strike_open()),
        )
        .state(
            STRONG_IN_EM,
            wrapped("strong").on(code_open()).on(strong_close()).on(strike_open()),
        )
        .state(
            EM_IN_STRONG,
            wrapped("em").on(code_open()).on(em_close()).on(strike_open()),
        )
}

// ---------------------------------------------------------------------------
// Links and images
// ---------------------------------------------------------------------------

/// Schemes that never become live links. Browsers drop control characters
/// from URLs, so any of them hides a scheme.
fn is_refused(url: &str, image: bool) -> bool {
    if url.chars().any(char::is_control) {
        return true;
    }
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("vbscript:") {
        return true;
    }
    lower.starts_with("data:") && !(image && lower.starts_with("data:image/"))
}

/// A label that opens or closes markup it does not contain would misnest.
fn balanced(label: &str) -> bool {
    let (mut open, mut close) = (0usize, 0usize);
    for tag in TAG.find_iter(label) {
        if tag.as_str().starts_with("</") {
            close += 1;
        } else {
            open += 1;
        }
    }
    open == close
}

/// Convert `![alt](url)` and `[text](url)` in already-escaped markup.
pub fn resolve_links(markup: &str) -> String {
    if !markup.contains("](") {
        return markup.to_string();
    }
    LINK.replace_all(markup, |caps: &Captures<'_>| {
        if caps.get(3).is_none() {
            return caps[0].to_string();
        }
        let image = !caps[1].is_empty();
        let (label, url) = (&caps[2], &caps[3]);
        if is_refused(url, image) || (!image && label.is_empty()) || !balanced(label) {
            return caps[0].to_string();
        }
        if image {
            let alt = TAG.replace_all(label, "").replace('"', "&quot;");
            format!("<img src=\"{url}\" alt=\"{alt}\">")
        } else {
            format!("<a href=\"{url}\" target=\"_blank\" rel=\"noopener noreferrer\">{label}</a>")
        }
    })
    .into_owned()
}

/// Escape and mark up one span of inline text.
pub fn render(table: &RuleTable, text: &str) -> String {
    resolve_links(&table.run(text))
}
