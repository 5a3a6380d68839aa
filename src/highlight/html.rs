//! HTML: tags, attributes, quoted attribute values and comments.
//!
//! `<script>` and `<style>` bodies are cut out before the outer pass, rendered
//! with the JavaScript and CSS tables, and spliced back in afterwards.

use crate::tokenizer::{Placement, RuleTable, StateRules, TokenContext, Transition};

use super::{Highlighter, Language, CLASS_ATTR, CLASS_COMMENT, CLASS_STRING, CLASS_TAG};

const TEXT: &str = "text";
const TAG: &str = "tag";
const ATTR_VALUE: &str = "attr-value";
const COMMENT: &str = "comment";

/// Private-use character that never survives from rendered input.
const MARKER_CHAR: char = '\u{E000}';

fn tag_token(t: &TokenContext<'_>) -> String {
    if t.token.is_empty() || matches!(t.before, Some('<') | Some('/')) {
        t.token.to_string()
    } else {
        format!("<span class=\"{CLASS_ATTR}\">{}</span>", t.token)
    }
}

pub fn table() -> RuleTable {
    RuleTable::new("html", TEXT)
        .state(
            TEXT,
            StateRules::new()
                .on(Transition::to(COMMENT).when(|c| c.starts_with("<!--")).step(3))
                .on(Transition::to(TAG).when(|c| {
                    c.ch == '<' && c.next.is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'))
                })),
        )
        .state(
            TAG,
            StateRules::new()
                .span(CLASS_TAG)
                .on(Transition::to(ATTR_VALUE)
                    .when(|c| c.ch == '"' || c.ch == '\'')
                    .nested()
                    .pair_trigger())
                .on(Transition::to(TEXT).when(|c| c.ch == '>').placement(Placement::Closing))
                .on(Transition::stay().when(|c| c.ch.is_whitespace() || c.ch == '='))
                .tokens(tag_token),
        )
        .state(
            ATTR_VALUE,
            StateRules::new()
                .span(CLASS_STRING)
                .on(Transition::pop().when(|c| Some(c.ch) == c.pair)),
        )
        .state(
            COMMENT,
            StateRules::new().span(CLASS_COMMENT).on(Transition::to(TEXT)
                .when(|c| c.starts_with("-->"))
                .step(2)
                .placement(Placement::Closing)),
        )
}

/// One `<script>`/`<style>` body lifted out of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Embedded {
    pub language: Language,
    pub body: String,
}

/// A marker string that does not occur anywhere in `code`.
fn unique_marker(code: &str) -> String {
    let mut marker = MARKER_CHAR.to_string();
    while code.contains(&marker) {
        marker.push(MARKER_CHAR);
    }
    marker
}

fn placeholder(marker: &str, index: usize) -> String {
    format!("{marker}{index}{marker}")
}

/// Replace every script/style body with an indexed placeholder.
pub(crate) fn extract(code: &str, marker: &str) -> (String, Vec<Embedded>) {
    let lower = code.to_ascii_lowercase();
    let mut skeleton = String::with_capacity(code.len());
    let mut embedded = Vec::new();
    let mut cursor = 0;

    while let Some((tag, language, open_at)) = next_embedded_tag(&lower, cursor) {
        let Some(gt) = lower[open_at..].find('>').map(|p| open_at + p + 1) else {
            break;
        };
        let close_pat = format!("</{tag}");
        let close_at = lower[gt..].find(&close_pat).map(|p| gt + p).unwrap_or(code.len());

        skeleton.push_str(&code[cursor..gt]);
        skeleton.push_str(&placeholder(marker, embedded.len()));
        embedded.push(Embedded {
            language,
            body: code[gt..close_at].to_string(),
        });
        cursor = close_at;
    }
    skeleton.push_str(&code[cursor..]);
    (skeleton, embedded)
}

fn next_embedded_tag(lower: &str, from: usize) -> Option<(&'static str, Language, usize)> {
    let candidates = [("script", Language::JavaScript), ("style", Language::Css)];
    candidates
        .iter()
        .filter_map(|(tag, lang)| {
            let pat = format!("<{tag}");
            let mut search = from;
            // `<scripts>` or `<styled-x>` are not embedded regions
            while let Some(p) = lower[search..].find(&pat) {
                let at = search + p;
                let after = lower[at + pat.len()..].chars().next();
                if matches!(after, None | Some('>') | Some('/')) || after.is_some_and(char::is_whitespace) {
                    return Some((*tag, *lang, at));
                }
                search = at + pat.len();
            }
            None
        })
        .min_by_key(|(_, _, at)| *at)
}

/// Highlight an HTML document, including embedded script and style bodies.
pub fn highlight(highlighter: &Highlighter, code: &str) -> String {
    let marker = unique_marker(code);
    let (skeleton, embedded) = extract(code, &marker);
    let mut out = highlighter.table(Language::Html).run(&skeleton);
    for (index, part) in embedded.iter().enumerate() {
        let rendered = highlighter.table(part.language).run(&part.body);
        out = out.replacen(&placeholder(&marker, index), &rendered, 1);
    }
    out
}
