//! Block scanner.
//!
//! ## Responsibility
//! Classifies each line with ordered line-shape predicates and renders the
//! resulting blocks. Paragraph, heading, list, quote and table text is handed
//! to the inline scanner; fenced code goes to the [`Highlighter`].
//!
//! ## Guarantees
//! - Block detection happens only at line starts, via zero-width transitions,
//!   so the first character of a line is rescanned in the block it opens.
//! - The fence body bypasses inline processing entirely. Only a line made of
//!   backticks closes a fence; an unterminated fence runs to end of input.
//! - The block table's char processor is [`verbatim`]: escaping happens once,
//!   in the inline scanner or the highlighter.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::highlight::Highlighter;
use crate::tokenizer::{
    escape_html, verbatim, Placement, RuleTable, ScanContext, StateId, StateRules, TokenContext, Transition,
};

use super::inline;

pub(super) const PARAGRAPH: StateId = "paragraph";
const HEADING: StateId = "heading";
const RULE: StateId = "rule";
const QUOTE: StateId = "quote";
const LIST: StateId = "list";
const OLIST: StateId = "ordered-list";
const TABLE: StateId = "table";
const FENCE: StateId = "fence";

// ---------------------------------------------------------------------------
// Line shapes
// ---------------------------------------------------------------------------

static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(#{1,6})\s+(.*)$").expect("heading pattern is valid"));
static RULE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}(?:-[ \t-]*-[ \t-]*-[ \t-]*|\*[ \t*]*\*[ \t*]*\*[ \t*]*|_[ \t_]*_[ \t_]*_[ \t_]*)$")
        .expect("rule pattern is valid")
});
static QUOTE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}>\s?(.*)$").expect("quote pattern is valid"));
static UNORDERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)([-*+])\s+(.*)$").expect("unordered pattern is valid"));
static ORDERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(\d{1,9}[.)])\s+(.*)$").expect("ordered pattern is valid"));

fn is_fence_open(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_fence_close(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && t.chars().all(|c| c == '`')
}

fn is_table_row(line: &str) -> bool {
    line.contains('|') && !line.trim().is_empty()
}

fn is_table_separator(line: &str) -> bool {
    let t = line.trim();
    t.contains('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn split_row(line: &str) -> Vec<&str> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    t.split('|').map(str::trim).collect()
}

/// Characters of the current line after the one under the cursor.
fn rest_of_line_extra(c: &ScanContext<'_>) -> usize {
    c.rest_of_line().chars().count().saturating_sub(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Fence,
    Table,
    Heading,
    Rule,
    Quote,
    Ordered,
    Unordered,
}

impl Block {
    /// Most specific shape first.
    const PRIORITY: [Block; 7] = [
        Block::Fence,
        Block::Table,
        Block::Heading,
        Block::Rule,
        Block::Quote,
        Block::Ordered,
        Block::Unordered,
    ];

    fn state(self) -> StateId {
        match self {
            Block::Fence => FENCE,
            Block::Table => TABLE,
            Block::Heading => HEADING,
            Block::Rule => RULE,
            Block::Quote => QUOTE,
            Block::Ordered => OLIST,
            Block::Unordered => LIST,
        }
    }

    fn opens(self, c: &ScanContext<'_>) -> bool {
        let line = c.rest_of_line();
        match self {
            Block::Fence => is_fence_open(&line),
            Block::Table => is_table_row(&line) && c.following_line().is_some_and(|next| is_table_separator(&next)),
            Block::Heading => HEADING_LINE.is_match(&line),
            Block::Rule => RULE_LINE.is_match(&line),
            Block::Quote => QUOTE_LINE.is_match(&line),
            Block::Ordered => ORDERED_LINE.is_match(&line),
            Block::Unordered => UNORDERED_LINE.is_match(&line),
        }
    }

    fn opener(self) -> Transition {
        let t = Transition::to(self.state()).when(move |c| c.at_line_start() && self.opens(c));
        match self {
            // The whole opening line, tag included, starts the fence token.
            Block::Fence => t.step_with(rest_of_line_extra).placement(Placement::Carry),
            _ => t.zero_width(),
        }
    }
}

/// Openers for every block kind except the one `current` already is.
fn openers(current: StateId) -> impl Iterator<Item = Transition> {
    Block::PRIORITY
        .into_iter()
        .filter(move |b| b.state() != current)
        .map(Block::opener)
}

/// Leave a container for a paragraph when the line does not continue it.
fn fall_back(continues: fn(&str) -> bool) -> Transition {
    Transition::to(PARAGRAPH)
        .when(move |c| c.at_line_start() && !continues(&c.rest_of_line()))
        .zero_width()
}

fn newline() -> Transition {
    Transition::stay().when(|c| c.ch == '\n').placement(Placement::Drop)
}

fn end_of_line() -> Transition {
    Transition::to(PARAGRAPH).when(|c| c.ch == '\n').placement(Placement::Drop)
}

// ---------------------------------------------------------------------------
// Token rendering
// ---------------------------------------------------------------------------

/// Lines inside one region are joined with `<br>`; an empty line adds a break
/// unless the region is being left.
fn joined_line(t: &TokenContext<'_>, body: Option<String>) -> String {
    match body {
        None if t.fresh || t.to != t.from => String::new(),
        None => "<br>".to_string(),
        Some(body) if t.fresh => body,
        Some(body) => format!("<br>{body}"),
    }
}

fn paragraph(t: &TokenContext<'_>, inline: &RuleTable) -> String {
    let body = (!t.token.is_empty()).then(|| inline::render(inline, t.token));
    joined_line(t, body)
}

fn quote(t: &TokenContext<'_>, inline: &RuleTable) -> String {
    if t.token.is_empty() {
        return String::new();
    }
    let text = QUOTE_LINE
        .captures(t.token)
        .and_then(|caps| caps.get(1))
        .map_or(t.token, |m| m.as_str());
    let body = (!text.trim().is_empty()).then(|| inline::render(inline, text));
    joined_line(t, body)
}

fn heading(t: &TokenContext<'_>, inline: &RuleTable) -> String {
    match HEADING_LINE.captures(t.token) {
        Some(caps) => {
            let level = caps[1].len();
            let text = caps[2].trim_end().trim_end_matches('#').trim_end();
            format!("<h{level}>{}</h{level}>", inline::render(inline, text))
        }
        None => inline::render(inline, t.token),
    }
}

fn list_item(t: &TokenContext<'_>, inline: &RuleTable, shape: &Regex) -> String {
    if t.token.trim().is_empty() {
        return String::new();
    }
    let text = shape
        .captures(t.token)
        .and_then(|caps| caps.get(3))
        .map_or(t.token, |m| m.as_str());
    format!("<li>{}</li>", inline::render(inline, text))
}

fn table_row(t: &TokenContext<'_>, inline: &RuleTable) -> String {
    let line = t.token.trim();
    if line.is_empty() || is_table_separator(line) {
        return String::new();
    }
    let (cell, open, close) = if t.fresh {
        ("th", "<thead><tr>", "</tr></thead>")
    } else {
        ("td", "<tr>", "</tr>")
    };
    let mut out = String::from(open);
    for text in split_row(line) {
        out.push_str(&format!("<{cell}>{}</{cell}>", inline::render(inline, text)));
    }
    out.push_str(close);
    out
}

/// Keeps only characters that are safe inside a class attribute.
fn fence_language(head: &str) -> String {
    head.trim()
        .trim_start_matches('`')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'))
        .collect()
}

/// Render a fence token: the opening line, then the raw body.
pub(super) fn code_block(token: &str, highlighter: Option<&Highlighter>) -> String {
    let (head, body) = token.split_once('\n').unwrap_or((token, ""));
    let body = body.strip_suffix('\n').unwrap_or(body);
    let lang = fence_language(head);
    let code = match highlighter {
        Some(h) => h.highlight(&lang, body),
        None => escape_html(body),
    };
    let label = if lang.is_empty() { "text" } else { lang.as_str() };
    format!(
        "<div class=\"code-block\"><div class=\"code-header\"><span class=\"code-lang\">{label}</span>\
         <button class=\"copy-code\">Copy</button></div><pre><code class=\"language-{label}\">{code}</code></pre></div>"
    )
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Build the block table. Fenced code is highlighted when `highlighter` is
/// set and escaped otherwise.
pub fn table(inline: Arc<RuleTable>, highlighter: Option<Arc<Highlighter>>) -> RuleTable {
    let para_inline = Arc::clone(&inline);
    let quote_inline = Arc::clone(&inline);
    let heading_inline = Arc::clone(&inline);
    let list_inline = Arc::clone(&inline);
    let olist_inline = Arc::clone(&inline);
    let table_inline = inline;

    RuleTable::new("markdown-block", PARAGRAPH)
        .chars(verbatim)
        .state(
            PARAGRAPH,
            StateRules::new()
                .extend(openers(PARAGRAPH))
                .on(newline())
                .tokens(move |t| paragraph(t, &para_inline)),
        )
        .state(
            HEADING,
            StateRules::new()
                .on(end_of_line())
                .tokens(move |t| heading(t, &heading_inline)),
        )
        .state(RULE, StateRules::new().on(end_of_line()).tokens(|_| "<hr>".to_string()))
        .state(
            QUOTE,
            StateRules::new()
                .entry("<blockquote>")
                .exit("</blockquote>")
                .extend(openers(QUOTE))
                .on(fall_back(|line| QUOTE_LINE.is_match(line)))
                .on(newline())
                .tokens(move |t| quote(t, &quote_inline)),
        )
        .state(
            LIST,
            StateRules::new()
                .entry("<ul>")
                .exit("</ul>")
                .extend(openers(LIST))
                .on(fall_back(|line| UNORDERED_LINE.is_match(line)))
                .on(newline())
                .tokens(move |t| list_item(t, &list_inline, &UNORDERED_LINE)),
        )
        .state(
            OLIST,
            StateRules::new()
                .entry("<ol>")
                .exit("</ol>")
                .extend(openers(OLIST))
                .on(fall_back(|line| ORDERED_LINE.is_match(line)))
                .on(newline())
                .tokens(move |t| list_item(t, &olist_inline, &ORDERED_LINE)),
        )
        .state(
            TABLE,
            StateRules::new()
                .entry("<table>")
                .exit("</table>")
                .extend(openers(TABLE))
                .on(fall_back(is_table_row))
                .on(newline())
                .tokens(move |t| table_row(t, &table_inline)),
        )
        .state(
            FENCE,
            StateRules::new()
                .on(Transition::to(PARAGRAPH)
                    .when(|c| c.at_line_start() && is_fence_close(&c.rest_of_line()))
                    .step_with(rest_of_line_extra)
                    .placement(Placement::Drop))
                .tokens(move |t| code_block(t.token, highlighter.as_deref())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plain() -> RuleTable {
        table(Arc::new(inline::table()), None)
    }

    #[rstest]
    #[case("# Title", true)]
    #[case("###### six", true)]
    #[case("####### seven", false)]
    #[case("#hashtag", false)]
    fn test_heading_shape(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(HEADING_LINE.is_match(line), expected);
    }

    #[rstest]
    #[case("---", true)]
    #[case("* * *", true)]
    #[case("___", true)]
    #[case("--", false)]
    #[case("- item", false)]
    fn test_rule_shape(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(RULE_LINE.is_match(line), expected);
    }

    #[rstest]
    #[case("|---|---|", true)]
    #[case("| :-- | --: |", true)]
    #[case("---", false)]
    #[case("| a | b |", false)]
    fn test_table_separator_shape(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(is_table_separator(line), expected);
    }

    #[test]
    fn test_split_row_strips_outer_pipes() {
        assert_eq!(split_row("| a | b |"), vec!["a", "b"]);
        assert_eq!(split_row("a|b"), vec!["a", "b"]);
    }

    #[test]
    fn test_paragraph_lines_join_with_break() {
        assert_eq!(plain().run("one\ntwo"), "one<br>two");
    }

    #[test]
    fn test_heading_then_paragraph() {
        assert_eq!(plain().run("## Hi *there*\nbody"), "<h2>Hi <em>there</em></h2>body");
    }

    #[test]
    fn test_unordered_list() {
        assert_eq!(plain().run("- a\n- **b**"), "<ul><li>a</li><li><strong>b</strong></li></ul>");
    }

    #[test]
    fn test_ordered_list_then_paragraph() {
        assert_eq!(plain().run("1. a\n2. b\n\nafter"), "<ol><li>a</li><li>b</li></ol>after");
    }

    #[test]
    fn test_list_switches_kind() {
        assert_eq!(plain().run("- a\n1. b"), "<ul><li>a</li></ul><ol><li>b</li></ol>");
    }

    #[test]
    fn test_blockquote() {
        assert_eq!(plain().run("> a\n> b"), "<blockquote>a<br>b</blockquote>");
    }

    #[test]
    fn test_horizontal_rule() {
        assert_eq!(plain().run("a\n---\nb"), "a<hr>b");
    }

    #[test]
    fn test_table() {
        assert_eq!(
            plain().run("| a | b |\n|---|---|\n| 1 | *2* |"),
            "<table><thead><tr><th>a</th><th>b</th></tr></thead><tr><td>1</td><td><em>2</em></td></tr></table>"
        );
    }

    #[test]
    fn test_pipe_without_separator_is_paragraph() {
        assert_eq!(plain().run("a | b"), "a | b");
    }

    #[test]
    fn test_fence_is_verbatim_and_escaped() {
        let out = plain().run("```\n**x** <y>\n```");
        assert!(out.contains("<code class=\"language-text\">**x** &lt;y&gt;</code>"), "{out}");
    }

    #[test]
    fn test_fence_with_language_label() {
        let out = plain().run("```py\nx = 1\n```\nafter");
        assert!(out.contains("<span class=\"code-lang\">py</span>"), "{out}");
        assert!(out.contains("<code class=\"language-py\">x = 1</code>"), "{out}");
        assert!(out.ends_with("</div>after"), "{out}");
    }

    #[test]
    fn test_fence_tag_cannot_break_attribute() {
        let out = plain().run("```a\"onmouseover=x\ncode");
        assert!(!out.contains("a\""), "{out}");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let out = plain().run("```js\nlet a\n# not a heading");
        assert!(out.contains("# not a heading</code></pre></div>"), "{out}");
        assert!(!out.contains("<h1>"), "{out}");
    }

    #[test]
    fn test_fence_opening_line_never_closes_itself() {
        let out = plain().run("```\nbody");
        assert!(out.contains(">body</code>"), "{out}");
    }

    #[test]
    fn test_highlighted_fence() {
        let table = table(Arc::new(inline::table()), Some(Arc::new(Highlighter::new())));
        let out = table.run("```python\ndef f(): pass\n```");
        assert!(out.contains("<span class=\"hl-keyword\">def</span>"), "{out}");
    }
}
