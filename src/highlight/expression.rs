//! Keyword-aware rule set shared by the C-family, ECMAScript-family, Python,
//! shell, VB-family and SQL highlighters.
//!
//! A [`Profile`] supplies the per-language differences (keywords, comment
//! markers, quote characters, regex literals, keyword case sensitivity); the
//! state layout is identical for all of them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::tokenizer::{Placement, RuleTable, ScanContext, StateRules, TokenContext, Transition, NORMAL};

use super::{CLASS_COMMENT, CLASS_KEYWORD, CLASS_NUMBER, CLASS_PROPERTY, CLASS_REGEX, CLASS_STRING, CLASS_VARIABLE};

const STRING: &str = "string";
const LINE_COMMENT: &str = "line-comment";
const BLOCK_COMMENT: &str = "block-comment";
const REGEX: &str = "regex";

/// Characters after which a `/` starts a regex literal rather than a division.
const REGEX_PRECEDERS: &str = "(,=:[!&|?{};+-*%<>~^";

/// Per-language parameters for the expression rule set.
#[derive(Debug, Clone)]
pub struct Profile {
    pub keywords: Vec<&'static str>,
    pub line_comments: &'static [&'static str],
    pub block_comment: Option<(&'static str, &'static str)>,
    pub quotes: &'static [char],
    pub regex_literals: bool,
    pub case_insensitive: bool,
}

impl Profile {
    pub fn c_family(keywords: Vec<&'static str>) -> Self {
        Self {
            keywords,
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            quotes: &['"', '\''],
            regex_literals: false,
            case_insensitive: false,
        }
    }
}

/// `[$_A-Za-z0-9]`, plus non-ASCII letters so words are never split mid-way.
pub fn is_ident_continue(c: char) -> bool {
    c == '$' || c == '_' || c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric())
}

/// Matches `^[$_A-Za-z][$_A-Za-z0-9]*$`.
pub fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c == '$' || c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '$' || c == '_' || c.is_ascii_alphanumeric())
}

fn is_number(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit()) && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn wrap(class: &str, token: &str) -> String {
    format!("<span class=\"{class}\">{token}</span>")
}

/// Keyword, then number, then property (after `.`) or variable; anything else
/// is returned unchanged.
pub fn classify(token: &str, before: Option<char>, keywords: &HashSet<String>, case_insensitive: bool) -> String {
    if token.is_empty() {
        return String::new();
    }
    let is_keyword = if case_insensitive {
        keywords.contains(&token.to_ascii_lowercase())
    } else {
        keywords.contains(token)
    };
    if is_keyword {
        wrap(CLASS_KEYWORD, token)
    } else if is_number(token) {
        wrap(CLASS_NUMBER, token)
    } else if is_identifier(token) {
        if before == Some('.') {
            wrap(CLASS_PROPERTY, token)
        } else {
            wrap(CLASS_VARIABLE, token)
        }
    } else {
        token.to_string()
    }
}

/// A `/` opens a regex literal when it does not follow an operand and an
/// unescaped closing `/` exists on the same line.
fn opens_regex(ctx: &ScanContext<'_>) -> bool {
    if ctx.ch != '/' || matches!(ctx.next, Some('/') | Some('*') | None) {
        return false;
    }
    let preceding = ctx.before.iter().rev().find(|c| **c != ' ' && **c != '\t').copied();
    match preceding {
        None | Some('\n') => {}
        Some(c) if REGEX_PRECEDERS.contains(c) => {}
        _ => return false,
    }
    let mut escaped = false;
    for c in ctx.after.iter().take_while(|c| **c != '\n') {
        match (escaped, *c) {
            (true, _) => escaped = false,
            (false, '\\') => escaped = true,
            (false, '/') => return true,
            _ => {}
        }
    }
    false
}

/// Build the rule table for one profile.
pub fn table(name: &'static str, profile: &Profile) -> RuleTable {
    let case_insensitive = profile.case_insensitive;
    let keywords: Arc<HashSet<String>> = Arc::new(
        profile
            .keywords
            .iter()
            .map(|k| if case_insensitive { k.to_ascii_lowercase() } else { k.to_string() })
            .collect(),
    );

    let mut normal = StateRules::new();
    for marker in profile.line_comments {
        normal = normal.on(
            Transition::to(LINE_COMMENT)
                .when(move |c| c.starts_with(marker))
                .step(marker.chars().count() - 1),
        );
    }
    let mut block_close = "*/";
    if let Some((open, close)) = profile.block_comment {
        block_close = close;
        normal = normal.on(
            Transition::to(BLOCK_COMMENT)
                .when(move |c| c.starts_with(open))
                .step(open.chars().count() - 1),
        );
    }
    let quotes = profile.quotes;
    normal = normal.on(Transition::to(STRING).when(move |c| quotes.contains(&c.ch)).pair_trigger());
    if profile.regex_literals {
        normal = normal.on(Transition::to(REGEX).when(opens_regex));
    }
    let normal = normal
        .on(Transition::stay().when(|c| !is_ident_continue(c.ch)))
        .tokens(move |t: &TokenContext<'_>| classify(t.token, t.before, &keywords, case_insensitive));

    RuleTable::new(name, NORMAL)
        .state(NORMAL, normal)
        .state(
            STRING,
            StateRules::new()
                .span(CLASS_STRING)
                .on(Transition::stay().when(|c| c.ch == '\\').step(1).placement(Placement::Closing))
                .on(Transition::pop().when(|c| Some(c.ch) == c.pair)),
        )
        .state(
            LINE_COMMENT,
            StateRules::new()
                .span(CLASS_COMMENT)
                .on(Transition::pop().when(|c| c.ch == '\n').placement(Placement::Between)),
        )
        .state(
            BLOCK_COMMENT,
            StateRules::new().span(CLASS_COMMENT).on(
                Transition::pop()
                    .when(move |c| c.starts_with(block_close))
                    .step(block_close.chars().count() - 1),
            ),
        )
        .state(
            REGEX,
            StateRules::new()
                .span(CLASS_REGEX)
                .on(Transition::stay().when(|c| c.ch == '\\').step(1).placement(Placement::Closing))
                .on(Transition::pop().when(|c| c.ch == '/'))
                .on(Transition::pop().when(|c| c.ch == '\n').placement(Placement::Between)),
        )
}
