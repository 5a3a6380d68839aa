//! YAML: key / branch / value regions per line, quoted scalars, `#` comments.

use crate::tokenizer::{Placement, RuleTable, ScanContext, StateRules, Transition};

use super::{CLASS_BRANCH, CLASS_COMMENT, CLASS_KEY, CLASS_STRING, CLASS_VALUE};

const KEY: &str = "key";
const VALUE: &str = "value";
const STRING: &str = "string";
const COMMENT: &str = "comment";

fn starts_comment(c: &ScanContext<'_>) -> bool {
    c.ch == '#' && c.prev.map_or(true, char::is_whitespace)
}

fn starts_string(c: &ScanContext<'_>) -> bool {
    (c.ch == '"' || c.ch == '\'') && matches!(c.prev, None | Some(' ' | '\t' | ':' | '[' | ',' | '\n'))
}

fn next_is_blank(c: &ScanContext<'_>) -> bool {
    matches!(c.next, None | Some(' ' | '\t' | '\n'))
}

fn newline() -> Transition {
    Transition::to(KEY).when(|c| c.ch == '\n').placement(Placement::Between)
}

pub fn table() -> RuleTable {
    RuleTable::new("yaml", KEY)
        .state(
            KEY,
            StateRules::new()
                .span(CLASS_KEY)
                .on(Transition::to(COMMENT).when(starts_comment))
                .on(Transition::stay()
                    .when(|c| c.ch == '-' && next_is_blank(c) && c.line_prefix().iter().all(|p| p.is_whitespace()))
                    .chars(|_, out| out.push_str(&format!("<span class=\"{CLASS_BRANCH}\">-</span>"))))
                .on(Transition::to(STRING).when(starts_string).nested().pair_trigger())
                .on(Transition::to(VALUE).when(|c| c.ch == ':' && next_is_blank(c)).placement(Placement::Between))
                .on(newline()),
        )
        .state(
            VALUE,
            StateRules::new()
                .span(CLASS_VALUE)
                .on(newline())
                .on(Transition::to(COMMENT).when(starts_comment))
                .on(Transition::to(STRING).when(starts_string).nested().pair_trigger()),
        )
        .state(
            STRING,
            StateRules::new()
                .span(CLASS_STRING)
                .on(Transition::stay()
                    .when(|c| c.ch == '\\' && c.pair == Some('"'))
                    .step(1)
                    .placement(Placement::Closing))
                .on(Transition::pop().when(|c| Some(c.ch) == c.pair)),
        )
        .state(COMMENT, StateRules::new().span(CLASS_COMMENT).on(newline()))
}
