//! CSS: selector / property / value regions with quoted strings and
//! `/* */` comments.

use crate::tokenizer::{Placement, RuleTable, StateRules, Transition};

use super::{CLASS_COMMENT, CLASS_PROPERTY, CLASS_SELECTOR, CLASS_STRING, CLASS_VALUE};

const SELECTOR: &str = "selector";
const PROPERTY: &str = "property";
const VALUE: &str = "value";
const STRING: &str = "string";
const COMMENT: &str = "comment";

fn comment() -> Transition {
    Transition::to(COMMENT).when(|c| c.starts_with("/*")).step(1).nested()
}

fn string() -> Transition {
    Transition::to(STRING)
        .when(|c| c.ch == '"' || c.ch == '\'')
        .nested()
        .pair_trigger()
}

fn between(state: &'static str, trigger: char) -> Transition {
    Transition::to(state)
        .when(move |c| c.ch == trigger)
        .placement(Placement::Between)
}

pub fn table() -> RuleTable {
    RuleTable::new("css", SELECTOR)
        .state(
            SELECTOR,
            StateRules::new()
                .span(CLASS_SELECTOR)
                .on(comment())
                .on(string())
                .on(between(PROPERTY, '{')),
        )
        .state(
            PROPERTY,
            StateRules::new()
                .span(CLASS_PROPERTY)
                .on(comment())
                .on(between(VALUE, ':'))
                .on(between(SELECTOR, '}')),
        )
        .state(
            VALUE,
            StateRules::new()
                .span(CLASS_VALUE)
                .on(comment())
                .on(string())
                .on(between(PROPERTY, ';'))
                .on(between(SELECTOR, '}')),
        )
        .state(
            STRING,
            StateRules::new()
                .span(CLASS_STRING)
                .on(Transition::stay().when(|c| c.ch == '\\').step(1).placement(Placement::Closing))
                .on(Transition::pop().when(|c| Some(c.ch) == c.pair)),
        )
        .state(
            COMMENT,
            StateRules::new()
                .span(CLASS_COMMENT)
                .on(Transition::pop().when(|c| c.starts_with("*/")).step(1)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_regions() {
        assert_eq!(
            table().run("a{color:red}"),
            "<span class=\"hl-selector\">a</span>{<span class=\"hl-property\">color</span>:\
             <span class=\"hl-value\">red</span>}"
        );
    }

    #[test]
    fn test_semicolon_returns_to_property() {
        let out = table().run("p{a:1;b:2}");
        assert!(out.contains(";<span class=\"hl-property\">b</span>"), "{out}");
    }

    #[test]
    fn test_comment_nests_inside_selector() {
        assert_eq!(
            table().run("a/*x*/"),
            "<span class=\"hl-selector\">a<span class=\"hl-comment\">/*x*/</span></span>"
        );
    }

    #[test]
    fn test_string_value() {
        let out = table().run("a{content:\"}\"}");
        assert!(out.contains("<span class=\"hl-string\">\"}\"</span>"), "{out}");
    }

    #[test]
    fn test_unterminated_block_is_closed() {
        let out = table().run("a{color:");
        assert_eq!(out.matches("<span").count(), out.matches("</span>").count());
    }
}
