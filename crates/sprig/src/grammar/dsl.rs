//! Rust counterparts of the `grammar.js` DSL.
//!
//! Every function builds a [`Rule`] exactly as `tree-sitter generate --json`
//! would serialize it, so a grammar written here and the same grammar loaded
//! from JSON flow through identical generation passes.
//!
//! ```
//! use sprig::grammar::dsl::*;
//!
//! let grammar = GrammarBuilder::new("list")
//!     .extras([pattern(r"\s")])
//!     .rule("list", seq([string("["), optional(sym("item")), string("]")]))
//!     .rule("item", pattern("[a-z]+"))
//!     .build();
//! assert_eq!(grammar.start_rule(), Some("list"));
//! ```

use super::{Grammar, Rule, RuleType, RuleValue};
use std::collections::HashMap;

/// A reference to another rule (`$.name`).
#[must_use]
pub fn sym(name: &str) -> Rule {
    Rule {
        name: Some(name.to_string()),
        ..Rule::new(RuleType::Symbol)
    }
}

/// A literal string token.
#[must_use]
pub fn string(value: &str) -> Rule {
    Rule {
        value: Some(RuleValue::String(value.to_string())),
        ..Rule::new(RuleType::String)
    }
}

/// A regular-expression token.
#[must_use]
pub fn pattern(source: &str) -> Rule {
    Rule {
        value: Some(RuleValue::String(source.to_string())),
        ..Rule::new(RuleType::Pattern)
    }
}

/// The empty rule.
#[must_use]
pub fn blank() -> Rule {
    Rule::new(RuleType::Blank)
}

/// Rules that must appear one after another.
#[must_use]
pub fn seq(members: impl IntoIterator<Item = Rule>) -> Rule {
    Rule {
        members: members.into_iter().collect(),
        ..Rule::new(RuleType::Seq)
    }
}

/// Exactly one of the given alternatives.
#[must_use]
pub fn choice(members: impl IntoIterator<Item = Rule>) -> Rule {
    Rule {
        members: members.into_iter().collect(),
        ..Rule::new(RuleType::Choice)
    }
}

/// Either the rule or nothing.
#[must_use]
pub fn optional(rule: Rule) -> Rule {
    choice([rule, blank()])
}

/// Zero or more repetitions.
#[must_use]
pub fn repeat(rule: Rule) -> Rule {
    wrap(RuleType::Repeat, rule)
}

/// One or more repetitions.
#[must_use]
pub fn repeat1(rule: Rule) -> Rule {
    wrap(RuleType::Repeat1, rule)
}

/// Collapses the rule into a single token.
#[must_use]
pub fn token(rule: Rule) -> Rule {
    wrap(RuleType::Token, rule)
}

/// A token that may not be preceded by extras.
#[must_use]
pub fn immediate_token(rule: Rule) -> Rule {
    wrap(RuleType::ImmediateToken, rule)
}

/// Numeric precedence without associativity.
#[must_use]
pub fn prec(level: i32, rule: Rule) -> Rule {
    with_level(RuleType::Prec, RuleValue::Integer(level), rule)
}

/// Left-associative precedence.
#[must_use]
pub fn prec_left(level: i32, rule: Rule) -> Rule {
    with_level(RuleType::PrecLeft, RuleValue::Integer(level), rule)
}

/// Right-associative precedence.
#[must_use]
pub fn prec_right(level: i32, rule: Rule) -> Rule {
    with_level(RuleType::PrecRight, RuleValue::Integer(level), rule)
}

/// Precedence referring to a level declared in `precedences`.
#[must_use]
pub fn prec_named(level: &str, rule: Rule) -> Rule {
    with_level(RuleType::Prec, RuleValue::String(level.to_string()), rule)
}

/// Runtime precedence, only meaningful to GLR parsers.
#[must_use]
pub fn prec_dynamic(level: i32, rule: Rule) -> Rule {
    with_level(RuleType::PrecDynamic, RuleValue::Integer(level), rule)
}

/// Attaches a field name to the child produced by `rule`.
#[must_use]
pub fn field(name: &str, rule: Rule) -> Rule {
    Rule {
        name: Some(name.to_string()),
        ..wrap(RuleType::Field, rule)
    }
}

/// Renames the node produced by `rule`.
#[must_use]
pub fn alias(rule: Rule, name: &str, named: bool) -> Rule {
    Rule {
        value: Some(RuleValue::String(name.to_string())),
        named: Some(named),
        ..wrap(RuleType::Alias, rule)
    }
}

fn wrap(rule_type: RuleType, rule: Rule) -> Rule {
    Rule {
        content: Some(Box::new(rule)),
        ..Rule::new(rule_type)
    }
}

fn with_level(rule_type: RuleType, level: RuleValue, rule: Rule) -> Rule {
    Rule {
        value: Some(level),
        ..wrap(rule_type, rule)
    }
}

/// Incrementally assembles a [`Grammar`], recording rule declaration order.
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    /// Starts an empty grammar called `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            grammar: Grammar {
                schema: None,
                name: name.to_string(),
                inherits: None,
                rules: HashMap::new(),
                rule_order: Vec::new(),
                extras: None,
                externals: None,
                inline: None,
                precedences: None,
                conflicts: None,
                reserved: None,
                word: None,
                supertypes: None,
            },
        }
    }

    /// Adds (or replaces) a rule. The first rule added is the start rule.
    #[must_use]
    pub fn rule(mut self, name: &str, rule: Rule) -> Self {
        if self.grammar.rules.insert(name.to_string(), rule).is_none() {
            self.grammar.rule_order.push(name.to_string());
        }
        self
    }

    /// Declares the extras allowed between any two tokens.
    #[must_use]
    pub fn extras(mut self, extras: impl IntoIterator<Item = Rule>) -> Self {
        self.grammar.extras = Some(extras.into_iter().collect());
        self
    }

    /// Declares tokens produced by an external scanner, in scanner order.
    #[must_use]
    pub fn externals(mut self, externals: impl IntoIterator<Item = Rule>) -> Self {
        self.grammar.externals = Some(externals.into_iter().collect());
        self
    }

    /// Names the identifier-like rule used for keyword extraction.
    #[must_use]
    pub fn word(mut self, name: &str) -> Self {
        self.grammar.word = Some(name.to_string());
        self
    }

    /// Marks rules whose nodes should be hidden from the tree.
    #[must_use]
    pub fn inline<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.grammar.inline = Some(names.into_iter().map(str::to_string).collect());
        self
    }

    /// Declares named precedence levels, highest first.
    #[must_use]
    pub fn precedences<'a>(mut self, levels: impl IntoIterator<Item = &'a str>) -> Self {
        let list = levels.into_iter().map(string).collect();
        self.grammar.precedences.get_or_insert_with(Vec::new).push(list);
        self
    }

    /// Declares supertype rules.
    #[must_use]
    pub fn supertypes<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.grammar.supertypes = Some(names.into_iter().map(str::to_string).collect());
        self
    }

    /// Finishes the grammar.
    #[must_use]
    pub fn build(self) -> Grammar {
        self.grammar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_is_choice_with_blank() {
        let rule = optional(sym("x"));
        assert_eq!(rule.rule_type, RuleType::Choice);
        assert_eq!(rule.members[1].rule_type, RuleType::Blank);
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let grammar = GrammarBuilder::new("t")
            .rule("zeta", sym("alpha"))
            .rule("alpha", string("a"))
            .rule("mid", string("m"))
            .build();
        assert_eq!(grammar.rule_names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_precedence_helpers() {
        assert_eq!(prec_left(3, blank()).precedence(), Some(3));
        assert_eq!(prec_named("sum", blank()).precedence_name(), Some("sum"));
        let aliased = alias(sym("x"), "y", true);
        assert_eq!(aliased.named, Some(true));
    }
}
