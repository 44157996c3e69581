//! Validation routines for Tree-sitter grammars.
//!
//! This module performs structural checks over parsed [`Grammar`](crate::grammar::Grammar)
//! definitions, such as verifying symbol references, ensuring all rules are reachable,
//! reporting immediate left recursion, and confirming precedence consistency. It runs at
//! the start of [`generate`](crate::generate::generate) so malformed grammars are
//! rejected before any table construction happens.

use crate::grammar::{Grammar, GrammarError, Rule, RuleType};
use std::collections::{BTreeMap, HashSet};

/// Represents a validation failure encountered when checking a grammar.
///
/// Validation errors indicate issues such as undefined symbols, unreachable
/// rules, or recursive constructs that violate Tree-sitter's grammar constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The descriptive human-readable error message.
    pub message: String,
}

impl ValidationError {
    /// Creates a new [`ValidationError`] from a message string.
    fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl From<ValidationError> for GrammarError {
    fn from(err: ValidationError) -> Self {
        GrammarError::Validation(err.message)
    }
}

/// Performs semantic validation of a parsed [`Grammar`](crate::grammar::Grammar).
///
/// This function runs several consistency passes over the grammar:
///
/// - Checks that the grammar has rules and that `word` names one of them.
/// - Checks that all referenced symbols are defined (externals count).
/// - Warns about unreachable rules.
/// - Detects immediate left recursion.
/// - Verifies precedence consistency.
///
/// Findings that do not prevent table generation are reported through
/// [`tracing`] rather than returned.
///
/// # Errors
///
/// Returns a [`ValidationError`] if any structural rule violation is detected.
pub fn validate(grammar: &Grammar) -> Result<(), ValidationError> {
    if grammar.rules.is_empty() {
        return Err(ValidationError::new("grammar has no rules"));
    }

    if let Some(word) = &grammar.word {
        if !grammar.rules.contains_key(word) {
            return Err(ValidationError::new(format!(
                "word rule '{word}' is not defined"
            )));
        }
    }

    check_undefined_symbols(grammar)?;
    check_unreachable_rules(grammar)?;
    check_left_recursion(grammar);
    check_precedence(grammar);

    Ok(())
}

fn check_undefined_symbols(grammar: &Grammar) -> Result<(), ValidationError> {
    let mut defined: HashSet<&str> = grammar.rules.keys().map(String::as_str).collect();
    defined.extend(grammar.external_names());

    for name in grammar.rule_names() {
        if let Some(rule) = grammar.rules.get(name) {
            check_rule_symbols(rule, &defined, name)?;
        }
    }
    for extra in grammar.extras() {
        check_rule_symbols(extra, &defined, "extras")?;
    }

    Ok(())
}

fn check_rule_symbols(
    rule: &Rule,
    defined: &HashSet<&str>,
    context: &str,
) -> Result<(), ValidationError> {
    if let Some(name) = rule.symbol_name() {
        if !defined.contains(name) {
            return Err(ValidationError::new(format!(
                "undefined symbol '{name}' referenced in rule '{context}'"
            )));
        }
    }
    for child in rule.children() {
        check_rule_symbols(child, defined, context)?;
    }
    Ok(())
}

fn check_unreachable_rules(grammar: &Grammar) -> Result<(), ValidationError> {
    let entry_point = grammar
        .start_rule()
        .ok_or_else(|| ValidationError::new("grammar has no rules"))?;

    let mut reachable = HashSet::new();
    let mut to_visit = vec![entry_point];
    for extra in grammar.extras() {
        collect_referenced_symbols(extra, &mut to_visit);
    }
    if let Some(word) = grammar.word.as_deref() {
        to_visit.push(word);
    }

    while let Some(rule_name) = to_visit.pop() {
        if !reachable.insert(rule_name) {
            continue;
        }
        if let Some(rule) = grammar.rules.get(rule_name) {
            collect_referenced_symbols(rule, &mut to_visit);
        }
    }

    for rule_name in grammar.rule_names() {
        let inline_contains = grammar
            .inline
            .as_ref()
            .is_some_and(|v| v.iter().any(|n| n == rule_name));

        if !reachable.contains(rule_name) && !inline_contains {
            tracing::warn!(rule = rule_name, "unreachable rule");
        }
    }

    Ok(())
}

fn collect_referenced_symbols<'a>(rule: &'a Rule, symbols: &mut Vec<&'a str>) {
    if let Some(name) = rule.symbol_name() {
        symbols.push(name);
    }
    for child in rule.children() {
        collect_referenced_symbols(child, symbols);
    }
}

fn check_left_recursion(grammar: &Grammar) {
    // The LR generator accepts left recursion; it is reported for grammar authors.
    for rule_name in grammar.rule_names() {
        if let Some(rule) = grammar.rules.get(rule_name) {
            if has_immediate_left_recursion(rule, rule_name) {
                tracing::info!(rule = rule_name, "rule is left recursive");
            }
        }
    }
}

fn has_immediate_left_recursion(rule: &Rule, target: &str) -> bool {
    match rule.rule_type {
        RuleType::Symbol => rule.name.as_deref() == Some(target),
        RuleType::Seq => rule
            .members
            .first()
            .is_some_and(|first| has_immediate_left_recursion(first, target)),
        RuleType::Choice => rule
            .members
            .iter()
            .any(|member| has_immediate_left_recursion(member, target)),
        RuleType::Prec
        | RuleType::PrecLeft
        | RuleType::PrecRight
        | RuleType::PrecDynamic
        | RuleType::Field
        | RuleType::Alias => rule
            .content
            .as_deref()
            .is_some_and(|content| has_immediate_left_recursion(content, target)),
        _ => false,
    }
}

fn check_precedence(grammar: &Grammar) {
    let mut prec_levels: BTreeMap<&str, Vec<i32>> = BTreeMap::new();

    for rule_name in grammar.rule_names() {
        if let Some(rule) = grammar.rules.get(rule_name) {
            collect_precedence_levels(rule, &mut prec_levels, rule_name);
        }
    }

    for (rule, levels) in &prec_levels {
        if levels.len() > 1 && levels.windows(2).any(|w| w[0] != w[1]) {
            tracing::warn!(rule, ?levels, "rule has multiple precedence levels");
        }
    }

    let declared: HashSet<&str> = grammar
        .precedences
        .iter()
        .flatten()
        .flatten()
        .filter_map(|entry| entry.string_value().or(entry.symbol_name()))
        .collect();
    for rule_name in grammar.rule_names() {
        if let Some(rule) = grammar.rules.get(rule_name) {
            check_named_precedence(rule, &declared, rule_name);
        }
    }
}

fn collect_precedence_levels<'a>(
    rule: &Rule,
    levels: &mut BTreeMap<&'a str, Vec<i32>>,
    context: &'a str,
) {
    if let Some(p) = rule.precedence() {
        levels.entry(context).or_default().push(p);
    }
    if matches!(rule.rule_type, RuleType::Token | RuleType::ImmediateToken) {
        return;
    }
    for child in rule.children() {
        collect_precedence_levels(child, levels, context);
    }
}

fn check_named_precedence(rule: &Rule, declared: &HashSet<&str>, context: &str) {
    if let Some(name) = rule.precedence_name() {
        if !declared.contains(name) {
            tracing::warn!(rule = context, level = name, "undeclared named precedence");
        }
    }
    for child in rule.children() {
        check_named_precedence(child, declared, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::dsl::{choice, pattern, seq, string, sym, GrammarBuilder};

    #[test]
    fn test_valid_grammar_passes() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", seq([sym("item"), string(";")]))
            .rule("item", pattern("[a-z]+"))
            .build();
        assert!(validate(&grammar).is_ok());
    }

    #[test]
    fn test_undefined_symbol_is_rejected() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", choice([sym("missing"), string("x")]))
            .build();
        let err = validate(&grammar).unwrap_err();
        assert!(err.message.contains("missing"), "{err}");
    }

    #[test]
    fn test_external_counts_as_defined() {
        let grammar = GrammarBuilder::new("t")
            .externals([sym("_content")])
            .rule("doc", seq([string("<"), sym("_content"), string(">")]))
            .build();
        assert!(validate(&grammar).is_ok());
    }

    #[test]
    fn test_missing_word_rule() {
        let grammar = GrammarBuilder::new("t")
            .word("identifier")
            .rule("doc", string("x"))
            .build();
        assert!(validate(&grammar).is_err());
    }

    #[test]
    fn test_left_recursion_detected() {
        let rule = choice([seq([sym("list"), string(",")]), string("x")]);
        assert!(has_immediate_left_recursion(&rule, "list"));
        assert!(!has_immediate_left_recursion(&rule, "other"));
    }

    #[test]
    fn test_empty_grammar() {
        let grammar = GrammarBuilder::new("t").build();
        let err: GrammarError = validate(&grammar).unwrap_err().into();
        assert!(matches!(err, GrammarError::Validation(_)));
    }
}
