//! Core structures and parsing logic for Tree-sitter grammars.
//!
//! This module defines the internal representation of a grammar as parsed from
//! Tree-sitter's JSON format. It uses [`facet_json`] for deserialization and
//! provides ergonomic accessors for inspecting rule properties and structure.
//! Grammars can also be written directly in Rust with the combinators in
//! [`dsl`], which mirror the functions available to a `grammar.js` file.

pub mod dsl;
mod json;
pub mod rules;

use facet::Facet;
use std::collections::{BTreeSet, HashMap};

pub use rules::{PrecedenceLevel, Rule, RuleType, RuleValue};

/// Represents a full Tree-sitter grammar definition.
///
/// This structure directly mirrors the serialized JSON format produced by
/// `tree-sitter generate --json`. It captures the complete rule set along with
/// auxiliary metadata such as precedences, conflicts, and supertypes.
///
/// `Grammar` is the root artifact in Sprig's parsing pipeline. It holds
/// both syntactic and semantic scaffolding (rules, precedence, conflicts,
/// and contextual hints) that together define a language's formal structure.
///
/// See <https://tree-sitter.github.io/tree-sitter/assets/schemas/grammar.schema.json>
#[derive(Debug, Clone, Facet)]
pub struct Grammar {
    /// Optional `$schema` field from the JSON, typically used for schema
    /// validation or editor integration.
    #[facet(rename = "$schema")]
    #[facet(default)]
    pub schema: Option<String>,

    /// The short name of the grammar (e.g. `"javascript"` or `"rust"`).
    pub name: String,

    /// Optional name of a base grammar that this one inherits from.
    #[facet(default)]
    pub inherits: Option<String>,

    /// Map of all rule identifiers to their corresponding definitions.
    pub rules: HashMap<String, Rule>,

    /// Declaration order of `rules`. The first entry is the start rule.
    ///
    /// [`parse_grammar`] fills it from the key order of the JSON `rules`
    /// object and [`dsl::GrammarBuilder`] from the order rules are added.
    /// When it is empty the order is recovered by [`Grammar::rule_names`].
    #[facet(default)]
    pub rule_order: Vec<String>,

    /// “Extras” that may appear between other tokens, such as whitespace or comments.
    #[facet(default)]
    pub extras: Option<Vec<Rule>>,

    /// Rules implemented externally via a scanner.
    #[facet(default)]
    pub externals: Option<Vec<Rule>>,

    /// Names of rules that should be inlined into other rules.
    #[facet(default)]
    pub inline: Option<Vec<String>>,

    /// Named precedence orderings, highest first within each list.
    #[facet(default)]
    pub precedences: Option<Vec<Vec<Rule>>>,

    /// Explicit conflict groups expected during parsing.
    #[facet(default)]
    pub conflicts: Option<Vec<Vec<String>>>,

    /// Context-specific reserved word definitions.
    #[facet(default)]
    pub reserved: Option<HashMap<String, Vec<Rule>>>,

    /// The special rule name used to identify word tokens (keywords, identifiers, etc.).
    #[facet(default)]
    pub word: Option<String>,

    /// A list of node supertypes, grouping related syntactic forms.
    #[facet(default)]
    pub supertypes: Option<Vec<String>>,
}

/// Parse a JSON grammar definition into a strongly typed [`Grammar`] structure.
///
/// # Errors
///
/// Returns [`GrammarError::JsonParse`] if the provided string is not valid JSON
/// or fails schema deserialization.
pub fn parse_grammar(json: &str) -> Result<Grammar, GrammarError> {
    let prepared = json::prepare(json)?;
    let mut grammar: Grammar = facet_json::from_str(&prepared.json)
        .map_err(|e| GrammarError::JsonParse(e.to_string()))?;
    if grammar.rule_order.is_empty() {
        grammar.rule_order = prepared.rule_order;
    }
    Ok(grammar)
}

/// Possible errors raised during grammar parsing, validation or table generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    /// The input JSON was syntactically invalid or structurally mismatched.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Higher-level structural or semantic validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// A `PATTERN` could not be compiled into the lexer.
    #[error("invalid pattern /{pattern}/: {message}")]
    Pattern {
        /// The offending regular expression source.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },

    /// Flattening a rule produced more alternatives than the generator accepts.
    #[error("rule '{0}' expands to too many alternatives")]
    TooManyAlternatives(String),

    /// The grammar declares external tokens but no scanner was supplied.
    #[error("grammar declares external token '{0}' but no external scanner was supplied")]
    MissingScanner(String),
}

impl Grammar {
    /// Returns every rule name in declaration order, start rule first.
    ///
    /// Names listed in [`Grammar::rule_order`] come first; any remaining
    /// rules follow in name order. Without a recorded order (a `Grammar`
    /// assembled by hand) the start rule is the rule no other rule, extra, or
    /// external refers to (`source_file` wins ties, then the alphabetically
    /// first name).
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.rules.len());
        let mut seen = BTreeSet::new();
        for name in &self.rule_order {
            if self.rules.contains_key(name) && seen.insert(name.as_str()) {
                names.push(name.as_str());
            }
        }
        let mut rest: Vec<&str> = self
            .rules
            .keys()
            .map(String::as_str)
            .filter(|name| !seen.contains(name))
            .collect();
        rest.sort_unstable();

        if names.is_empty() {
            if let Some(start) = self.implied_start_rule(&rest) {
                rest.retain(|name| *name != start);
                names.push(start);
            }
        }
        names.extend(rest);
        names
    }

    /// Returns the start rule: the first rule in declaration order.
    #[must_use]
    pub fn start_rule(&self) -> Option<&str> {
        self.rule_names().into_iter().next()
    }

    /// Returns the declared extras, or an empty slice.
    #[must_use]
    pub fn extras(&self) -> &[Rule] {
        self.extras.as_deref().unwrap_or_default()
    }

    /// Returns the declared external tokens, or an empty slice.
    #[must_use]
    pub fn externals(&self) -> &[Rule] {
        self.externals.as_deref().unwrap_or_default()
    }

    /// Returns the names of the declared external tokens.
    #[must_use]
    pub fn external_names(&self) -> Vec<&str> {
        self.externals()
            .iter()
            .filter_map(|rule| rule.name.as_deref().or_else(|| rule.string_value()))
            .collect()
    }

    /// Returns `true` if `name` should be hidden from the visible tree.
    ///
    /// Underscore-prefixed rules, inlined rules and supertypes are hidden.
    #[must_use]
    pub fn is_hidden(&self, name: &str) -> bool {
        name.starts_with('_')
            || self.inline.as_ref().is_some_and(|v| v.iter().any(|n| n == name))
            || self
                .supertypes
                .as_ref()
                .is_some_and(|v| v.iter().any(|n| n == name))
    }

    fn implied_start_rule<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        let mut referenced = BTreeSet::new();
        let mut pending: Vec<&Rule> = self.rules.values().collect();
        pending.extend(self.extras());
        while let Some(rule) = pending.pop() {
            if let Some(name) = rule.symbol_name() {
                referenced.insert(name);
            }
            pending.extend(rule.children());
        }
        let roots: Vec<&'a str> = candidates
            .iter()
            .copied()
            .filter(|name| !referenced.contains(name))
            .collect();
        roots
            .iter()
            .copied()
            .find(|name| *name == "source_file")
            .or_else(|| roots.first().copied())
            .or_else(|| candidates.first().copied())
    }
}
