//! The rule tree of a grammar, as serialized by `tree-sitter generate`.
//!
//! Field names and `type` tags follow the JSON schema so that `grammar.json`
//! files deserialize directly. The accessors below are the views the
//! validator and the table generator need: which rules become tokens, what
//! precedence a wrapper declares, and the sub-rules to recurse into.

use crate::symbol::Associativity;
use facet::Facet;

/// One node of a grammar's rule tree.
///
/// Only the fields relevant to its [`RuleType`] are set: `value` for
/// strings, patterns and precedence levels, `name` for symbols, fields and
/// aliases, `content` for wrappers and `members` for sequences and choices.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Rule {
    /// Which combinator this node is.
    #[facet(rename = "type")]
    pub rule_type: RuleType,

    /// Literal text, pattern source or precedence level.
    #[facet(default)]
    pub value: Option<RuleValue>,

    /// Referenced rule (`SYMBOL`), field name (`FIELD`) or alias name (`ALIAS`).
    #[facet(default)]
    pub name: Option<String>,

    /// The wrapped rule of unary combinators.
    #[facet(default)]
    pub content: Option<Box<Rule>>,

    /// Operands of `SEQ` and `CHOICE`.
    #[facet(default)]
    pub members: Vec<Rule>,

    /// Whether an alias produces a named node.
    #[facet(default)]
    pub named: Option<bool>,

    /// Regex flags of a `PATTERN` (only `i` is honoured).
    #[facet(default)]
    pub flags: Option<String>,

    /// Reserved-word context of a `RESERVED` wrapper.
    #[facet(default)]
    pub context_name: Option<String>,
}

/// The scalar payload of a rule.
///
/// `grammar.json` writes it as a bare string or number; [`parse_grammar`]
/// tags it before decoding.
///
/// [`parse_grammar`]: super::parse_grammar
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum RuleValue {
    /// Text: a literal, a pattern, or a named precedence level.
    String(String),

    /// A numeric precedence level.
    Integer(i32),
}

/// The `type` tag of a [`Rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum RuleType {
    /// Matches the empty string.
    #[facet(rename = "BLANK")]
    Blank,
    /// Matches literal text.
    #[facet(rename = "STRING")]
    String,
    /// Matches a regular expression.
    #[facet(rename = "PATTERN")]
    Pattern,
    /// Refers to a rule by name.
    #[facet(rename = "SYMBOL")]
    Symbol,
    /// Matches any one of `members`.
    #[facet(rename = "CHOICE")]
    Choice,
    /// Matches `members` one after another.
    #[facet(rename = "SEQ")]
    Seq,
    /// Zero or more of `content`.
    #[facet(rename = "REPEAT")]
    Repeat,
    /// One or more of `content`.
    #[facet(rename = "REPEAT1")]
    Repeat1,
    /// Precedence without associativity.
    #[facet(rename = "PREC")]
    Prec,
    /// Precedence, reducing on ties.
    #[facet(rename = "PREC_LEFT")]
    PrecLeft,
    /// Precedence, shifting on ties.
    #[facet(rename = "PREC_RIGHT")]
    PrecRight,
    /// Runtime precedence between ambiguous parses; treated as transparent.
    #[facet(rename = "PREC_DYNAMIC")]
    PrecDynamic,
    /// Labels `content` with a field name; transparent to parsing.
    #[facet(rename = "FIELD")]
    Field,
    /// Renames the node of `content`; transparent to parsing.
    #[facet(rename = "ALIAS")]
    Alias,
    /// Compiles `content` into one lexer token.
    #[facet(rename = "TOKEN")]
    Token,
    /// Like `TOKEN`; the no-leading-extras restriction is not enforced.
    #[facet(rename = "IMMEDIATE_TOKEN")]
    ImmediateToken,
    /// Reserved-word scoping; transparent to parsing.
    #[facet(rename = "RESERVED")]
    Reserved,
}

impl RuleType {
    /// Returns `true` for the `PREC*` wrappers.
    #[must_use]
    pub fn is_precedence(self) -> bool {
        matches!(
            self,
            RuleType::Prec | RuleType::PrecLeft | RuleType::PrecRight | RuleType::PrecDynamic
        )
    }
}

/// A precedence level as written in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecedenceLevel<'a> {
    /// `prec(3, ...)`.
    Number(i32),
    /// `prec("member", ...)`, ranked by the grammar's `precedences` lists.
    Named(&'a str),
}

impl Rule {
    /// A rule of type `rule_type` with no payload.
    #[must_use]
    pub fn new(rule_type: RuleType) -> Self {
        Self {
            rule_type,
            value: None,
            name: None,
            content: None,
            members: Vec::new(),
            named: None,
            flags: None,
            context_name: None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self.value.as_ref()? {
            RuleValue::String(s) => Some(s),
            RuleValue::Integer(_) => None,
        }
    }

    /// Returns `true` if a rule whose whole body is this rule becomes a
    /// single token rather than a syntax node with children.
    #[must_use]
    pub fn is_lexical(&self) -> bool {
        matches!(
            self.rule_type,
            RuleType::String | RuleType::Pattern | RuleType::Token | RuleType::ImmediateToken
        )
    }

    /// The rule a `SYMBOL` refers to.
    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        (self.rule_type == RuleType::Symbol)
            .then_some(self.name.as_deref())
            .flatten()
    }

    /// The text a `STRING` matches.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        (self.rule_type == RuleType::String).then(|| self.text()).flatten()
    }

    /// The source of a `PATTERN`.
    #[must_use]
    pub fn pattern_value(&self) -> Option<&str> {
        (self.rule_type == RuleType::Pattern).then(|| self.text()).flatten()
    }

    /// Returns `true` for a `PATTERN` with the case-insensitive flag.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        self.rule_type == RuleType::Pattern
            && self.flags.as_deref().is_some_and(|f| f.contains('i'))
    }

    /// The level declared by a precedence wrapper.
    #[must_use]
    pub fn precedence_level(&self) -> Option<PrecedenceLevel<'_>> {
        if !self.rule_type.is_precedence() {
            return None;
        }
        match self.value.as_ref()? {
            RuleValue::Integer(level) => Some(PrecedenceLevel::Number(*level)),
            RuleValue::String(name) => Some(PrecedenceLevel::Named(name)),
        }
    }

    /// The numeric level of a precedence wrapper.
    #[must_use]
    pub fn precedence(&self) -> Option<i32> {
        match self.precedence_level()? {
            PrecedenceLevel::Number(level) => Some(level),
            PrecedenceLevel::Named(_) => None,
        }
    }

    /// The named level of a precedence wrapper.
    #[must_use]
    pub fn precedence_name(&self) -> Option<&str> {
        match self.precedence_level()? {
            PrecedenceLevel::Named(name) => Some(name),
            PrecedenceLevel::Number(_) => None,
        }
    }

    /// The associativity a precedence wrapper gives its productions.
    #[must_use]
    pub fn associativity(&self) -> Associativity {
        match self.rule_type {
            RuleType::PrecLeft => Associativity::Left,
            RuleType::PrecRight => Associativity::Right,
            _ => Associativity::None,
        }
    }

    /// Iterates over the direct sub-rules (`members` followed by `content`).
    pub fn children(&self) -> impl Iterator<Item = &Rule> {
        self.members.iter().chain(self.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::json::prepare;

    fn decode(json: &str) -> Rule {
        facet_json::from_str(&prepare(json).unwrap().json).unwrap()
    }

    #[test]
    fn test_deserialize_choice() {
        let json = r#"{
            "type": "CHOICE",
            "members": [
                {"type": "STRING", "value": "let"},
                {"type": "PATTERN", "value": "[a-z]+", "flags": "i"}
            ]
        }"#;
        let rule = decode(json);

        assert_eq!(rule.rule_type, RuleType::Choice);
        assert_eq!(rule.members[0].string_value(), Some("let"));
        assert_eq!(rule.members[0].pattern_value(), None);
        assert_eq!(rule.members[1].pattern_value(), Some("[a-z]+"));
        assert!(rule.members[1].is_case_insensitive());
        assert_eq!(rule.children().count(), 2);
    }

    #[test]
    fn test_precedence_levels() {
        let json = r#"{
            "type": "PREC_RIGHT",
            "value": 2,
            "content": {"type": "SYMBOL", "name": "assignment"}
        }"#;
        let rule = decode(json);
        assert_eq!(rule.precedence_level(), Some(PrecedenceLevel::Number(2)));
        assert_eq!(rule.precedence(), Some(2));
        assert_eq!(rule.precedence_name(), None);
        assert_eq!(rule.associativity(), Associativity::Right);
        assert_eq!(rule.children().next().and_then(Rule::symbol_name), Some("assignment"));

        let named = decode(r#"{"type": "PREC", "value": "call", "content": {"type": "BLANK"}}"#);
        assert_eq!(named.precedence_name(), Some("call"));
        assert_eq!(named.associativity(), Associativity::None);
    }

    #[test]
    fn test_lexical_rules() {
        assert!(Rule::new(RuleType::Token).is_lexical());
        assert!(Rule::new(RuleType::Pattern).is_lexical());
        assert!(!Rule::new(RuleType::Choice).is_lexical());
        assert!(!Rule::new(RuleType::Symbol).is_lexical());
        assert!(Rule::new(RuleType::Symbol).symbol_name().is_none());
    }
}
