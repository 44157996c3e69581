//! The Bolt grammar.

use sprig::grammar::dsl::{
    choice, optional, pattern, repeat, seq, string, sym, token, GrammarBuilder,
};
use sprig::{Grammar, Rule};

const CONTROL_KEYWORDS: [&str; 8] = [
    "if", "else", "for", "return", "break", "continue", "do", "then",
];

const OTHER_KEYWORDS: [&str; 20] = [
    "fn", "import", "from", "as", "export", "type", "typeof", "let", "const", "final",
    "unsealed", "enum", "in", "by", "to", "and", "or", "not", "is", "match",
];

const TYPE_KEYWORDS: [&str; 8] = [
    "any", "number", "string", "bool", "array", "table", "module", "Type",
];

fn literals(values: &[&str]) -> Rule {
    choice(values.iter().map(|v| string(v)))
}

/// Builds the Bolt grammar.
///
/// Bolt is tokenized rather than fully parsed: a source file is a sequence
/// of tokens and `{ }` blocks, which is what highlighting and folding need.
#[must_use]
pub fn grammar() -> Grammar {
    GrammarBuilder::new("bolt")
        .extras([pattern(r"\s"), sym("line_comment"), sym("block_comment")])
        .externals([sym("_block_comment_content")])
        .word("identifier")
        .rule("source_file", repeat(sym("_top_level_item")))
        .rule("_top_level_item", choice([sym("block"), sym("_token")]))
        .rule(
            "_token",
            choice([
                sym("keyword"),
                sym("type_keyword"),
                sym("identifier"),
                sym("number_literal"),
                sym("string_literal"),
                sym("boolean_literal"),
                sym("null_literal"),
                sym("this"),
                sym("array_literal"),
                sym("operator"),
                sym("punctuation"),
            ]),
        )
        .rule(
            "block",
            seq([
                string("{"),
                repeat(choice([sym("block"), sym("_token")])),
                string("}"),
            ]),
        )
        .rule(
            "keyword",
            choice([literals(&CONTROL_KEYWORDS), literals(&OTHER_KEYWORDS)]),
        )
        .rule("type_keyword", literals(&TYPE_KEYWORDS))
        .rule("arithmetic_operator", token(literals(&["+", "-", "*", "/"])))
        .rule(
            "other_operator",
            token(literals(&[">", ">=", "<", "<=", "=", "==", "=>", "!=", "??"])),
        )
        .rule(
            "operator",
            choice([sym("arithmetic_operator"), sym("other_operator")]),
        )
        .rule("punctuation", token(literals(&[".", ",", ":", "!", "?", "?."])))
        .rule("number_literal", token(pattern(r"\d[\d_]*(\.[\d_]+)?")))
        .rule("boolean_literal", literals(&["true", "false"]))
        .rule("null_literal", string("null"))
        .rule("this", string("this"))
        .rule(
            "array_literal",
            seq([
                string("["),
                optional(seq([
                    sym("_array_item"),
                    repeat(seq([string(","), sym("_array_item")])),
                ])),
                string("]"),
            ]),
        )
        .rule("_array_item", choice([sym("block"), sym("_token")]))
        .rule(
            "string_literal",
            seq([
                string("\""),
                repeat(choice([sym("escape_sequence"), token(pattern(r#"[^"\\]+"#))])),
                string("\""),
            ]),
        )
        .rule("escape_sequence", token(pattern(r"\\.")))
        .rule("identifier", token(pattern(r"(@|_|\w)(@|_|\w|\d)*")))
        .rule("line_comment", token(seq([string("//"), pattern(".*")])))
        .rule(
            "block_comment",
            seq([
                string("/*"),
                optional(sym("_block_comment_content")),
                string("*/"),
            ]),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_is_valid() {
        let grammar = grammar();
        assert!(sprig::validate(&grammar).is_ok());
        assert_eq!(grammar.start_rule(), Some("source_file"));
        assert_eq!(grammar.external_names(), vec!["_block_comment_content"]);
    }

    #[test]
    fn test_number_is_declared_before_identifier() {
        let grammar = grammar();
        let names = grammar.rule_names();
        let position = |name: &str| names.iter().position(|n| *n == name);
        assert!(position("number_literal") < position("identifier"));
    }
}
