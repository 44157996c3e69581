#![allow(dead_code)]

use proptest::prelude::*;
use sprig::grammar::dsl::*;
use sprig::{generate, Grammar, Language, Parser, Tree};

/// A small statement language: `let` bindings, expression statements,
/// nested blocks, calls and two levels of binary precedence.
pub fn statements_grammar() -> Grammar {
    GrammarBuilder::new("statements")
        .extras([pattern(r"\s"), sym("comment")])
        .word("identifier")
        .rule("program", repeat(sym("_statement")))
        .rule(
            "_statement",
            choice([sym("let_statement"), sym("expression_statement"), sym("block")]),
        )
        .rule(
            "let_statement",
            seq([string("let"), sym("identifier"), string("="), sym("_expression"), string(";")]),
        )
        .rule("expression_statement", seq([sym("_expression"), string(";")]))
        .rule("block", seq([string("{"), repeat(sym("_statement")), string("}")]))
        .rule(
            "_expression",
            choice([
                sym("identifier"),
                sym("number"),
                sym("string"),
                sym("binary"),
                sym("call"),
                sym("parenthesized"),
            ]),
        )
        .rule(
            "binary",
            choice([
                prec_left(1, seq([sym("_expression"), string("+"), sym("_expression")])),
                prec_left(2, seq([sym("_expression"), string("*"), sym("_expression")])),
            ]),
        )
        .rule(
            "call",
            seq([
                sym("identifier"),
                string("("),
                optional(seq([
                    sym("_expression"),
                    repeat(seq([string(","), sym("_expression")])),
                ])),
                string(")"),
            ]),
        )
        .rule("parenthesized", seq([string("("), sym("_expression"), string(")")]))
        .rule("string", token(seq([string("\""), pattern(r#"[^"\n]*"#), string("\"")])))
        .rule("number", pattern(r"\d+"))
        .rule("identifier", pattern(r"[a-z_]\w*"))
        .rule("comment", token(seq([string("//"), pattern(".*")])))
        .build()
}

pub fn statements() -> Language {
    generate(&statements_grammar()).unwrap()
}

pub fn parse(text: &str) -> Tree {
    Parser::new(statements()).parse(text)
}

/// The same shape of language as a tree-sitter `grammar.json`.
pub const PAIRS_JSON: &str = r#"{
  "name": "pairs",
  "extras": [{"type": "PATTERN", "value": "\\s"}],
  "rules": {
    "document": {"type": "REPEAT", "content": {"type": "SYMBOL", "name": "pair"}},
    "pair": {
      "type": "SEQ",
      "members": [
        {"type": "SYMBOL", "name": "key"},
        {"type": "STRING", "value": ":"},
        {"type": "SYMBOL", "name": "value"},
        {"type": "STRING", "value": ";"}
      ]
    },
    "key": {"type": "PATTERN", "value": "[a-z]+"},
    "value": {"type": "PATTERN", "value": "[0-9]+"}
  }
}"#;

/// Asserts that the leaves of `tree` cover `text` exactly, in order.
pub fn assert_tiles(tree: &Tree, text: &str) {
    let mut position = 0;
    for leaf in tree.leaves() {
        assert_eq!(leaf.byte_range.start, position, "gap before {leaf:?}");
        position = leaf.byte_range.end;
    }
    assert_eq!(position, text.len());
    assert_eq!(tree.root_node().byte_range(), 0..text.len());
}

/// Statement-language text, usually well formed.
pub fn statement_text() -> impl Strategy<Value = String> {
    let statement = prop_oneof![
        "[a-k]{1,3}".prop_map(|name| format!("let {name} = 1;")),
        "[a-k]{1,3}".prop_map(|name| format!("{name}(2, \"s\") + 3 * x;")),
        Just("{ a; { b; } }".to_string()),
        Just("// note\n".to_string()),
        Just("(a + b);".to_string()),
    ];
    prop::collection::vec(statement, 0..8).prop_map(|s| s.join("\n"))
}

/// Arbitrary fragments, including ones that do not parse.
pub fn fragment() -> impl Strategy<Value = String> {
    let piece = prop::sample::select(vec![
        "let ", "x", "=", "1", ";", "{", "}", "(", ")", ",", "+", "*", "\"", "\"q\"", " ", "\n",
        "//", "é", "@",
    ]);
    prop::collection::vec(piece, 0..6).prop_map(|parts| parts.concat())
}
