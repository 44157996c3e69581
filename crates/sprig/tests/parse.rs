//! Parsing complete documents with generated languages.

mod common;

use common::{assert_tiles, fragment, parse, statement_text, statements};
use proptest::prelude::*;
use rstest::rstest;
use sprig::grammar::dsl::{pattern, GrammarBuilder};
use sprig::{generate, parse_grammar, Parser};

#[test]
fn test_statements() {
    let text = "let x = 1;\nprint(x, \"hi\");\n{ x; }";
    let tree = parse(text);
    assert_eq!(
        tree.root_node().to_sexp(),
        "(program (let_statement (identifier) (number)) \
         (expression_statement (call (identifier) (identifier) (string))) \
         (block (expression_statement (identifier))))"
    );
    assert_eq!(tree.to_string(), tree.root_node().to_sexp());
    assert!(tree.errors().is_empty());
}

#[rstest]
#[case(
    "a + b * c;",
    "(program (expression_statement \
     (binary (identifier) (binary (identifier) (identifier)))))"
)]
#[case(
    "a * b + c;",
    "(program (expression_statement \
     (binary (binary (identifier) (identifier)) (identifier))))"
)]
#[case(
    "a + b + c;",
    "(program (expression_statement \
     (binary (binary (identifier) (identifier)) (identifier))))"
)]
#[case(
    "(a + b) * c;",
    "(program (expression_statement \
     (binary (parenthesized (binary (identifier) (identifier))) (identifier))))"
)]
#[case("f();", "(program (expression_statement (call (identifier))))")]
fn test_precedence_and_associativity(#[case] text: &str, #[case] expected: &str) {
    assert_eq!(parse(text).root_node().to_sexp(), expected);
}

#[rstest]
#[case("let", "let")]
#[case("letter", "identifier")]
#[case("let_", "identifier")]
fn test_keywords_and_identifiers(#[case] word: &str, #[case] kind: &str) {
    let text = format!("{word} = 1;");
    let tree = parse(&text);
    let first = tree.leaves().into_iter().next().unwrap();
    assert_eq!(first.kind, kind);
    assert_eq!(first.byte_range, 0..word.len());
}

#[test]
fn test_node_navigation() {
    let text = "let total = f(1);";
    let tree = parse(text);
    let root = tree.root_node();
    assert_eq!(root.kind(), "program");
    assert!(root.parent().is_none());

    let statement = root.child(0).unwrap();
    assert_eq!(statement.parent(), Some(root));
    assert_eq!(statement.byte_range(), 0..text.len());
    let kinds: Vec<_> = statement.children().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec!["let", "identifier", "=", "call", ";"]);
    assert!(!statement.child(0).unwrap().is_named());
    assert_eq!(statement.child_count(), 5);
    assert!(statement.child(5).is_none());

    let call = statement.named_children().nth(1).unwrap();
    assert_eq!(call.utf8_text(text), Some("f(1)"));
    assert_eq!((call.start_byte(), call.end_byte()), (12, 16));
    assert_eq!(call.symbol(), tree.language().symbol_for_name("call").unwrap());
}

#[test]
fn test_comments_are_visible_extras() {
    let text = "a; // first\nb;";
    let tree = parse(text);
    let comment = tree.root_node().child(1).unwrap();
    assert_eq!(comment.kind(), "comment");
    assert!(comment.is_extra());
    assert_eq!(comment.utf8_text(text), Some("// first"));
}

#[test]
fn test_whitespace_is_hidden_but_tiles() {
    let text = "  a ;\n\n";
    let tree = parse(text);
    assert_eq!(tree.root_node().child_count(), 1);
    assert_tiles(&tree, text);
    assert!(tree.leaves().iter().filter(|l| l.is_extra).count() >= 4);
}

#[test]
fn test_empty_input() {
    let tree = parse("");
    assert_eq!(tree.root_node().to_sexp(), "(program)");
    assert_eq!(tree.root_node().byte_range(), 0..0);
    assert!(tree.leaves().is_empty());
}

#[test]
fn test_multibyte_text() {
    let text = "let café = \"naïve\";";
    let tree = parse(text);
    assert!(tree.errors().is_empty());
    let name = tree.root_node().child(0).unwrap().child(1).unwrap();
    assert_eq!(name.utf8_text(text), Some("café"));
    assert_tiles(&tree, text);
}

#[test]
fn test_json_grammar() {
    let grammar = parse_grammar(common::PAIRS_JSON).unwrap();
    let language = generate(&grammar).unwrap();
    let tree = Parser::new(language).parse("a: 1;\nbc: 22;");
    assert_eq!(tree.root_node().to_sexp(), "(document (pair (key) (value)) (pair (key) (value)))");
}

#[test]
fn test_single_token_document() {
    let grammar = GrammarBuilder::new("word").rule("word", pattern("[a-z]+")).build();
    let parser = Parser::new(generate(&grammar).unwrap());
    let tree = parser.parse("abc");
    assert_eq!(tree.root_node().to_sexp(), "(word)");
    assert!(tree.errors().is_empty());
    assert!(parser.parse("abc def").root_node().has_error());
}

#[test]
fn test_trees_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<sprig::Tree>();
    assert_send_sync::<sprig::Language>();
    assert_send_sync::<Parser>();
}

#[test]
fn test_parsers_share_a_language_across_threads() {
    let language = statements();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let language = language.clone();
            std::thread::spawn(move || {
                let text = format!("let v{i} = {i};");
                Parser::new(language).parse(&text).root_node().to_sexp()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "(program (let_statement (identifier) (number)))");
    }
}

proptest! {
    #[test]
    fn test_leaves_tile_well_formed_text(text in statement_text()) {
        let tree = parse(&text);
        prop_assert!(tree.errors().is_empty(), "{}", tree);
        assert_tiles(&tree, &text);
    }

    #[test]
    fn test_leaves_tile_any_text(parts in prop::collection::vec(fragment(), 0..6)) {
        let text = parts.concat();
        assert_tiles(&parse(&text), &text);
    }

    #[test]
    fn test_parse_is_idempotent(parts in prop::collection::vec(fragment(), 0..6)) {
        let text = parts.concat();
        let parser = Parser::new(statements());
        prop_assert!(parser.parse(&text).structurally_eq(&parser.parse(&text)));
    }
}
