//! Parsing Bolt source through the packaged language.

use proptest::prelude::*;
use rstest::rstest;
use sprig::{InputEdit, Language, Parser, Tree};
use std::time::{Duration, Instant};

fn parse(text: &str) -> Tree {
    Parser::new(sprig_bolt::language().unwrap()).parse(text)
}

fn sexp(text: &str) -> String {
    parse(text).root_node().to_sexp()
}

#[test]
fn test_can_load_grammar() {
    let language = sprig_bolt::language().expect("Error loading Bolt grammar");
    assert_eq!(language.name(), "bolt");
    assert!(language.has_external_scanner());
    let _parser = Parser::new(language);
}

#[test]
fn test_language_is_shared() {
    let a = sprig_bolt::language().unwrap();
    let b = sprig_bolt::language().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_table_round_trips_with_scanner() {
    let language = sprig_bolt::language().unwrap();
    let bytes = language.to_bytes();
    assert!(Language::from_bytes(&bytes, None).is_err());
    let loaded =
        Language::from_bytes(&bytes, Some(std::sync::Arc::new(sprig_bolt::BlockCommentScanner)))
            .unwrap();
    let text = "fn f { /* a /* b */ c */ }";
    let expected = parse(text);
    let tree = Parser::new(loaded).parse(text);
    assert_eq!(tree.root_node().to_sexp(), expected.root_node().to_sexp());
}

#[rstest]
#[case("let", "(source_file (keyword))")]
#[case("letter", "(source_file (identifier))")]
#[case("Type any", "(source_file (type_keyword) (type_keyword))")]
#[case("true null this", "(source_file (boolean_literal) (null_literal) (this))")]
#[case("1_000.5 x2", "(source_file (number_literal) (identifier))")]
#[case(
    "a >= b ?? c",
    "(source_file (identifier) (operator (other_operator)) \
     (identifier) (operator (other_operator)) (identifier))"
)]
#[case("x?.y", "(source_file (identifier) (punctuation) (identifier))")]
fn test_tokens(#[case] text: &str, #[case] expected: &str) {
    assert_eq!(sexp(text), expected);
}

#[test]
fn test_blocks_nest() {
    assert_eq!(
        sexp("fn main { if x { return 1 } }"),
        "(source_file (keyword) (identifier) \
         (block (keyword) (identifier) (block (keyword) (number_literal))))"
    );
}

#[test]
fn test_arrays() {
    assert_eq!(
        sexp("[1, { a }, \"s\"]"),
        "(source_file (array_literal (number_literal) (block (identifier)) (string_literal)))"
    );
    assert_eq!(sexp("[]"), "(source_file (array_literal))");
}

#[test]
fn test_string_with_escapes() {
    let text = r#"let s = "a \"quoted\" \\ word""#;
    let tree = parse(text);
    let root = tree.root_node();
    let string = root.named_children().last().unwrap();
    assert_eq!(string.kind(), "string_literal");
    assert_eq!(string.utf8_text(text), Some(r#""a \"quoted\" \\ word""#));
    let escapes: Vec<_> = string
        .named_children()
        .map(|n| n.utf8_text(text).unwrap())
        .collect();
    assert_eq!(escapes, vec![r#"\""#, r#"\""#, r"\\"]);
}

#[test]
fn test_comments() {
    let text = "a // trailing\n/* one /* two */ still one */ b";
    let tree = parse(text);
    assert_eq!(
        tree.root_node().to_sexp(),
        "(source_file (identifier) (line_comment) (block_comment) (identifier))"
    );
    let block = tree.root_node().child(2).unwrap();
    assert!(block.is_extra());
    assert_eq!(block.utf8_text(text), Some("/* one /* two */ still one */"));
}

#[test]
fn test_empty_block_comment() {
    assert_eq!(sexp("/**/ x"), "(source_file (block_comment) (identifier))");
}

#[test]
fn test_comment_inside_array() {
    assert!(!parse("[1, /* gap */ 2]").root_node().has_error());
}

#[rstest]
#[case("/* never closed")]
#[case("\"never closed")]
#[case("{ { }")]
#[case("] } ,,")]
fn test_malformed_input_is_contained(#[case] text: &str) {
    let tree = parse(text);
    assert!(tree.root_node().has_error());
    assert_eq!(tree.root_node().byte_range(), 0..text.len());
    assert!(!tree.errors().is_empty());
}

#[test]
fn test_unclosed_comment_runs_to_end_of_input() {
    let text = "x /* a /* b */";
    let tree = parse(text);
    assert_eq!(tree.errors(), vec![2..text.len()]);
    assert_eq!(tree.root_node().child(0).unwrap().kind(), "identifier");

    let text = "x /* a */ /* b";
    let tree = parse(text);
    assert_eq!(tree.root_node().child(1).unwrap().kind(), "block_comment");
    assert_eq!(tree.errors(), vec![10..text.len()]);
}

#[rstest]
#[case("/*")]
#[case("*/")]
#[case("/* ")]
fn test_unclosed_comments_parse_in_linear_time(#[case] piece: &str) {
    let small = piece.repeat(1_000);
    let large = piece.repeat(10_000);

    let start = Instant::now();
    let tree = parse(&small);
    let small_time = start.elapsed();
    assert_eq!(tree.root_node().byte_range(), 0..small.len());

    let start = Instant::now();
    let tree = parse(&large);
    let large_time = start.elapsed();
    assert_eq!(tree.root_node().byte_range(), 0..large.len());
    assert!(tree.root_node().has_error());

    assert!(
        large_time < small_time * 40 + Duration::from_millis(200),
        "{small_time:?} vs {large_time:?}"
    );
}

#[test]
fn test_edit_inside_block_reuses_siblings() {
    let text = "{ a } { b c } { d }";
    let parser = Parser::new(sprig_bolt::language().unwrap());
    let old = parser.parse(text);
    // Rename `c` to `cc`.
    let edit = InputEdit::new(10, 11, 12);
    let new_text = "{ a } { b cc } { d }";
    let tree = parser.reparse(&old.edit(&[edit]), new_text);
    assert!(tree.structurally_eq(&parser.parse(new_text)));
    let old_root = old.root_node();
    let new_root = tree.root_node();
    assert!(new_root.child(0).unwrap().same_subtree(&old_root.child(0).unwrap()));
    assert!(new_root.child(2).unwrap().same_subtree(&old_root.child(2).unwrap()));
    assert!(!new_root.child(1).unwrap().same_subtree(&old_root.child(1).unwrap()));
}

fn bolt_text() -> impl Strategy<Value = String> {
    let pieces = prop::sample::select(vec![
        "let ", "x", " ", "\n", "{", "}", "[", "]", ",", "1", "\"s\"", "\\", "/*", "*/",
        "// c\n", "=", "?.", "true", "\"",
    ]);
    prop::collection::vec(pieces, 0..24).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn test_reparse_matches_full_parse(
        text in bolt_text(),
        insert in bolt_text(),
        at in 0usize..64,
        len in 0usize..6,
    ) {
        let parser = Parser::new(sprig_bolt::language().unwrap());
        let start = at.min(text.len());
        let end = (start + len).min(text.len());
        let (new_text, edits) = sprig::apply(&text, &[sprig::TextEdit::new(start..end, &insert)]);
        let old = parser.parse(&text);
        let tree = parser.reparse(&old.edit(&edits), &new_text);
        let fresh = parser.parse(&new_text);
        prop_assert!(tree.structurally_eq(&fresh), "{} vs {}", tree, fresh);
    }
}
