//! Error recovery on malformed input.

mod common;

use common::{assert_tiles, fragment, parse};
use proptest::prelude::*;
use rstest::rstest;
use std::time::{Duration, Instant};

#[test]
fn test_unterminated_string_is_covered_by_an_error() {
    let text = "let a = 1;\nlet s = \"abc";
    let tree = parse(text);
    assert!(tree.root_node().has_error());
    let quote = text.find('"').unwrap();
    assert!(tree.errors().iter().any(|range| range.contains(&quote)));
    assert_tiles(&tree, text);
}

#[test]
fn test_statements_after_an_error_still_parse() {
    let text = "let a = ) 1;\nlet b = 2;\nc;";
    let tree = parse(text);
    let root = tree.root_node();
    assert_eq!(tree.errors().len(), 1);
    let last = root.child(root.child_count() - 1).unwrap();
    assert_eq!(last.kind(), "expression_statement");
    assert!(!last.has_error());
    let second = root
        .named_children()
        .find(|n| n.utf8_text(text) == Some("let b = 2;"))
        .unwrap();
    assert_eq!(second.kind(), "let_statement");
}

#[rstest]
#[case("let = 1;")]
#[case("let a 1;")]
#[case("{ a; ")]
#[case("a; } b;")]
#[case("f(1,,2);")]
#[case("@#$")]
#[case(")")]
fn test_malformed_input_yields_a_tree(#[case] text: &str) {
    let tree = parse(text);
    assert!(tree.root_node().has_error(), "{tree}");
    assert!(!tree.errors().is_empty());
    assert_tiles(&tree, text);
}

#[test]
fn test_error_nodes_are_visible() {
    let tree = parse("a; ) b;");
    let error = tree
        .root_node()
        .children()
        .find(|n| n.is_error())
        .unwrap();
    assert_eq!(error.kind(), "ERROR");
    assert!(error.is_named());
    assert_eq!(error.byte_range(), 3..4);
}

#[test]
fn test_garbage_is_recovered_in_linear_time() {
    let small = ")".repeat(2_000);
    let large = ")".repeat(20_000);

    let start = Instant::now();
    let tree = parse(&small);
    let small_time = start.elapsed();
    assert_tiles(&tree, &small);

    let start = Instant::now();
    let tree = parse(&large);
    let large_time = start.elapsed();
    assert_tiles(&tree, &large);
    assert_eq!(tree.errors().len(), 1);

    // Ten times the input should not cost anywhere near a hundred times the work.
    assert!(
        large_time < small_time * 40 + Duration::from_millis(200),
        "{small_time:?} vs {large_time:?}"
    );
}

#[test]
fn test_mixed_garbage_terminates() {
    let text = "let ( { = ; ) } \" , * + ".repeat(500);
    let tree = parse(&text);
    assert_tiles(&tree, &text);
}

proptest! {
    #[test]
    fn test_any_input_tiles(parts in prop::collection::vec(fragment(), 0..10)) {
        let text = parts.concat();
        let tree = parse(&text);
        assert_tiles(&tree, &text);
        for range in tree.errors() {
            prop_assert!(range.end <= text.len());
        }
    }
}
