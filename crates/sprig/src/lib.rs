//! An incremental parsing toolkit in the style of tree-sitter.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::multiple_crate_versions)]

/// Grammar definitions: the JSON schema types and a Rust DSL to build them.
///
/// A [`Grammar`] is the declarative input to everything else. It can be read
/// from a `grammar.json` with [`parse_grammar`] or built in Rust with
/// [`grammar::dsl::GrammarBuilder`].
pub mod grammar;

/// Grammar validation and consistency checking.
///
/// Validation protects the generator from malformed grammars: undefined
/// references, bad regular expressions and misuse of `word` or `externals`
/// are reported here rather than surfacing as confusing table conflicts.
pub mod validate;

/// Symbols, productions and their metadata.
pub mod symbol;

/// Compiling a [`Grammar`] into a [`Language`].
pub mod generate;

/// The compiled grammar table.
pub mod language;

/// Context-aware tokenization and the external scanner interface.
pub mod lexer;

mod subtree;

/// The public syntax tree.
pub mod tree;

/// Text edits and position mapping for incremental parsing.
pub mod edit;

/// The parser, its error recovery and incremental re-parsing.
pub mod parser;

pub use edit::{apply, EditedTree, InputEdit, Point, TextEdit};
pub use generate::{generate, generate_with_scanner};
pub use grammar::{parse_grammar, Grammar, GrammarError, Rule};
pub use language::{Action, Language, LoadError, FORMAT_VERSION};
pub use lexer::scanner::{ExternalScanner, ScanCursor, ValidSymbols};
pub use lexer::{LexModeId, Token};
pub use parser::{ParseError, ParseOptions, Parser};
pub use symbol::{Associativity, Production, ProductionId, StateId, Symbol, SymbolMetadata};
pub use tree::{Leaf, Node, Tree};
pub use validate::{validate, ValidationError};
