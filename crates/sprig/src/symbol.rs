//! Grammar symbols and productions as they appear in a compiled [`Language`](crate::Language).
//!
//! Symbols are dense integers. The numbering is fixed by the generator:
//!
//! | range | meaning |
//! | --- | --- |
//! | `0` | end of input |
//! | `1` | `ERROR` |
//! | `2 ..` | lexer tokens, in declaration order |
//! | then | external scanner tokens, in `externals` order |
//! | then | non-terminals, start rule first |

use facet::Facet;
use std::fmt;

/// Index of a parse state in the action and goto tables.
pub type StateId = u16;

/// Index of a production in a [`Language`](crate::Language).
pub type ProductionId = u16;

/// A terminal or non-terminal grammar symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub(crate) u16);

impl Symbol {
    /// The end-of-input terminal.
    pub const END: Symbol = Symbol(0);

    /// The symbol used for error nodes and unrecognized characters.
    pub const ERROR: Symbol = Symbol(1);

    /// Returns the numeric id of this symbol.
    #[must_use]
    pub fn id(self) -> u16 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Describes how a symbol shows up in syntax trees.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct SymbolMetadata {
    /// Display name: the rule name, or the literal text of anonymous tokens.
    pub name: String,
    /// Whether nodes of this symbol appear in the public tree.
    pub visible: bool,
    /// Whether the symbol comes from a named rule (as opposed to a literal).
    pub named: bool,
    /// Whether the symbol is produced by the lexer.
    pub terminal: bool,
    /// Whether the symbol may appear anywhere, between any two tokens.
    pub extra: bool,
}

/// Associativity attached to a production by `PREC_LEFT` or `PREC_RIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Facet)]
#[repr(u8)]
pub enum Associativity {
    /// No associativity; shift/reduce ties favour the shift.
    #[default]
    None,
    /// Ties reduce.
    Left,
    /// Ties shift.
    Right,
}

/// One flattened alternative of a grammar rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    /// The non-terminal this production builds.
    pub lhs: Symbol,
    /// The symbols consumed, in order.
    pub rhs: Vec<Symbol>,
    /// Declared precedence (0 when none was given).
    pub precedence: i32,
    /// Declared associativity.
    pub associativity: Associativity,
    /// Set for `R -> R x` productions of repetition helpers, whose nodes
    /// absorb the children of the leading `R` instead of nesting it.
    pub repeat_append: bool,
}
