//! Immutable, reference-counted syntax tree nodes.
//!
//! A [`Subtree`] stores sizes rather than absolute positions, so the same
//! subtree can sit at a different offset in a later tree. That is what lets
//! the incremental parser splice old subtrees into a new tree by reference.
//! Besides its shape, each subtree remembers the context it was built in
//! (parse state beneath it, lex modes, how far past its end the lexer
//! looked), which the reuse checks compare against the current parse.

use crate::lexer::{LexModeId, Token};
use crate::symbol::{StateId, Symbol};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) struct SubtreeData {
    pub symbol: Symbol,
    pub size: usize,
    pub children: Vec<Subtree>,
    /// State on the stack beneath this subtree when it was pushed.
    pub parse_state: StateId,
    /// Symbol and lex mode of the first token inside, if any.
    pub first_leaf: Option<(Symbol, LexModeId)>,
    /// The state the lexer used for the token following this subtree.
    pub end_lex_state: StateId,
    /// How many bytes past the end of this subtree influenced its construction.
    pub lookahead_bytes: usize,
    pub extra: bool,
    pub has_error: bool,
    pub fragile: bool,
    pub terminal: bool,
}

/// A shared handle to an immutable syntax tree node.
#[derive(Debug, Clone)]
pub(crate) struct Subtree(Arc<SubtreeData>);

impl Subtree {
    /// A leaf for `token`, shifted on top of `parse_state` into `next_state`.
    pub(crate) fn leaf(
        token: &Token,
        parse_state: StateId,
        next_state: StateId,
        extra: bool,
    ) -> Self {
        Self(Arc::new(SubtreeData {
            symbol: token.symbol,
            size: token.len(),
            children: Vec::new(),
            parse_state,
            first_leaf: Some((token.symbol, token.lex_mode)),
            end_lex_state: next_state,
            lookahead_bytes: token.examined_end.saturating_sub(token.end),
            extra,
            has_error: token.symbol == Symbol::ERROR,
            fragile: false,
            terminal: true,
        }))
    }

    /// An inner node over `children`.
    ///
    /// `examined_end` is the furthest byte, relative to the node's start, that
    /// influenced the decision to build it (the end of the lookahead token).
    pub(crate) fn node(
        symbol: Symbol,
        children: Vec<Subtree>,
        parse_state: StateId,
        examined_end: usize,
        fragile: bool,
    ) -> Self {
        let mut data = SubtreeData {
            symbol,
            size: 0,
            children,
            parse_state,
            first_leaf: None,
            end_lex_state: parse_state,
            lookahead_bytes: 0,
            extra: false,
            has_error: symbol == Symbol::ERROR,
            fragile,
            terminal: false,
        };
        data.summarize(examined_end);
        Self(Arc::new(data))
    }

    /// Appends `children` to this node, reusing its allocation when it is not shared.
    pub(crate) fn append(
        mut self,
        children: impl IntoIterator<Item = Subtree>,
        examined_end: usize,
        fragile: bool,
    ) -> Self {
        let data = Arc::make_mut(&mut self.0);
        let mut extent = examined_end.max(data.size + data.lookahead_bytes);
        for child in children {
            extent = extent.max(data.size + child.size() + child.lookahead_bytes());
            data.size += child.size();
            data.has_error |= child.has_error();
            if !child.is_extra() {
                if let Some(leaf) = child.first_leaf() {
                    data.first_leaf.get_or_insert(leaf);
                    data.end_lex_state = child.end_lex_state();
                }
            }
            data.children.push(child);
        }
        data.lookahead_bytes = extent - data.size;
        data.fragile |= fragile;
        self
    }

    /// This subtree with a different parse state beneath it.
    pub(crate) fn with_states(&self, parse_state: StateId, end_lex_state: StateId) -> Self {
        if self.0.parse_state == parse_state && self.0.end_lex_state == end_lex_state {
            return self.clone();
        }
        let mut data = (*self.0).clone();
        data.parse_state = parse_state;
        data.end_lex_state = end_lex_state;
        Self(Arc::new(data))
    }

    /// This subtree flagged as an extra.
    pub(crate) fn into_extra(mut self) -> Self {
        if !self.0.extra {
            Arc::make_mut(&mut self.0).extra = true;
        }
        self
    }

    pub(crate) fn symbol(&self) -> Symbol {
        self.0.symbol
    }

    pub(crate) fn size(&self) -> usize {
        self.0.size
    }

    pub(crate) fn children(&self) -> &[Subtree] {
        &self.0.children
    }

    pub(crate) fn parse_state(&self) -> StateId {
        self.0.parse_state
    }

    pub(crate) fn first_leaf(&self) -> Option<(Symbol, LexModeId)> {
        self.0.first_leaf
    }

    pub(crate) fn end_lex_state(&self) -> StateId {
        self.0.end_lex_state
    }

    pub(crate) fn lookahead_bytes(&self) -> usize {
        self.0.lookahead_bytes
    }

    pub(crate) fn is_extra(&self) -> bool {
        self.0.extra
    }

    pub(crate) fn has_error(&self) -> bool {
        self.0.has_error
    }

    pub(crate) fn is_fragile(&self) -> bool {
        self.0.fragile
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.0.terminal
    }

    pub(crate) fn is_error(&self) -> bool {
        self.0.symbol == Symbol::ERROR
    }

    /// Returns `true` if both handles point at the same allocation.
    pub(crate) fn ptr_eq(&self, other: &Subtree) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Absolute end of the first token inside, including the bytes its lexer examined.
    pub(crate) fn first_token_extent(&self, start: usize) -> usize {
        if self.is_terminal() {
            return start + self.size() + self.lookahead_bytes();
        }
        let mut offset = start;
        for child in self.children() {
            if child.first_leaf().is_some() && !child.is_extra() {
                return child.first_token_extent(offset);
            }
            offset += child.size();
        }
        start + self.size() + self.lookahead_bytes()
    }

    /// Same symbols, sizes, extras and children, ignoring parser bookkeeping.
    pub(crate) fn structurally_eq(&self, other: &Subtree) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.symbol() == other.symbol()
            && self.size() == other.size()
            && self.is_extra() == other.is_extra()
            && self.children().len() == other.children().len()
            && self
                .children()
                .iter()
                .zip(other.children())
                .all(|(a, b)| a.structurally_eq(b))
    }
}

impl SubtreeData {
    fn summarize(&mut self, examined_end: usize) {
        let mut size = 0;
        let mut extent = examined_end;
        let mut has_error = self.symbol == Symbol::ERROR;
        for child in &self.children {
            extent = extent.max(size + child.size() + child.lookahead_bytes());
            size += child.size();
            has_error |= child.has_error();
        }
        self.size = size;
        self.lookahead_bytes = extent.saturating_sub(size);
        self.has_error = has_error;
        self.first_leaf = self
            .children
            .iter()
            .filter(|c| !c.is_extra())
            .find_map(Subtree::first_leaf);
        if let Some(last) = self
            .children
            .iter()
            .rev()
            .find(|c| !c.is_extra() && c.first_leaf().is_some())
        {
            self.end_lex_state = last.end_lex_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(symbol: u16, start: usize, end: usize, examined_end: usize) -> Token {
        Token {
            symbol: Symbol(symbol),
            start,
            end,
            lex_mode: 0,
            examined_end,
        }
    }

    #[test]
    fn test_leaf_lookahead() {
        let leaf = Subtree::leaf(&token(2, 0, 3, 4), 0, 5, false);
        assert_eq!(leaf.size(), 3);
        assert_eq!(leaf.lookahead_bytes(), 1);
        assert_eq!(leaf.end_lex_state(), 5);
        assert_eq!(leaf.first_leaf(), Some((Symbol(2), 0)));
    }

    #[test]
    fn test_node_summarizes_children() {
        let a = Subtree::leaf(&token(2, 0, 2, 3), 0, 1, false);
        let space = Subtree::leaf(&token(3, 2, 3, 3), 1, 1, true);
        let b = Subtree::leaf(&token(4, 3, 5, 6), 1, 2, false);
        let node = Subtree::node(Symbol(9), vec![a, space, b], 0, 5, false);
        assert_eq!(node.size(), 5);
        assert_eq!(node.lookahead_bytes(), 1);
        assert_eq!(node.end_lex_state(), 2);
        assert_eq!(node.first_leaf(), Some((Symbol(2), 0)));
        assert!(!node.has_error());
    }

    #[test]
    fn test_error_propagates() {
        let bad = Subtree::leaf(&token(1, 0, 1, 1), 0, 0, false);
        let node = Subtree::node(Symbol(9), vec![bad], 0, 1, false);
        assert!(node.has_error());
    }

    #[test]
    fn test_append_copies_shared_nodes() {
        let a = Subtree::leaf(&token(2, 0, 1, 1), 0, 1, false);
        let b = Subtree::leaf(&token(2, 1, 2, 2), 1, 1, false);
        let node = Subtree::node(Symbol(9), vec![a], 0, 1, false);
        let shared = node.clone();
        let grown = node.append([b], 2, false);
        assert_eq!(shared.children().len(), 1);
        assert_eq!(grown.children().len(), 2);
        assert_eq!(grown.size(), 2);
        assert!(!grown.structurally_eq(&shared));
    }

    #[test]
    fn test_first_token_extent() {
        let a = Subtree::leaf(&token(2, 4, 6, 7), 0, 1, false);
        let b = Subtree::leaf(&token(3, 6, 9, 10), 1, 2, false);
        let node = Subtree::node(Symbol(9), vec![a, b], 0, 6, false);
        assert_eq!(node.first_token_extent(4), 7);
    }
}
