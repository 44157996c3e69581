//! The parse stack.
//!
//! Entries pair a subtree with the parse state reached after pushing it.
//! Extras and `ERROR` nodes are *transparent*: they sit on the stack in
//! document order but carry the state beneath them, so the automaton never
//! sees them and reductions step over them.

use crate::language::Language;
use crate::subtree::Subtree;
use crate::symbol::{ProductionId, StateId};

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub state: StateId,
    pub subtree: Subtree,
    pub start: usize,
    pub transparent: bool,
}

impl Entry {
    pub(crate) fn end(&self) -> usize {
        self.start + self.subtree.size()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Stack {
    initial: StateId,
    origin: usize,
    entries: Vec<Entry>,
}

impl Stack {
    /// An empty stack in state `initial` whose first entry will start at byte `origin`.
    pub(crate) fn new(initial: StateId, origin: usize) -> Self {
        Self {
            initial,
            origin,
            entries: Vec::new(),
        }
    }

    pub(crate) fn top_state(&self) -> StateId {
        self.entries.last().map_or(self.initial, |e| e.state)
    }

    /// Byte offset just past the last entry.
    pub(crate) fn end(&self) -> usize {
        self.entries.last().map_or(self.origin, Entry::end)
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn push(&mut self, state: StateId, subtree: Subtree, start: usize) {
        self.entries.push(Entry {
            state,
            subtree,
            start,
            transparent: false,
        });
    }

    pub(crate) fn push_transparent(&mut self, subtree: Subtree, start: usize) {
        let state = self.top_state();
        self.entries.push(Entry {
            state,
            subtree,
            start,
            transparent: true,
        });
    }

    /// Removes every entry from index `at` upwards.
    pub(crate) fn split_off(&mut self, at: usize) -> Vec<Entry> {
        self.entries.split_off(at.min(self.entries.len()))
    }

    pub(crate) fn take(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }

    /// States of the non-transparent entries, bottom first, starting with the initial state.
    pub(crate) fn states(&self) -> Vec<StateId> {
        std::iter::once(self.initial)
            .chain(self.entries.iter().filter(|e| !e.transparent).map(|e| e.state))
            .collect()
    }

    /// Index of the first entry above the lowest `depth` non-transparent
    /// entries counted from the top; everything from there up is discarded
    /// when recovering at that depth.
    pub(crate) fn cut_point(&self, depth: usize) -> usize {
        let mut remaining = depth;
        for (i, entry) in self.entries.iter().enumerate().rev() {
            if !entry.transparent {
                if remaining == 0 {
                    return i + 1;
                }
                remaining -= 1;
            }
        }
        0
    }

    /// Applies production `id`, building its node and pushing the goto state.
    ///
    /// Transparent entries between the popped symbols end up inside the
    /// node; transparent entries above the last symbol are put back on top.
    /// `examined_end` is the absolute end of the bytes the lookahead
    /// examined. Returns `false` if the stack does not hold enough entries.
    pub(crate) fn reduce(
        &mut self,
        language: &Language,
        id: ProductionId,
        examined_end: usize,
    ) -> bool {
        let Some(production) = language.production(id) else {
            return false;
        };
        let mut trailing = Vec::new();
        while self.entries.last().is_some_and(|e| e.transparent) {
            trailing.extend(self.entries.pop());
        }
        trailing.reverse();

        let available = self.entries.iter().filter(|e| !e.transparent).count();
        if available < production.rhs.len() {
            self.entries.extend(trailing);
            return false;
        }
        let at = if production.rhs.is_empty() {
            self.entries.len()
        } else {
            self.cut_point(production.rhs.len() - 1).saturating_sub(1)
        };
        let popped = self.entries.split_off(at);
        let start = popped
            .first()
            .or(trailing.first())
            .map_or_else(|| self.end(), |e| e.start);
        let beneath = self.top_state();
        let fragile = trailing.iter().any(|e| e.subtree.is_error());
        let relative_end = examined_end.saturating_sub(start);

        let mut children = popped.into_iter().map(|e| e.subtree);
        let node = match children.next() {
            Some(first)
                if production.repeat_append
                    && !first.is_terminal()
                    && !first.is_extra()
                    && first.symbol() == production.lhs =>
            {
                first.append(children, relative_end, fragile)
            }
            first => Subtree::node(
                production.lhs,
                first.into_iter().chain(children).collect(),
                beneath,
                relative_end,
                fragile,
            ),
        };
        let next = language.goto(beneath, production.lhs).unwrap_or(beneath);
        tracing::trace!(
            symbol = language.symbol_name(production.lhs).unwrap_or_default(),
            start,
            size = node.size(),
            state = next,
            "reduce"
        );
        self.push(next, node, start);
        for entry in trailing {
            self.push_transparent(entry.subtree, entry.start);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Token;
    use crate::symbol::Symbol;

    fn leaf(symbol: u16, start: usize, end: usize, extra: bool) -> Subtree {
        let token = Token {
            symbol: Symbol(symbol),
            start,
            end,
            lex_mode: 0,
            examined_end: end,
        };
        Subtree::leaf(&token, 0, 0, extra)
    }

    #[test]
    fn test_transparent_entries_keep_state() {
        let mut stack = Stack::new(3, 0);
        stack.push(7, leaf(2, 0, 1, false), 0);
        stack.push_transparent(leaf(4, 1, 2, true), 1);
        assert_eq!(stack.top_state(), 7);
        assert_eq!(stack.states(), vec![3, 7]);
        assert_eq!(stack.end(), 2);
    }

    #[test]
    fn test_cut_point_skips_transparent_entries() {
        let mut stack = Stack::new(0, 0);
        stack.push(1, leaf(2, 0, 1, false), 0);
        stack.push_transparent(leaf(4, 1, 2, true), 1);
        stack.push(2, leaf(2, 2, 3, false), 2);
        stack.push_transparent(leaf(4, 3, 4, true), 3);
        assert_eq!(stack.cut_point(0), 3);
        assert_eq!(stack.cut_point(1), 1);
        assert_eq!(stack.cut_point(2), 0);
        assert_eq!(stack.cut_point(9), 0);
    }
}
