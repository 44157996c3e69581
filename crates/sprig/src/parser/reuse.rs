//! Walks an old tree in document order, offering subtrees for reuse.

use crate::edit::{old_position, touches, InputEdit};
use crate::lexer::LexModeId;
use crate::subtree::Subtree;

#[derive(Debug)]
struct Frame {
    subtree: Subtree,
    child: usize,
    child_start: usize,
}

/// A cursor over the old tree of an incremental re-parse.
///
/// Positions handed to [`ReuseCursor::candidate`] are in the new text and
/// must never decrease; the cursor only moves forward.
#[derive(Debug)]
pub(crate) struct ReuseCursor {
    edits: Vec<InputEdit>,
    frames: Vec<Frame>,
}

impl ReuseCursor {
    pub(crate) fn new(root: &Subtree, edits: Vec<InputEdit>) -> Self {
        Self {
            edits,
            frames: vec![Frame {
                subtree: root.clone(),
                child: 0,
                child_start: 0,
            }],
        }
    }

    /// The old subtree that starts at new byte `position` and can be reused
    /// as the next lookahead in lex mode `mode`, if any.
    ///
    /// Subtrees that start there but cannot be reused are descended into
    /// (or skipped, for tokens) until a reusable one is found.
    pub(crate) fn candidate(&mut self, position: usize, mode: LexModeId) -> Option<Subtree> {
        let target = old_position(&self.edits, position)?;
        loop {
            let frame = self.frames.last_mut()?;
            let Some(child) = frame.subtree.children().get(frame.child).cloned() else {
                self.frames.pop();
                continue;
            };
            let start = frame.child_start;
            let end = start + child.size();
            if end <= target || child.size() == 0 {
                frame.child += 1;
                frame.child_start = end;
                continue;
            }
            if start > target {
                return None;
            }
            if start == target && self.reusable(&child, start, mode) {
                tracing::trace!(position, size = child.size(), "reuse candidate");
                return Some(child);
            }
            self.descend();
        }
    }

    /// Moves into the subtree last offered by [`ReuseCursor::candidate`], or past it for a token.
    pub(crate) fn descend(&mut self) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let Some(child) = frame.subtree.children().get(frame.child).cloned() else {
            return;
        };
        let start = frame.child_start;
        frame.child += 1;
        frame.child_start = start + child.size();
        if !child.is_terminal() {
            self.frames.push(Frame {
                subtree: child,
                child: 0,
                child_start: start,
            });
        }
    }

    fn reusable(&self, subtree: &Subtree, start: usize, mode: LexModeId) -> bool {
        !subtree.has_error()
            && !subtree.is_fragile()
            && subtree.first_leaf().is_some_and(|(_, m)| m == mode)
            && !touches(
                &self.edits,
                start,
                start + subtree.size() + subtree.lookahead_bytes(),
            )
    }
}
