//! The public syntax tree.
//!
//! A [`Tree`] owns its root [`Subtree`] and an arena of the nodes a caller
//! can see: hidden rules and repetition helpers are flattened into their
//! parents and hidden tokens (such as whitespace) are left out. Nodes refer
//! to their parent and children by index into the arena, and a [`Node`] is
//! a borrowed view (`&Tree` plus an index).

use crate::edit::{normalize, EditedTree, InputEdit};
use crate::language::Language;
use crate::subtree::Subtree;
use crate::symbol::Symbol;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone)]
struct NodeEntry {
    subtree: Subtree,
    start: usize,
    parent: Option<usize>,
    children: Range<usize>,
}

/// A parsed syntax tree.
#[derive(Debug, Clone)]
pub struct Tree {
    root: Subtree,
    language: Language,
    nodes: Vec<NodeEntry>,
}

/// A terminal of the tree, hidden or not, with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf<'tree> {
    /// The terminal symbol.
    pub symbol: Symbol,
    /// The symbol's name.
    pub kind: &'tree str,
    /// Bytes covered by the terminal.
    pub byte_range: Range<usize>,
    /// Whether the terminal is an extra (whitespace, comments).
    pub is_extra: bool,
}

impl Tree {
    pub(crate) fn new(root: Subtree, language: Language) -> Self {
        let mut nodes = vec![NodeEntry {
            subtree: root.clone(),
            start: 0,
            parent: None,
            children: 0..0,
        }];
        let mut found = Vec::new();
        let mut index = 0;
        while index < nodes.len() {
            found.clear();
            collect_visible(&language, &nodes[index].subtree, nodes[index].start, &mut found);
            let first = nodes.len();
            nodes.extend(found.drain(..).map(|(subtree, start)| NodeEntry {
                subtree,
                start,
                parent: Some(index),
                children: 0..0,
            }));
            nodes[index].children = first..nodes.len();
            index += 1;
        }
        Self {
            root,
            language,
            nodes,
        }
    }

    /// The root node.
    #[must_use]
    pub fn root_node(&self) -> Node<'_> {
        Node {
            tree: self,
            index: 0,
        }
    }

    /// The language this tree was parsed with.
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Every terminal in document order, including hidden ones.
    ///
    /// Their byte ranges tile the source text exactly.
    #[must_use]
    pub fn leaves(&self) -> Vec<Leaf<'_>> {
        let mut leaves = Vec::new();
        let mut pending = vec![(&self.root, 0)];
        while let Some((subtree, start)) = pending.pop() {
            if subtree.is_terminal() {
                leaves.push(Leaf {
                    symbol: subtree.symbol(),
                    kind: self.language.symbol_name(subtree.symbol()).unwrap_or("ERROR"),
                    byte_range: start..start + subtree.size(),
                    is_extra: subtree.is_extra(),
                });
                continue;
            }
            let mut offset = start + subtree.size();
            for child in subtree.children().iter().rev() {
                offset -= child.size();
                pending.push((child, offset));
            }
        }
        leaves
    }

    /// Byte ranges of the outermost `ERROR` nodes.
    #[must_use]
    pub fn errors(&self) -> Vec<Range<usize>> {
        let mut errors = Vec::new();
        let mut pending = vec![(&self.root, 0)];
        while let Some((subtree, start)) = pending.pop() {
            if subtree.is_error() {
                errors.push(start..start + subtree.size());
            } else if subtree.has_error() {
                let mut offset = start + subtree.size();
                for child in subtree.children().iter().rev() {
                    offset -= child.size();
                    pending.push((child, offset));
                }
            }
        }
        errors
    }

    /// Returns `true` if both trees have the same symbols and byte ranges throughout.
    #[must_use]
    pub fn structurally_eq(&self, other: &Tree) -> bool {
        self.root.structurally_eq(&other.root)
    }

    /// Records `edits` (against the text this tree was parsed from) for an
    /// incremental re-parse.
    #[must_use]
    pub fn edit(&self, edits: &[InputEdit]) -> EditedTree {
        let edits = normalize(edits);
        tracing::trace!(edits = edits.len(), "edited tree");
        EditedTree {
            root: self.root.clone(),
            language: self.language.clone(),
            edits,
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root_node().to_sexp())
    }
}

fn collect_visible(
    language: &Language,
    subtree: &Subtree,
    start: usize,
    out: &mut Vec<(Subtree, usize)>,
) {
    let mut offset = start;
    for child in subtree.children() {
        if child.is_error() || language.is_visible(child.symbol()) {
            out.push((child.clone(), offset));
        } else if !child.is_terminal() {
            collect_visible(language, child, offset, out);
        }
        offset += child.size();
    }
}

/// A node of a [`Tree`].
#[derive(Clone, Copy)]
pub struct Node<'tree> {
    tree: &'tree Tree,
    index: usize,
}

impl<'tree> Node<'tree> {
    fn entry(&self) -> &'tree NodeEntry {
        &self.tree.nodes[self.index]
    }

    fn at(&self, index: usize) -> Node<'tree> {
        Node {
            tree: self.tree,
            index,
        }
    }

    /// The node's symbol name; literal text for anonymous tokens.
    #[must_use]
    pub fn kind(&self) -> &'tree str {
        self.tree
            .language
            .symbol_name(self.symbol())
            .unwrap_or("ERROR")
    }

    /// The node's symbol.
    #[must_use]
    pub fn symbol(&self) -> Symbol {
        self.entry().subtree.symbol()
    }

    /// Bytes covered by the node.
    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.start_byte()..self.end_byte()
    }

    /// First byte of the node.
    #[must_use]
    pub fn start_byte(&self) -> usize {
        self.entry().start
    }

    /// One past the last byte of the node.
    #[must_use]
    pub fn end_byte(&self) -> usize {
        self.entry().start + self.entry().subtree.size()
    }

    /// The visible children, in order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = Node<'tree>> + 'tree {
        let tree = self.tree;
        self.entry().children.clone().map(move |index| Node { tree, index })
    }

    /// The named children, in order.
    pub fn named_children(&self) -> impl Iterator<Item = Node<'tree>> + 'tree {
        self.children().filter(Node::is_named)
    }

    /// The `index`th visible child.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Node<'tree>> {
        let children = &self.entry().children;
        (index < children.len()).then(|| self.at(children.start + index))
    }

    /// Number of visible children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.entry().children.len()
    }

    /// The enclosing node, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Node<'tree>> {
        self.entry().parent.map(|index| self.at(index))
    }

    /// Returns `true` for nodes of named rules, as opposed to literal tokens.
    #[must_use]
    pub fn is_named(&self) -> bool {
        self.is_error()
            || self
                .tree
                .language
                .symbol_metadata(self.symbol())
                .is_some_and(|m| m.named)
    }

    /// Returns `true` if this is an `ERROR` node.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.entry().subtree.is_error()
    }

    /// Returns `true` if this node is or contains an `ERROR` node.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.entry().subtree.has_error()
    }

    /// Returns `true` for extras such as comments.
    #[must_use]
    pub fn is_extra(&self) -> bool {
        self.entry().subtree.is_extra()
    }

    /// The source text of this node, or `None` if `source` is not the parsed text.
    #[must_use]
    pub fn utf8_text<'s>(&self, source: &'s str) -> Option<&'s str> {
        source.get(self.byte_range())
    }

    /// Renders the named nodes below this one as an S-expression.
    #[must_use]
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        out.push('(');
        out.push_str(self.kind());
        for child in self.named_children() {
            out.push(' ');
            child.write_sexp(out);
        }
        out.push(')');
    }

    /// Returns `true` if both nodes are backed by the same shared subtree.
    ///
    /// After an incremental re-parse this tells which nodes were reused from
    /// the old tree rather than rebuilt.
    #[must_use]
    pub fn same_subtree(&self, other: &Node<'_>) -> bool {
        self.entry().subtree.ptr_eq(&other.entry().subtree)
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Node {} {:?}}}", self.kind(), self.byte_range())
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.index == other.index
    }
}

impl Eq for Node<'_> {}
