//! Text edits and their effect on byte positions.
//!
//! Edits are always expressed against the text a [`Tree`](crate::Tree) was
//! parsed from. [`Tree::edit`](crate::Tree::edit) normalizes them (sorted,
//! overlapping edits merged) and keeps them alongside the old tree; the
//! incremental parser maps positions between the new and old text on demand
//! instead of rewriting every node.

use crate::language::Language;
use crate::subtree::Subtree;
use ropey::Rope;
use std::fmt;
use std::ops::Range;

/// A row and byte column in a text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    /// Zero-based line number.
    pub row: usize,
    /// Zero-based byte offset within the line.
    pub column: usize,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    fn at(rope: &Rope, byte: usize) -> Self {
        let byte = byte.min(rope.len_bytes());
        let row = rope.byte_to_line(byte);
        Self {
            row,
            column: byte - rope.line_to_byte(row),
        }
    }

    fn after(self, inserted: &str) -> Self {
        match inserted.rfind('\n') {
            Some(last) => Self {
                row: self.row + inserted.matches('\n').count(),
                column: inserted.len() - last - 1,
            },
            None => Self {
                row: self.row,
                column: self.column + inserted.len(),
            },
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// One replacement of `start_byte..old_end_byte` by `new_end_byte - start_byte` new bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputEdit {
    /// First byte of the replaced range.
    pub start_byte: usize,
    /// End of the replaced range in the old text.
    pub old_end_byte: usize,
    /// End of the replacement in the new text.
    pub new_end_byte: usize,
    /// Position of `start_byte`, if known.
    pub start_position: Option<Point>,
    /// Position of `old_end_byte` in the old text, if known.
    pub old_end_position: Option<Point>,
    /// Position of `new_end_byte` in the new text, if known.
    pub new_end_position: Option<Point>,
}

impl InputEdit {
    /// An edit without position information.
    #[must_use]
    pub fn new(start_byte: usize, old_end_byte: usize, new_end_byte: usize) -> Self {
        Self {
            start_byte,
            old_end_byte: old_end_byte.max(start_byte),
            new_end_byte: new_end_byte.max(start_byte),
            ..Self::default()
        }
    }

    /// The edit that replaces `range` of `old_text` with `replacement`,
    /// with row/column positions filled in.
    #[must_use]
    pub fn from_replacement(old_text: &str, range: Range<usize>, replacement: &str) -> Self {
        let rope = Rope::from_str(old_text);
        let start = range.start.min(old_text.len());
        let old_end = range.end.clamp(start, old_text.len());
        let start_position = Point::at(&rope, start);
        Self {
            start_byte: start,
            old_end_byte: old_end,
            new_end_byte: start + replacement.len(),
            start_position: Some(start_position),
            old_end_position: Some(Point::at(&rope, old_end)),
            new_end_position: Some(start_position.after(replacement)),
        }
    }

    /// Number of bytes the edit inserts.
    #[must_use]
    pub fn inserted_len(&self) -> usize {
        self.new_end_byte - self.start_byte
    }

    /// Number of old bytes the edit removes.
    #[must_use]
    pub fn deleted_len(&self) -> usize {
        self.old_end_byte - self.start_byte
    }
}

/// A replacement to apply to a text, in that text's coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte range being replaced.
    pub range: Range<usize>,
    /// The new text for `range`.
    pub replacement: String,
}

impl TextEdit {
    /// Creates a text edit.
    #[must_use]
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Applies `edits` (all against `text`) and returns the new text together
/// with the normalized [`InputEdit`]s describing it.
///
/// Ranges are clamped to the text and to character boundaries. Overlapping
/// edits, or edits starting at the same byte, are merged: their ranges are
/// united and their replacements concatenated in order.
#[must_use]
pub fn apply(text: &str, edits: &[TextEdit]) -> (String, Vec<InputEdit>) {
    let mut sorted: Vec<(Range<usize>, &str)> = edits
        .iter()
        .map(|edit| {
            let start = floor_char_boundary(text, edit.range.start);
            let end = floor_char_boundary(text, edit.range.end).max(start);
            (start..end, edit.replacement.as_str())
        })
        .collect();
    sorted.sort_by_key(|(range, _)| (range.start, range.end));

    let mut merged: Vec<(Range<usize>, String)> = Vec::with_capacity(sorted.len());
    for (range, replacement) in sorted {
        match merged.last_mut() {
            Some((last, joined)) if range.start < last.end || range.start == last.start => {
                last.end = last.end.max(range.end);
                joined.push_str(replacement);
            }
            _ => merged.push((range, replacement.to_string())),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut input_edits = Vec::with_capacity(merged.len());
    let mut copied = 0;
    for (range, replacement) in &merged {
        out.push_str(&text[copied..range.start]);
        out.push_str(replacement);
        copied = range.end;
        input_edits.push(InputEdit::from_replacement(text, range.clone(), replacement));
    }
    out.push_str(&text[copied..]);
    (out, input_edits)
}

/// Sorts `edits` and merges those that overlap or start at the same byte.
pub(crate) fn normalize(edits: &[InputEdit]) -> Vec<InputEdit> {
    let mut sorted: Vec<InputEdit> = edits
        .iter()
        .map(|e| InputEdit::new(e.start_byte, e.old_end_byte, e.new_end_byte))
        .zip(edits)
        .map(|(clean, original)| InputEdit {
            start_position: original.start_position,
            old_end_position: original.old_end_position,
            new_end_position: original.new_end_position,
            ..clean
        })
        .collect();
    sorted.sort_by_key(|e| (e.start_byte, e.old_end_byte));

    let mut merged: Vec<InputEdit> = Vec::with_capacity(sorted.len());
    for edit in sorted {
        match merged.last_mut() {
            Some(last)
                if edit.start_byte < last.old_end_byte || edit.start_byte == last.start_byte =>
            {
                let inserted = last.inserted_len() + edit.inserted_len();
                if edit.old_end_byte > last.old_end_byte {
                    last.old_end_byte = edit.old_end_byte;
                    last.old_end_position = edit.old_end_position;
                }
                last.new_end_byte = last.start_byte + inserted;
                last.new_end_position = None;
            }
            _ => merged.push(edit),
        }
    }
    merged
}

/// Maps a byte offset in the new text to the same byte in the old text.
///
/// Returns `None` for bytes that were inserted by an edit. `edits` must be normalized.
pub(crate) fn old_position(edits: &[InputEdit], new: usize) -> Option<usize> {
    let (mut old_base, mut new_base) = (0, 0);
    for edit in edits {
        let new_start = new_base + edit.start_byte.saturating_sub(old_base);
        if new < new_start {
            break;
        }
        if new < new_start + edit.inserted_len() {
            return None;
        }
        old_base = edit.old_end_byte;
        new_base = new_start + edit.inserted_len();
    }
    Some(old_base + (new - new_base))
}

/// Returns `true` if any edit touches an old range `start..extent`.
///
/// `extent` includes the bytes the lexer examined past the subtree's end.
/// Insertions only count strictly inside the range: text inserted at the
/// first byte lands before the subtree and text inserted at `extent` was
/// never looked at.
pub(crate) fn touches(edits: &[InputEdit], start: usize, extent: usize) -> bool {
    edits.iter().any(|edit| {
        if edit.deleted_len() == 0 {
            start < edit.start_byte && edit.start_byte < extent
        } else {
            edit.start_byte < extent && edit.old_end_byte > start
        }
    })
}

/// A tree whose source has been edited, ready for [`Parser::reparse`](crate::Parser::reparse).
#[derive(Debug, Clone)]
pub struct EditedTree {
    pub(crate) root: Subtree,
    pub(crate) language: Language,
    pub(crate) edits: Vec<InputEdit>,
}

impl EditedTree {
    /// The normalized edits, sorted by start byte, in old-text coordinates.
    #[must_use]
    pub fn edits(&self) -> &[InputEdit] {
        &self.edits
    }

    /// The language of the edited tree.
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_from_replacement_points() {
        let edit = InputEdit::from_replacement("ab\ncd\nef", 4..7, "X\nYZ");
        assert_eq!(edit.start_position, Some(Point::new(1, 1)));
        assert_eq!(edit.old_end_position, Some(Point::new(2, 1)));
        assert_eq!(edit.new_end_position, Some(Point::new(2, 2)));
        assert_eq!(edit.new_end_byte, 8);
    }

    #[test]
    fn test_apply_in_old_coordinates() {
        let (text, edits) = apply(
            "hello world",
            &[TextEdit::new(6..11, "there"), TextEdit::new(0..5, "HI")],
        );
        assert_eq!(text, "HI there");
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].start_byte, 0);
        assert_eq!(edits[1].start_byte, 6);
    }

    #[test]
    fn test_apply_merges_overlaps() {
        let (text, edits) = apply("abcdef", &[TextEdit::new(1..4, "X"), TextEdit::new(2..5, "Y")]);
        assert_eq!(text, "aXYf");
        assert_eq!(edits, normalize(&edits));
        assert_eq!(edits[0].deleted_len(), 4);
        assert_eq!(edits[0].inserted_len(), 2);
    }

    #[test]
    fn test_normalize_merges_same_start() {
        let edits = normalize(&[
            InputEdit::new(3, 3, 5),
            InputEdit::new(1, 2, 1),
            InputEdit::new(3, 4, 4),
        ]);
        assert_eq!(edits.len(), 2);
        assert_eq!((edits[0].start_byte, edits[0].old_end_byte, edits[0].new_end_byte), (1, 2, 1));
        assert_eq!((edits[1].start_byte, edits[1].old_end_byte, edits[1].new_end_byte), (3, 4, 6));
    }

    #[rstest]
    #[case(0, Some(0))]
    #[case(2, Some(2))]
    #[case(3, None)]
    #[case(4, None)]
    #[case(5, Some(4))]
    #[case(9, Some(8))]
    fn test_old_position(#[case] new: usize, #[case] old: Option<usize>) {
        // "abcdefgh" -> "abcXYefgh": [3, 4) replaced by "XY".
        let edits = [InputEdit::new(3, 4, 5)];
        assert_eq!(old_position(&edits, new), old);
    }

    #[rstest]
    #[case(0, 3, false)]
    #[case(3, 6, false)]
    #[case(2, 4, true)]
    #[case(4, 5, false)]
    fn test_touches_insertion(#[case] start: usize, #[case] extent: usize, #[case] dirty: bool) {
        let edits = [InputEdit::new(3, 3, 5)];
        assert_eq!(touches(&edits, start, extent), dirty);
    }

    #[test]
    fn test_touches_deletion() {
        let edits = [InputEdit::new(3, 5, 3)];
        assert!(!touches(&edits, 0, 3));
        assert!(touches(&edits, 0, 4));
        assert!(!touches(&edits, 5, 8));
        assert!(touches(&edits, 4, 8));
    }
}
