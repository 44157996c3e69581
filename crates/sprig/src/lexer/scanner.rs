//! The capability interface for hand-written, context-sensitive scanners.
//!
//! A grammar lists the tokens it cannot express as patterns in `externals`.
//! The scanner that produces them is supplied when the
//! [`Language`](crate::Language) is generated or loaded, and is consulted
//! before the built-in lexer whenever the parser can accept one of them.

use std::fmt;

/// Recognizes external tokens.
///
/// `scan` inspects the input through `cursor` and returns the index (in the
/// grammar's `externals` list) of the token it recognized, or `None`. The
/// token ends at the last [`ScanCursor::mark_end`] call, or at the cursor
/// position if `mark_end` was never called. Scanners hold no state between
/// calls, so scanning can restart at any token boundary.
pub trait ExternalScanner: Send + Sync {
    /// Attempts to recognize one external token at the cursor.
    fn scan(&self, cursor: &mut ScanCursor<'_>, valid: &ValidSymbols<'_>) -> Option<usize>;
}

impl fmt::Debug for dyn ExternalScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalScanner")
    }
}

/// Which external tokens the parser can accept in the current state.
#[derive(Debug, Clone, Copy)]
pub struct ValidSymbols<'a>(&'a [bool]);

impl<'a> ValidSymbols<'a> {
    pub(crate) fn new(valid: &'a [bool]) -> Self {
        Self(valid)
    }

    /// Returns `true` if external token `index` is acceptable here.
    #[must_use]
    pub fn is_valid(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Returns `true` if any external token is acceptable here.
    #[must_use]
    pub fn any(&self) -> bool {
        self.0.iter().any(|&v| v)
    }
}

/// Read-only view of the input handed to an [`ExternalScanner`].
#[derive(Debug)]
pub struct ScanCursor<'a> {
    text: &'a str,
    start: usize,
    position: usize,
    marked: Option<usize>,
    examined_end: usize,
}

impl<'a> ScanCursor<'a> {
    pub(crate) fn new(text: &'a str, start: usize) -> Self {
        Self {
            text,
            start,
            position: start,
            marked: None,
            examined_end: start,
        }
    }

    /// The character at the cursor, or `None` at end of input.
    pub fn lookahead(&mut self) -> Option<char> {
        let next = self.text.get(self.position..).and_then(|s| s.chars().next());
        let seen = next.map_or(self.text.len() + 1, |c| self.position + c.len_utf8());
        self.examined_end = self.examined_end.max(seen);
        next
    }

    /// Moves past the character at the cursor. Does nothing at end of input.
    pub fn advance(&mut self) {
        if let Some(c) = self.lookahead() {
            self.position += c.len_utf8();
        }
    }

    /// Records the cursor position as the end of the token being scanned.
    pub fn mark_end(&mut self) {
        self.marked = Some(self.position);
    }

    /// Byte offset of the cursor in the input.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Byte offset at which this token started.
    #[must_use]
    pub fn token_start(&self) -> usize {
        self.start
    }

    /// Returns `true` once every character of the input has been consumed.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.position >= self.text.len()
    }

    pub(crate) fn token_end(&self) -> usize {
        self.marked.unwrap_or(self.position)
    }

    pub(crate) fn examined_end(&self) -> usize {
        self.examined_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_records_examined_bytes() {
        let mut cursor = ScanCursor::new("aé", 0);
        assert_eq!(cursor.lookahead(), Some('a'));
        cursor.advance();
        cursor.mark_end();
        assert_eq!(cursor.lookahead(), Some('é'));
        assert_eq!(cursor.examined_end(), 3);
        cursor.advance();
        assert_eq!(cursor.lookahead(), None);
        assert_eq!(cursor.examined_end(), 4);
        assert_eq!(cursor.token_end(), 1);
        assert!(cursor.is_at_end());
    }

    #[test]
    fn test_unmarked_token_ends_at_cursor() {
        let mut cursor = ScanCursor::new("xyz", 1);
        cursor.advance();
        assert_eq!(cursor.token_start(), 1);
        assert_eq!(cursor.token_end(), 2);
    }

    #[test]
    fn test_valid_symbols() {
        let flags = [false, true];
        let valid = ValidSymbols::new(&flags);
        assert!(valid.any());
        assert!(valid.is_valid(1));
        assert!(!valid.is_valid(5));
    }
}
