//! The external scanner for nested block comments.
//!
//! `/* a /* b */ c */` is one comment in Bolt, which a regular expression
//! cannot express. The grammar lexes the opening `/*` and closing `*/`
//! itself and asks this scanner for everything in between.

use sprig::{ExternalScanner, ScanCursor, ValidSymbols};

/// Index of `_block_comment_content` in the grammar's `externals`.
pub const BLOCK_COMMENT_CONTENT: usize = 0;

/// Scans the body of a block comment, tracking nesting depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCommentScanner;

impl ExternalScanner for BlockCommentScanner {
    fn scan(&self, cursor: &mut ScanCursor<'_>, valid: &ValidSymbols<'_>) -> Option<usize> {
        if !valid.is_valid(BLOCK_COMMENT_CONTENT) {
            return None;
        }
        // The opening "/*" has already been consumed.
        let mut depth = 1usize;
        let mut consumed = false;
        loop {
            match cursor.lookahead()? {
                '/' => {
                    cursor.advance();
                    if cursor.lookahead() == Some('*') {
                        cursor.advance();
                        depth += 1;
                    }
                }
                '*' => {
                    cursor.advance();
                    if cursor.lookahead() == Some('/') {
                        if depth == 1 {
                            // The closing "*/" belongs to the grammar.
                            return consumed.then_some(BLOCK_COMMENT_CONTENT);
                        }
                        cursor.advance();
                        depth -= 1;
                    }
                }
                _ => cursor.advance(),
            }
            cursor.mark_end();
            consumed = true;
        }
    }
}
