//! Bolt language support for sprig.
//!
//! ```
//! let language = sprig_bolt::language().unwrap();
//! let tree = sprig::Parser::new(language).parse("let x = { 1 /* one */ }");
//! assert!(!tree.root_node().has_error());
//! ```

mod grammar;
mod scanner;

pub use grammar::grammar;
pub use scanner::{BlockCommentScanner, BLOCK_COMMENT_CONTENT};

use once_cell::sync::Lazy;
use sprig::{generate_with_scanner, GrammarError, Language};
use std::sync::Arc;

static LANGUAGE: Lazy<Result<Language, GrammarError>> = Lazy::new(|| {
    let language = generate_with_scanner(&grammar(), Arc::new(BlockCommentScanner))?;
    tracing::debug!(
        states = language.state_count(),
        conflicts = language.conflict_count(),
        "generated bolt table"
    );
    Ok(language)
});

/// The Bolt [`Language`], generated on first use and shared afterwards.
///
/// # Errors
///
/// Returns the [`GrammarError`] if the grammar fails to generate.
pub fn language() -> Result<Language, GrammarError> {
    LANGUAGE.clone()
}
