//! Offline table generation: grammar in, [`Language`] out.
//!
//! The pipeline is validate, flatten, build the LALR(1) automaton, then
//! assemble the lexer and tables into a [`Language`]. The same grammar always
//! yields the same table, byte for byte.

pub(crate) mod flatten;
pub(crate) mod lalr;

use crate::grammar::{Grammar, GrammarError};
use crate::language::{parts_from, Language};
use crate::lexer::scanner::ExternalScanner;
use crate::validate::validate;
use std::sync::Arc;

/// Compiles `grammar` into a [`Language`].
///
/// # Errors
///
/// Returns a [`GrammarError`] if the grammar fails validation, uses an
/// unsupported pattern, cannot be flattened, or declares external tokens
/// (use [`generate_with_scanner`] for those).
pub fn generate(grammar: &Grammar) -> Result<Language, GrammarError> {
    build(grammar, None)
}

/// Compiles `grammar` into a [`Language`] whose external tokens are
/// recognized by `scanner`.
///
/// # Errors
///
/// Returns a [`GrammarError`] under the same conditions as [`generate`],
/// apart from the missing scanner.
pub fn generate_with_scanner(
    grammar: &Grammar,
    scanner: Arc<dyn ExternalScanner>,
) -> Result<Language, GrammarError> {
    build(grammar, Some(scanner))
}

fn build(
    grammar: &Grammar,
    scanner: Option<Arc<dyn ExternalScanner>>,
) -> Result<Language, GrammarError> {
    validate(grammar)?;
    if scanner.is_none() {
        if let Some(external) = grammar.external_names().first() {
            return Err(GrammarError::MissingScanner((*external).to_string()));
        }
    }
    let flat = flatten::flatten(grammar)?;
    let table = lalr::build(&flat)?;
    tracing::debug!(
        grammar = %grammar.name,
        states = table.state_count,
        conflicts = table.conflicts,
        "generated language"
    );
    Language::from_parts(parts_from(&grammar.name, flat, table), scanner)
}
