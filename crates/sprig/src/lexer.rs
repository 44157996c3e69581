//! Context-aware tokenization.
//!
//! Every parse state is assigned a *lex mode*: the set of tokens the parser
//! could use there, plus the extras that may appear anywhere. The lexer only
//! tries those candidates, which is what lets `","` be punctuation in one
//! place and an array separator in another. When no candidate matches, every
//! token is tried; when nothing matches at all, one character becomes an
//! `ERROR` token so the parser can recover.
//!
//! Lexing never carries state from one token to the next, so it can restart
//! at any token boundary. Each [`Token`] records how far the lexer looked
//! ([`Token::examined_end`]); the incremental parser relies on that extent to
//! decide whether an old token is still valid after an edit.

pub(crate) mod nfa;
pub mod scanner;

use crate::symbol::{StateId, Symbol};
use nfa::Nfa;
use rustc_hash::FxHashMap;
use scanner::{ExternalScanner, ScanCursor, ValidSymbols};
use std::cmp::Reverse;
use std::ops::Range;

/// Identifier of a lex mode.
pub type LexModeId = u16;

/// A token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The terminal symbol recognized.
    pub symbol: Symbol,
    /// First byte of the token.
    pub start: usize,
    /// One past the last byte of the token.
    pub end: usize,
    /// The lex mode the token was recognized in.
    pub lex_mode: LexModeId,
    /// One past the furthest byte inspected while recognizing the token
    /// (`len + 1` when the end of input was observed).
    pub examined_end: usize,
}

impl Token {
    /// The bytes covered by this token.
    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Length of the token in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` for zero-width tokens such as end of input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Selection attributes of one lexer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenInfo {
    pub precedence: i32,
    pub literal: bool,
    pub extra: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LexMode {
    candidates: Vec<usize>,
    externals: Vec<bool>,
}

/// The compiled lexer of one language.
#[derive(Debug, Clone)]
pub(crate) struct Lexer {
    nfa: Nfa,
    tokens: Vec<TokenInfo>,
    all_tokens: Vec<usize>,
    external_base: u16,
    modes: Vec<LexMode>,
    state_modes: Vec<LexModeId>,
}

impl Lexer {
    /// Builds a lexer from compiled patterns and the valid terminals of each state.
    ///
    /// `valid_terminals[state]` lists every terminal symbol the parser accepts in
    /// `state`; `always_valid` lists terminals that are candidates in every mode
    /// (extras and the first tokens of non-terminal extras).
    pub(crate) fn new(
        nfa: Nfa,
        tokens: Vec<TokenInfo>,
        external_count: usize,
        valid_terminals: &[Vec<Symbol>],
        always_valid: &[Symbol],
    ) -> Self {
        const FIRST_TOKEN: usize = 2;
        let token_count = tokens.len();
        let external_base = FIRST_TOKEN + token_count;

        let mut modes = Vec::new();
        let mut by_mode: FxHashMap<LexMode, LexModeId> = FxHashMap::default();
        let mut state_modes = Vec::with_capacity(valid_terminals.len());
        for valid in valid_terminals {
            let mut candidates = Vec::new();
            let mut externals = vec![false; external_count];
            for symbol in valid.iter().chain(always_valid) {
                let index = symbol.index();
                if (FIRST_TOKEN..external_base).contains(&index) {
                    candidates.push(index - FIRST_TOKEN);
                } else if let Some(flag) = index
                    .checked_sub(external_base)
                    .and_then(|i| externals.get_mut(i))
                {
                    *flag = true;
                }
            }
            candidates.sort_unstable();
            candidates.dedup();
            let mode = LexMode {
                candidates,
                externals,
            };
            let id = *by_mode.entry(mode.clone()).or_insert_with(|| {
                modes.push(mode);
                LexModeId::try_from(modes.len() - 1).unwrap_or(LexModeId::MAX)
            });
            state_modes.push(id);
        }
        tracing::debug!(
            states = state_modes.len(),
            modes = modes.len(),
            tokens = token_count,
            "built lex modes"
        );

        Self {
            nfa,
            tokens,
            all_tokens: (0..token_count).collect(),
            external_base: u16::try_from(external_base).unwrap_or(u16::MAX),
            modes,
            state_modes,
        }
    }

    /// The lex mode used in parse `state`.
    pub(crate) fn mode_of(&self, state: StateId) -> LexModeId {
        self.state_modes
            .get(usize::from(state))
            .copied()
            .unwrap_or_default()
    }

    /// Recognizes the token starting at byte `position` of `text` in the lex
    /// mode of `state`. External scanning is skipped when `allow_external` is false.
    pub(crate) fn next_token(
        &self,
        text: &str,
        position: usize,
        state: StateId,
        scanner: Option<&dyn ExternalScanner>,
        allow_external: bool,
    ) -> Token {
        let lex_mode = self.mode_of(state);
        let Some(mode) = self.modes.get(usize::from(lex_mode)) else {
            return self.error_token(text, position, lex_mode, position);
        };
        let mut examined_end = position;

        if let Some(scanner) = scanner.filter(|_| allow_external) {
            let valid = ValidSymbols::new(&mode.externals);
            if valid.any() {
                let mut cursor = ScanCursor::new(text, position);
                let result = scanner.scan(&mut cursor, &valid);
                examined_end = examined_end.max(cursor.examined_end());
                if let Some(index) = result.filter(|&i| valid.is_valid(i)) {
                    let end = cursor.token_end().clamp(position, text.len());
                    let offset = u16::try_from(index).unwrap_or(u16::MAX);
                    tracing::trace!(position, end, index, "external token");
                    return Token {
                        symbol: Symbol(self.external_base.saturating_add(offset)),
                        start: position,
                        end,
                        lex_mode,
                        examined_end: examined_end.max(end),
                    };
                }
            }
        }

        if position >= text.len() {
            return Token {
                symbol: Symbol::END,
                start: text.len(),
                end: text.len(),
                lex_mode,
                examined_end: examined_end.max(text.len() + 1),
            };
        }

        for candidates in [&mode.candidates, &self.all_tokens] {
            let run = self.nfa.run(text, position, candidates);
            examined_end = examined_end.max(run.examined_end);
            if let Some((token, end)) = self.select(&run.matches) {
                return Token {
                    symbol: Symbol(u16::try_from(token + 2).unwrap_or(u16::MAX)),
                    start: position,
                    end,
                    lex_mode,
                    examined_end,
                };
            }
        }

        self.error_token(text, position, lex_mode, examined_end)
    }

    fn error_token(
        &self,
        text: &str,
        position: usize,
        lex_mode: LexModeId,
        examined_end: usize,
    ) -> Token {
        let width = text
            .get(position..)
            .and_then(|rest| rest.chars().next())
            .map_or(0, char::len_utf8);
        tracing::trace!(position, "unrecognized character");
        Token {
            symbol: Symbol::ERROR,
            start: position,
            end: position + width,
            lex_mode,
            examined_end: examined_end.max(position + width),
        }
    }

    /// Picks the winning match: higher precedence, then longer, then
    /// non-extra, then literal, then earlier declared.
    fn select(&self, matches: &[(usize, usize)]) -> Option<(usize, usize)> {
        matches.iter().copied().max_by_key(|&(token, end)| {
            let info = self.tokens[token];
            (
                info.precedence,
                end,
                !info.extra,
                info.literal,
                Reverse(token),
            )
        })
    }

    pub(crate) fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn mode_count(&self) -> usize {
        self.modes.len()
    }
}
