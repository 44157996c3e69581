//! The compiled grammar table.
//!
//! A [`Language`] is produced once, by [`generate`](crate::generate) or by
//! loading a blob with [`Language::from_bytes`], and is immutable afterwards.
//! It is a cheap handle (`Arc`) that every [`Parser`](crate::Parser) and
//! [`Tree`](crate::Tree) carries, so it can be shared freely across threads.

mod blob;

pub use blob::{LoadError, FORMAT_VERSION};

use crate::grammar::GrammarError;
use crate::lexer::nfa::Nfa;
use crate::lexer::scanner::ExternalScanner;
use crate::lexer::{LexModeId, Lexer, Token, TokenInfo};
use crate::symbol::{Associativity, Production, ProductionId, StateId, Symbol, SymbolMetadata};
use facet::Facet;
use std::fmt;
use std::sync::Arc;

/// What the parser does with a lookahead symbol in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Consume the lookahead and move to the given state.
    Shift(StateId),
    /// Build a node for the given production.
    Reduce(ProductionId),
    /// The input is complete.
    Accept,
    /// The lookahead is not valid here.
    Error,
}

impl Action {
    fn encode(self) -> u32 {
        match self {
            Action::Error => 0,
            Action::Accept => 1,
            Action::Shift(state) => (u32::from(state) << 2) | 2,
            Action::Reduce(production) => (u32::from(production) << 2) | 3,
        }
    }

    fn decode(raw: u32) -> Option<Self> {
        let payload = u16::try_from(raw >> 2).ok();
        match raw & 3 {
            0 if raw == 0 => Some(Action::Error),
            1 if raw == 1 => Some(Action::Accept),
            2 => payload.map(Action::Shift),
            3 => payload.map(Action::Reduce),
            _ => None,
        }
    }
}

/// A lexer token as stored in a serialized table.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub(crate) struct TokenRecord {
    pub pattern: String,
    pub literal: bool,
    pub precedence: i32,
}

/// A production as stored in a serialized table.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub(crate) struct ProductionRecord {
    pub lhs: u16,
    pub rhs: Vec<u16>,
    pub precedence: i32,
    pub associativity: Associativity,
    pub repeat_append: bool,
}

/// Start state of the sub-parser of one non-terminal extra.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub(crate) struct ExtraStart {
    pub symbol: u16,
    pub state: u16,
}

/// Everything a [`Language`] is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub(crate) struct LanguageParts {
    pub name: String,
    pub symbols: Vec<SymbolMetadata>,
    pub tokens: Vec<TokenRecord>,
    pub external_count: u32,
    pub productions: Vec<ProductionRecord>,
    pub state_count: u32,
    pub actions: Vec<u32>,
    pub gotos: Vec<u32>,
    pub extra_starts: Vec<ExtraStart>,
    pub conflicts: u32,
}

const NO_GOTO: u32 = u32::MAX;

struct LanguageInner {
    parts: LanguageParts,
    terminal_count: usize,
    productions: Vec<Production>,
    actions: Vec<Action>,
    gotos: Vec<Option<StateId>>,
    extra_starts: Vec<(Symbol, StateId)>,
    default_actions: Vec<Option<Action>>,
    lexer: Lexer,
    scanner: Option<Arc<dyn ExternalScanner>>,
}

/// An immutable, shareable grammar table.
#[derive(Clone)]
pub struct Language(Arc<LanguageInner>);

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .field("symbols", &self.symbol_count())
            .field("states", &self.state_count())
            .field("productions", &self.production_count())
            .field("external_scanner", &self.0.scanner.is_some())
            .finish()
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.parts == other.0.parts
    }
}

impl Eq for Language {}

fn corrupt(message: impl Into<String>) -> GrammarError {
    GrammarError::Validation(message.into())
}

impl Language {
    /// Rebuilds every derived table (lexer, defaults, decoded actions) from `parts`.
    pub(crate) fn from_parts(
        parts: LanguageParts,
        scanner: Option<Arc<dyn ExternalScanner>>,
    ) -> Result<Self, GrammarError> {
        let external_count =
            usize::try_from(parts.external_count).map_err(|_| corrupt("external count"))?;
        let state_count =
            usize::try_from(parts.state_count).map_err(|_| corrupt("state count"))?;
        let terminal_count = 2 + parts.tokens.len() + external_count;
        if parts.symbols.len() < terminal_count {
            return Err(corrupt("fewer symbols than terminals"));
        }
        let nonterminal_count = parts.symbols.len() - terminal_count;
        if parts.actions.len() != state_count * terminal_count
            || parts.gotos.len() != state_count * nonterminal_count
        {
            return Err(corrupt("table dimensions do not match the symbol counts"));
        }
        let in_range = |symbol: u16| usize::from(symbol) < parts.symbols.len();

        let productions = parts
            .productions
            .iter()
            .map(|record| {
                if usize::from(record.lhs) < terminal_count
                    || !in_range(record.lhs)
                    || !record.rhs.iter().all(|&s| in_range(s))
                {
                    return Err(corrupt("production refers to an unknown symbol"));
                }
                Ok(Production {
                    lhs: Symbol(record.lhs),
                    rhs: record.rhs.iter().map(|&s| Symbol(s)).collect(),
                    precedence: record.precedence,
                    associativity: record.associativity,
                    repeat_append: record.repeat_append,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let actions = parts
            .actions
            .iter()
            .map(|&raw| match Action::decode(raw) {
                Some(Action::Shift(s)) if usize::from(s) >= state_count => None,
                Some(Action::Reduce(p)) if usize::from(p) >= productions.len() => None,
                other => other,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| corrupt("invalid action"))?;
        let gotos = parts
            .gotos
            .iter()
            .map(|&raw| match raw {
                NO_GOTO => Ok(None),
                state => StateId::try_from(state)
                    .ok()
                    .filter(|&s| usize::from(s) < state_count)
                    .map(Some)
                    .ok_or_else(|| corrupt("invalid goto")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let extra_starts = parts
            .extra_starts
            .iter()
            .map(|e| {
                if in_range(e.symbol) && usize::from(e.state) < state_count {
                    Ok((Symbol(e.symbol), e.state))
                } else {
                    Err(corrupt("invalid extra start state"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut nfa = Nfa::default();
        for token in &parts.tokens {
            nfa.add_token(&token.pattern)?;
        }
        let infos = parts
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| TokenInfo {
                precedence: token.precedence,
                literal: token.literal,
                extra: parts.symbols[2 + i].extra,
            })
            .collect();

        let valid_terminals: Vec<Vec<Symbol>> = (0..state_count)
            .map(|state| {
                (0..terminal_count)
                    .filter(|&t| actions[state * terminal_count + t] != Action::Error)
                    .filter_map(|t| u16::try_from(t).ok().map(Symbol))
                    .collect()
            })
            .collect();
        let mut always_valid: Vec<Symbol> = (0..terminal_count)
            .filter(|&t| parts.symbols[t].extra)
            .filter_map(|t| u16::try_from(t).ok().map(Symbol))
            .collect();
        for &(_, state) in &extra_starts {
            always_valid.extend(valid_terminals[usize::from(state)].iter().copied());
        }
        always_valid.sort_unstable();
        always_valid.dedup();
        let lexer = Lexer::new(nfa, infos, external_count, &valid_terminals, &always_valid);

        let default_actions = (0..state_count)
            .map(|state| {
                let row = &actions[state * terminal_count..(state + 1) * terminal_count];
                let mut live = row.iter().copied().filter(|a| *a != Action::Error);
                let first = live.next()?;
                let uniform = matches!(first, Action::Reduce(_) | Action::Accept)
                    && live.all(|a| a == first);
                uniform.then_some(first)
            })
            .collect();

        tracing::debug!(
            language = %parts.name,
            states = state_count,
            symbols = parts.symbols.len(),
            tokens = lexer.token_count(),
            lex_modes = lexer.mode_count(),
            conflicts = parts.conflicts,
            "loaded language"
        );

        Ok(Self(Arc::new(LanguageInner {
            parts,
            terminal_count,
            productions,
            actions,
            gotos,
            extra_starts,
            default_actions,
            lexer,
            scanner,
        })))
    }

    pub(crate) fn parts(&self) -> &LanguageParts {
        &self.0.parts
    }

    /// The grammar's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.parts.name
    }

    /// The action for `symbol` in `state`.
    ///
    /// For a non-terminal this is the goto transition, reported as a shift.
    #[must_use]
    pub fn lookup(&self, state: StateId, symbol: Symbol) -> Action {
        if self.is_terminal(symbol) {
            self.0
                .actions
                .get(usize::from(state) * self.0.terminal_count + symbol.index())
                .copied()
                .unwrap_or(Action::Error)
        } else {
            self.goto(state, symbol).map_or(Action::Error, Action::Shift)
        }
    }

    /// The state reached after building a `symbol` node on top of `state`.
    #[must_use]
    pub fn goto(&self, state: StateId, symbol: Symbol) -> Option<StateId> {
        let nt = symbol.index().checked_sub(self.0.terminal_count)?;
        let width = self.symbol_count() - self.0.terminal_count;
        if nt >= width {
            return None;
        }
        self.0
            .gotos
            .get(usize::from(state) * width + nt)
            .copied()
            .flatten()
    }

    /// Total number of symbols, terminals and non-terminals.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.0.parts.symbols.len()
    }

    /// Number of terminal symbols, including `end` and `ERROR`.
    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.0.terminal_count
    }

    /// Number of parse states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.0.default_actions.len()
    }

    /// Number of productions.
    #[must_use]
    pub fn production_count(&self) -> usize {
        self.0.productions.len()
    }

    /// Number of (state, lookahead) cells where conflict resolution picked an action.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        usize::try_from(self.0.parts.conflicts).unwrap_or(usize::MAX)
    }

    /// The production with id `id`.
    #[must_use]
    pub fn production(&self, id: ProductionId) -> Option<&Production> {
        self.0.productions.get(usize::from(id))
    }

    /// Metadata of `symbol`.
    #[must_use]
    pub fn symbol_metadata(&self, symbol: Symbol) -> Option<&SymbolMetadata> {
        self.0.parts.symbols.get(symbol.index())
    }

    /// Display name of `symbol`.
    #[must_use]
    pub fn symbol_name(&self, symbol: Symbol) -> Option<&str> {
        self.symbol_metadata(symbol).map(|m| m.name.as_str())
    }

    /// Finds a symbol by name, preferring named symbols over literals.
    #[must_use]
    pub fn symbol_for_name(&self, name: &str) -> Option<Symbol> {
        let symbols = &self.0.parts.symbols;
        let find = |named: bool| {
            symbols
                .iter()
                .position(|m| m.name == name && m.named == named)
                .and_then(|i| u16::try_from(i).ok())
                .map(Symbol)
        };
        find(true).or_else(|| find(false))
    }

    /// Returns `true` for symbols produced by the lexer.
    #[must_use]
    pub fn is_terminal(&self, symbol: Symbol) -> bool {
        symbol.index() < self.0.terminal_count
    }

    /// Returns `true` for symbols that may appear between any two tokens.
    #[must_use]
    pub fn is_extra(&self, symbol: Symbol) -> bool {
        self.symbol_metadata(symbol).is_some_and(|m| m.extra)
    }

    /// Returns `true` if nodes of `symbol` appear in the public tree.
    #[must_use]
    pub fn is_visible(&self, symbol: Symbol) -> bool {
        self.symbol_metadata(symbol).is_some_and(|m| m.visible)
    }

    /// Returns `true` if this language was given an external scanner.
    #[must_use]
    pub fn has_external_scanner(&self) -> bool {
        self.0.scanner.is_some()
    }

    /// Lexes the token at byte `position` of `text`, using the lex mode of `state`.
    #[must_use]
    pub fn next_token(&self, text: &str, position: usize, state: StateId) -> Token {
        self.lex(text, position, state, true)
    }

    pub(crate) fn lex(
        &self,
        text: &str,
        position: usize,
        state: StateId,
        allow_external: bool,
    ) -> Token {
        self.0
            .lexer
            .next_token(text, position, state, self.0.scanner.as_deref(), allow_external)
    }

    /// The lex mode used in `state`.
    pub(crate) fn lex_mode(&self, state: StateId) -> LexModeId {
        self.0.lexer.mode_of(state)
    }

    /// The only action available in `state`, if every valid lookahead leads to the same reduction.
    pub(crate) fn default_action(&self, state: StateId) -> Option<Action> {
        self.0.default_actions.get(usize::from(state)).copied().flatten()
    }

    /// Start state of the sub-parser for a non-terminal extra whose first token is `token`.
    pub(crate) fn extra_start_for(&self, token: Symbol) -> Option<(Symbol, StateId)> {
        self.0
            .extra_starts
            .iter()
            .copied()
            .find(|&(_, state)| matches!(self.lookup(state, token), Action::Shift(_)))
    }

    /// Serializes the table into a versioned blob.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        blob::encode(self.parts())
    }

    /// Loads a table serialized by [`Language::to_bytes`].
    ///
    /// # Errors
    ///
    /// Fails if the blob has the wrong magic or version, if its body is
    /// corrupt, or if the grammar declares external tokens and `scanner` is `None`.
    pub fn from_bytes(
        bytes: &[u8],
        scanner: Option<Arc<dyn ExternalScanner>>,
    ) -> Result<Self, LoadError> {
        let parts = blob::decode(bytes)?;
        if parts.external_count > 0 && scanner.is_none() {
            let name = parts
                .symbols
                .get(2 + parts.tokens.len())
                .map(|m| m.name.clone())
                .unwrap_or_default();
            return Err(LoadError::Grammar(GrammarError::MissingScanner(name)));
        }
        Self::from_parts(parts, scanner).map_err(|e| match e {
            GrammarError::Validation(message) => LoadError::Corrupt(message),
            other => LoadError::Grammar(other),
        })
    }
}

/// Assembles the serializable parts of a table from its generated pieces.
pub(crate) fn parts_from(
    name: &str,
    flat: crate::generate::flatten::FlatGrammar,
    table: crate::generate::lalr::ParseTable,
) -> LanguageParts {
    LanguageParts {
        name: name.to_string(),
        symbols: flat.symbols,
        tokens: flat
            .tokens
            .into_iter()
            .map(|t| TokenRecord {
                pattern: t.pattern,
                literal: t.literal,
                precedence: t.precedence,
            })
            .collect(),
        external_count: u32::try_from(flat.external_count).unwrap_or(u32::MAX),
        productions: flat
            .productions
            .into_iter()
            .map(|p| ProductionRecord {
                lhs: p.lhs.id(),
                rhs: p.rhs.iter().map(|s| s.id()).collect(),
                precedence: p.precedence,
                associativity: p.associativity,
                repeat_append: p.repeat_append,
            })
            .collect(),
        state_count: u32::try_from(table.state_count).unwrap_or(u32::MAX),
        actions: table.actions.into_iter().map(Action::encode).collect(),
        gotos: table
            .gotos
            .into_iter()
            .map(|g| g.map_or(NO_GOTO, u32::from))
            .collect(),
        extra_starts: table
            .extra_starts
            .into_iter()
            .map(|(symbol, state)| ExtraStart {
                symbol: symbol.id(),
                state,
            })
            .collect(),
        conflicts: u32::try_from(table.conflicts).unwrap_or(u32::MAX),
    }
}
