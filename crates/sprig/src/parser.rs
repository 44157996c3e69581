//! The table-driven parser and incremental re-parser.
//!
//! [`Parser`] runs the LR automaton of a [`Language`] over a text. The loop
//! asks for a lookahead (a fresh token, or during a re-parse a subtree of
//! the old tree), looks up the action for it in the current state and
//! shifts, reduces, accepts or recovers. A parse never fails on malformed
//! input: unparseable regions end up inside `ERROR` nodes. The only way a
//! parse returns no tree is cancellation through [`ParseOptions`].

mod recover;
mod reuse;
mod stack;

use crate::edit::EditedTree;
use crate::language::{Action, Language};
use crate::lexer::Token;
use crate::subtree::Subtree;
use crate::symbol::{StateId, Symbol};
use crate::tree::Tree;
use reuse::ReuseCursor;
use stack::Stack;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often (in parser steps) the deadline is checked.
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Cooperative cancellation for a single parse.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    cancellation: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl ParseOptions {
    /// Options that never interrupt the parse.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the parse once `flag` is set.
    #[must_use]
    pub fn with_cancellation_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    /// Aborts the parse once `deadline` has passed.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Aborts the parse once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// Why a parse produced no tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The cancellation flag was set.
    #[error("parse was cancelled")]
    Cancelled,
    /// The deadline passed.
    #[error("parse exceeded its deadline")]
    TimedOut,
}

/// Decides, between steps, whether a parse should stop.
trait Interrupt {
    type Error;

    fn check(&mut self, step: usize) -> Result<(), Self::Error>;
}

struct Uninterrupted;

impl Interrupt for Uninterrupted {
    type Error = Infallible;

    fn check(&mut self, _step: usize) -> Result<(), Infallible> {
        Ok(())
    }
}

impl Interrupt for &ParseOptions {
    type Error = ParseError;

    fn check(&mut self, step: usize) -> Result<(), ParseError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(ParseError::Cancelled);
        }
        if step % DEADLINE_CHECK_INTERVAL == 1
            && self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            return Err(ParseError::TimedOut);
        }
        Ok(())
    }
}

/// Parses texts with one [`Language`].
#[derive(Debug, Clone)]
pub struct Parser {
    language: Language,
}

impl Parser {
    /// Creates a parser for `language`.
    #[must_use]
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// The language this parser uses.
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Parses `text` from scratch.
    #[must_use]
    pub fn parse(&self, text: &str) -> Tree {
        let Ok(tree) = self.execute(text, None, Uninterrupted);
        tree
    }

    /// Parses `text` from scratch, stopping early as `options` dictate.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the parse was cancelled or ran past its deadline.
    pub fn parse_with_options(
        &self,
        text: &str,
        options: &ParseOptions,
    ) -> Result<Tree, ParseError> {
        self.execute(text, None, options)
    }

    /// Parses `text`, the result of applying the edits recorded in `edited`,
    /// reusing every subtree of the old tree the edits did not affect.
    ///
    /// The result is identical to `self.parse(text)`.
    #[must_use]
    pub fn reparse(&self, edited: &EditedTree, text: &str) -> Tree {
        let Ok(tree) = self.execute(text, Some(edited), Uninterrupted);
        tree
    }

    /// Like [`Parser::reparse`], stopping early as `options` dictate.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the parse was cancelled or ran past its deadline.
    pub fn reparse_with_options(
        &self,
        edited: &EditedTree,
        text: &str,
        options: &ParseOptions,
    ) -> Result<Tree, ParseError> {
        self.execute(text, Some(edited), options)
    }

    fn execute<I: Interrupt>(
        &self,
        text: &str,
        edited: Option<&EditedTree>,
        interrupt: I,
    ) -> Result<Tree, I::Error> {
        let reuse = edited.and_then(|edited| {
            if edited.language == self.language {
                Some(ReuseCursor::new(&edited.root, edited.edits.clone()))
            } else {
                tracing::debug!("edited tree has a different language; parsing from scratch");
                None
            }
        });
        let run = Run {
            language: &self.language,
            text,
            stack: Stack::new(0, 0),
            reuse,
            lex_state: 0,
            no_external_at: None,
            interrupt,
            steps: 0,
        };
        let root = run.run()?;
        Ok(Tree::new(root, self.language.clone()))
    }
}

/// The next input for the automaton.
#[derive(Debug, Clone)]
enum Lookahead {
    Token(Token),
    /// A subtree of the old tree, starting at the current stack end.
    Reused(Subtree),
}

enum Step {
    Continue(Option<Lookahead>),
    Done(Subtree),
}

/// State of one parse in progress.
struct Run<'a, I> {
    language: &'a Language,
    text: &'a str,
    stack: Stack,
    reuse: Option<ReuseCursor>,
    /// The state whose lex mode the next token is lexed in.
    lex_state: StateId,
    /// Position at which external scanning is suppressed after it produced an unusable empty token.
    no_external_at: Option<usize>,
    interrupt: I,
    steps: usize,
}

impl<I: Interrupt> Run<'_, I> {
    fn run(mut self) -> Result<Subtree, I::Error> {
        let mut lookahead = None;
        loop {
            self.steps += 1;
            self.interrupt.check(self.steps)?;
            let current = match lookahead.take() {
                Some(current) => current,
                None => self.next_lookahead(),
            };
            let step = match current {
                Lookahead::Token(token) => self.step_token(token),
                Lookahead::Reused(subtree) => self.step_reused(subtree),
            };
            match step {
                Step::Continue(next) => lookahead = next,
                Step::Done(root) => {
                    tracing::debug!(steps = self.steps, size = root.size(), "parse finished");
                    return Ok(root);
                }
            }
        }
    }
}

impl<I> Run<'_, I> {
    fn lex(&self, position: usize, state: StateId) -> Token {
        let allow_external = self.no_external_at != Some(position);
        self.language.lex(self.text, position, state, allow_external)
    }

    fn next_lookahead(&mut self) -> Lookahead {
        let position = self.stack.end();
        if self.no_external_at != Some(position) {
            let mode = self.language.lex_mode(self.lex_state);
            if let Some(subtree) = self.reuse.as_mut().and_then(|c| c.candidate(position, mode)) {
                return Lookahead::Reused(subtree);
            }
        }
        Lookahead::Token(self.lex(position, self.lex_state))
    }

    fn descend(&mut self) {
        if let Some(cursor) = self.reuse.as_mut() {
            cursor.descend();
        }
    }

    fn step_token(&mut self, token: Token) -> Step {
        let state = self.stack.top_state();
        match self.language.lookup(state, token.symbol) {
            Action::Shift(next) => {
                tracing::trace!(
                    symbol = self.language.symbol_name(token.symbol).unwrap_or_default(),
                    start = token.start,
                    state = next,
                    "shift"
                );
                self.stack
                    .push(next, Subtree::leaf(&token, state, next, false), token.start);
                self.lex_state = next;
                Step::Continue(None)
            }
            Action::Reduce(production) => {
                if self.stack.reduce(self.language, production, token.examined_end) {
                    Step::Continue(Some(Lookahead::Token(token)))
                } else {
                    self.recover(token)
                }
            }
            Action::Accept => Step::Done(self.accept(token.examined_end)),
            Action::Error => self.handle_error(token),
        }
    }

    fn handle_error(&mut self, token: Token) -> Step {
        if token.is_empty() && token.symbol != Symbol::END {
            tracing::trace!(position = token.start, "discarding empty external token");
            self.no_external_at = Some(token.start);
            return Step::Continue(None);
        }
        if self.is_extra_token(token.symbol) {
            let leaf = Subtree::leaf(&token, self.stack.top_state(), self.lex_state, true);
            self.stack.push_transparent(leaf, token.start);
            return Step::Continue(None);
        }
        if let Some(entries) = self.parse_extra(&token) {
            for (subtree, start) in entries {
                self.stack.push_transparent(subtree, start);
            }
            return Step::Continue(None);
        }
        self.recover(token)
    }

    fn is_extra_token(&self, symbol: Symbol) -> bool {
        symbol != Symbol::END
            && symbol != Symbol::ERROR
            && self.language.is_terminal(symbol)
            && self.language.is_extra(symbol)
    }

    fn step_reused(&mut self, subtree: Subtree) -> Step {
        let state = self.stack.top_state();
        let start = self.stack.end();
        let Some((first_symbol, _)) = subtree.first_leaf() else {
            self.descend();
            return Step::Continue(None);
        };
        let action = self.language.lookup(state, first_symbol);

        if subtree.is_extra() {
            if action == Action::Error {
                tracing::trace!(start, size = subtree.size(), "reuse extra");
                self.stack.push_transparent(subtree, start);
            } else {
                self.descend();
            }
            return Step::Continue(None);
        }

        match action {
            Action::Reduce(production) => {
                let examined_end = subtree.first_token_extent(start);
                if self.stack.reduce(self.language, production, examined_end) {
                    Step::Continue(Some(Lookahead::Reused(subtree)))
                } else {
                    self.descend();
                    Step::Continue(None)
                }
            }
            Action::Shift(next) if subtree.is_terminal() => {
                tracing::trace!(start, state = next, "reuse token");
                self.stack.push(next, subtree.with_states(state, next), start);
                self.lex_state = next;
                Step::Continue(None)
            }
            Action::Shift(_) if subtree.parse_state() == state => {
                match self.language.goto(state, subtree.symbol()) {
                    Some(next) => {
                        let symbol = self.language.symbol_name(subtree.symbol());
                        tracing::trace!(
                            symbol = symbol.unwrap_or_default(),
                            start,
                            size = subtree.size(),
                            state = next,
                            "reuse node"
                        );
                        self.lex_state = subtree.end_lex_state();
                        self.stack.push(next, subtree, start);
                    }
                    None => self.descend(),
                }
                Step::Continue(None)
            }
            _ if subtree.is_terminal() => {
                Step::Continue(Some(Lookahead::Token(self.lex(start, self.lex_state))))
            }
            _ => {
                self.descend();
                Step::Continue(None)
            }
        }
    }

    /// Builds the root from the finished stack: leading extras, the start
    /// symbol's children, then trailing extras.
    fn accept(&mut self, examined_end: usize) -> Subtree {
        let mut symbol = None;
        let mut children = Vec::new();
        for entry in self.stack.take() {
            if symbol.is_none() && !entry.transparent && !entry.subtree.is_terminal() {
                symbol = Some(entry.subtree.symbol());
                children.extend(entry.subtree.children().iter().cloned());
            } else {
                children.push(entry.subtree);
            }
        }
        Subtree::node(
            symbol.unwrap_or(Symbol::ERROR),
            children,
            0,
            examined_end,
            false,
        )
    }

    /// Parses a non-terminal extra (such as a block comment) starting with
    /// `first`, on a stack of its own.
    ///
    /// Returns the entries to push, the extra's node first, or `None` if the
    /// text does not form that extra; nothing is consumed in that case. An
    /// extra cut off by the end of input (an unclosed block comment) is
    /// returned as one `ERROR` entry reaching the end of the text.
    fn parse_extra(&self, first: &Token) -> Option<Vec<(Subtree, usize)>> {
        let (symbol, start_state) = self.language.extra_start_for(first.symbol)?;
        let mut stack = Stack::new(start_state, first.start);
        let mut lookahead = Some(*first);
        let mut lex_state = start_state;
        let mut suppressed = None;
        loop {
            let state = stack.top_state();
            if lookahead.is_none() {
                match self.language.default_action(state) {
                    Some(Action::Reduce(production)) => {
                        let end = stack.end();
                        if !stack.reduce(self.language, production, end) {
                            return None;
                        }
                        continue;
                    }
                    Some(Action::Accept) => break,
                    _ => {}
                }
            }
            let token = match lookahead.take() {
                Some(token) => token,
                None => {
                    let position = stack.end();
                    let allow_external =
                        suppressed != Some(position) && self.no_external_at != Some(position);
                    self.language.lex(self.text, position, lex_state, allow_external)
                }
            };
            if token.is_empty() && token.symbol != Symbol::END {
                if suppressed == Some(token.start) {
                    return None;
                }
                suppressed = Some(token.start);
                continue;
            }
            match self.language.lookup(state, token.symbol) {
                Action::Shift(next) => {
                    stack.push(next, Subtree::leaf(&token, state, next, false), token.start);
                    lex_state = next;
                }
                Action::Reduce(production) => {
                    if !stack.reduce(self.language, production, token.examined_end) {
                        return None;
                    }
                    lookahead = Some(token);
                }
                Action::Accept => break,
                Action::Error if token.examined_end > self.text.len() => {
                    tracing::trace!(
                        extra = self.language.symbol_name(symbol).unwrap_or_default(),
                        start = first.start,
                        "extra runs to end of input"
                    );
                    let error = self.unterminated(stack, first.start, &token, lex_state);
                    return Some(vec![(error, first.start)]);
                }
                Action::Error if self.is_extra_token(token.symbol) => {
                    let leaf = Subtree::leaf(&token, state, lex_state, true);
                    stack.push_transparent(leaf, token.start);
                }
                Action::Error => {
                    tracing::trace!(
                        extra = self.language.symbol_name(symbol).unwrap_or_default(),
                        start = first.start,
                        "extra did not parse"
                    );
                    return None;
                }
            }
        }
        let entries = stack
            .take()
            .into_iter()
            .map(|entry| {
                let subtree = if entry.transparent {
                    entry.subtree
                } else {
                    entry.subtree.into_extra()
                };
                (subtree, entry.start)
            })
            .collect();
        Some(entries)
    }

    /// An `ERROR` node over an extra that failed only because the input
    /// ended: the part parsed so far and the rest of the text, which is not
    /// lexed any further.
    fn unterminated(
        &self,
        mut stack: Stack,
        origin: usize,
        failed: &Token,
        lex_state: StateId,
    ) -> Subtree {
        let state = self.stack.top_state();
        let mut children: Vec<Subtree> = stack.take().into_iter().map(|e| e.subtree).collect();
        if failed.start < self.text.len() {
            let rest = Token {
                symbol: Symbol::ERROR,
                end: self.text.len(),
                ..*failed
            };
            children.push(Subtree::leaf(&rest, state, lex_state, false));
        }
        let examined_end = failed.examined_end.saturating_sub(origin);
        Subtree::node(Symbol::ERROR, children, state, examined_end, true)
    }
}
