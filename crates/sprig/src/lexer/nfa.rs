//! Thompson NFA over `char`s for the token patterns of one language.
//!
//! Patterns are parsed by [`regex_syntax`] and lowered into a single shared
//! state arena with one entry point per token. Simulation runs every
//! candidate token in lock step so a single pass yields each token's longest
//! match together with the furthest byte the lexer had to inspect.

use crate::grammar::GrammarError;
use regex_syntax::hir::{Class, Hir, HirKind};
use regex_syntax::ParserBuilder;

/// Patterns may not expand into more states than this.
const MAX_STATES: usize = 1 << 20;

#[derive(Debug, Clone)]
enum State {
    /// Consume one char inside any of the (sorted, inclusive) ranges.
    Ranges { ranges: Box<[(char, char)]>, next: usize },
    /// Epsilon transitions.
    Split(Vec<usize>),
    /// Reaching this state means the token has matched.
    Accept(usize),
}

/// The compiled automaton for every lexer token of a language.
#[derive(Debug, Clone, Default)]
pub(crate) struct Nfa {
    states: Vec<State>,
    starts: Vec<usize>,
}

/// Outcome of running a set of candidate tokens from one position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Run {
    /// `(token, end)` pairs: the longest non-empty match of each token that matched.
    pub matches: Vec<(usize, usize)>,
    /// One past the last byte inspected; `text.len() + 1` if end of input was observed.
    pub examined_end: usize,
}

impl Nfa {
    /// Compiles `pattern` as the next token. Tokens must be added in index order.
    pub(crate) fn add_token(&mut self, pattern: &str) -> Result<(), GrammarError> {
        let fail = |message: String| GrammarError::Pattern {
            pattern: pattern.to_string(),
            message,
        };
        let hir = ParserBuilder::new()
            .build()
            .parse(pattern)
            .map_err(|e| fail(e.to_string()))?;
        let token = self.starts.len();
        let accept = self.push(State::Accept(token)).map_err(&fail)?;
        let start = self.compile(&hir, accept).map_err(&fail)?;
        self.starts.push(start);
        Ok(())
    }

    fn push(&mut self, state: State) -> Result<usize, String> {
        if self.states.len() >= MAX_STATES {
            return Err("pattern is too large".to_string());
        }
        self.states.push(state);
        Ok(self.states.len() - 1)
    }

    /// Lowers `hir` so that completing it continues at `next`; returns the entry state.
    fn compile(&mut self, hir: &Hir, next: usize) -> Result<usize, String> {
        match hir.kind() {
            HirKind::Empty => Ok(next),
            HirKind::Literal(literal) => {
                let text = std::str::from_utf8(&literal.0)
                    .map_err(|_| "literal is not valid UTF-8".to_string())?;
                let mut entry = next;
                for c in text.chars().rev() {
                    entry = self.push(State::Ranges {
                        ranges: Box::new([(c, c)]),
                        next: entry,
                    })?;
                }
                Ok(entry)
            }
            HirKind::Class(Class::Unicode(class)) => {
                let ranges = class.iter().map(|r| (r.start(), r.end())).collect();
                self.push(State::Ranges { ranges, next })
            }
            HirKind::Class(Class::Bytes(class)) => {
                let ranges = class
                    .iter()
                    .map(|r| {
                        if r.end().is_ascii() {
                            Ok((char::from(r.start()), char::from(r.end())))
                        } else {
                            Err("byte classes outside ASCII are not supported".to_string())
                        }
                    })
                    .collect::<Result<_, _>>()?;
                self.push(State::Ranges { ranges, next })
            }
            HirKind::Look(_) => Err("look-around assertions are not supported".to_string()),
            HirKind::Capture(capture) => self.compile(&capture.sub, next),
            HirKind::Concat(parts) => {
                let mut entry = next;
                for part in parts.iter().rev() {
                    entry = self.compile(part, entry)?;
                }
                Ok(entry)
            }
            HirKind::Alternation(alternatives) => {
                let mut entries = Vec::with_capacity(alternatives.len());
                for alternative in alternatives {
                    entries.push(self.compile(alternative, next)?);
                }
                self.push(State::Split(entries))
            }
            HirKind::Repetition(repetition) => {
                let sub = &repetition.sub;
                let mut entry = match repetition.max {
                    None => {
                        let split = self.push(State::Split(Vec::new()))?;
                        let body = self.compile(sub, split)?;
                        self.states[split] = State::Split(vec![body, next]);
                        split
                    }
                    Some(max) => {
                        let optional = max.saturating_sub(repetition.min);
                        let mut entry = next;
                        for _ in 0..optional {
                            let body = self.compile(sub, entry)?;
                            entry = self.push(State::Split(vec![body, next]))?;
                        }
                        entry
                    }
                };
                for _ in 0..repetition.min {
                    entry = self.compile(sub, entry)?;
                }
                Ok(entry)
            }
        }
    }

    /// Runs `candidates` (token indices) from byte `start` of `text`.
    pub(crate) fn run(&self, text: &str, start: usize, candidates: &[usize]) -> Run {
        let mut current = StateSet::new(self.states.len());
        let mut next = StateSet::new(self.states.len());
        for &token in candidates {
            if let Some(&entry) = self.starts.get(token) {
                self.add_closure(&mut current, entry);
            }
        }

        let mut longest: Vec<Option<usize>> = vec![None; self.starts.len()];
        let mut examined_end = start;
        let mut pos = start;
        while !current.is_empty() {
            let mut consuming = false;
            for &id in current.iter() {
                match &self.states[id] {
                    State::Accept(token) if pos > start => longest[*token] = Some(pos),
                    State::Ranges { .. } => consuming = true,
                    _ => {}
                }
            }
            if !consuming {
                break;
            }
            let Some(c) = text.get(pos..).and_then(|rest| rest.chars().next()) else {
                examined_end = text.len() + 1;
                break;
            };
            examined_end = pos + c.len_utf8();

            next.clear();
            for &id in current.iter() {
                if let State::Ranges { ranges, next: target } = &self.states[id] {
                    if contains(ranges, c) {
                        self.add_closure(&mut next, *target);
                    }
                }
            }
            std::mem::swap(&mut current, &mut next);
            pos += c.len_utf8();
        }

        Run {
            matches: longest
                .iter()
                .enumerate()
                .filter_map(|(token, end)| end.map(|end| (token, end)))
                .collect(),
            examined_end,
        }
    }

    fn add_closure(&self, set: &mut StateSet, entry: usize) {
        let mut pending = vec![entry];
        while let Some(id) = pending.pop() {
            if !set.insert(id) {
                continue;
            }
            if let State::Split(targets) = &self.states[id] {
                pending.extend(targets.iter().rev());
            }
        }
    }
}

fn contains(ranges: &[(char, char)], c: char) -> bool {
    ranges
        .binary_search_by(|&(lo, hi)| {
            if hi < c {
                std::cmp::Ordering::Less
            } else if lo > c {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// Sparse set of NFA state ids with insertion order.
#[derive(Debug)]
struct StateSet {
    dense: Vec<usize>,
    member: Vec<bool>,
}

impl StateSet {
    fn new(capacity: usize) -> Self {
        Self {
            dense: Vec::new(),
            member: vec![false; capacity],
        }
    }

    fn insert(&mut self, id: usize) -> bool {
        if self.member[id] {
            return false;
        }
        self.member[id] = true;
        self.dense.push(id);
        true
    }

    fn clear(&mut self) {
        for &id in &self.dense {
            self.member[id] = false;
        }
        self.dense.clear();
    }

    fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.dense.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn nfa(patterns: &[&str]) -> Nfa {
        let mut nfa = Nfa::default();
        for pattern in patterns {
            nfa.add_token(pattern).unwrap();
        }
        nfa
    }

    #[rstest]
    #[case(r"\d+", "123abc", Some(3))]
    #[case(r"[a-z]+", "123", None)]
    #[case(r"a|ab|abc", "abcd", Some(3))]
    #[case(r"x{2,3}", "xxxx", Some(3))]
    #[case(r"//.*", "// hi\nnext", Some(5))]
    #[case(r"\\.", r"\n", Some(2))]
    #[case(r"é+", "ééa", Some(4))]
    fn test_longest_match(#[case] pattern: &str, #[case] text: &str, #[case] end: Option<usize>) {
        let run = nfa(&[pattern]).run(text, 0, &[0]);
        assert_eq!(run.matches.first().map(|m| m.1), end);
    }

    #[test]
    fn test_examined_end_counts_the_rejecting_char() {
        let run = nfa(&[r"[a-z]+"]).run("abc;", 0, &[0]);
        assert_eq!(run.matches, vec![(0, 3)]);
        assert_eq!(run.examined_end, 4);
    }

    #[test]
    fn test_examined_end_past_eof() {
        let run = nfa(&[r"[a-z]+"]).run("abc", 0, &[0]);
        assert_eq!(run.examined_end, 4);
    }

    #[test]
    fn test_single_char_token_does_not_peek() {
        let run = nfa(&[r"\s"]).run("  ", 0, &[0]);
        assert_eq!(run.matches, vec![(0, 1)]);
        assert_eq!(run.examined_end, 1);
    }

    #[test]
    fn test_candidates_run_together() {
        let run = nfa(&["if", r"\w+", r"\d+"]).run("iffy", 0, &[0, 1]);
        assert_eq!(run.matches, vec![(0, 2), (1, 4)]);
    }

    #[test]
    fn test_empty_match_is_ignored() {
        let run = nfa(&[r"a*"]).run("bbb", 0, &[0]);
        assert!(run.matches.is_empty());
    }

    #[test]
    fn test_look_around_is_rejected() {
        let mut nfa = Nfa::default();
        let err = nfa.add_token(r"^a").unwrap_err();
        assert!(matches!(err, GrammarError::Pattern { .. }));
    }
}
