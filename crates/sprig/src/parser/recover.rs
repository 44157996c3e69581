//! Error recovery.
//!
//! When the lookahead has no action, the parser looks a few tokens ahead
//! and searches for the cheapest way to continue: pop `d` entries off the
//! stack and skip `k` tokens, such that the token after the skipped ones is
//! acceptable in the state left on the stack. Everything popped or skipped
//! is wrapped in an `ERROR` node. Cost is `d + k`; ties go to the repair
//! that skips fewer tokens.

use super::{Lookahead, Run, Step};
use crate::language::{Action, Language};
use crate::lexer::Token;
use crate::subtree::Subtree;
use crate::symbol::{StateId, Symbol};

/// Most tokens a single recovery may skip.
const MAX_SKIPPED_TOKENS: usize = 3;

/// Bound on the reductions simulated when checking a repair.
const MAX_VIABILITY_STEPS: usize = 1024;

/// Tokens following an error, with the extras lexed before each of them.
struct Upcoming {
    tokens: Vec<Token>,
    extras: Vec<Vec<(Subtree, usize)>>,
}

impl<I> Run<'_, I> {
    pub(super) fn recover(&mut self, first: Token) -> Step {
        let upcoming = self.upcoming(first);
        let states = self.stack.states();

        let mut best: Option<(usize, usize)> = None;
        for (k, token) in upcoming.tokens.iter().enumerate() {
            for d in 0..states.len() {
                if d + k == 0 {
                    continue;
                }
                if best.is_some_and(|(bd, bk)| d + k >= bd + bk) {
                    break;
                }
                if viable(self.language, &states[..states.len() - d], token.symbol) {
                    best = Some((d, k));
                    break;
                }
            }
        }

        let (depth, skipped) = match best {
            Some(best) => best,
            None if first.symbol == Symbol::END => return Step::Done(self.error_root(&first)),
            None => (0, 1),
        };
        self.wrap_error(depth, skipped, &upcoming);

        let Upcoming { tokens, mut extras } = upcoming;
        match tokens.get(skipped) {
            Some(&next) => {
                for (subtree, start) in extras.swap_remove(skipped) {
                    self.stack.push_transparent(subtree, start);
                }
                Step::Continue(Some(Lookahead::Token(next)))
            }
            None => Step::Continue(None),
        }
    }

    /// Lexes up to [`MAX_SKIPPED_TOKENS`] tokens past `first` in the current lex
    /// state, setting extras aside.
    fn upcoming(&self, first: Token) -> Upcoming {
        let mut upcoming = Upcoming {
            tokens: vec![first],
            extras: vec![Vec::new()],
        };
        let mut pending = Vec::new();
        let mut position = first.end;
        let mut allow_external = true;
        let state = self.stack.top_state();
        while upcoming.tokens.len() <= MAX_SKIPPED_TOKENS
            && upcoming.tokens.last().is_some_and(|t| t.symbol != Symbol::END)
        {
            let token = self.language.lex(
                self.text,
                position,
                self.lex_state,
                allow_external && self.no_external_at != Some(position),
            );
            if token.is_empty() && token.symbol != Symbol::END {
                if !allow_external {
                    break;
                }
                allow_external = false;
                continue;
            }
            allow_external = true;
            if self.is_extra_token(token.symbol) {
                pending.push((Subtree::leaf(&token, state, self.lex_state, true), token.start));
                position = token.end;
                continue;
            }
            if let Some(entries) = self.parse_extra(&token) {
                position = entries
                    .last()
                    .map_or(token.end, |(subtree, start)| start + subtree.size());
                pending.extend(entries);
                continue;
            }
            position = token.end;
            upcoming.tokens.push(token);
            upcoming.extras.push(std::mem::take(&mut pending));
        }
        upcoming
    }

    /// Replaces the top `depth` entries and the first `skipped` upcoming
    /// tokens with a single `ERROR` node.
    fn wrap_error(&mut self, depth: usize, skipped: usize, upcoming: &Upcoming) {
        let mut at = self.stack.cut_point(depth);
        while self
            .stack
            .entries()
            .get(at)
            .is_some_and(|e| e.transparent && !is_error_node(&e.subtree))
        {
            at += 1;
        }
        let popped = self.stack.split_off(at);
        let state = self.stack.top_state();
        let start = popped.first().map_or_else(
            || upcoming.tokens.first().map_or(self.stack.end(), |t| t.start),
            |e| e.start,
        );

        let mut base = None;
        let mut children = Vec::new();
        for entry in popped {
            if is_error_node(&entry.subtree) {
                if base.is_none() && children.is_empty() {
                    base = Some(entry.subtree);
                } else {
                    children.extend(entry.subtree.children().iter().cloned());
                }
            } else {
                children.push(entry.subtree);
            }
        }
        for (token, extras) in upcoming.tokens.iter().zip(&upcoming.extras).take(skipped) {
            children.extend(extras.iter().map(|(subtree, _)| subtree.clone()));
            children.push(Subtree::leaf(token, state, self.lex_state, false));
        }

        let examined_end = upcoming
            .tokens
            .iter()
            .map(|t| t.examined_end)
            .max()
            .unwrap_or(start)
            .saturating_sub(start);
        let error = match base {
            Some(base) => base.append(children, examined_end, true),
            None => Subtree::node(Symbol::ERROR, children, state, examined_end, true),
        };
        tracing::debug!(
            start,
            end = start + error.size(),
            popped = depth,
            skipped,
            "recovered from syntax error"
        );
        self.stack.push_transparent(error, start);
    }

    /// A root `ERROR` node over everything parsed, for input that cannot be
    /// completed at the end of the text.
    fn error_root(&mut self, end: &Token) -> Subtree {
        tracing::debug!(position = end.start, "no recovery at end of input");
        let children = self.stack.take().into_iter().map(|e| e.subtree).collect();
        Subtree::node(Symbol::ERROR, children, 0, end.examined_end, true)
    }
}

fn is_error_node(subtree: &Subtree) -> bool {
    subtree.is_error() && !subtree.is_terminal()
}

/// Returns `true` if `symbol` can be shifted (or accepted) once the stack
/// holds exactly `states`, after any reductions it triggers.
pub(super) fn viable(language: &Language, states: &[StateId], symbol: Symbol) -> bool {
    let mut stack = states.to_vec();
    for _ in 0..MAX_VIABILITY_STEPS {
        let Some(&top) = stack.last() else {
            return false;
        };
        match language.lookup(top, symbol) {
            Action::Shift(_) | Action::Accept => return true,
            Action::Error => return false,
            Action::Reduce(id) => {
                let Some(production) = language.production(id) else {
                    return false;
                };
                let Some(kept) = stack
                    .len()
                    .checked_sub(production.rhs.len())
                    .filter(|&n| n > 0)
                else {
                    return false;
                };
                stack.truncate(kept);
                let Some(next) = stack.last().and_then(|&s| language.goto(s, production.lhs)) else {
                    return false;
                };
                stack.push(next);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use crate::grammar::dsl::*;
    use crate::parser::Parser;

    /// Statements `x = 1;` with parenthesized sums.
    fn language() -> Language {
        let grammar = GrammarBuilder::new("statements")
            .extras([pattern(r"\s")])
            .rule("program", repeat(sym("statement")))
            .rule("statement", seq([sym("name"), string("="), sym("_expression"), string(";")]))
            .rule(
                "_expression",
                choice([sym("name"), sym("number"), sym("sum"), sym("group")]),
            )
            .rule("sum", prec_left(1, seq([sym("_expression"), string("+"), sym("_expression")])))
            .rule("group", seq([string("("), sym("_expression"), string(")")]))
            .rule("name", pattern("[a-z]+"))
            .rule("number", pattern("[0-9]+"))
            .build();
        generate(&grammar).unwrap()
    }

    #[test]
    fn test_viable_from_initial_state() {
        let language = language();
        let name = language.symbol_for_name("name").unwrap();
        let number = language.symbol_for_name("number").unwrap();
        assert!(viable(&language, &[0], name));
        assert!(viable(&language, &[0], Symbol::END));
        assert!(!viable(&language, &[0], number));
    }

    #[test]
    fn test_skips_unexpected_token() {
        let text = "a = 1 ) ; b = 2;";
        let tree = Parser::new(language()).parse(text);
        let errors = tree.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(&text[errors[0].clone()], ")");
        let root = tree.root_node();
        assert_eq!(root.kind(), "program");
        assert_eq!(root.named_children().filter(|n| n.kind() == "statement").count(), 2);
    }

    #[test]
    fn test_unknown_character_is_skipped() {
        let text = "a = 1; @ b = 2;";
        let tree = Parser::new(language()).parse(text);
        assert_eq!(tree.errors().len(), 1);
        assert_eq!(&text[tree.errors()[0].clone()], "@");
    }

    #[test]
    fn test_missing_tail_pops_stack() {
        let text = "a = (1 + ";
        let tree = Parser::new(language()).parse(text);
        assert!(tree.root_node().has_error());
        assert_eq!(tree.root_node().byte_range(), 0..text.len());
        let covered: usize = tree.leaves().iter().map(|l| l.byte_range.len()).sum();
        assert_eq!(covered, text.len());
    }

    #[test]
    fn test_garbage_only() {
        let text = "= = =";
        let tree = Parser::new(language()).parse(text);
        assert!(tree.root_node().has_error());
        assert_eq!(tree.root_node().byte_range(), 0..text.len());
    }

    #[test]
    fn test_leaves_tile_text_after_recovery() {
        let text = "a = 1 + + 2; b = ((3); c = 4;";
        let tree = Parser::new(language()).parse(text);
        let mut position = 0;
        for leaf in tree.leaves() {
            assert_eq!(leaf.byte_range.start, position);
            position = leaf.byte_range.end;
        }
        assert_eq!(position, text.len());
    }
}
