//! LALR(1) automaton construction and conflict resolution.
//!
//! States are identified by their LR(0) kernel. Lookaheads are propagated by
//! re-processing a state whenever its kernel lookaheads grow, until nothing
//! changes, which yields the LALR(1) lookahead sets directly. All iteration
//! happens in symbol and item order, so a grammar always produces the same
//! state numbering.

use super::flatten::FlatGrammar;
use crate::grammar::GrammarError;
use crate::language::Action;
use crate::symbol::{Associativity, ProductionId, StateId, Symbol};
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

/// The dense tables produced for a flattened grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseTable {
    pub state_count: usize,
    /// `state * terminal_count + terminal`.
    pub actions: Vec<Action>,
    /// `state * nonterminal_count + (symbol - terminal_count)`.
    pub gotos: Vec<Option<StateId>>,
    /// Start state of the sub-parser of each non-terminal extra.
    pub extra_starts: Vec<(Symbol, StateId)>,
    /// Number of (state, terminal) cells that needed conflict resolution.
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TerminalSet(Vec<u64>);

impl TerminalSet {
    fn new(size: usize) -> Self {
        Self(vec![0; size.div_ceil(64)])
    }

    fn insert(&mut self, terminal: usize) -> bool {
        let (word, bit) = (terminal / 64, 1u64 << (terminal % 64));
        let fresh = self.0[word] & bit == 0;
        self.0[word] |= bit;
        fresh
    }

    fn union(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (mine, theirs) in self.0.iter_mut().zip(&other.0) {
            let merged = *mine | *theirs;
            changed |= merged != *mine;
            *mine = merged;
        }
        changed
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &bits)| {
            (0..64).filter(move |b| bits & (1u64 << b) != 0).map(move |b| w * 64 + b)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Item {
    production: usize,
    dot: usize,
}

#[derive(Debug, Clone)]
struct GenProduction {
    lhs: usize,
    rhs: Vec<Symbol>,
    precedence: i32,
    associativity: Associativity,
}

#[derive(Debug)]
struct StateData {
    kernel: Vec<Item>,
    lookaheads: Vec<TerminalSet>,
    transitions: Vec<(Symbol, usize)>,
}

/// Augmented root of a parse: the main start rule or a non-terminal extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Main,
    Extra(Symbol),
}

struct Builder<'a> {
    flat: &'a FlatGrammar,
    terminal_count: usize,
    productions: Vec<GenProduction>,
    roots: Vec<Root>,
    by_lhs: Vec<Vec<usize>>,
    first: Vec<TerminalSet>,
    nullable: Vec<bool>,
    states: Vec<StateData>,
    by_kernel: FxHashMap<Vec<Item>, usize>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl<'a> Builder<'a> {
    fn new(flat: &'a FlatGrammar) -> Self {
        let terminal_count = flat.terminal_count();
        let nonterminal_count = flat.symbols.len() - terminal_count;
        let mut productions: Vec<GenProduction> = flat
            .productions
            .iter()
            .map(|p| GenProduction {
                lhs: p.lhs.index() - terminal_count,
                rhs: p.rhs.clone(),
                precedence: p.precedence,
                associativity: p.associativity,
            })
            .collect();

        let mut roots = vec![Root::Main];
        roots.extend(flat.extra_nonterminals.iter().map(|&s| Root::Extra(s)));
        for (i, root) in roots.iter().enumerate() {
            let target = match root {
                Root::Main => flat.start,
                Root::Extra(symbol) => *symbol,
            };
            productions.push(GenProduction {
                lhs: nonterminal_count + i,
                rhs: vec![target],
                precedence: 0,
                associativity: Associativity::None,
            });
        }

        let mut by_lhs = vec![Vec::new(); nonterminal_count + roots.len()];
        for (i, production) in productions.iter().enumerate() {
            by_lhs[production.lhs].push(i);
        }

        let mut builder = Self {
            flat,
            terminal_count,
            productions,
            roots,
            by_lhs,
            first: vec![TerminalSet::new(terminal_count); nonterminal_count],
            nullable: vec![false; nonterminal_count],
            states: Vec::new(),
            by_kernel: FxHashMap::default(),
            queue: VecDeque::new(),
            queued: Vec::new(),
        };
        builder.compute_first_sets();
        builder
    }

    fn nonterminal(&self, symbol: Symbol) -> Option<usize> {
        symbol.index().checked_sub(self.terminal_count)
    }

    fn compute_first_sets(&mut self) {
        let real = self.flat.productions.len();
        let mut changed = true;
        while changed {
            changed = false;
            for production in &self.productions[..real] {
                let (first, nullable) = self.first_of(&production.rhs);
                changed |= self.first[production.lhs].union(&first);
                if nullable && !self.nullable[production.lhs] {
                    self.nullable[production.lhs] = true;
                    changed = true;
                }
            }
        }
    }

    /// FIRST set of a symbol string and whether it can derive the empty string.
    fn first_of(&self, symbols: &[Symbol]) -> (TerminalSet, bool) {
        let mut set = TerminalSet::new(self.terminal_count);
        for &symbol in symbols {
            match self.nonterminal(symbol) {
                None => {
                    set.insert(symbol.index());
                    return (set, false);
                }
                Some(nt) => {
                    set.union(&self.first[nt]);
                    if !self.nullable[nt] {
                        return (set, false);
                    }
                }
            }
        }
        (set, true)
    }

    fn closure(&self, state: &StateData) -> Vec<(Item, TerminalSet)> {
        let mut items: Vec<(Item, TerminalSet)> = state
            .kernel
            .iter()
            .copied()
            .zip(state.lookaheads.iter().cloned())
            .collect();
        let mut position: FxHashMap<Item, usize> = items
            .iter()
            .enumerate()
            .map(|(i, (item, _))| (*item, i))
            .collect();
        let mut work: Vec<usize> = (0..items.len()).rev().collect();

        while let Some(i) = work.pop() {
            let (item, lookahead) = items[i].clone();
            let production = &self.productions[item.production];
            let Some(nt) = production
                .rhs
                .get(item.dot)
                .and_then(|&next| self.nonterminal(next))
            else {
                continue;
            };
            let (mut follow, nullable) = self.first_of(&production.rhs[item.dot + 1..]);
            if nullable {
                follow.union(&lookahead);
            }
            for &q in &self.by_lhs[nt] {
                let entry = Item {
                    production: q,
                    dot: 0,
                };
                match position.get(&entry) {
                    Some(&j) => {
                        if items[j].1.union(&follow) {
                            work.push(j);
                        }
                    }
                    None => {
                        position.insert(entry, items.len());
                        work.push(items.len());
                        items.push((entry, follow.clone()));
                    }
                }
            }
        }
        items
    }

    fn enqueue(&mut self, state: usize) {
        if !self.queued[state] {
            self.queued[state] = true;
            self.queue.push_back(state);
        }
    }

    fn add_state(&mut self, kernel: Vec<Item>, lookaheads: Vec<TerminalSet>) -> usize {
        let id = self.states.len();
        self.by_kernel.insert(kernel.clone(), id);
        self.states.push(StateData {
            kernel,
            lookaheads,
            transitions: Vec::new(),
        });
        self.queued.push(false);
        self.enqueue(id);
        id
    }

    fn build_states(&mut self) {
        let real = self.flat.productions.len();
        for i in 0..self.roots.len() {
            let mut lookahead = TerminalSet::new(self.terminal_count);
            match self.roots[i] {
                Root::Main => {
                    lookahead.insert(Symbol::END.index());
                }
                Root::Extra(_) => {
                    for t in (0..self.terminal_count).filter(|&t| t != Symbol::ERROR.index()) {
                        lookahead.insert(t);
                    }
                }
            }
            let kernel = vec![Item {
                production: real + i,
                dot: 0,
            }];
            self.add_state(kernel, vec![lookahead]);
        }

        while let Some(id) = self.queue.pop_front() {
            self.queued[id] = false;
            let closure = self.closure(&self.states[id]);
            let mut groups: BTreeMap<Symbol, BTreeMap<Item, TerminalSet>> = BTreeMap::new();
            for (item, lookahead) in closure {
                if let Some(&next) = self.productions[item.production].rhs.get(item.dot) {
                    let advanced = Item {
                        production: item.production,
                        dot: item.dot + 1,
                    };
                    groups
                        .entry(next)
                        .or_default()
                        .entry(advanced)
                        .and_modify(|set| {
                            set.union(&lookahead);
                        })
                        .or_insert(lookahead);
                }
            }

            let mut transitions = Vec::with_capacity(groups.len());
            for (symbol, items) in groups {
                let kernel: Vec<Item> = items.keys().copied().collect();
                let lookaheads: Vec<TerminalSet> = items.into_values().collect();
                let target = if let Some(&existing) = self.by_kernel.get(&kernel) {
                    let mut changed = false;
                    let existing_lookaheads = self.states[existing].lookaheads.iter_mut();
                    for (mine, theirs) in existing_lookaheads.zip(&lookaheads) {
                        changed |= mine.union(theirs);
                    }
                    if changed {
                        self.enqueue(existing);
                    }
                    existing
                } else {
                    self.add_state(kernel, lookaheads)
                };
                transitions.push((symbol, target));
            }
            self.states[id].transitions = transitions;
        }
    }

    fn resolve(
        &self,
        state: usize,
        terminal: usize,
        shift: Option<(usize, i32)>,
        reduces: &[usize],
        accept: bool,
    ) -> (Action, bool) {
        let conflicted = usize::from(shift.is_some()) + reduces.len() + usize::from(accept) > 1;
        let reduce = if accept {
            None
        } else {
            reduces.iter().copied().max_by_key(|&p| {
                let production = &self.productions[p];
                (production.precedence, production.rhs.len(), Reverse(p))
            })
        };
        let reduce_action = if accept {
            Some(Action::Accept)
        } else {
            reduce.map(|p| Action::Reduce(ProductionId::try_from(p).unwrap_or(ProductionId::MAX)))
        };

        let action = match (shift, reduce_action) {
            (None, None) => Action::Error,
            (None, Some(action)) => action,
            (Some((target, _)), None) => {
                Action::Shift(StateId::try_from(target).unwrap_or(StateId::MAX))
            }
            (Some((target, shift_precedence)), Some(action)) => {
                let (precedence, associativity) = reduce.map_or((0, Associativity::None), |p| {
                    let production = &self.productions[p];
                    (production.precedence, production.associativity)
                });
                let reduce_wins = match precedence.cmp(&shift_precedence) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => associativity == Associativity::Left,
                };
                if reduce_wins {
                    action
                } else {
                    Action::Shift(StateId::try_from(target).unwrap_or(StateId::MAX))
                }
            }
        };
        if conflicted {
            tracing::debug!(
                state,
                lookahead = %self.flat.symbols[terminal].name,
                ?action,
                reductions = reduces.len(),
                "resolved conflict"
            );
        }
        (action, conflicted)
    }

    fn into_table(self) -> Result<ParseTable, GrammarError> {
        let state_count = self.states.len();
        if state_count > usize::from(StateId::MAX) {
            return Err(GrammarError::Validation(format!(
                "grammar needs {state_count} parse states, more than supported"
            )));
        }
        let nonterminal_count = self.flat.symbols.len() - self.terminal_count;
        let real = self.flat.productions.len();
        let mut actions = vec![Action::Error; state_count * self.terminal_count];
        let mut gotos = vec![None; state_count * nonterminal_count];
        let mut conflicts = 0;

        for (id, state) in self.states.iter().enumerate() {
            let mut shifts: BTreeMap<usize, i32> = BTreeMap::new();
            let mut reduces: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            let mut accepts: Vec<usize> = Vec::new();

            for (item, lookahead) in self.closure(state) {
                let production = &self.productions[item.production];
                match production.rhs.get(item.dot) {
                    Some(&next) if self.nonterminal(next).is_none() => {
                        let entry = shifts.entry(next.index()).or_insert(i32::MIN);
                        *entry = (*entry).max(production.precedence);
                    }
                    Some(_) => {}
                    None if item.production >= real => accepts.extend(lookahead.iter()),
                    None => {
                        for terminal in lookahead.iter() {
                            reduces.entry(terminal).or_default().push(item.production);
                        }
                    }
                }
            }

            for &(symbol, target) in &state.transitions {
                if let Some(nt) = self.nonterminal(symbol) {
                    gotos[id * nonterminal_count + nt] =
                        Some(StateId::try_from(target).unwrap_or(StateId::MAX));
                }
            }

            for terminal in 0..self.terminal_count {
                let shift = shifts.get(&terminal).map(|&precedence| {
                    let target = state
                        .transitions
                        .iter()
                        .find(|(s, _)| s.index() == terminal)
                        .map_or(0, |&(_, t)| t);
                    (target, precedence)
                });
                let candidates = reduces.get(&terminal).map_or(&[][..], Vec::as_slice);
                let accept = accepts.contains(&terminal);
                let (action, conflicted) = self.resolve(id, terminal, shift, candidates, accept);
                conflicts += usize::from(conflicted);
                actions[id * self.terminal_count + terminal] = action;
            }
        }

        let extra_starts = self
            .roots
            .iter()
            .enumerate()
            .filter_map(|(i, root)| match root {
                Root::Extra(symbol) => {
                    Some((*symbol, StateId::try_from(i).unwrap_or(StateId::MAX)))
                }
                Root::Main => None,
            })
            .collect();

        Ok(ParseTable {
            state_count,
            actions,
            gotos,
            extra_starts,
            conflicts,
        })
    }
}

/// Builds the LALR(1) action and goto tables of `flat`.
///
/// # Errors
///
/// Returns [`GrammarError::Validation`] if the automaton needs more states
/// than a [`StateId`] can address.
pub(crate) fn build(flat: &FlatGrammar) -> Result<ParseTable, GrammarError> {
    let mut builder = Builder::new(flat);
    builder.build_states();
    let table = builder.into_table()?;
    tracing::debug!(
        states = table.state_count,
        conflicts = table.conflicts,
        "built parse table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::flatten::flatten;
    use crate::grammar::dsl::*;

    fn table(grammar: &crate::Grammar) -> (FlatGrammar, ParseTable) {
        let flat = flatten(grammar).unwrap();
        let table = build(&flat).unwrap();
        (flat, table)
    }

    fn action(flat: &FlatGrammar, table: &ParseTable, state: usize, name: &str) -> Action {
        let terminal = flat.symbols.iter().position(|m| m.name == name).unwrap();
        table.actions[state * flat.terminal_count() + terminal]
    }

    #[test]
    fn test_terminal_set() {
        let mut set = TerminalSet::new(130);
        assert!(set.insert(3));
        assert!(!set.insert(3));
        set.insert(129);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 129]);
    }

    #[test]
    fn test_simple_sequence() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", seq([string("a"), string("b")]))
            .build();
        let (flat, table) = table(&grammar);
        let Action::Shift(after_a) = action(&flat, &table, 0, "a") else {
            panic!("expected shift on 'a'");
        };
        assert_eq!(action(&flat, &table, 0, "b"), Action::Error);
        assert!(matches!(
            action(&flat, &table, usize::from(after_a), "b"),
            Action::Shift(_)
        ));
        assert_eq!(table.conflicts, 0);
    }

    #[test]
    fn test_accept_on_end() {
        let grammar = GrammarBuilder::new("t").rule("doc", string("a")).build();
        let (flat, table) = table(&grammar);
        let doc = flat.start.index() - flat.terminal_count();
        let nonterminals = flat.symbols.len() - flat.terminal_count();
        let after_doc = table.gotos[doc].unwrap();
        assert_eq!(
            table.actions[usize::from(after_doc) * flat.terminal_count()],
            Action::Accept
        );
        assert_eq!(table.gotos.len(), table.state_count * nonterminals);
    }

    #[test]
    fn test_ambiguous_expression_needs_resolution() {
        let grammar = GrammarBuilder::new("t")
            .rule(
                "expr",
                choice([
                    prec_left(1, seq([sym("expr"), string("+"), sym("expr")])),
                    prec_left(2, seq([sym("expr"), string("*"), sym("expr")])),
                    pattern("[0-9]+"),
                ]),
            )
            .build();
        let (_, table) = table(&grammar);
        assert!(table.conflicts > 0);
    }

    #[test]
    fn test_extra_start_state_accepts_everything() {
        let grammar = GrammarBuilder::new("t")
            .extras([sym("comment")])
            .rule("doc", repeat(string("x")))
            .rule("comment", seq([string("#"), string("!")]))
            .build();
        let (flat, table) = table(&grammar);
        assert_eq!(table.extra_starts.len(), 1);
        let (symbol, start) = table.extra_starts[0];
        assert_eq!(flat.symbols[symbol.index()].name, "comment");
        assert!(matches!(
            action(&flat, &table, usize::from(start), "#"),
            Action::Shift(_)
        ));
    }

    #[test]
    fn test_deterministic() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", repeat(choice([sym("pair"), string(";")])))
            .rule("pair", seq([string("("), optional(sym("doc")), string(")")]))
            .build();
        let (_, first) = table(&grammar);
        let (_, second) = table(&grammar);
        assert_eq!(first, second);
    }
}
