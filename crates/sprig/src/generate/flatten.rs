//! Lowers a [`Grammar`] into numbered symbols and flat productions.
//!
//! Lexical rules (whose whole body is a string, pattern or `token(...)`)
//! become named terminals; strings and patterns used inside other rules
//! become anonymous terminals, shared by every rule that spells them the
//! same way. Every other rule becomes a non-terminal whose body is expanded
//! into a list of alternatives: choices are distributed over sequences and
//! repetitions turn into hidden left-recursive helper rules.

use crate::grammar::{Grammar, GrammarError, PrecedenceLevel, Rule, RuleType};
use crate::symbol::{Associativity, Production, Symbol, SymbolMetadata};
use rustc_hash::FxHashMap;

/// Upper bound on the alternatives a single rule may expand into.
const MAX_ALTERNATIVES: usize = 4096;

/// A lexer token produced by flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenDef {
    /// Regular expression matching the token, in `regex-syntax` syntax.
    pub pattern: String,
    /// Whether the token is a plain string literal.
    pub literal: bool,
    /// Lexical precedence declared inside the token.
    pub precedence: i32,
}

/// A grammar reduced to numbered symbols and productions.
#[derive(Debug, Clone)]
pub(crate) struct FlatGrammar {
    pub symbols: Vec<SymbolMetadata>,
    pub tokens: Vec<TokenDef>,
    pub external_count: usize,
    pub productions: Vec<Production>,
    pub start: Symbol,
    pub extra_nonterminals: Vec<Symbol>,
}

impl FlatGrammar {
    /// Number of terminal symbols, including `end` and `ERROR`.
    pub(crate) fn terminal_count(&self) -> usize {
        2 + self.tokens.len() + self.external_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TokenKey {
    Literal(String),
    Named(String),
    Pattern(String, i32),
}

#[derive(Debug, Default)]
struct TokenTable {
    defs: Vec<TokenDef>,
    meta: Vec<SymbolMetadata>,
    index: FxHashMap<TokenKey, usize>,
    counters: FxHashMap<String, usize>,
}

impl TokenTable {
    fn push(&mut self, def: TokenDef, meta: SymbolMetadata) -> usize {
        self.defs.push(def);
        self.meta.push(meta);
        self.defs.len() - 1
    }

    fn intern_named(
        &mut self,
        name: &str,
        rule: &Rule,
        hidden: bool,
        ranks: &FxHashMap<String, i32>,
    ) -> Result<usize, GrammarError> {
        let meta = SymbolMetadata {
            name: name.to_string(),
            visible: !hidden,
            named: true,
            terminal: true,
            extra: false,
        };
        if let Some(value) = rule.string_value() {
            if let Some(&existing) = self.index.get(&TokenKey::Literal(value.to_string())) {
                self.meta[existing] = meta;
                self.index.insert(TokenKey::Named(name.to_string()), existing);
                return Ok(existing);
            }
        }
        let (pattern, precedence) = token_regex(rule, ranks)?;
        let index = self.push(
            TokenDef {
                pattern,
                literal: rule.string_value().is_some(),
                precedence,
            },
            meta,
        );
        self.index.insert(TokenKey::Named(name.to_string()), index);
        if let Some(value) = rule.string_value() {
            self.index.insert(TokenKey::Literal(value.to_string()), index);
        }
        Ok(index)
    }

    fn intern_inline(
        &mut self,
        rule: &Rule,
        owner: &str,
        ranks: &FxHashMap<String, i32>,
    ) -> Result<usize, GrammarError> {
        let key = inline_key(rule, ranks)?;
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        let (pattern, precedence) = token_regex(rule, ranks)?;
        let (name, visible, literal) = match rule.string_value() {
            Some(value) => (value.to_string(), true, true),
            None => {
                let counter = self.counters.entry(owner.to_string()).or_default();
                *counter += 1;
                (format!("{owner}_token{counter}"), false, false)
            }
        };
        let index = self.push(
            TokenDef {
                pattern,
                literal,
                precedence,
            },
            SymbolMetadata {
                name,
                visible,
                named: false,
                terminal: true,
                extra: false,
            },
        );
        self.index.insert(key, index);
        Ok(index)
    }

    fn collect(
        &mut self,
        rule: &Rule,
        owner: &str,
        ranks: &FxHashMap<String, i32>,
    ) -> Result<(), GrammarError> {
        match rule.rule_type {
            RuleType::String | RuleType::Pattern | RuleType::Token | RuleType::ImmediateToken => {
                self.intern_inline(rule, owner, ranks)?;
            }
            RuleType::Symbol | RuleType::Blank => {}
            _ => {
                for child in rule.children() {
                    self.collect(child, owner, ranks)?;
                }
            }
        }
        Ok(())
    }
}

fn inline_key(rule: &Rule, ranks: &FxHashMap<String, i32>) -> Result<TokenKey, GrammarError> {
    Ok(match rule.string_value() {
        Some(value) => TokenKey::Literal(value.to_string()),
        None => {
            let (pattern, precedence) = token_regex(rule, ranks)?;
            TokenKey::Pattern(pattern, precedence)
        }
    })
}

/// Converts a lexical rule into a regular expression and its lexical precedence.
fn token_regex(
    rule: &Rule,
    ranks: &FxHashMap<String, i32>,
) -> Result<(String, i32), GrammarError> {
    let mut precedence = None;
    let pattern = regex_of(rule, ranks, &mut precedence)?;
    Ok((pattern, precedence.unwrap_or(0)))
}

fn regex_of(
    rule: &Rule,
    ranks: &FxHashMap<String, i32>,
    precedence: &mut Option<i32>,
) -> Result<String, GrammarError> {
    let content = |precedence: &mut Option<i32>| match rule.content.as_deref() {
        Some(content) => regex_of(content, ranks, precedence),
        None => Ok(String::new()),
    };
    Ok(match rule.rule_type {
        RuleType::Blank => String::new(),
        RuleType::String => regex_syntax::escape(rule.string_value().unwrap_or_default()),
        RuleType::Pattern => {
            let source = rule.pattern_value().unwrap_or_default();
            if rule.is_case_insensitive() {
                format!("(?i:{source})")
            } else {
                format!("(?:{source})")
            }
        }
        RuleType::Seq => {
            let mut out = String::new();
            for member in &rule.members {
                out.push_str("(?:");
                out.push_str(&regex_of(member, ranks, precedence)?);
                out.push(')');
            }
            out
        }
        RuleType::Choice => {
            let alternatives = rule
                .members
                .iter()
                .map(|member| regex_of(member, ranks, precedence))
                .collect::<Result<Vec<_>, _>>()?;
            format!("(?:{})", alternatives.join("|"))
        }
        RuleType::Repeat => format!("(?:{})*", content(precedence)?),
        RuleType::Repeat1 => format!("(?:{})+", content(precedence)?),
        RuleType::Prec | RuleType::PrecLeft | RuleType::PrecRight | RuleType::PrecDynamic => {
            if precedence.is_none() {
                *precedence = Some(level(rule, ranks));
            }
            content(precedence)?
        }
        RuleType::Token
        | RuleType::ImmediateToken
        | RuleType::Field
        | RuleType::Alias
        | RuleType::Reserved => content(precedence)?,
        RuleType::Symbol => {
            return Err(GrammarError::Validation(format!(
                "symbol '{}' cannot be used inside a token",
                rule.name.as_deref().unwrap_or_default()
            )))
        }
    })
}

fn level(rule: &Rule, ranks: &FxHashMap<String, i32>) -> i32 {
    match rule.precedence_level() {
        Some(PrecedenceLevel::Number(level)) => level,
        Some(PrecedenceLevel::Named(name)) => ranks.get(name).copied().unwrap_or(0),
        None => 0,
    }
}

/// Maps each named precedence level to a rank; earlier entries rank higher.
fn precedence_ranks(grammar: &Grammar) -> FxHashMap<String, i32> {
    let mut ranks = FxHashMap::default();
    for list in grammar.precedences.iter().flatten() {
        for (i, entry) in list.iter().enumerate() {
            if let Some(name) = entry.string_value().or(entry.symbol_name()) {
                let rank = i32::try_from(list.len() - i).unwrap_or(i32::MAX);
                ranks.entry(name.to_string()).or_insert(rank);
            }
        }
    }
    ranks
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Alt {
    symbols: Vec<Symbol>,
    precedence: Option<i32>,
    associativity: Associativity,
}

impl Alt {
    fn single(symbol: Symbol) -> Self {
        Self {
            symbols: vec![symbol],
            ..Self::default()
        }
    }
}

struct Flattener<'g> {
    grammar: &'g Grammar,
    ranks: FxHashMap<String, i32>,
    tokens: TokenTable,
    externals: Vec<&'g str>,
    nonterminals: Vec<SymbolMetadata>,
    nonterminal_index: FxHashMap<&'g str, Symbol>,
    productions: Vec<Production>,
    repeat_counters: FxHashMap<String, usize>,
}

impl<'g> Flattener<'g> {
    fn terminal_count(&self) -> usize {
        2 + self.tokens.defs.len() + self.externals.len()
    }

    fn symbol_at(index: usize) -> Result<Symbol, GrammarError> {
        u16::try_from(index)
            .map(Symbol)
            .map_err(|_| GrammarError::Validation("grammar has too many symbols".to_string()))
    }

    fn resolve(&self, name: &str) -> Result<Symbol, GrammarError> {
        if let Some(i) = self.externals.iter().position(|e| *e == name) {
            return Self::symbol_at(2 + self.tokens.defs.len() + i);
        }
        if let Some(&i) = self.tokens.index.get(&TokenKey::Named(name.to_string())) {
            return Self::symbol_at(2 + i);
        }
        self.nonterminal_index
            .get(name)
            .copied()
            .ok_or_else(|| GrammarError::Validation(format!("undefined symbol '{name}'")))
    }

    fn inline_token(&self, rule: &Rule) -> Result<Symbol, GrammarError> {
        let key = inline_key(rule, &self.ranks)?;
        let index = self.tokens.index.get(&key).copied().ok_or_else(|| {
            GrammarError::Validation(format!("token {key:?} was not collected"))
        })?;
        Self::symbol_at(2 + index)
    }

    fn add_nonterminal(&mut self, meta: SymbolMetadata) -> Result<Symbol, GrammarError> {
        let symbol = Self::symbol_at(self.terminal_count() + self.nonterminals.len())?;
        self.nonterminals.push(meta);
        Ok(symbol)
    }

    fn expand(&mut self, rule: &Rule, owner: &str) -> Result<Vec<Alt>, GrammarError> {
        match rule.rule_type {
            RuleType::Blank => Ok(vec![Alt::default()]),
            RuleType::String | RuleType::Pattern | RuleType::Token | RuleType::ImmediateToken => {
                Ok(vec![Alt::single(self.inline_token(rule)?)])
            }
            RuleType::Symbol => {
                let name = rule.name.as_deref().unwrap_or_default();
                Ok(vec![Alt::single(self.resolve(name)?)])
            }
            RuleType::Choice => {
                let mut alts = Vec::new();
                for member in &rule.members {
                    alts.extend(self.expand(member, owner)?);
                    if alts.len() > MAX_ALTERNATIVES {
                        return Err(GrammarError::TooManyAlternatives(owner.to_string()));
                    }
                }
                Ok(alts)
            }
            RuleType::Seq => {
                let mut acc = vec![Alt::default()];
                for member in &rule.members {
                    let tails = self.expand(member, owner)?;
                    if acc.len().saturating_mul(tails.len()) > MAX_ALTERNATIVES {
                        return Err(GrammarError::TooManyAlternatives(owner.to_string()));
                    }
                    let mut next = Vec::with_capacity(acc.len() * tails.len());
                    for head in &acc {
                        for tail in &tails {
                            let mut symbols = head.symbols.clone();
                            symbols.extend(&tail.symbols);
                            let (precedence, associativity) = if tail.precedence.is_some() {
                                (tail.precedence, tail.associativity)
                            } else {
                                (head.precedence, head.associativity)
                            };
                            next.push(Alt {
                                symbols,
                                precedence,
                                associativity,
                            });
                        }
                    }
                    acc = next;
                }
                Ok(acc)
            }
            RuleType::Repeat | RuleType::Repeat1 => self.expand_repeat(rule, owner),
            RuleType::Prec | RuleType::PrecLeft | RuleType::PrecRight => {
                let value = level(rule, &self.ranks);
                let associativity = rule.associativity();
                let mut alts = self.expand_content(rule, owner)?;
                for alt in alts.iter_mut().filter(|alt| alt.precedence.is_none()) {
                    alt.precedence = Some(value);
                    alt.associativity = associativity;
                }
                Ok(alts)
            }
            RuleType::PrecDynamic | RuleType::Field | RuleType::Alias | RuleType::Reserved => {
                self.expand_content(rule, owner)
            }
        }
    }

    fn expand_content(&mut self, rule: &Rule, owner: &str) -> Result<Vec<Alt>, GrammarError> {
        match rule.content.as_deref() {
            Some(content) => self.expand(content, owner),
            None => Ok(vec![Alt::default()]),
        }
    }

    fn expand_repeat(&mut self, rule: &Rule, owner: &str) -> Result<Vec<Alt>, GrammarError> {
        let alts = self.expand_content(rule, owner)?;
        let has_empty = alts.iter().any(|alt| alt.symbols.is_empty());
        let mut items: Vec<Alt> = Vec::new();
        for alt in alts {
            if !alt.symbols.is_empty() && !items.iter().any(|a| a.symbols == alt.symbols) {
                items.push(alt);
            }
        }
        if items.is_empty() {
            return Ok(vec![Alt::default()]);
        }

        let counter = self.repeat_counters.entry(owner.to_string()).or_default();
        *counter += 1;
        let name = format!("{owner}_repeat{counter}");
        let helper = self.add_nonterminal(SymbolMetadata {
            name,
            visible: false,
            named: false,
            terminal: false,
            extra: false,
        })?;
        for alt in &items {
            let mut rhs = vec![helper];
            rhs.extend(&alt.symbols);
            self.productions.push(Production {
                lhs: helper,
                rhs,
                precedence: alt.precedence.unwrap_or(0),
                associativity: alt.associativity,
                repeat_append: true,
            });
        }
        for alt in &items {
            self.productions.push(Production {
                lhs: helper,
                rhs: alt.symbols.clone(),
                precedence: alt.precedence.unwrap_or(0),
                associativity: alt.associativity,
                repeat_append: false,
            });
        }

        let mut out = vec![Alt::single(helper)];
        if rule.rule_type == RuleType::Repeat || has_empty {
            out.push(Alt::default());
        }
        Ok(out)
    }
}

/// Flattens `grammar`. The grammar is expected to have passed validation.
pub(crate) fn flatten(grammar: &Grammar) -> Result<FlatGrammar, GrammarError> {
    let names = grammar.rule_names();
    let start_name = *names
        .first()
        .ok_or_else(|| GrammarError::Validation("grammar has no rules".to_string()))?;
    let ranks = precedence_ranks(grammar);
    let externals = grammar.external_names();
    let is_external = |name: &str| externals.iter().any(|e| *e == name);

    let mut tokens = TokenTable::default();
    for &name in &names {
        if is_external(name) {
            continue;
        }
        let Some(rule) = grammar.rules.get(name) else {
            continue;
        };
        // A lexical start rule still gets a node of its own: its body becomes
        // an anonymous token under a one-symbol start production.
        if rule.is_lexical() && name != start_name {
            tokens.intern_named(name, rule, grammar.is_hidden(name), &ranks)?;
        } else {
            tokens.collect(rule, name, &ranks)?;
        }
    }
    for extra in grammar.extras() {
        if extra.symbol_name().is_none() {
            let index = tokens.intern_inline(extra, "extras", &ranks)?;
            tokens.meta[index].extra = true;
        }
    }

    let mut flattener = Flattener {
        grammar,
        ranks,
        tokens,
        externals: externals.clone(),
        nonterminals: Vec::new(),
        nonterminal_index: FxHashMap::default(),
        productions: Vec::new(),
        repeat_counters: FxHashMap::default(),
    };

    let syntactic: Vec<(&str, &Rule)> = names
        .iter()
        .filter(|name| !is_external(name))
        .filter_map(|&name| grammar.rules.get(name).map(|rule| (name, rule)))
        .filter(|&(name, rule)| !rule.is_lexical() || name == start_name)
        .collect();
    for &(name, _) in &syntactic {
        let symbol = flattener.add_nonterminal(SymbolMetadata {
            name: name.to_string(),
            visible: !grammar.is_hidden(name),
            named: true,
            terminal: false,
            extra: false,
        })?;
        flattener.nonterminal_index.insert(name, symbol);
    }

    let start = flattener.resolve(start_name)?;
    if start.index() < flattener.terminal_count() {
        return Err(GrammarError::Validation(format!(
            "start rule '{start_name}' must not be an external token"
        )));
    }

    for &(name, rule) in &syntactic {
        let lhs = flattener.resolve(name)?;
        let alts = flattener.expand(rule, name)?;
        if alts.is_empty() {
            return Err(GrammarError::Validation(format!(
                "rule '{name}' has no alternatives"
            )));
        }
        let mut seen: Vec<&[Symbol]> = Vec::new();
        let mut unique = Vec::new();
        for alt in &alts {
            if !seen.contains(&alt.symbols.as_slice()) {
                seen.push(&alt.symbols);
                unique.push(Production {
                    lhs,
                    rhs: alt.symbols.clone(),
                    precedence: alt.precedence.unwrap_or(0),
                    associativity: alt.associativity,
                    repeat_append: false,
                });
            }
        }
        flattener.productions.extend(unique);
    }

    let token_count = flattener.tokens.defs.len();
    let mut symbols = vec![
        SymbolMetadata {
            name: "end".to_string(),
            visible: false,
            named: false,
            terminal: true,
            extra: false,
        },
        SymbolMetadata {
            name: "ERROR".to_string(),
            visible: true,
            named: true,
            terminal: false,
            extra: false,
        },
    ];
    symbols.extend(flattener.tokens.meta.iter().cloned());
    symbols.extend(externals.iter().map(|name| SymbolMetadata {
        name: (*name).to_string(),
        visible: !grammar.is_hidden(name),
        named: true,
        terminal: true,
        extra: false,
    }));
    symbols.extend(flattener.nonterminals.iter().cloned());

    let mut extra_nonterminals = Vec::new();
    for extra in grammar.extras() {
        if let Some(name) = extra.symbol_name() {
            let symbol = flattener.resolve(name)?;
            symbols[symbol.index()].extra = true;
            if !symbols[symbol.index()].terminal && !extra_nonterminals.contains(&symbol) {
                extra_nonterminals.push(symbol);
            }
        }
    }

    tracing::debug!(
        grammar = %flattener.grammar.name,
        tokens = token_count,
        externals = externals.len(),
        symbols = symbols.len(),
        productions = flattener.productions.len(),
        "flattened grammar"
    );

    Ok(FlatGrammar {
        symbols,
        tokens: flattener.tokens.defs,
        external_count: externals.len(),
        productions: flattener.productions,
        start,
        extra_nonterminals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::dsl::*;

    fn names(flat: &FlatGrammar, production: &Production) -> Vec<String> {
        production
            .rhs
            .iter()
            .map(|s| flat.symbols[s.index()].name.clone())
            .collect()
    }

    #[test]
    fn test_choice_is_distributed_over_seq() {
        let grammar = GrammarBuilder::new("t")
            .rule(
                "doc",
                seq([choice([string("a"), string("b")]), optional(string("c"))]),
            )
            .build();
        let flat = flatten(&grammar).unwrap();
        let rhs: Vec<Vec<String>> = flat.productions.iter().map(|p| names(&flat, p)).collect();
        assert_eq!(
            rhs,
            vec![
                vec!["a".to_string(), "c".to_string()],
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["b".to_string()],
            ]
        );
    }

    #[test]
    fn test_repeat_becomes_hidden_helper() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", repeat(sym("item")))
            .rule("item", pattern("[a-z]+"))
            .build();
        let flat = flatten(&grammar).unwrap();
        let helper = flat
            .symbols
            .iter()
            .position(|m| m.name == "doc_repeat1")
            .unwrap();
        assert!(!flat.symbols[helper].visible);
        let appends: Vec<&Production> =
            flat.productions.iter().filter(|p| p.repeat_append).collect();
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].rhs.len(), 2);
        assert!(flat
            .productions
            .iter()
            .any(|p| p.lhs == flat.start && p.rhs.is_empty()));
    }

    #[test]
    fn test_strings_are_shared_and_lexical_rules_named() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", seq([string("null"), sym("nil"), string(";"), string(";")]))
            .rule("nil", string("null"))
            .build();
        let flat = flatten(&grammar).unwrap();
        assert_eq!(flat.tokens.len(), 2);
        let null = flat.productions[0].rhs[0];
        assert_eq!(null, flat.productions[0].rhs[1]);
        assert_eq!(flat.symbols[null.index()].name, "nil");
        assert!(flat.symbols[null.index()].named);
    }

    #[test]
    fn test_lexical_start_rule_gets_a_production() {
        let grammar = GrammarBuilder::new("t").rule("doc", pattern("[a-z]+")).build();
        let flat = flatten(&grammar).unwrap();
        assert!(flat.start.index() >= flat.terminal_count());
        assert_eq!(flat.symbols[flat.start.index()].name, "doc");
        assert_eq!(flat.productions.len(), 1);
        assert_eq!(names(&flat, &flat.productions[0]), vec!["doc_token1".to_string()]);
        assert!(!flat.symbols[flat.productions[0].rhs[0].index()].visible);
    }

    #[test]
    fn test_precedence_is_attached() {
        let grammar = GrammarBuilder::new("t")
            .rule(
                "expr",
                choice([
                    prec_left(1, seq([sym("expr"), string("+"), sym("expr")])),
                    prec_right(2, seq([sym("expr"), string("^"), sym("expr")])),
                    pattern("[0-9]+"),
                ]),
            )
            .build();
        let flat = flatten(&grammar).unwrap();
        assert_eq!(flat.productions[0].precedence, 1);
        assert_eq!(flat.productions[0].associativity, Associativity::Left);
        assert_eq!(flat.productions[1].associativity, Associativity::Right);
        assert_eq!(flat.productions[2].precedence, 0);
    }

    #[test]
    fn test_extras() {
        let grammar = GrammarBuilder::new("t")
            .extras([pattern(r"\s"), sym("comment")])
            .rule("doc", repeat(string("x")))
            .rule("comment", seq([string("#"), pattern("[a-z]*")]))
            .build();
        let flat = flatten(&grammar).unwrap();
        assert_eq!(flat.extra_nonterminals.len(), 1);
        let whitespace = flat.symbols.iter().find(|m| m.name == "extras_token1").unwrap();
        assert!(whitespace.extra && !whitespace.visible);
    }

    #[test]
    fn test_token_rule_regex() {
        let grammar = GrammarBuilder::new("t")
            .rule("doc", sym("op"))
            .rule("op", token(prec(3, choice([string("+"), string("*")]))))
            .build();
        let flat = flatten(&grammar).unwrap();
        assert_eq!(flat.tokens[0].pattern, r"(?:\+|\*)");
        assert_eq!(flat.tokens[0].precedence, 3);
        assert!(!flat.tokens[0].literal);
    }

    #[test]
    fn test_alternative_explosion_is_rejected() {
        let many = seq((0..13).map(|i| optional(string(&format!("t{i}")))));
        let grammar = GrammarBuilder::new("t").rule("doc", many).build();
        assert!(matches!(
            flatten(&grammar),
            Err(GrammarError::TooManyAlternatives(_))
        ));
    }
}
