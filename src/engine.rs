use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};
use smallvec::{smallvec, SmallVec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{DatalogError, Result};
use crate::eval::Evaluator;
use crate::literal::Clause;
use crate::term::{Predicate, Term};
use crate::unify::{find_all, Bindings, Found};

/// A stored or derived row: fully ground arguments
pub type Fact = Vec<Term>;

/// Answer to a [`Database::query`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QueryAnswer {
    /// A row matched without binding anything (ground queries)
    True,
    /// Nothing matched
    False,
    /// One binding set per matching row, stored facts first
    Bindings(Vec<Bindings>),
}

impl QueryAnswer {
    /// Returns true unless the answer is [`QueryAnswer::False`]
    #[must_use]
    pub fn holds(&self) -> bool {
        !matches!(self, Self::False)
    }

    /// The binding sets; empty for `True` and `False`
    #[must_use]
    pub fn bindings(&self) -> &[Bindings] {
        match self {
            Self::Bindings(found) => found,
            Self::True | Self::False => &[],
        }
    }

    /// Values bound to `variable` across all binding sets
    pub fn values<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.bindings()
            .iter()
            .filter_map(move |bindings| bindings.get(variable))
    }
}

/// In-memory deductive database.
///
/// Holds ground facts and rule clauses per predicate, the dependency edges
/// between rule predicates, and a cache of fully materialized rule tables.
/// Cache entries are created on first use and evicted, together with every
/// predicate that transitively reads them, whenever a fact or clause is added.
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    facts: IndexMap<Predicate, Vec<Fact>>,
    rules: IndexMap<Predicate, Vec<Clause>>,
    /// `requirements[p]` holds the rule predicates whose bodies read `p`
    requirements: IndexMap<Predicate, IndexSet<Predicate>>,
    derived: IndexMap<Predicate, Vec<Fact>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Create an empty database with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty database
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            facts: IndexMap::new(),
            rules: IndexMap::new(),
            requirements: IndexMap::new(),
            derived: IndexMap::new(),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Store a ground fact for `predicate`.
    ///
    /// Duplicates are kept unless [`EngineConfig::deduplicate_facts`] is set.
    ///
    /// # Errors
    ///
    /// - [`DatalogError::InvalidArguments`] if `args` does not have `predicate.arity` elements
    /// - [`DatalogError::FactVariable`] if a variable occurs anywhere in `args`
    ///
    /// Nothing is stored when an error is returned.
    pub fn define_fact(&mut self, predicate: Predicate, args: Vec<Term>) -> Result<()> {
        if args.len() != predicate.arity {
            return Err(DatalogError::InvalidArguments {
                expected: predicate.arity,
                found: args.len(),
                predicate,
            });
        }
        if let Some(variable) = args.iter().find_map(Term::first_variable) {
            return Err(DatalogError::FactVariable {
                variable: variable.clone(),
                predicate,
            });
        }

        let table = self.facts.entry(predicate.clone()).or_default();
        if self.config.deduplicate_facts && table.contains(&args) {
            trace!("ignoring duplicate fact for {predicate}");
            return Ok(());
        }
        table.push(args);
        trace!("stored fact #{} for {predicate}", table.len());
        self.invalidate(&predicate);
        Ok(())
    }

    /// Store a fact given as a compound term or constant, e.g. `(parent a b)`.
    ///
    /// # Errors
    ///
    /// [`DatalogError::InvalidLiteral`] if `fact` is a variable, otherwise as
    /// for [`Database::define_fact`].
    pub fn add_fact(&mut self, fact: Term) -> Result<()> {
        match fact {
            Term::Compound { name, args, .. } => {
                let predicate = Predicate::new(name, args.len());
                self.define_fact(predicate, args)
            }
            variable @ Term::Variable { .. } => Err(DatalogError::InvalidLiteral {
                term: variable,
                reason: "a fact must be a compound term or a constant",
            }),
        }
    }

    /// Add a clause `predicate(head) :- body` and evict every cached table it
    /// can affect.
    ///
    /// # Errors
    ///
    /// - [`DatalogError::InvalidArguments`] if `head` does not have `predicate.arity` elements
    /// - [`DatalogError::InvalidLiteral`] if a body term is not a usable literal
    /// - [`DatalogError::UnsafeRule`] if safety checks are enabled and a
    ///   variable is not bound by a positive literal
    ///
    /// Nothing is stored when an error is returned.
    pub fn define_rule(&mut self, predicate: Predicate, head: Vec<Term>, body: &[Term]) -> Result<()> {
        if head.len() != predicate.arity {
            return Err(DatalogError::InvalidArguments {
                expected: predicate.arity,
                found: head.len(),
                predicate,
            });
        }
        let clause = Clause::new(head, body)?;
        match clause.check_safety(&predicate) {
            Err(err) if self.config.check_rule_safety => return Err(err),
            Err(err) => warn!("accepting unchecked rule: {err}"),
            Ok(()) => {}
        }

        for literal in &clause.body {
            for dependency in literal.predicates() {
                if *dependency != predicate {
                    self.requirements
                        .entry(dependency.clone())
                        .or_default()
                        .insert(predicate.clone());
                }
            }
        }
        let clauses = self.rules.entry(predicate.clone()).or_default();
        clauses.push(clause);
        debug!("defined clause #{} for {predicate}", clauses.len());
        self.invalidate(&predicate);
        Ok(())
    }

    /// Add a clause whose head is given as a term, e.g. `(ancestor ?x ?y)`.
    ///
    /// # Errors
    ///
    /// [`DatalogError::InvalidLiteral`] if `head` is a variable, otherwise as
    /// for [`Database::define_rule`].
    pub fn add_rule(&mut self, head: Term, body: &[Term]) -> Result<()> {
        match head {
            Term::Compound { name, args, .. } => {
                let predicate = Predicate::new(name, args.len());
                self.define_rule(predicate, args, body)
            }
            variable @ Term::Variable { .. } => Err(DatalogError::InvalidLiteral {
                term: variable,
                reason: "a rule head must be a compound term or a constant",
            }),
        }
    }

    /// Answer a pattern query against stored and derived facts.
    ///
    /// Returns [`QueryAnswer::True`] as soon as a row matches without any
    /// binding, otherwise the stored-fact bindings followed by the derived-fact
    /// bindings, or [`QueryAnswer::False`] when there are none.
    ///
    /// # Errors
    ///
    /// - [`DatalogError::InvalidLiteral`] if `head` is a variable
    /// - [`DatalogError::UnknownPredicate`] if the predicate has neither facts nor rules
    /// - [`DatalogError::UnboundVariable`] if evaluation reaches an unchecked unsafe rule
    pub fn query(&mut self, head: &Term) -> Result<QueryAnswer> {
        let predicate = head.predicate().ok_or_else(|| DatalogError::InvalidLiteral {
            term: head.clone(),
            reason: "a query must be a compound term or a constant",
        })?;
        if !self.is_defined(&predicate) {
            return Err(DatalogError::UnknownPredicate {
                predicate,
                term: head.clone(),
            });
        }
        debug!("query {head}");

        let seed = Bindings::new();
        let stored = self.facts.get(&predicate).into_iter().flatten();
        let Found::Matches(mut results) = find_all(stored.map(Vec::as_slice), head.args(), &seed)
        else {
            return Ok(QueryAnswer::True);
        };

        if self.rules.contains_key(&predicate) {
            let derived = self.derived_facts(&predicate)?;
            match find_all(derived.iter().map(Vec::as_slice), head.args(), &seed) {
                Found::Exists => return Ok(QueryAnswer::True),
                Found::Matches(found) => results.extend(found),
            }
        }

        Ok(if results.is_empty() {
            QueryAnswer::False
        } else {
            QueryAnswer::Bindings(results)
        })
    }

    /// The materialized table of a rule predicate, computing it if it is not
    /// cached. Empty for predicates without rules.
    ///
    /// # Errors
    ///
    /// [`DatalogError::UnboundVariable`] if evaluation reaches an unchecked
    /// unsafe rule; nothing is cached in that case.
    pub fn derived_facts(&mut self, predicate: &Predicate) -> Result<&[Fact]> {
        if !self.derived.contains_key(predicate) && self.rules.contains_key(predicate) {
            let mut evaluator = Evaluator::new(&self.facts, &self.rules, &self.derived);
            evaluator.materialize(predicate)?;
            let finished = evaluator.into_finished();
            debug!("caching {} materialized predicates", finished.len());
            self.derived.extend(finished);
        }
        Ok(self
            .derived
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Stored facts for `predicate`
    #[must_use]
    pub fn facts(&self, predicate: &Predicate) -> &[Fact] {
        self.facts
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Rule clauses for `predicate`
    #[must_use]
    pub fn clauses(&self, predicate: &Predicate) -> &[Clause] {
        self.rules
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Rule predicates whose bodies read `predicate` directly
    pub fn dependents(&self, predicate: &Predicate) -> impl Iterator<Item = &Predicate> + '_ {
        self.requirements.get(predicate).into_iter().flatten()
    }

    /// Returns true if `predicate` has facts or rules
    #[must_use]
    pub fn is_defined(&self, predicate: &Predicate) -> bool {
        self.facts.contains_key(predicate) || self.rules.contains_key(predicate)
    }

    /// Returns true if `predicate` has a materialized table in the cache
    #[must_use]
    pub fn is_cached(&self, predicate: &Predicate) -> bool {
        self.derived.contains_key(predicate)
    }

    /// Every predicate with facts or rules, in definition order
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> + '_ {
        let mut seen: IndexSet<&Predicate> = self.facts.keys().collect();
        seen.extend(self.rules.keys());
        seen.into_iter()
    }

    /// Evict `predicate` and everything that transitively reads it
    fn invalidate(&mut self, predicate: &Predicate) {
        let mut pending: SmallVec<[&Predicate; 8]> = smallvec![predicate];
        let mut seen: IndexSet<&Predicate> = IndexSet::new();
        seen.insert(predicate);
        let mut evicted = 0usize;

        while let Some(current) = pending.pop() {
            if self.derived.swap_remove(current).is_some() {
                trace!("evicted derived facts of {current}");
                evicted += 1;
            }
            for dependent in self.requirements.get(current).into_iter().flatten() {
                if seen.insert(dependent) {
                    pending.push(dependent);
                }
            }
        }

        if evicted > 0 {
            debug!("change to {predicate} evicted {evicted} cached predicates");
        }
    }
}
