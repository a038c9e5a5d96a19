//! Bottom-up evaluation of rule predicates to a fixpoint.
//!
//! An [`Evaluator`] is created per top-level materialization and owns every
//! piece of in-flight state: the stack of predicates being computed, their
//! partial accumulators, and the results that are ready to be cached. The
//! [`Database`](crate::Database) only sees the finished tables once the
//! outermost predicate converges.
//!
//! Mutual recursion is handled like cycle detection in a depth-first graph
//! walk. Each frame tracks the shallowest stack depth whose partial
//! accumulator it (or anything it called) has read. A predicate that read an
//! ancestor's partial table cannot be cached on its own: it stays in the
//! arena as provisional and is re-evaluated whenever it is referenced, until
//! the ancestor converges and commits the whole group.

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use crate::engine::Fact;
use crate::error::{DatalogError, Result};
use crate::literal::{Clause, Literal};
use crate::term::{Predicate, Term};
use crate::unify::{find_all, substitute, unbound_variable, Bindings, Found};

#[derive(Debug)]
struct Frame {
    predicate: Predicate,
    /// Shallowest stack depth this frame depends on
    lowlink: usize,
}

/// Evaluation stack for one materialization request
#[derive(Debug)]
pub(crate) struct Evaluator<'db> {
    facts: &'db IndexMap<Predicate, Vec<Fact>>,
    rules: &'db IndexMap<Predicate, Vec<Clause>>,
    derived: &'db IndexMap<Predicate, Vec<Fact>>,
    /// Predicates currently being computed; the index is the stack depth
    frames: Vec<Frame>,
    /// Accumulators of predicates that are active or provisional
    partial: IndexMap<Predicate, Vec<Fact>>,
    /// Converged against partial ancestors, awaiting the ancestor's commit
    provisional: IndexSet<Predicate>,
    /// Committed fixpoints, ready for the derived-fact cache
    finished: IndexMap<Predicate, Vec<Fact>>,
    /// Total facts added to any accumulator so far
    derivations: usize,
}

impl<'db> Evaluator<'db> {
    pub(crate) fn new(
        facts: &'db IndexMap<Predicate, Vec<Fact>>,
        rules: &'db IndexMap<Predicate, Vec<Clause>>,
        derived: &'db IndexMap<Predicate, Vec<Fact>>,
    ) -> Self {
        Self {
            facts,
            rules,
            derived,
            frames: Vec::new(),
            partial: IndexMap::new(),
            provisional: IndexSet::new(),
            finished: IndexMap::new(),
            derivations: 0,
        }
    }

    /// Tables that reached their fixpoint during this evaluation
    pub(crate) fn into_finished(self) -> IndexMap<Predicate, Vec<Fact>> {
        self.finished
    }

    /// Compute `predicate` to a fixpoint. Returns the frame's low-link: the
    /// shallowest stack depth whose in-progress table was consulted.
    pub(crate) fn materialize(&mut self, predicate: &Predicate) -> Result<usize> {
        let rules = self.rules;
        let Some(clauses) = rules.get(predicate) else {
            return Ok(usize::MAX);
        };
        if self.is_settled(predicate) {
            return Ok(usize::MAX);
        }

        let depth = self.frames.len();
        self.frames.push(Frame {
            predicate: predicate.clone(),
            lowlink: depth,
        });
        let mark = self.provisional.len();
        self.partial.entry(predicate.clone()).or_default();
        debug!("materializing {predicate} at depth {depth}");

        let mut passes = 0usize;
        loop {
            passes += 1;
            let before = self.derivations;
            for clause in clauses {
                for bindings in self.eval_body(&clause.body)? {
                    self.derive(predicate, clause, &bindings)?;
                }
            }
            // Stable only when no accumulator grew, including those of
            // provisional predicates re-evaluated during the pass
            if self.derivations == before {
                break;
            }
        }

        let lowlink = self.frames.pop().map_or(depth, |frame| frame.lowlink);
        if lowlink < depth {
            trace!("{predicate} depends on an unfinished ancestor, deferring commit");
            self.provisional.insert(predicate.clone());
            return Ok(lowlink);
        }

        let mut group: Vec<Predicate> = self.provisional.drain(mark..).collect();
        self.provisional.shift_remove(predicate);
        group.push(predicate.clone());
        for member in group {
            let facts = self.partial.swap_remove(&member).unwrap_or_default();
            debug!(
                "{member} reached its fixpoint with {} facts after {passes} passes",
                facts.len()
            );
            self.finished.insert(member, facts);
        }
        Ok(lowlink)
    }

    fn is_settled(&self, predicate: &Predicate) -> bool {
        self.derived.contains_key(predicate) || self.finished.contains_key(predicate)
    }

    /// Ground the clause head under `bindings` and add it unless already known
    fn derive(&mut self, predicate: &Predicate, clause: &Clause, bindings: &Bindings) -> Result<()> {
        if let Some(variable) = unbound_variable(&clause.head, bindings) {
            return Err(DatalogError::UnboundVariable {
                variable: variable.clone(),
                literal: format!("the head of {predicate}"),
            });
        }
        let fact: Fact = clause
            .head
            .iter()
            .map(|template| substitute(template, bindings))
            .collect();
        let accumulated = self.partial.entry(predicate.clone()).or_default();
        if !accumulated.contains(&fact) {
            trace!("derived {predicate} #{}", accumulated.len());
            accumulated.push(fact);
            self.derivations += 1;
        }
        Ok(())
    }

    /// Make `predicate`'s rows readable, computing it if needed
    fn prepare(&mut self, predicate: &Predicate) -> Result<()> {
        if !self.rules.contains_key(predicate) || self.is_settled(predicate) {
            return Ok(());
        }
        let lowlink = match self
            .frames
            .iter()
            .position(|frame| &frame.predicate == predicate)
        {
            // Already on the stack: read its partial table instead of recursing
            Some(depth) => depth,
            None => self.materialize(predicate)?,
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.lowlink = frame.lowlink.min(lowlink);
        }
        Ok(())
    }

    /// Stored facts followed by the derived, finished or in-progress table
    fn rows(&self, predicate: &Predicate) -> impl Iterator<Item = &[Term]> + '_ {
        let stored = self.facts.get(predicate);
        let derived = self
            .derived
            .get(predicate)
            .or_else(|| self.finished.get(predicate))
            .or_else(|| self.partial.get(predicate));
        stored
            .into_iter()
            .chain(derived)
            .flatten()
            .map(Vec::as_slice)
    }

    /// Conjunction: each literal transforms the previous binding list
    fn eval_body(&mut self, body: &[Literal]) -> Result<Vec<Bindings>> {
        let mut solutions = vec![Bindings::new()];
        for literal in body {
            solutions = self.eval_literal(literal, &solutions)?;
            if solutions.is_empty() {
                break;
            }
        }
        Ok(solutions)
    }

    fn eval_literal(&mut self, literal: &Literal, incoming: &[Bindings]) -> Result<Vec<Bindings>> {
        match literal {
            Literal::Plain(atom) => {
                self.prepare(&atom.predicate)?;
                let mut out = Vec::new();
                for bindings in incoming {
                    match find_all(self.rows(&atom.predicate), &atom.args, bindings) {
                        Found::Exists => out.push(bindings.clone()),
                        Found::Matches(found) => out.extend(found),
                    }
                }
                Ok(out)
            }
            Literal::Not(atom) => {
                self.prepare(&atom.predicate)?;
                let mut out = Vec::new();
                for bindings in incoming {
                    // Variables left unbound under a non-empty binding are
                    // existential; only a fully unbound context is an error
                    if bindings.is_empty() {
                        if let Some(variable) = atom.variables().next() {
                            return Err(DatalogError::UnboundVariable {
                                variable: variable.clone(),
                                literal: literal.to_string(),
                            });
                        }
                    }
                    if find_all(self.rows(&atom.predicate), &atom.args, bindings).is_empty() {
                        out.push(bindings.clone());
                    }
                }
                Ok(out)
            }
            Literal::Distinct(a, b) => {
                let mut out = Vec::new();
                for bindings in incoming {
                    let open = unbound_variable(std::slice::from_ref(a), bindings)
                        .or_else(|| unbound_variable(std::slice::from_ref(b), bindings));
                    if let Some(variable) = open {
                        return Err(DatalogError::UnboundVariable {
                            variable: variable.clone(),
                            literal: literal.to_string(),
                        });
                    }
                    if substitute(a, bindings) != substitute(b, bindings) {
                        out.push(bindings.clone());
                    }
                }
                Ok(out)
            }
            Literal::Or(alternatives) => {
                let mut out: Vec<Bindings> = Vec::new();
                for (index, alternative) in alternatives.iter().enumerate() {
                    let found = self.eval_literal(alternative, incoming)?;
                    if index == 0 {
                        out = found;
                        continue;
                    }
                    for bindings in found {
                        if !out.contains(&bindings) {
                            out.push(bindings);
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}
