//! Rule bodies resolved into a closed set of literal shapes.
//!
//! A body term is classified once, when the rule is defined, so evaluation
//! dispatches on [`Literal`] instead of re-inspecting terms on every pass.

use std::fmt;

use indexmap::IndexSet;

use crate::error::{DatalogError, Result};
use crate::term::{Predicate, Term};

/// A predicate applied to arguments (e.g. `(parent ?x ?y)`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// `(name, arity)` of the referenced table
    pub predicate: Predicate,
    /// Argument patterns, possibly containing variables
    pub args: Vec<Term>,
}

impl Atom {
    /// Build an atom from a compound term.
    ///
    /// # Errors
    ///
    /// Returns [`DatalogError::InvalidLiteral`] if `term` is a variable.
    pub fn from_term(term: &Term) -> Result<Self> {
        let predicate = term.predicate().ok_or_else(|| DatalogError::InvalidLiteral {
            term: term.clone(),
            reason: "a variable cannot stand as a literal",
        })?;
        Ok(Self {
            predicate,
            args: term.args().to_vec(),
        })
    }

    /// Variables occurring in the arguments, depth-first
    pub fn variables(&self) -> impl Iterator<Item = &Term> + '_ {
        self.args.iter().flat_map(Term::variables)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return f.write_str(&self.predicate.name);
        }
        write!(f, "({}", self.predicate.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        f.write_str(")")
    }
}

/// One conjunct of a rule body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// A reference to a fact or rule table
    Plain(Atom),
    /// Negation as failure over a plain literal.
    ///
    /// Holds for a binding when the atom has no match under it. Variables the
    /// binding leaves open are existential: `(not (r ?x ?y))` with `?x` bound
    /// rejects the binding if any `r(x, _)` row exists. A fully unbound
    /// context is a usage error unless the atom is ground, in which case the
    /// negation is simply checked against the table.
    Not(Atom),
    /// Holds when both terms, once grounded, differ
    Distinct(Term, Term),
    /// Disjunction of two or more literals
    Or(Vec<Literal>),
}

impl Literal {
    /// Classify a body term.
    ///
    /// # Errors
    ///
    /// Returns [`DatalogError::InvalidLiteral`] for variables, for negations of
    /// anything but a plain literal, and for `not`, `distinct` or `or` used with
    /// the wrong number of arguments.
    pub fn from_term(term: &Term) -> Result<Self> {
        let invalid = |reason| DatalogError::InvalidLiteral {
            term: term.clone(),
            reason,
        };

        if term.is_not() {
            let inner = &term.args()[0];
            if inner.is_not() || inner.is_distinct() || inner.is_or() {
                return Err(invalid("only a plain literal can be negated"));
            }
            return Ok(Self::Not(Atom::from_term(inner)?));
        }
        if term.is_distinct() {
            let [a, b] = term.args() else {
                return Err(invalid("distinct takes two arguments"));
            };
            return Ok(Self::Distinct(a.clone(), b.clone()));
        }
        if term.is_or() {
            let alternatives = term
                .args()
                .iter()
                .map(Self::from_term)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Or(alternatives));
        }

        match term.name() {
            "not" if !term.is_variable() => Err(invalid("not takes exactly one argument")),
            "distinct" if !term.is_variable() => Err(invalid("distinct takes two arguments")),
            "or" if !term.is_variable() => Err(invalid("or takes at least two arguments")),
            _ => Ok(Self::Plain(Atom::from_term(term)?)),
        }
    }

    /// Every table this literal reads, looking through `not` and `or`
    #[must_use]
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut found = Vec::new();
        self.collect_predicates(&mut found);
        found
    }

    fn collect_predicates<'a>(&'a self, found: &mut Vec<&'a Predicate>) {
        match self {
            Self::Plain(atom) | Self::Not(atom) => found.push(&atom.predicate),
            Self::Distinct(..) => {}
            Self::Or(alternatives) => {
                for alternative in alternatives {
                    alternative.collect_predicates(found);
                }
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(atom) => write!(f, "{atom}"),
            Self::Not(atom) => write!(f, "(not {atom})"),
            Self::Distinct(a, b) => write!(f, "(distinct {a} {b})"),
            Self::Or(alternatives) => {
                f.write_str("(or")?;
                for alternative in alternatives {
                    write!(f, " {alternative}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One definition of a rule predicate: `head_args :- body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Head argument templates
    pub head: Vec<Term>,
    /// Conjunction evaluated left to right
    pub body: Vec<Literal>,
}

impl Clause {
    /// Resolve raw body terms into literals.
    ///
    /// # Errors
    ///
    /// Propagates [`Literal::from_term`] failures.
    pub fn new(head: Vec<Term>, body: &[Term]) -> Result<Self> {
        let body = body.iter().map(Literal::from_term).collect::<Result<_>>()?;
        Ok(Self { head, body })
    }

    /// Check that every head variable and every variable of a `distinct` is
    /// bound by a positive literal to its left, and that a negated atom with
    /// variables shares at least one of them with those literals. A variable
    /// bound inside `or` counts only if every alternative binds it.
    ///
    /// # Errors
    ///
    /// Returns [`DatalogError::UnsafeRule`] naming the first unbound variable.
    pub fn check_safety(&self, predicate: &Predicate) -> Result<()> {
        let mut bound = IndexSet::new();
        for literal in &self.body {
            bind_literal(literal, &mut bound, predicate)?;
        }
        require_bound(self.head.iter().flat_map(Term::variables), &bound, predicate)
    }
}

fn bind_literal<'a>(
    literal: &'a Literal,
    bound: &mut IndexSet<&'a str>,
    predicate: &Predicate,
) -> Result<()> {
    match literal {
        Literal::Plain(atom) => {
            bound.extend(atom.variables().map(Term::name));
            Ok(())
        }
        Literal::Not(atom) => {
            let mut variables = atom.variables();
            let Some(first) = variables.next() else {
                return Ok(());
            };
            if bound.contains(first.name()) || variables.any(|v| bound.contains(v.name())) {
                Ok(())
            } else {
                Err(DatalogError::UnsafeRule {
                    predicate: predicate.clone(),
                    variable: first.clone(),
                })
            }
        }
        Literal::Distinct(a, b) => {
            require_bound(a.variables().chain(b.variables()), bound, predicate)
        }
        Literal::Or(alternatives) => {
            let mut common: Option<IndexSet<&'a str>> = None;
            for alternative in alternatives {
                let mut local = bound.clone();
                bind_literal(alternative, &mut local, predicate)?;
                common = Some(match common {
                    None => local,
                    Some(previous) => previous.intersection(&local).copied().collect(),
                });
            }
            if let Some(common) = common {
                *bound = common;
            }
            Ok(())
        }
    }
}

fn require_bound<'a>(
    mut variables: impl Iterator<Item = &'a Term>,
    bound: &IndexSet<&str>,
    predicate: &Predicate,
) -> Result<()> {
    match variables.find(|variable| !bound.contains(variable.name())) {
        Some(variable) => Err(DatalogError::UnsafeRule {
            predicate: predicate.clone(),
            variable: variable.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &str, args: Vec<Term>) -> Term {
        Term::compound(name, args)
    }

    #[test]
    fn test_literal_shapes_resolved_once() {
        let plain = atom("parent", vec![Term::var("?x"), Term::var("?y")]);
        assert!(matches!(Literal::from_term(&plain), Ok(Literal::Plain(_))));

        let negated = atom("not", vec![plain.clone()]);
        match Literal::from_term(&negated) {
            Ok(Literal::Not(inner)) => assert_eq!(inner.predicate, Predicate::new("parent", 2)),
            other => panic!("expected a negation, got {other:?}"),
        }

        let distinct = atom("distinct", vec![Term::var("?x"), Term::constant("a")]);
        assert!(matches!(
            Literal::from_term(&distinct),
            Ok(Literal::Distinct(..))
        ));

        let or = atom(
            "or",
            vec![
                atom("red", vec![Term::var("?x")]),
                atom("blue", vec![Term::var("?x")]),
                atom("green", vec![Term::var("?x")]),
            ],
        );
        match Literal::from_term(&or) {
            Ok(Literal::Or(alternatives)) => assert_eq!(alternatives.len(), 3),
            other => panic!("expected a disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_literals_rejected() {
        let var = Term::var("?x");
        assert!(matches!(
            Literal::from_term(&var),
            Err(DatalogError::InvalidLiteral { .. })
        ));

        let double_negation = atom("not", vec![atom("not", vec![atom("p", vec![])])]);
        assert!(matches!(
            Literal::from_term(&double_negation),
            Err(DatalogError::InvalidLiteral { .. })
        ));

        let negated_variable = atom("not", vec![Term::var("?x")]);
        assert!(matches!(
            Literal::from_term(&negated_variable),
            Err(DatalogError::InvalidLiteral { .. })
        ));

        let short_distinct = atom("distinct", vec![Term::var("?x")]);
        assert!(matches!(
            Literal::from_term(&short_distinct),
            Err(DatalogError::InvalidLiteral { .. })
        ));

        let lonely_or = atom("or", vec![atom("p", vec![])]);
        assert!(matches!(
            Literal::from_term(&lonely_or),
            Err(DatalogError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_predicates_seen_through_not_and_or() {
        let body = atom(
            "or",
            vec![
                atom("not", vec![atom("blocked", vec![Term::var("?x")])]),
                atom("open", vec![Term::var("?x")]),
                atom("distinct", vec![Term::var("?x"), Term::constant("a")]),
            ],
        );
        let literal = Literal::from_term(&body).unwrap();
        let names: Vec<&str> = literal
            .predicates()
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["blocked", "open"]);
    }

    #[test]
    fn test_safe_clause_accepted() {
        let clause = Clause::new(
            vec![Term::var("?x")],
            &[
                atom("node", vec![Term::var("?x")]),
                atom("not", vec![atom("blocked", vec![Term::var("?x")])]),
                atom("distinct", vec![Term::var("?x"), Term::constant("a")]),
            ],
        )
        .unwrap();
        assert!(clause.check_safety(&Predicate::new("free", 1)).is_ok());
    }

    #[test]
    fn test_unbound_head_variable_rejected() {
        let clause = Clause::new(
            vec![Term::var("?x"), Term::var("?y")],
            &[atom("person", vec![Term::var("?x")])],
        )
        .unwrap();
        match clause.check_safety(&Predicate::new("result", 2)) {
            Err(DatalogError::UnsafeRule { variable, .. }) => assert_eq!(variable, Term::var("?y")),
            other => panic!("expected an unsafe rule, got {other:?}"),
        }
    }

    #[test]
    fn test_negation_before_binding_rejected() {
        let clause = Clause::new(
            vec![Term::var("?x")],
            &[
                atom("not", vec![atom("blocked", vec![Term::var("?x")])]),
                atom("node", vec![Term::var("?x")]),
            ],
        )
        .unwrap();
        assert!(matches!(
            clause.check_safety(&Predicate::new("free", 1)),
            Err(DatalogError::UnsafeRule { .. })
        ));
    }

    #[test]
    fn test_or_binds_only_common_variables() {
        // ?y is bound by only one alternative
        let clause = Clause::new(
            vec![Term::var("?x"), Term::var("?y")],
            &[atom(
                "or",
                vec![
                    atom("red", vec![Term::var("?x")]),
                    atom("pair", vec![Term::var("?x"), Term::var("?y")]),
                ],
            )],
        )
        .unwrap();
        match clause.check_safety(&Predicate::new("q", 2)) {
            Err(DatalogError::UnsafeRule { variable, .. }) => assert_eq!(variable, Term::var("?y")),
            other => panic!("expected an unsafe rule, got {other:?}"),
        }
    }

    #[test]
    fn test_negation_may_leave_variables_existential() {
        // ?y occurs only under the negation
        let clause = Clause::new(
            vec![Term::var("?x")],
            &[
                atom("q", vec![Term::var("?x")]),
                atom("not", vec![atom("r", vec![Term::var("?x"), Term::var("?y")])]),
            ],
        )
        .unwrap();
        assert!(clause.check_safety(&Predicate::new("p", 1)).is_ok());

        // Nothing in the negated atom is bound yet
        let clause = Clause::new(
            vec![Term::var("?x")],
            &[
                atom("q", vec![Term::var("?x")]),
                atom("not", vec![atom("r", vec![Term::var("?y"), Term::var("?z")])]),
            ],
        )
        .unwrap();
        match clause.check_safety(&Predicate::new("p", 1)) {
            Err(DatalogError::UnsafeRule { variable, .. }) => assert_eq!(variable, Term::var("?y")),
            other => panic!("expected an unsafe rule, got {other:?}"),
        }
    }

    #[test]
    fn test_ground_negation_is_safe() {
        let clause = Clause::new(
            vec![Term::constant("yes")],
            &[atom("not", vec![atom("terminal", vec![])])],
        )
        .unwrap();
        assert!(clause.check_safety(&Predicate::new("running", 1)).is_ok());
    }
}
