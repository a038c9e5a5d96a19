//! Matching query patterns against ground rows.

use indexmap::IndexMap;

use crate::term::Term;

/// Variable name to ground term, in the order the variables were first bound.
///
/// Equality is order-insensitive, which is what binding-set deduplication needs.
pub type Bindings = IndexMap<String, Term>;

/// Outcome of matching one pattern list against one stored row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// The row does not match
    Fail,
    /// The row matches and the resulting binding is empty: a plain yes
    Trivial,
    /// The row matches under these bindings (seed bindings included)
    Bound(Bindings),
}

/// Outcome of matching a pattern list against a whole table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    /// Some row matched without needing any binding
    Exists,
    /// One binding set per matching row, possibly none
    Matches(Vec<Bindings>),
}

impl Found {
    /// Returns true when nothing matched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Matches(found) if found.is_empty())
    }
}

/// Match `query` against a ground `stored` row, extending `seed`.
///
/// A variable already bound must equal the stored value; an unbound one is
/// bound to a copy of it. Compound patterns must agree on name and arity and
/// are matched child by child with the same binding map, so a variable that
/// repeats anywhere in the tree binds consistently.
#[must_use]
pub fn match_args(query: &[Term], stored: &[Term], seed: &Bindings) -> Match {
    let mut bindings = seed.clone();
    if query.len() != stored.len() || !unify_into(query, stored, &mut bindings) {
        return Match::Fail;
    }
    if bindings.is_empty() {
        Match::Trivial
    } else {
        Match::Bound(bindings)
    }
}

fn unify_into(query: &[Term], stored: &[Term], bindings: &mut Bindings) -> bool {
    query.iter().zip(stored).all(|(pattern, value)| match pattern {
        Term::Variable { name, .. } => match bindings.get(name) {
            Some(bound) => bound == value,
            None => {
                bindings.insert(name.clone(), value.clone());
                true
            }
        },
        Term::Compound { name, args, .. } => match value {
            Term::Compound {
                name: value_name,
                args: value_args,
                ..
            } => {
                name == value_name
                    && args.len() == value_args.len()
                    && unify_into(args, value_args, bindings)
            }
            Term::Variable { .. } => false,
        },
    })
}

/// Match `query` against every row of a table.
///
/// Stops at the first row that matches trivially; otherwise collects one
/// binding set per matching row.
pub fn find_all<'a, I>(rows: I, query: &[Term], seed: &Bindings) -> Found
where
    I: IntoIterator<Item = &'a [Term]>,
{
    let mut found = Vec::new();
    for row in rows {
        match match_args(query, row, seed) {
            Match::Fail => {}
            Match::Trivial => return Found::Exists,
            Match::Bound(bindings) => found.push(bindings),
        }
    }
    Found::Matches(found)
}

/// Build a new term from `template`, replacing bound variables by their values.
///
/// Unbound variables are copied through unchanged; the template is never
/// modified.
#[must_use]
pub fn substitute(template: &Term, bindings: &Bindings) -> Term {
    match template {
        Term::Variable { name, .. } => bindings
            .get(name)
            .cloned()
            .unwrap_or_else(|| template.clone()),
        Term::Compound { name, args, span } => Term::Compound {
            name: name.clone(),
            args: args.iter().map(|arg| substitute(arg, bindings)).collect(),
            span: *span,
        },
    }
}

/// First variable in `templates` that `bindings` leaves open
#[must_use]
pub fn unbound_variable<'a>(templates: &'a [Term], bindings: &Bindings) -> Option<&'a Term> {
    templates
        .iter()
        .flat_map(Term::variables)
        .find(|variable| !bindings.contains_key(variable.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    fn v(name: &str) -> Term {
        Term::var(name)
    }

    #[test]
    fn test_ground_match_is_trivial() {
        let result = match_args(&[c("a"), c("b")], &[c("a"), c("b")], &Bindings::new());
        assert_eq!(result, Match::Trivial);

        let result = match_args(&[c("a"), c("b")], &[c("a"), c("c")], &Bindings::new());
        assert_eq!(result, Match::Fail);
    }

    #[test]
    fn test_seeded_ground_match_keeps_seed() {
        let mut seed = Bindings::new();
        seed.insert("?x".to_string(), c("a"));

        // A ground pattern under a non-empty seed is not trivial
        let result = match_args(&[c("b")], &[c("b")], &seed);
        assert_eq!(result, Match::Bound(seed.clone()));
    }

    #[test]
    fn test_repeated_variable_must_agree() {
        let query = [v("?x"), v("?x")];
        assert_eq!(
            match_args(&query, &[c("a"), c("b")], &Bindings::new()),
            Match::Fail
        );

        let mut expected = Bindings::new();
        expected.insert("?x".to_string(), c("c"));
        assert_eq!(
            match_args(&query, &[c("c"), c("c")], &Bindings::new()),
            Match::Bound(expected)
        );
    }

    #[test]
    fn test_nested_bindings_are_shared() {
        // (f ?x (g ?x)) against (f a (g b)) must fail: ?x is bound to a at
        // the top level and must stay consistent inside g
        let query = [v("?x"), Term::compound("g", vec![v("?x")])];
        let stored = [c("a"), Term::compound("g", vec![c("b")])];
        assert_eq!(match_args(&query, &stored, &Bindings::new()), Match::Fail);

        // A variable first bound inside a nested term is visible afterwards
        let query = [Term::compound("g", vec![v("?y")]), v("?y")];
        let stored = [Term::compound("g", vec![c("b")]), c("b")];
        let mut expected = Bindings::new();
        expected.insert("?y".to_string(), c("b"));
        assert_eq!(
            match_args(&query, &stored, &Bindings::new()),
            Match::Bound(expected)
        );
    }

    #[test]
    fn test_compound_functor_and_arity_must_agree() {
        let query = [Term::compound("g", vec![v("?y")])];
        assert_eq!(
            match_args(&query, &[Term::compound("h", vec![c("b")])], &Bindings::new()),
            Match::Fail
        );
        assert_eq!(
            match_args(
                &query,
                &[Term::compound("g", vec![c("b"), c("c")])],
                &Bindings::new()
            ),
            Match::Fail
        );
        assert_eq!(match_args(&query, &[c("g")], &Bindings::new()), Match::Fail);
    }

    #[test]
    fn test_find_all_short_circuits_on_trivial_match() {
        let rows = vec![vec![c("a")], vec![c("b")], vec![c("b")]];
        let found = find_all(rows.iter().map(Vec::as_slice), &[c("b")], &Bindings::new());
        assert_eq!(found, Found::Exists);
    }

    #[test]
    fn test_find_all_collects_every_binding() {
        let rows = vec![
            vec![c("a"), c("b")],
            vec![c("a"), c("c")],
            vec![c("d"), c("e")],
        ];
        let found = find_all(
            rows.iter().map(Vec::as_slice),
            &[c("a"), v("?y")],
            &Bindings::new(),
        );
        let Found::Matches(found) = found else {
            panic!("expected bindings for a variable query");
        };
        let values: Vec<&Term> = found.iter().map(|b| &b["?y"]).collect();
        assert_eq!(values, vec![&c("b"), &c("c")]);

        let none = find_all(
            rows.iter().map(Vec::as_slice),
            &[c("z"), v("?y")],
            &Bindings::new(),
        );
        assert!(none.is_empty());
    }

    #[test]
    fn test_substitute_leaves_template_untouched() {
        let template = Term::compound("f", vec![v("?x"), Term::compound("g", vec![v("?y")])]);
        let mut bindings = Bindings::new();
        bindings.insert("?x".to_string(), c("a"));

        let partial = substitute(&template, &bindings);
        assert_eq!(
            partial,
            Term::compound("f", vec![c("a"), Term::compound("g", vec![v("?y")])])
        );
        assert_eq!(
            template,
            Term::compound("f", vec![v("?x"), Term::compound("g", vec![v("?y")])])
        );
        assert_eq!(
            unbound_variable(std::slice::from_ref(&template), &bindings),
            Some(&v("?y"))
        );

        bindings.insert("?y".to_string(), c("b"));
        assert!(substitute(&template, &bindings).is_ground());
        assert_eq!(unbound_variable(&[template], &bindings), None);
    }
}
