use thiserror::Error;

use crate::term::{Predicate, Span, Term};

/// Errors raised by fact/rule definition and by queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatalogError {
    /// The query names a predicate with neither facts nor rules
    #[error("no facts or rules are defined for {predicate}")]
    UnknownPredicate {
        /// Queried predicate
        predicate: Predicate,
        /// The query head, for diagnostics
        term: Term,
    },
    /// A fact argument tree contains a variable
    #[error("facts must be ground, but {predicate} contains variable {variable}")]
    FactVariable {
        /// Predicate the fact was defined for
        predicate: Predicate,
        /// The offending variable node
        variable: Term,
    },
    /// An argument list does not fit the predicate's arity
    #[error("{predicate} expects {expected} arguments, found {found}")]
    InvalidArguments {
        /// Predicate being defined
        predicate: Predicate,
        /// Declared arity
        expected: usize,
        /// Length of the argument list that was supplied
        found: usize,
    },
    /// A term that cannot stand as a body literal or query head
    #[error("{term} is not a valid literal: {reason}")]
    InvalidLiteral {
        /// The rejected term
        term: Term,
        /// What is wrong with it
        reason: &'static str,
    },
    /// A rule uses a variable that no earlier positive literal binds
    #[error("unsafe rule for {predicate}: variable {variable} is not bound by a positive literal")]
    UnsafeRule {
        /// Head predicate of the rejected clause
        predicate: Predicate,
        /// The unbound variable
        variable: Term,
    },
    /// Evaluation reached a variable that the current binding leaves open
    #[error("variable {variable} is unbound while evaluating {literal}")]
    UnboundVariable {
        /// The unbound variable
        variable: Term,
        /// Rendered literal being evaluated
        literal: String,
    },
}

impl DatalogError {
    /// Source position of the offending term, if one was recorded
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UnknownPredicate { term, .. } | Self::InvalidLiteral { term, .. } => term.span(),
            Self::FactVariable { variable, .. }
            | Self::UnsafeRule { variable, .. }
            | Self::UnboundVariable { variable, .. } => variable.span(),
            Self::InvalidArguments { .. } => None,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_points_at_offending_variable() {
        let err = DatalogError::FactVariable {
            predicate: Predicate::new("cell", 3),
            variable: Term::var("?x").with_span(Span::new(4, 9)),
        };
        assert_eq!(err.span(), Some(Span::new(4, 9)));
        assert_eq!(
            err.to_string(),
            "facts must be ground, but cell/3 contains variable ?x"
        );
    }

    #[test]
    fn test_arity_errors_have_no_span() {
        let err = DatalogError::InvalidArguments {
            predicate: Predicate::new("p", 2),
            expected: 2,
            found: 3,
        };
        assert_eq!(err.span(), None);
        assert_eq!(err.to_string(), "p/2 expects 2 arguments, found 3");
    }
}
