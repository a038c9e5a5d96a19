//! # gdlog
//!
//! An in-memory deductive database for GDL-style rule languages.
//!
//! ## Features
//!
//! - Ground facts and Horn-clause rules over nested terms
//! - Negation as failure, disjunction and `distinct` constraints
//! - Lazy bottom-up materialization of rule predicates, cached per predicate
//!   and evicted along the dependency graph when definitions change
//! - Recursive and mutually recursive rules
//!
//! ## Example
//!
//! ```rust
//! use gdlog::{Database, QueryAnswer, Term};
//!
//! let mut db = Database::new();
//! db.add_fact(Term::compound("parent", vec![Term::constant("a"), Term::constant("b")]))?;
//! db.add_rule(
//!     Term::compound("ancestor", vec![Term::var("?x"), Term::var("?y")]),
//!     &[Term::compound("parent", vec![Term::var("?x"), Term::var("?y")])],
//! )?;
//!
//! let answer = db.query(&Term::compound("ancestor", vec![Term::constant("a"), Term::var("?z")]))?;
//! assert_eq!(answer.values("?z").next(), Some(&Term::constant("b")));
//!
//! let ground = db.query(&Term::compound("ancestor", vec![Term::constant("b"), Term::constant("a")]))?;
//! assert_eq!(ground, QueryAnswer::False);
//! # Ok::<(), gdlog::DatalogError>(())
//! ```

/// Engine configuration.
pub mod config;
/// Deductive database.
pub mod engine;
/// Error types.
pub mod error;
mod eval;
pub mod literal;
/// Terms and predicates.
pub mod term;
pub mod unify;

pub use config::EngineConfig;
pub use engine::{Database, Fact, QueryAnswer};
pub use error::{DatalogError, Result};
pub use literal::{Atom, Clause, Literal};
pub use term::{Predicate, Span, Term};
pub use unify::Bindings;
