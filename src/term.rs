use std::fmt;
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Source position of a token, carried through so callers can point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
}

impl Span {
    /// Create a span at `line:column`
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The `(name, arity)` identity of a fact table or rule table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Predicate {
    /// Functor name (e.g. `"parent"`)
    pub name: String,
    /// Number of arguments
    pub arity: usize,
}

impl Predicate {
    /// Create a predicate from a name and an arity
    #[must_use]
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// A node of the logic term language.
///
/// Constants are compound terms with no arguments. Equality and hashing are
/// structural and ignore spans, so a term parsed twice from different places
/// compares equal to itself.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Term {
    /// A logic variable such as `?x`
    Variable {
        /// Variable name as written, including any sigil
        name: String,
        /// Where the variable token appeared, if known
        span: Option<Span>,
    },
    /// A functor applied to zero or more arguments
    Compound {
        /// Functor name
        name: String,
        /// Ordered arguments; their count is the arity
        args: Vec<Term>,
        /// Where the functor token appeared, if known
        span: Option<Span>,
    },
}

impl Term {
    /// Create a variable term
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable {
            name: name.into(),
            span: None,
        }
    }

    /// Create a constant (a zero-arity compound)
    #[must_use]
    pub fn constant(name: impl Into<String>) -> Self {
        Self::compound(name, Vec::new())
    }

    /// Create a compound term
    #[must_use]
    pub fn compound(name: impl Into<String>, args: Vec<Term>) -> Self {
        Self::Compound {
            name: name.into(),
            args,
            span: None,
        }
    }

    /// Attach a source position
    #[must_use]
    pub fn with_span(mut self, at: Span) -> Self {
        match &mut self {
            Self::Variable { span, .. } | Self::Compound { span, .. } => *span = Some(at),
        }
        self
    }

    /// Source position, if the term came from a parser that tracks them
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Variable { span, .. } | Self::Compound { span, .. } => *span,
        }
    }

    /// The variable name, or the functor name (a constant's value when arity is 0)
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Variable { name, .. } | Self::Compound { name, .. } => name,
        }
    }

    /// Child terms; empty for variables and constants
    #[must_use]
    pub fn args(&self) -> &[Term] {
        match self {
            Self::Variable { .. } => &[],
            Self::Compound { args, .. } => args,
        }
    }

    /// Number of children
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args().len()
    }

    /// `(name, arity)` of a compound term, `None` for a variable
    #[must_use]
    pub fn predicate(&self) -> Option<Predicate> {
        match self {
            Self::Variable { .. } => None,
            Self::Compound { name, args, .. } => Some(Predicate::new(name.clone(), args.len())),
        }
    }

    /// Returns true for a variable node
    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }

    /// Returns true if no variable occurs anywhere in the tree
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.first_variable().is_none()
    }

    /// The first variable found in a depth-first, left-to-right walk
    #[must_use]
    pub fn first_variable(&self) -> Option<&Term> {
        match self {
            Self::Variable { .. } => Some(self),
            Self::Compound { args, .. } => args.iter().find_map(Term::first_variable),
        }
    }

    /// Every variable occurrence, in depth-first order
    pub fn variables(&self) -> impl Iterator<Item = &Term> + '_ {
        let mut pending = vec![self];
        std::iter::from_fn(move || {
            while let Some(term) = pending.pop() {
                match term {
                    Self::Variable { .. } => return Some(term),
                    Self::Compound { args, .. } => pending.extend(args.iter().rev()),
                }
            }
            None
        })
    }

    /// `(not L)`
    #[must_use]
    pub fn is_not(&self) -> bool {
        self.is_keyword("not", 1)
    }

    /// `(distinct A B)`
    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.is_keyword("distinct", 2)
    }

    /// `(or L1 L2 ...)` with at least two alternatives
    #[must_use]
    pub fn is_or(&self) -> bool {
        matches!(self, Self::Compound { name, args, .. } if name == "or" && args.len() >= 2)
    }

    fn is_keyword(&self, keyword: &str, arity: usize) -> bool {
        matches!(self, Self::Compound { name, args, .. } if name == keyword && args.len() == arity)
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Variable { name: a, .. }, Self::Variable { name: b, .. }) => a == b,
            (
                Self::Compound {
                    name: a, args: xs, ..
                },
                Self::Compound {
                    name: b, args: ys, ..
                },
            ) => a == b && xs == ys,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Variable { name, .. } => {
                0u8.hash(state);
                name.hash(state);
            }
            Self::Compound { name, args, .. } => {
                1u8.hash(state);
                name.hash(state);
                args.hash(state);
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable { name, .. } => f.write_str(name),
            Self::Compound { name, args, .. } if args.is_empty() => f.write_str(name),
            Self::Compound { name, args, .. } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
