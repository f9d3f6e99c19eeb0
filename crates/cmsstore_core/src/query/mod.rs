//! Typed entity filters and their translation to parameterized SQL.
//!
//! # Responsibility
//! - Let callers express filters over entity fields without writing SQL.
//! - Resolve every field through an explicit per-entity column map.
//! - Render predicates as one WHERE clause with positional parameters.
//!
//! # Invariants
//! - Values are always bound, never spliced into SQL text.
//! - Clauses of a [`Query`] are ANDed in the order they were added.
//! - LIKE patterns escape `%`, `_` and `\` before binding.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod column_map;
pub mod predicate;
pub mod translator;

pub use column_map::ColumnMap;
pub use predicate::{CompareOp, FieldExt, Predicate, Query, QueryField, QueryValue};
pub use translator::{escape_like, QueryTranslator};

/// Filter construction or translation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Field has no backing column in the entity's column map.
    UnmappedField {
        entity: &'static str,
        field: &'static str,
    },
    /// Predicate shape cannot be rendered (e.g. LIKE on a non-text value).
    InvalidPredicate(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmappedField { entity, field } => {
                write!(f, "field `{field}` of `{entity}` has no mapped column")
            }
            Self::InvalidPredicate(message) => write!(f, "invalid predicate: {message}"),
        }
    }
}

impl Error for QueryError {}
