//! Predicate tree and fluent builders.

use rusqlite::types::Value;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Not;
use uuid::Uuid;

/// Filterable field of one entity type.
pub trait QueryField: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every field; column maps must cover all of them.
    const ALL: &'static [Self];

    fn name(self) -> &'static str;
}

/// Literal operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Integer(i64),
    Text(String),
    Bool(bool),
    Uuid(Uuid),
}

impl QueryValue {
    /// SQLite representation; booleans are stored as 0/1.
    pub fn to_sql(&self) -> Value {
        match self {
            Self::Integer(value) => Value::Integer(*value),
            Self::Text(value) => Value::Text(value.clone()),
            Self::Bool(value) => Value::Integer(i64::from(*value)),
            Self::Uuid(value) => Value::Text(value.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for QueryValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    EndsWith,
    Contains,
}

impl CompareOp {
    pub(crate) fn is_like(self) -> bool {
        matches!(self, Self::StartsWith | Self::EndsWith | Self::Contains)
    }
}

/// Boolean filter expression over fields of `F`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<F> {
    Compare {
        field: F,
        op: CompareOp,
        value: QueryValue,
    },
    In {
        field: F,
        values: Vec<QueryValue>,
    },
    IsNull {
        field: F,
        negated: bool,
    },
    And(Box<Predicate<F>>, Box<Predicate<F>>),
    Or(Box<Predicate<F>>, Box<Predicate<F>>),
    Not(Box<Predicate<F>>),
}

impl<F> Predicate<F> {
    pub fn and(self, other: Predicate<F>) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate<F>) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }
}

impl<F> Not for Predicate<F> {
    type Output = Predicate<F>;

    fn not(self) -> Self::Output {
        Predicate::Not(Box::new(self))
    }
}

/// Fluent predicate constructors available on every [`QueryField`].
pub trait FieldExt: QueryField {
    fn equals(self, value: impl Into<QueryValue>) -> Predicate<Self> {
        compare(self, CompareOp::Eq, value)
    }

    fn not_equals(self, value: impl Into<QueryValue>) -> Predicate<Self> {
        compare(self, CompareOp::NotEq, value)
    }

    fn greater_than(self, value: impl Into<QueryValue>) -> Predicate<Self> {
        compare(self, CompareOp::Gt, value)
    }

    fn greater_or_equal(self, value: impl Into<QueryValue>) -> Predicate<Self> {
        compare(self, CompareOp::Gte, value)
    }

    fn less_than(self, value: impl Into<QueryValue>) -> Predicate<Self> {
        compare(self, CompareOp::Lt, value)
    }

    fn less_or_equal(self, value: impl Into<QueryValue>) -> Predicate<Self> {
        compare(self, CompareOp::Lte, value)
    }

    fn starts_with(self, value: impl Into<String>) -> Predicate<Self> {
        compare(self, CompareOp::StartsWith, QueryValue::Text(value.into()))
    }

    fn ends_with(self, value: impl Into<String>) -> Predicate<Self> {
        compare(self, CompareOp::EndsWith, QueryValue::Text(value.into()))
    }

    fn contains(self, value: impl Into<String>) -> Predicate<Self> {
        compare(self, CompareOp::Contains, QueryValue::Text(value.into()))
    }

    fn is_in<I, V>(self, values: I) -> Predicate<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        Predicate::In {
            field: self,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn is_null(self) -> Predicate<Self> {
        Predicate::IsNull {
            field: self,
            negated: false,
        }
    }

    fn is_not_null(self) -> Predicate<Self> {
        Predicate::IsNull {
            field: self,
            negated: true,
        }
    }
}

impl<F: QueryField> FieldExt for F {}

fn compare<F>(field: F, op: CompareOp, value: impl Into<QueryValue>) -> Predicate<F> {
    Predicate::Compare {
        field,
        op,
        value: value.into(),
    }
}

/// Ordered list of clauses, ANDed left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Query<F> {
    clauses: Vec<Predicate<F>>,
}

impl<F> Default for Query<F> {
    fn default() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }
}

impl<F> Query<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a clause.
    pub fn filter(mut self, predicate: Predicate<F>) -> Self {
        self.clauses.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate<F>) {
        self.clauses.push(predicate);
    }

    pub fn clauses(&self) -> &[Predicate<F>] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
