//! The seam between a [`SessionTable`](crate::SessionTable) and a database driver.
//!
//! A [`QueryExecutor`] runs one parameterized statement at a time. The table
//! never inspects driver errors beyond the [`Error`] variant an executor maps
//! them to, so any database can be plugged in by implementing the trait with
//! [`Dialect::Generic`].

#[cfg(feature = "postgres-store")]
pub mod postgres;

#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use std::future::Future;

use crate::schema::Dialect;
use crate::store::Error;

/// A positional statement parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Int(i64),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

/// A single column value of a result row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    /// Reads the value as an integer, parsing text if needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Text(text) => text.trim().parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An ordered, column-keyed result row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column, returning the row for chaining.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Looks a column up by name, ignoring ASCII case.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<C: Into<String>> FromIterator<(C, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (C, Value)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value))
                .collect(),
        }
    }
}

/// Sorts a driver error into the connection/query split of [`Error`].
#[cfg(any(feature = "postgres-store", feature = "sqlite-store"))]
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Error::connection(err),
        sqlx::Error::Configuration(_) => Error::Configuration(err.to_string()),
        _ => Error::query(err),
    }
}

/// Runs parameterized statements against a database.
///
/// Implementations map a failure to reach the database to
/// [`Error::Connection`] and everything the database itself rejects to
/// [`Error::Query`].
pub trait QueryExecutor: Send + Sync + 'static {
    /// The SQL flavour statements must be rendered in.
    fn dialect(&self) -> Dialect;

    /// Whether the underlying connection can still serve statements.
    fn is_open(&self) -> bool {
        true
    }

    /// Runs a statement that returns rows.
    fn fetch_all(
        &self,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Result<Vec<Row>, Error>> + Send;

    /// Runs a statement for its effect, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Param]) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Releases the underlying connection. Must tolerate repeated calls.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send {
        async { Ok(()) }
    }
}
