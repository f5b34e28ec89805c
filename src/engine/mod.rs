//! Tabular data engine.
//!
//! The analyzer only talks to the [`DataEngine`] and [`Table`] traits.
//! [`LocalEngine`] is the in-process implementation: line-delimited JSON
//! files loaded into a polars `DataFrame` and queried through its lazy API.
//! Predicates are plain polars expressions.

mod local;
mod reader;
mod writer;

pub use local::{LocalEngine, LocalTable};
pub use polars::prelude::{col, lit, Expr};
pub use reader::MalformedMode;
pub use writer::{WriteOptions, WriteSummary};

use polars::prelude::PolarsError;
use std::path::{Path, PathBuf};

/// Aggregate function applied to one column of each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    /// Number of non-null values.
    Count,
    /// Arithmetic mean of the non-null numeric values; null if there are none.
    Avg,
}

/// A single named aggregation, e.g. `avg(totalLatency) AS avg_latency_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub func: AggFn,
    pub column: String,
    pub alias: String,
}

impl Aggregation {
    pub fn count(column: &str) -> Self {
        Self {
            func: AggFn::Count,
            column: column.to_string(),
            alias: format!("count({column})"),
        }
    }

    pub fn avg(column: &str) -> Self {
        Self {
            func: AggFn::Avg,
            column: column.to_string(),
            alias: format!("avg({column})"),
        }
    }

    /// Rename the output column.
    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    /// The polars expression computing this aggregation within a group.
    pub fn to_expr(&self) -> Expr {
        let column = col(self.column.as_str());
        let agg = match self.func {
            AggFn::Count => column.count(),
            AggFn::Avg => column.mean(),
        };
        agg.alias(self.alias.as_str())
    }
}

/// A running engine session that can load tables.
pub trait DataEngine {
    type Table: Table;

    /// Human-readable session name (e.g., "TraceFlywheel").
    fn name(&self) -> &str;

    /// Read every record under `path` into a table with an inferred schema.
    fn load(&self, path: &Path) -> Result<Self::Table, EngineError>;

    /// End the session. Calling it more than once is a no-op.
    fn stop(&mut self);
}

/// An immutable table produced by a [`DataEngine`].
pub trait Table: Sized {
    /// Column names in schema order.
    fn columns(&self) -> &[String];

    fn has_column(&self, name: &str) -> bool {
        self.columns().iter().any(|c| c == name)
    }

    /// Group rows by `key` and compute `aggregations` per group.
    ///
    /// The result has the key column followed by one column per aggregation alias.
    fn group_by_aggregate(
        &self,
        key: &str,
        aggregations: &[Aggregation],
    ) -> Result<Self, EngineError>;

    /// Keep the rows for which `predicate` evaluates to true.
    fn filter(&self, predicate: &Expr) -> Result<Self, EngineError>;

    fn count(&self) -> usize;

    /// Render up to `max_rows` rows as a text table.
    fn show(&self, max_rows: usize) -> String;

    /// Write all rows to `path`, replacing anything already there.
    fn write_overwrite(
        &self,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<WriteSummary, EngineError>;
}

/// Errors produced by engine operations.
#[derive(Debug)]
pub enum EngineError {
    PathNotFound {
        path: PathBuf,
    },
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Malformed {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    NotAnObject {
        path: PathBuf,
        line: usize,
    },
    EmptyInput {
        path: PathBuf,
    },
    UnresolvedColumn {
        name: String,
        available: Vec<String>,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failure inside polars while decoding, querying or encoding a frame.
    Polars(PolarsError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::PathNotFound { path } => {
                write!(f, "path does not exist: {}", path.display())
            }
            EngineError::Pattern { pattern, source } => {
                write!(f, "invalid input pattern {pattern}: {source}")
            }
            EngineError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            EngineError::Malformed { path, line, source } => {
                write!(
                    f,
                    "malformed JSON record at {}:{line}: {source}",
                    path.display()
                )
            }
            EngineError::NotAnObject { path, line } => {
                write!(
                    f,
                    "record at {}:{line} is not a JSON object",
                    path.display()
                )
            }
            EngineError::EmptyInput { path } => {
                write!(
                    f,
                    "unable to infer schema: no records found in {}",
                    path.display()
                )
            }
            EngineError::UnresolvedColumn { name, available } => {
                write!(
                    f,
                    "cannot resolve column '{name}' given input columns: [{}]",
                    available.join(", ")
                )
            }
            EngineError::Write { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
            EngineError::Polars(e) => write!(f, "query failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Pattern { source, .. } => Some(source),
            EngineError::Io { source, .. } => Some(source),
            EngineError::Malformed { source, .. } => Some(source),
            EngineError::Write { source, .. } => Some(source),
            EngineError::Polars(e) => Some(e),
            EngineError::PathNotFound { .. }
            | EngineError::NotAnObject { .. }
            | EngineError::EmptyInput { .. }
            | EngineError::UnresolvedColumn { .. } => None,
        }
    }
}

impl From<PolarsError> for EngineError {
    fn from(e: PolarsError) -> Self {
        EngineError::Polars(e)
    }
}
