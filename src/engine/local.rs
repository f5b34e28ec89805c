//! In-process engine: JSONL files loaded into a polars `DataFrame`.

use super::reader::{read_frame, read_lines, resolve_input_files, MalformedMode};
use super::writer::{write_overwrite, WriteOptions, WriteSummary};
use super::{Aggregation, DataEngine, EngineError, Expr, Table};
use chrono::{DateTime, Utc};
use polars::prelude::{col, DataFrame, IntoLazy};
use std::path::Path;
use tracing::{debug, info};

/// Builder for a [`LocalEngine`] session.
#[derive(Debug, Clone)]
pub struct LocalEngineBuilder {
    app_name: String,
    malformed: MalformedMode,
}

impl LocalEngineBuilder {
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = name.to_string();
        self
    }

    pub fn malformed_mode(mut self, mode: MalformedMode) -> Self {
        self.malformed = mode;
        self
    }

    /// Start the session.
    pub fn get_or_create(self) -> LocalEngine {
        let started_at = Utc::now();
        info!(app = %self.app_name, "engine session started");
        LocalEngine {
            app_name: self.app_name,
            malformed: self.malformed,
            started_at,
            stopped: false,
        }
    }
}

/// A single-process engine session.
#[derive(Debug)]
pub struct LocalEngine {
    app_name: String,
    malformed: MalformedMode,
    started_at: DateTime<Utc>,
    stopped: bool,
}

impl LocalEngine {
    pub fn builder() -> LocalEngineBuilder {
        LocalEngineBuilder {
            app_name: "TraceFlywheel".to_string(),
            malformed: MalformedMode::default(),
        }
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl DataEngine for LocalEngine {
    type Table = LocalTable;

    fn name(&self) -> &str {
        &self.app_name
    }

    fn load(&self, path: &Path) -> Result<LocalTable, EngineError> {
        let files = resolve_input_files(path)?;
        let lines = read_lines(&files, self.malformed)?;
        if lines.records == 0 {
            return Err(EngineError::EmptyInput {
                path: path.to_path_buf(),
            });
        }

        let table = LocalTable::from_frame(read_frame(lines.buf)?);
        info!(
            input = %path.display(),
            files = files.len(),
            records = table.count(),
            dropped = lines.dropped,
            columns = table.columns.len(),
            "loaded traces"
        );
        Ok(table)
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(app = %self.app_name, elapsed_ms, "engine session stopped");
    }
}

/// A polars frame together with its column names.
#[derive(Debug, Clone)]
pub struct LocalTable {
    columns: Vec<String>,
    df: DataFrame,
}

impl LocalTable {
    /// Wrap a frame. Columns keep the frame's schema order, which for loaded
    /// input is the order keys first appear in.
    pub fn from_frame(df: DataFrame) -> Self {
        let columns = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        Self { columns, df }
    }

    #[cfg(test)]
    pub fn from_jsonl(lines: &[&str]) -> Self {
        let df = read_frame(lines.join("\n").into_bytes()).unwrap();
        Self::from_frame(df)
    }

    /// Rows as JSON objects, in frame order.
    #[cfg(test)]
    pub fn records(&self) -> Vec<serde_json::Value> {
        let mut df = self.df.clone();
        let buf = super::writer::encode_jsonl(&mut df).unwrap();
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn require(&self, name: &str) -> Result<(), EngineError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(EngineError::UnresolvedColumn {
                name: name.to_string(),
                available: self.columns.clone(),
            })
        }
    }
}

impl Table for LocalTable {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn group_by_aggregate(
        &self,
        key: &str,
        aggregations: &[Aggregation],
    ) -> Result<LocalTable, EngineError> {
        self.require(key)?;
        for agg in aggregations {
            self.require(&agg.column)?;
        }

        let exprs: Vec<Expr> = aggregations.iter().map(Aggregation::to_expr).collect();
        // Stable grouping keeps groups in order of first appearance.
        let grouped = self
            .df
            .clone()
            .lazy()
            .group_by_stable([col(key)])
            .agg(exprs)
            .collect()?;

        debug!(key, groups = grouped.height(), "grouped rows");
        Ok(LocalTable::from_frame(grouped))
    }

    fn filter(&self, predicate: &Expr) -> Result<LocalTable, EngineError> {
        let filtered = self.df.clone().lazy().filter(predicate.clone()).collect()?;
        debug!(kept = filtered.height(), of = self.df.height(), "filtered rows");
        Ok(LocalTable::from_frame(filtered))
    }

    fn count(&self) -> usize {
        self.df.height()
    }

    fn show(&self, max_rows: usize) -> String {
        let mut out = format!("{}\n", self.df.head(Some(max_rows)));
        if self.df.height() > max_rows {
            out.push_str(&format!("only showing top {max_rows} rows\n"));
        }
        out
    }

    fn write_overwrite(
        &self,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<WriteSummary, EngineError> {
        let mut df = self.df.clone();
        write_overwrite(path, &mut df, options)
    }
}
