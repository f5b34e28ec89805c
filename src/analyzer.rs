//! The trace analysis job: load, provider metrics, golden filter, export.
//!
//! Only load failures are recovered here. Every later engine failure is
//! returned to the caller untouched.

use crate::config::FlywheelConfig;
use crate::engine::{DataEngine, EngineError, Table, WriteSummary};
use crate::metrics::provider_aggregations;
use crate::quality::golden_predicate;
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

/// How a run ended when it did not fail outright.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// The input could not be read; nothing was written.
    InputUnreadable(EngineError),
}

#[derive(Debug)]
pub struct RunReport {
    pub total_records: usize,
    /// Number of metric groups, or `None` when the group column was absent.
    pub provider_groups: Option<usize>,
    pub golden_count: usize,
    pub export: WriteSummary,
}

/// Run the analysis against `engine`, writing the human-readable report to `out`.
///
/// The session is stopped on success and on load failure.
pub fn analyze_traces<E: DataEngine>(
    engine: &mut E,
    input: &Path,
    output: &Path,
    config: &FlywheelConfig,
    out: &mut impl Write,
) -> Result<RunOutcome, AnalyzeError> {
    info!(engine = engine.name(), input = %input.display(), "starting trace analysis");
    let traces = match engine.load(input) {
        Ok(t) => t,
        Err(e) => {
            error!(input = %input.display(), error = %e, "failed to read input");
            writeln!(out, "Error reading input: {e}")?;
            engine.stop();
            return Ok(RunOutcome::InputUnreadable(e));
        }
    };

    writeln!(out, "--- Provider Performance Metrics ---")?;
    let group_by = config.metrics.group_by.as_str();
    let provider_groups = if traces.has_column(group_by) {
        let metrics = traces.group_by_aggregate(group_by, &provider_aggregations())?;
        write!(out, "{}", metrics.show(config.metrics.show_rows))?;
        Some(metrics.count())
    } else {
        warn!(column = group_by, "group column missing, skipping provider metrics");
        writeln!(out, "Column '{group_by}' not found in dataset.")?;
        None
    };

    writeln!(out, "--- Extracting Golden Traces ---")?;
    let predicate = golden_predicate(config.quality.max_latency_ms);
    info!(?predicate, "filtering golden traces");
    let golden = traces.filter(&predicate)?;

    let golden_count = golden.count();
    writeln!(out, "Found {golden_count} golden traces.")?;

    let export = golden.write_overwrite(output, &config.export.write_options())?;
    writeln!(out, "Golden traces exported to {}", output.display())?;
    info!(
        output = %export.path.display(),
        records = export.records,
        bytes = export.bytes,
        "golden traces exported"
    );

    engine.stop();

    Ok(RunOutcome::Completed(RunReport {
        total_records: traces.count(),
        provider_groups,
        golden_count,
        export,
    }))
}

/// Failures that abort a run after the input was loaded.
#[derive(Debug)]
pub enum AnalyzeError {
    Engine(EngineError),
    Report(std::io::Error),
}

impl std::fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyzeError::Engine(e) => write!(f, "{e}"),
            AnalyzeError::Report(e) => write!(f, "failed to write report: {e}"),
        }
    }
}

impl std::error::Error for AnalyzeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalyzeError::Engine(e) => Some(e),
            AnalyzeError::Report(e) => Some(e),
        }
    }
}

impl From<EngineError> for AnalyzeError {
    fn from(e: EngineError) -> Self {
        AnalyzeError::Engine(e)
    }
}

impl From<std::io::Error> for AnalyzeError {
    fn from(e: std::io::Error) -> Self {
        AnalyzeError::Report(e)
    }
}
