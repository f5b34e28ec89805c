/// Golden-trace selection.
///
/// A trace is golden when it finished under the latency threshold and did
/// not error. This stands in for a feedback-score criterion that does not
/// exist yet.
use crate::engine::{col, lit, Expr};

pub const TRACE_ID: &str = "traceId";
pub const TOTAL_LATENCY: &str = "totalLatency";
pub const TOTAL_COST_USD: &str = "totalCostUsd";
pub const ERROR: &str = "error";

/// Traces at or above this latency are never golden.
pub const LATENCY_THRESHOLD_MS: u64 = 2000;

/// `totalLatency < threshold AND (error IS NULL OR error = false)`
///
/// A null latency makes the comparison null, and null rows are filtered out.
pub fn golden_predicate(max_latency_ms: u64) -> Expr {
    col(TOTAL_LATENCY)
        .lt(lit(max_latency_ms as f64))
        .and(col(ERROR).is_null().or(col(ERROR).eq(lit(false))))
}
