/// Per-provider performance metrics.
///
/// Groups traces by a categorical column and reports request count,
/// average latency and average cost for each group.
use crate::engine::Aggregation;
use crate::quality::{TOTAL_COST_USD, TOTAL_LATENCY, TRACE_ID};

pub const TOTAL_REQUESTS: &str = "total_requests";
pub const AVG_LATENCY_MS: &str = "avg_latency_ms";
pub const AVG_COST: &str = "avg_cost";

pub fn provider_aggregations() -> Vec<Aggregation> {
    vec![
        Aggregation::count(TRACE_ID).alias(TOTAL_REQUESTS),
        Aggregation::avg(TOTAL_LATENCY).alias(AVG_LATENCY_MS),
        Aggregation::avg(TOTAL_COST_USD).alias(AVG_COST),
    ]
}
