//! Ad-hoc aggregation reports over transactions.

mod coercion;
mod endpoint;
mod pipeline;
mod request;

pub use coercion::{coerce_filter_value, map_operator};
pub use endpoint::{ReportState, create_report_endpoint};
pub use pipeline::build_pipeline;
pub use request::{AggregationRequest, FilterSpec, FilterValue, MetricSpec};
