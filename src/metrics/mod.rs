//! Post-run statistics: counter aggregation and report files.

pub mod aggregator;
pub mod report;

pub use aggregator::{packet_delivery_ratio, MetricsAggregator, NodeStats, RunStatistics, RunSummary};
pub use report::{PdrParseError, PdrResult};
