//! Runtime observability: counters and task latency distribution.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
