//! Metrics projection and Prometheus exposition.
//!
//! `projector` maps a state snapshot to samples; `sink` renders samples into
//! the Prometheus text format through a registry built fresh per scrape.

pub mod projector;
pub mod sink;

pub use projector::{project, Metric, Sample};
pub use sink::MetricsSink;
