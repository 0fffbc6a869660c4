//! Prometheus metrics for the resource runtime
//!
//! Operation counts and latencies, informer event throughput and a health
//! gauge, served over HTTP by [`serve`].

mod prometheus;

pub use prometheus::*;
