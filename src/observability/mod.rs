//! Observability: structured logging via `tracing` and optional Prometheus
//! metrics.

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
