//! Observability: health endpoints and Prometheus metrics.

pub mod health;
pub mod metrics;
