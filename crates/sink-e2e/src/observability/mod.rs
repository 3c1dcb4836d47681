//! Observability for harness runs.
//!
//! Metrics go through the `metrics` facade. Without an installed recorder
//! (the default, and the case in tests) recording is a no-op; the binary
//! installs a Prometheus recorder when metric emission is enabled.

pub mod metrics;
