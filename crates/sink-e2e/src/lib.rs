//! Log Delivery End-to-End Harness
//!
//! Validates, against a live cluster, that a log line written to stdout by a
//! workload reaches a syslog sink configured through a `LogSink` object.
//!
//! # Modules
//!
//! - [`cluster`]: the control plane seam, a real client and an in-memory mock
//! - [`provisioner`]: idempotent object creation
//! - [`eventual`]: condition polling against eventually-consistent state
//! - [`scenario`]: the seven-step delivery scenario
//! - [`fixture`]: namespace ownership and interrupt-safe teardown
//! - [`runner`]: one complete run and its exit code
//!
//! # Prerequisites
//!
//! 1. A cluster with the log sink controller and forwarders installed
//! 2. A kubeconfig (`KUBECONFIG`, `~/.kube/config`, or in-cluster credentials)
//!
//! # Usage
//!
//! ```bash
//! # Full run against the current kube context
//! cargo run -p sink-e2e
//!
//! # Keep nothing behind, even on failure
//! E2E_TEARDOWN_ON_FAILURE=true cargo run -p sink-e2e
//!
//! # Unit and mock-backed tests only
//! cargo test -p sink-e2e
//!
//! # Include the live-cluster test
//! cargo test -p sink-e2e --features cluster
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod eventual;
pub mod fixture;
pub mod observability;
pub mod provisioner;
pub mod resources;
pub mod runner;
pub mod scenario;
