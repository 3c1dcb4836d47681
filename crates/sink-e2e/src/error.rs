//! Harness error types.
//!
//! Every error raised while a scenario runs names the step it came from.
//! None of them are recovered from: a delivery check cannot be salvaged once
//! a step has failed.

use std::time::Duration;
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::config::ConfigError;
use crate::eventual::PollError;

#[derive(Debug, Error)]
pub enum E2eError {
    /// Creating an object failed for a reason other than "already exists".
    /// `step` is unset only for the fixture namespace, created before any step.
    #[error("{}Failed to create {kind} {name:?}: {source}", step_prefix(.step))]
    Provisioning {
        step: Option<&'static str>,
        kind: &'static str,
        name: String,
        #[source]
        source: ClusterError,
    },

    /// A condition never held within its budget.
    #[error(
        "[{step}] condition {condition:?} not met for selector {selector:?} after {elapsed:?} \
         ({attempts} attempts); last observed: {last_observed}"
    )]
    Timeout {
        step: &'static str,
        condition: &'static str,
        selector: String,
        elapsed: Duration,
        attempts: u32,
        last_observed: String,
    },

    /// The condition itself failed. Structural, never retried.
    #[error(
        "[{step}] condition {condition:?} failed for {selector:?} after {elapsed:?}: {message}"
    )]
    Predicate {
        step: &'static str,
        condition: &'static str,
        selector: String,
        elapsed: Duration,
        message: String,
    },

    /// A cluster read needed by a step failed.
    #[error("[{step}] {operation} failed: {source}")]
    Cluster {
        step: &'static str,
        operation: &'static str,
        #[source]
        source: ClusterError,
    },

    /// Captured output did not contain what the pipeline should have delivered.
    #[error("[{step}] expected {expected:?} in captured output:\n{output}")]
    Assertion {
        step: &'static str,
        expected: String,
        output: String,
    },

    /// The run was interrupted while this step was pending.
    #[error("[{step}] interrupted")]
    Interrupted { step: &'static str },

    /// The namespace could not be deleted. Leaves a polluted environment.
    #[error("Failed to delete namespace {namespace:?}: {source}")]
    Teardown {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl E2eError {
    /// Wrap a poller error with the step that was waiting.
    pub fn from_poll(step: &'static str, error: PollError) -> Self {
        match error {
            PollError::Timeout {
                condition,
                selector,
                elapsed,
                attempts,
                last_observed,
            } => E2eError::Timeout {
                step,
                condition,
                selector,
                elapsed,
                attempts,
                last_observed,
            },
            PollError::Predicate {
                condition,
                selector,
                elapsed,
                message,
            } => E2eError::Predicate {
                step,
                condition,
                selector,
                elapsed,
                message,
            },
            PollError::Observation { source, .. } => E2eError::Cluster {
                step,
                operation: "observe",
                source,
            },
        }
    }

    /// Attribute a step-less error to `step`. Errors that already name a step
    /// keep it.
    #[must_use]
    pub fn at_step(self, step: &'static str) -> Self {
        match self {
            E2eError::Provisioning {
                step: None,
                kind,
                name,
                source,
            } => E2eError::Provisioning {
                step: Some(step),
                kind,
                name,
                source,
            },
            other => other,
        }
    }

    /// Step the error was raised in, if any.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            E2eError::Timeout { step, .. }
            | E2eError::Predicate { step, .. }
            | E2eError::Cluster { step, .. }
            | E2eError::Assertion { step, .. }
            | E2eError::Interrupted { step } => Some(*step),
            E2eError::Provisioning { step, .. } => *step,
            E2eError::Teardown { .. } | E2eError::Config(_) => None,
        }
    }

    /// Errors that indicate a broken environment rather than a failed check.
    pub fn is_fatal_to_process(&self) -> bool {
        matches!(self, E2eError::Teardown { .. } | E2eError::Config(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, E2eError::Interrupted { .. })
    }
}

fn step_prefix(step: &Option<&'static str>) -> String {
    step.map(|step| format!("[{step}] ")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_poll_keeps_timeout_and_predicate_distinct() {
        let timeout = E2eError::from_poll(
            "emit-logs",
            PollError::Timeout {
                condition: "pod-succeeded",
                selector: "app=x".to_string(),
                elapsed: Duration::from_secs(3),
                attempts: 4,
                last_observed: "0 pods".to_string(),
            },
        );
        assert!(matches!(timeout, E2eError::Timeout { attempts: 4, .. }));
        assert_eq!(timeout.step(), Some("emit-logs"));

        let predicate = E2eError::from_poll(
            "emit-logs",
            PollError::Predicate {
                condition: "pod-succeeded",
                selector: "app=x".to_string(),
                elapsed: Duration::ZERO,
                message: "bad".to_string(),
            },
        );
        assert!(matches!(predicate, E2eError::Predicate { .. }));
    }

    #[test]
    fn test_assertion_display_includes_full_output() {
        let err = E2eError::Assertion {
            step: "assert-delivery",
            expected: "Logs Received: 10".to_string(),
            output: "Logs Received: 3\nLogs Received: 7\n".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("assert-delivery"));
        assert!(rendered.contains("Logs Received: 3\nLogs Received: 7"));
    }

    #[test]
    fn test_provisioning_takes_the_step_it_failed_in() {
        let err = E2eError::Provisioning {
            step: None,
            kind: "LogSink",
            name: "run-test".to_string(),
            source: ClusterError::Api {
                code: 403,
                message: "forbidden".to_string(),
            },
        };
        assert_eq!(err.step(), None);
        assert!(err.to_string().starts_with("Failed to create LogSink"));

        let err = err.at_step("create-log-sink");
        assert_eq!(err.step(), Some("create-log-sink"));
        assert!(err.to_string().starts_with("[create-log-sink] Failed to create LogSink"));

        // An attributed error is not re-attributed.
        let err = err.at_step("emit-logs");
        assert_eq!(err.step(), Some("create-log-sink"));
    }

    #[test]
    fn test_fatal_classification() {
        let teardown = E2eError::Teardown {
            namespace: "ns".to_string(),
            source: ClusterError::Transport("reset".to_string()),
        };
        assert!(teardown.is_fatal_to_process());

        let interrupted = E2eError::Interrupted { step: "emit-logs" };
        assert!(!interrupted.is_fatal_to_process());
        assert!(interrupted.is_interrupted());
    }
}
