//! Harness configuration.
//!
//! Configuration is loaded from environment variables. Everything has a
//! default, so an empty environment yields a usable config that infers the
//! cluster from the ambient kubeconfig.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cluster::ClientSettings;
use crate::eventual::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::fixture::TeardownPolicy;
use crate::resources::RunPrefix;

/// Default namespace the fixture owns.
pub const DEFAULT_NAMESPACE: &str = "observability-tests";

/// Default namespace the log forwarders run in.
pub const DEFAULT_FORWARDER_NAMESPACE: &str = "knative-observability";

/// Default wait before checking forwarders, giving the sink controller time to
/// roll them with the new configuration.
pub const DEFAULT_SETTLE_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit kubeconfig path (`KUBECONFIG`). Inferred when unset.
    pub kubeconfig: Option<PathBuf>,

    /// Cluster name override (`E2E_CLUSTER`).
    pub cluster: Option<String>,

    /// Debug-level logging (`E2E_VERBOSE`).
    pub verbose: bool,

    /// Install a metrics recorder and print it at exit (`E2E_EMIT_METRICS`).
    pub emit_metrics: bool,

    /// Namespace owned by the fixture (`E2E_NAMESPACE`).
    pub namespace: String,

    /// Namespace the forwarder pods run in (`E2E_FORWARDER_NAMESPACE`).
    pub forwarder_namespace: String,

    /// Run prefix (`E2E_RUN_PREFIX`), generated when unset.
    pub run_prefix: RunPrefix,

    /// Interval between condition checks (`E2E_POLL_INTERVAL_MS`).
    pub poll_interval: Duration,

    /// Budget for each wait (`E2E_POLL_TIMEOUT_SECS`).
    pub poll_timeout: Duration,

    /// Pause before waiting on forwarders (`E2E_SETTLE_SECS`).
    pub settle: Duration,

    /// What happens to the namespace when the scenario fails
    /// (`E2E_TEARDOWN_ON_FAILURE`).
    pub teardown_policy: TeardownPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let kubeconfig = non_empty(vars, "KUBECONFIG").map(PathBuf::from);
        let cluster = non_empty(vars, "E2E_CLUSTER").map(str::to_string);

        let verbose = parse_bool(vars, "E2E_VERBOSE", false)?;
        let emit_metrics = parse_bool(vars, "E2E_EMIT_METRICS", false)?;

        let namespace = non_empty(vars, "E2E_NAMESPACE")
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string();

        let forwarder_namespace = non_empty(vars, "E2E_FORWARDER_NAMESPACE")
            .unwrap_or(DEFAULT_FORWARDER_NAMESPACE)
            .to_string();

        let run_prefix = match vars.get("E2E_RUN_PREFIX") {
            Some(value) => RunPrefix::parse(value).map_err(ConfigError::InvalidValue)?,
            None => RunPrefix::generate(),
        };

        let poll_interval = match parse_u64(vars, "E2E_POLL_INTERVAL_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "E2E_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let poll_timeout = match parse_u64(vars, "E2E_POLL_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_TIMEOUT,
        };
        if poll_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "E2E_POLL_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let settle = Duration::from_secs(
            parse_u64(vars, "E2E_SETTLE_SECS")?.unwrap_or(DEFAULT_SETTLE_SECS),
        );

        let teardown_policy = if parse_bool(vars, "E2E_TEARDOWN_ON_FAILURE", false)? {
            TeardownPolicy::AlwaysDelete
        } else {
            TeardownPolicy::RetainOnFailure
        };

        Ok(Self {
            kubeconfig,
            cluster,
            verbose,
            emit_metrics,
            namespace,
            forwarder_namespace,
            run_prefix,
            poll_interval,
            poll_timeout,
            settle,
            teardown_policy,
        })
    }

    /// Settings for building the cluster client.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            kubeconfig: self.kubeconfig.clone(),
            cluster: self.cluster.clone(),
        }
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = non_empty(vars, key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

fn parse_u64(vars: &HashMap<String, String>, key: &str) -> Result<Option<u64>, ConfigError> {
    non_empty(vars, key)
        .map(|raw| {
            raw.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("{key} must be a non-negative integer: {e}"))
            })
        })
        .transpose()
}
