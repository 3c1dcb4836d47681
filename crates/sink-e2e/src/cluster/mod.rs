//! Cluster control-plane seam.
//!
//! The harness never talks to the API server directly. Everything it needs
//! (namespace lifecycle, object creation, pod listing, node counting and log
//! retrieval) goes through [`ClusterClient`], which has a real implementation
//! in [`kube_cluster`] and an in-memory one in [`mock`] for tests.

pub mod kube_cluster;
pub mod mock;

pub use kube_cluster::{ClientSettings, KubeCluster};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::resources::ResourceDescriptor;

/// Errors returned by a [`ClusterClient`].
///
/// `AlreadyExists` and `NotFound` are split out because callers treat them as
/// success in specific places (idempotent create, idempotent delete).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("API server returned {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Cluster transport error: {0}")]
    Transport(String),

    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClusterError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Equality-based label selector (`app=foo,tier=bar`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector on the conventional `app` label.
    pub fn app(value: impl Into<String>) -> Self {
        Self::new().with("app", value)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    /// True when every requirement is present in `labels`.
    ///
    /// An empty selector matches everything.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.requirements {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Pod lifecycle phase as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl From<&str> for PodPhase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of a single container inside a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReadiness {
    pub name: String,
    pub ready: bool,
}

/// Point-in-time view of a pod, reduced to what conditions look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub phase: PodPhase,
    pub containers: Vec<ContainerReadiness>,
}

impl PodSnapshot {
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            phase,
            containers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_container(mut self, name: impl Into<String>, ready: bool) -> Self {
        self.containers.push(ContainerReadiness {
            name: name.into(),
            ready,
        });
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// A pod is ready when it reports at least one container and every
    /// container is ready. A pod with no statuses yet is not ready.
    pub fn is_ready(&self) -> bool {
        !self.containers.is_empty() && self.containers.iter().all(|c| c.ready)
    }
}

/// Operations the harness needs from the cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a namespace.
    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Delete a namespace and everything in it.
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Submit a described object into `namespace`.
    async fn create(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
    ) -> Result<(), ClusterError>;

    /// List pods in `namespace` matching `selector`.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodSnapshot>, ClusterError>;

    /// Current number of nodes in the cluster.
    async fn count_nodes(&self) -> Result<usize, ClusterError>;

    /// Raw log output of a pod.
    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<Vec<u8>, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_selector_display_is_sorted_and_comma_joined() {
        let selector = LabelSelector::app("receiver").with("tier", "sink");
        assert_eq!(selector.to_string(), "app=receiver,tier=sink");
        assert_eq!(LabelSelector::new().to_string(), "");
    }

    #[test]
    fn test_selector_matches_requires_every_label() {
        let selector = LabelSelector::app("receiver").with("tier", "sink");

        assert!(selector.matches(&labels(&[
            ("app", "receiver"),
            ("tier", "sink"),
            ("extra", "x")
        ])));
        assert!(!selector.matches(&labels(&[("app", "receiver")])));
        assert!(!selector.matches(&labels(&[("app", "other"), ("tier", "sink")])));
        assert!(LabelSelector::new().matches(&BTreeMap::new()));
    }

    #[test]
    fn test_pod_phase_parsing() {
        assert_eq!(PodPhase::from("Running"), PodPhase::Running);
        assert_eq!(PodPhase::from("Succeeded"), PodPhase::Succeeded);
        assert_eq!(PodPhase::from("bogus"), PodPhase::Unknown);
    }

    #[test]
    fn test_pod_without_container_statuses_is_not_ready() {
        let pod = PodSnapshot::new("p", PodPhase::Running);
        assert!(!pod.is_ready());

        let pod = pod.with_container("a", true).with_container("b", false);
        assert!(!pod.is_ready());

        let pod = PodSnapshot::new("p", PodPhase::Running)
            .with_container("a", true)
            .with_container("b", true);
        assert!(pod.is_ready());
    }

    #[test]
    fn test_cluster_error_classification() {
        let exists = ClusterError::AlreadyExists {
            kind: "Pod".to_string(),
            name: "x".to_string(),
        };
        assert!(exists.is_already_exists());
        assert!(!exists.is_not_found());

        let api = ClusterError::Api {
            code: 500,
            message: "boom".to_string(),
        };
        assert!(!api.is_already_exists());
        assert!(!api.is_not_found());
    }
}
