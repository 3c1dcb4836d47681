//! Namespace ownership for one run.
//!
//! The fixture creates the run's namespace on entry and deletes it on the way
//! out. Deletion can be requested from two places at once: the normal end of
//! the run and the interrupt watcher. Both go through the same lock over
//! [`NamespaceState`], so the delete call reaches the cluster at most once.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterClient;
use crate::error::E2eError;
use crate::observability::metrics;
use crate::runner::RunOutcome;

/// Lifecycle of the fixture namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceState {
    Absent,
    Creating,
    Present,
    Deleting,
}

/// What to do with the namespace after a failed scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownPolicy {
    /// Keep it so the workloads can be inspected.
    #[default]
    RetainOnFailure,
    AlwaysDelete,
}

/// Owns the namespace a scenario runs in.
pub struct NamespaceFixture<C: ?Sized> {
    client: Arc<C>,
    namespace: String,
    policy: TeardownPolicy,
    state: Arc<Mutex<NamespaceState>>,
}

impl<C: ?Sized> Clone for NamespaceFixture<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            namespace: self.namespace.clone(),
            policy: self.policy,
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: ClusterClient + ?Sized + 'static> NamespaceFixture<C> {
    /// Create `namespace`, or adopt it if a previous run left it behind.
    ///
    /// # Errors
    ///
    /// `E2eError::Provisioning` with kind `Namespace` for anything other than
    /// "already exists".
    pub async fn setup(
        client: Arc<C>,
        namespace: impl Into<String>,
        policy: TeardownPolicy,
    ) -> Result<Self, E2eError> {
        let fixture = Self {
            client,
            namespace: namespace.into(),
            policy,
            state: Arc::new(Mutex::new(NamespaceState::Absent)),
        };

        let mut state = fixture.state.lock().await;
        *state = NamespaceState::Creating;
        match fixture.client.create_namespace(&fixture.namespace).await {
            Ok(()) => {
                info!(namespace = %fixture.namespace, "Created namespace");
            }
            Err(e) if e.is_already_exists() => {
                info!(namespace = %fixture.namespace, "Namespace already exists, adopting");
            }
            Err(source) => {
                *state = NamespaceState::Absent;
                error!(
                    namespace = %fixture.namespace,
                    error = %source,
                    "Failed to create namespace"
                );
                return Err(E2eError::Provisioning {
                    step: None,
                    kind: "Namespace",
                    name: fixture.namespace.clone(),
                    source,
                });
            }
        }
        *state = NamespaceState::Present;
        drop(state);

        Ok(fixture)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn policy(&self) -> TeardownPolicy {
        self.policy
    }

    pub async fn state(&self) -> NamespaceState {
        *self.state.lock().await
    }

    /// Tear the namespace down as soon as `cancel` fires.
    ///
    /// The returned task only finishes after cancellation; abort it once the
    /// run is over.
    pub fn watch_interrupt(&self, cancel: CancellationToken) -> JoinHandle<Result<(), E2eError>> {
        let fixture = self.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            warn!(namespace = %fixture.namespace, "Interrupted, tearing down namespace");
            let result = fixture.teardown_with("interrupted").await;
            if let Err(e) = &result {
                error!(error = %e, "Teardown after interrupt failed");
            }
            result
        })
    }

    /// Delete the namespace unless it is already gone.
    ///
    /// # Errors
    ///
    /// `E2eError::Teardown` when the delete call fails for a reason other than
    /// "not found". The namespace stays `Present` so a later call may retry.
    pub async fn teardown(&self) -> Result<(), E2eError> {
        self.teardown_with("explicit").await
    }

    /// Apply the teardown policy to a finished run.
    pub async fn finish(&self, outcome: &RunOutcome) -> Result<(), E2eError> {
        match outcome {
            RunOutcome::Passed(_) => self.teardown_with("passed").await,
            RunOutcome::Interrupted => self.teardown_with("interrupted").await,
            RunOutcome::Failed(_) => match self.policy {
                TeardownPolicy::AlwaysDelete => self.teardown_with("failed").await,
                TeardownPolicy::RetainOnFailure => {
                    warn!(
                        namespace = %self.namespace,
                        "Scenario failed, keeping namespace for inspection"
                    );
                    metrics::record_teardown("failed", "retained");
                    Ok(())
                }
            },
        }
    }

    async fn teardown_with(&self, trigger: &'static str) -> Result<(), E2eError> {
        let mut state = self.state.lock().await;
        if *state == NamespaceState::Absent {
            debug!(namespace = %self.namespace, trigger, "Namespace already absent");
            return Ok(());
        }

        *state = NamespaceState::Deleting;
        match self.client.delete_namespace(&self.namespace).await {
            Ok(()) => {
                *state = NamespaceState::Absent;
                info!(namespace = %self.namespace, trigger, "Deleted namespace");
                metrics::record_teardown(trigger, "deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                *state = NamespaceState::Absent;
                info!(namespace = %self.namespace, trigger, "Namespace was already deleted");
                metrics::record_teardown(trigger, "absent");
                Ok(())
            }
            Err(source) => {
                *state = NamespaceState::Present;
                metrics::record_teardown(trigger, "error");
                Err(E2eError::Teardown {
                    namespace: self.namespace.clone(),
                    source,
                })
            }
        }
    }
}
