//! Condition polling against an eventually-consistent control plane.
//!
//! Objects the harness creates show up asynchronously: a pod is first absent,
//! then `Pending`, then `Running`. Conditions are therefore evaluated against a
//! fresh snapshot at a fixed interval until they hold, fail structurally, or the
//! budget runs out.
//!
//! A condition sees a best-effort, possibly stale snapshot. It must treat an
//! empty list or partial state as "not yet" ([`PollOutcome::Pending`]) and only
//! return an error for a malformed observation, which stops polling at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use sink_e2e::cluster::LabelSelector;
//! use sink_e2e::eventual::{ConditionPoller, PollOutcome};
//!
//! let poller = ConditionPoller::new(client, Duration::from_secs(1));
//! let pod_name = poller
//!     .wait_for("ns", &LabelSelector::app("receiver"), "running", |pods| {
//!         Ok(pods
//!             .iter()
//!             .find(|p| p.phase == PodPhase::Running)
//!             .map_or(PollOutcome::Pending, |p| PollOutcome::Satisfied(p.name.clone())))
//!     }, Duration::from_secs(60))
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClient, ClusterError, LabelSelector, PodSnapshot};
use crate::observability::metrics;

/// Default interval between snapshot fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default budget for a single wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(8 * 60);

/// Result of evaluating a condition once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition holds; carries whatever the caller needs next.
    Satisfied(T),
    /// Not yet. Also the answer for an empty or partial snapshot.
    Pending,
}

/// The condition could not be evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PredicateError(pub String);

/// Why a wait ended without the condition holding.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(
        "condition {condition:?} not met for {selector:?} within {elapsed:?} ({attempts} attempts)"
    )]
    Timeout {
        condition: &'static str,
        selector: String,
        elapsed: Duration,
        attempts: u32,
        /// Summary of the last snapshot seen before giving up.
        last_observed: String,
    },

    #[error("condition {condition:?} failed for {selector:?}: {message}")]
    Predicate {
        condition: &'static str,
        selector: String,
        elapsed: Duration,
        message: String,
    },

    #[error("fetching snapshot for {condition:?} ({selector:?}) failed: {source}")]
    Observation {
        condition: &'static str,
        selector: String,
        #[source]
        source: ClusterError,
    },
}

/// Interval and budget for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Snapshot types that can describe themselves in a timeout diagnostic.
pub trait Observation {
    fn summary(&self) -> String;
}

impl Observation for Vec<PodSnapshot> {
    fn summary(&self) -> String {
        summarize_pods(self)
    }
}

/// Pods together with the cluster topology they are judged against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyObservation {
    pub pods: Vec<PodSnapshot>,
    pub node_count: usize,
}

impl Observation for TopologyObservation {
    fn summary(&self) -> String {
        format!("{} nodes; {}", self.node_count, summarize_pods(&self.pods))
    }
}

fn summarize_pods(pods: &[PodSnapshot]) -> String {
    if pods.is_empty() {
        return "0 pods".to_string();
    }
    let details: Vec<String> = pods
        .iter()
        .map(|p| {
            let ready = p.containers.iter().filter(|c| c.ready).count();
            format!("{}={} ({}/{} ready)", p.name, p.phase, ready, p.containers.len())
        })
        .collect();
    format!("{} pods: {}", pods.len(), details.join(", "))
}

/// Evaluate `condition` against snapshots from `fetch` until it holds.
///
/// The first evaluation happens immediately, later ones every
/// `policy.interval`. The final sleep is capped at the remaining budget so the
/// last attempt lands on the deadline.
///
/// - `Ok(PollOutcome::Satisfied(v))` ends the wait with `v`.
/// - `Err(PredicateError)` ends the wait with [`PollError::Predicate`]; it is
///   never retried.
/// - A failed fetch ends the wait with [`PollError::Observation`].
/// - Otherwise the wait ends with [`PollError::Timeout`] once the budget is
///   spent.
pub async fn poll_until<S, T, Fetch, Fut, Cond>(
    condition_name: &'static str,
    selector: &LabelSelector,
    policy: PollPolicy,
    mut fetch: Fetch,
    mut condition: Cond,
) -> Result<T, PollError>
where
    S: Observation,
    Fetch: FnMut() -> Fut,
    Fut: Future<Output = Result<S, ClusterError>>,
    Cond: FnMut(&S) -> Result<PollOutcome<T>, PredicateError>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    let mut last_observed = String::from("nothing observed");

    loop {
        attempts = attempts.saturating_add(1);

        let snapshot = fetch().await.map_err(|source| {
            warn!(
                condition = condition_name,
                selector = %selector,
                attempt = attempts,
                error = %source,
                "Snapshot fetch failed"
            );
            metrics::record_poll(condition_name, "observation_error", attempts);
            PollError::Observation {
                condition: condition_name,
                selector: selector.to_string(),
                source,
            }
        })?;

        match condition(&snapshot) {
            Ok(PollOutcome::Satisfied(value)) => {
                info!(
                    condition = condition_name,
                    selector = %selector,
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Condition satisfied"
                );
                metrics::record_poll(condition_name, "satisfied", attempts);
                return Ok(value);
            }
            Ok(PollOutcome::Pending) => {
                last_observed = snapshot.summary();
                debug!(
                    condition = condition_name,
                    selector = %selector,
                    attempt = attempts,
                    observed = %last_observed,
                    "Condition not yet satisfied"
                );
            }
            Err(PredicateError(message)) => {
                warn!(
                    condition = condition_name,
                    selector = %selector,
                    attempt = attempts,
                    error = %message,
                    "Condition failed"
                );
                metrics::record_poll(condition_name, "predicate_error", attempts);
                return Err(PollError::Predicate {
                    condition: condition_name,
                    selector: selector.to_string(),
                    elapsed: start.elapsed(),
                    message,
                });
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            warn!(
                condition = condition_name,
                selector = %selector,
                attempts,
                observed = %last_observed,
                "Condition not met before timeout"
            );
            metrics::record_poll(condition_name, "timeout", attempts);
            return Err(PollError::Timeout {
                condition: condition_name,
                selector: selector.to_string(),
                elapsed,
                attempts,
                last_observed,
            });
        }

        let remaining = policy.timeout.saturating_sub(elapsed);
        sleep(policy.interval.min(remaining)).await;
    }
}

/// Pod-list polling bound to a cluster client.
pub struct ConditionPoller<C: ?Sized> {
    client: Arc<C>,
    interval: Duration,
}

impl<C: ClusterClient + ?Sized> ConditionPoller<C> {
    pub fn new(client: Arc<C>, interval: Duration) -> Self {
        Self { client, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `condition` holds for the pods in `namespace` matching
    /// `selector`.
    ///
    /// No matching pods is a pending state, not an error.
    pub async fn wait_for<T, Cond>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
        condition_name: &'static str,
        mut condition: Cond,
        timeout: Duration,
    ) -> Result<T, PollError>
    where
        Cond: FnMut(&[PodSnapshot]) -> Result<PollOutcome<T>, PredicateError>,
    {
        let policy = PollPolicy {
            interval: self.interval,
            timeout,
        };
        let client = &self.client;
        poll_until(
            condition_name,
            selector,
            policy,
            move || client.list_pods(namespace, selector),
            |pods: &Vec<PodSnapshot>| condition(pods.as_slice()),
        )
        .await
    }

    /// Like [`wait_for`](Self::wait_for), but every attempt also re-reads the
    /// node count, since membership can change while waiting.
    pub async fn wait_for_topology<T, Cond>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
        condition_name: &'static str,
        condition: Cond,
        timeout: Duration,
    ) -> Result<T, PollError>
    where
        Cond: FnMut(&TopologyObservation) -> Result<PollOutcome<T>, PredicateError>,
    {
        let policy = PollPolicy {
            interval: self.interval,
            timeout,
        };
        let client = &self.client;
        poll_until(
            condition_name,
            selector,
            policy,
            move || async move {
                let pods = client.list_pods(namespace, selector).await?;
                let node_count = client.count_nodes().await?;
                Ok(TopologyObservation { pods, node_count })
            },
            condition,
        )
        .await
    }
}
