//! In-memory cluster for testing the harness without a control plane.
//!
//! Behaves like a very small API server:
//! - namespaces must exist before objects are created in them
//! - names are unique per kind and namespace (`AlreadyExists` otherwise), so a
//!   service and a pod may share a name
//! - deleting a namespace removes everything in it
//! - a created pod appears `Pending` and turns `Running` (all containers
//!   ready) after a configurable number of listings
//! - a created job gets one pod `<job>-pod` that turns `Succeeded` the same way
//!
//! Failures can be injected per object name, and every call is counted so tests
//! can assert how often the cluster was touched.
//!
//! # Example
//!
//! ```rust,ignore
//! let cluster = MockCluster::new()
//!     .with_nodes(3)
//!     .with_ready_pods("knative-observability", "fluent-bit-ds", 3)
//!     .with_job_logs("log-observer", "Logs Received: 10\n");
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{ClusterClient, ClusterError, LabelSelector, PodPhase, PodSnapshot};
use crate::resources::{ResourceDescriptor, ResourceKind, WorkloadSpec};

/// Pod spawned for a job, named `<job>-pod`.
pub fn job_pod_name(job: &str) -> String {
    format!("{job}-pod")
}

#[derive(Debug)]
struct MockPod {
    snapshot: PodSnapshot,
    /// Phase the pod settles into.
    target: PodPhase,
    /// Listings left before the pod reaches `target`.
    remaining_lag: u32,
}

impl MockPod {
    fn observe(&mut self) {
        if self.snapshot.phase == self.target {
            return;
        }
        if self.remaining_lag > 0 {
            self.remaining_lag -= 1;
            return;
        }
        self.snapshot.phase = self.target;
        let ready = self.target == PodPhase::Running;
        for container in &mut self.snapshot.containers {
            container.ready = ready;
        }
    }
}

#[derive(Debug, Default)]
struct MockClusterInner {
    namespaces: HashSet<String>,
    /// Objects by namespace, then kind and name.
    objects: HashMap<String, BTreeMap<(ResourceKind, String), ResourceDescriptor>>,
    /// Pods by namespace, in creation order.
    pods: HashMap<String, Vec<MockPod>>,
    logs: HashMap<(String, String), Vec<u8>>,
    /// Logs for the pod of a job, keyed by job name.
    job_logs: HashMap<String, Vec<u8>>,
    /// Final phase for a job's pod, keyed by job name (default `Succeeded`).
    job_outcomes: HashMap<String, PodPhase>,
    node_count: usize,
    pod_lag: u32,
    create_failures: HashMap<String, ClusterError>,
    create_namespace_failure: Option<ClusterError>,
    delete_namespace_failure: Option<ClusterError>,
    list_failure: Option<ClusterError>,
    create_delay: Option<Duration>,
}

/// In-memory [`ClusterClient`].
#[derive(Debug, Clone)]
pub struct MockCluster {
    inner: Arc<Mutex<MockClusterInner>>,
    create_calls: Arc<AtomicUsize>,
    create_namespace_calls: Arc<AtomicUsize>,
    delete_namespace_calls: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
    node_calls: Arc<AtomicUsize>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// Single-node cluster with no namespaces.
    pub fn new() -> Self {
        let inner = MockClusterInner {
            node_count: 1,
            ..MockClusterInner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            create_calls: Arc::new(AtomicUsize::new(0)),
            create_namespace_calls: Arc::new(AtomicUsize::new(0)),
            delete_namespace_calls: Arc::new(AtomicUsize::new(0)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            node_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockClusterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.lock().namespaces.insert(namespace.to_string());
        self
    }

    #[must_use]
    pub fn with_nodes(self, count: usize) -> Self {
        self.set_node_count(count);
        self
    }

    /// Seed a pod that never changes phase. Creates the namespace if needed.
    #[must_use]
    pub fn with_pod(self, namespace: &str, pod: PodSnapshot) -> Self {
        {
            let mut inner = self.lock();
            inner.namespaces.insert(namespace.to_string());
            let target = pod.phase;
            inner.pods.entry(namespace.to_string()).or_default().push(MockPod {
                snapshot: pod,
                target,
                remaining_lag: 0,
            });
        }
        self
    }

    /// Seed `count` running, ready pods labeled `app=<app>`.
    #[must_use]
    pub fn with_ready_pods(self, namespace: &str, app: &str, count: usize) -> Self {
        (0..count).fold(self, |cluster, i| {
            cluster.with_pod(
                namespace,
                PodSnapshot::new(format!("{app}-{i}"), PodPhase::Running)
                    .with_label("app", app)
                    .with_container(app, true),
            )
        })
    }

    /// Listings a created pod stays `Pending` for before settling.
    #[must_use]
    pub fn with_pod_lag(self, listings: u32) -> Self {
        self.lock().pod_lag = listings;
        self
    }

    /// Log output of the pod created for `job`.
    #[must_use]
    pub fn with_job_logs(self, job: &str, logs: impl Into<Vec<u8>>) -> Self {
        self.lock().job_logs.insert(job.to_string(), logs.into());
        self
    }

    /// Phase the pod of `job` settles into instead of `Succeeded`.
    #[must_use]
    pub fn with_job_outcome(self, job: &str, phase: PodPhase) -> Self {
        self.lock().job_outcomes.insert(job.to_string(), phase);
        self
    }

    /// Fail creation of the object called `name`.
    #[must_use]
    pub fn fail_create(self, name: &str, error: ClusterError) -> Self {
        self.lock().create_failures.insert(name.to_string(), error);
        self
    }

    #[must_use]
    pub fn fail_create_namespace(self, error: ClusterError) -> Self {
        self.lock().create_namespace_failure = Some(error);
        self
    }

    #[must_use]
    pub fn fail_delete_namespace(self, error: ClusterError) -> Self {
        self.lock().delete_namespace_failure = Some(error);
        self
    }

    #[must_use]
    pub fn fail_list_pods(self, error: ClusterError) -> Self {
        self.lock().list_failure = Some(error);
        self
    }

    /// Delay every object creation, simulating a slow API server.
    #[must_use]
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.lock().create_delay = Some(delay);
        self
    }

    /// Change the node count while a wait is in progress.
    pub fn set_node_count(&self, count: usize) {
        self.lock().node_count = count;
    }

    /// Replace the snapshot of an existing pod (matched by name).
    pub fn update_pod(&self, namespace: &str, pod: PodSnapshot) {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .pods
            .get_mut(namespace)
            .and_then(|pods| pods.iter_mut().find(|p| p.snapshot.name == pod.name))
        {
            existing.target = pod.phase;
            existing.remaining_lag = 0;
            existing.snapshot = pod;
        }
    }

    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.lock().namespaces.contains(namespace)
    }

    /// Objects created in `namespace`, ordered by kind, then name.
    pub fn objects_in(&self, namespace: &str) -> Vec<ResourceDescriptor> {
        self.lock()
            .objects
            .get(namespace)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Option<ResourceDescriptor> {
        self.lock()
            .objects
            .get(namespace)
            .and_then(|objects| objects.get(&(kind, name.to_string())))
            .cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn create_namespace_calls(&self) -> usize {
        self.create_namespace_calls.load(Ordering::SeqCst)
    }

    pub fn delete_namespace_calls(&self) -> usize {
        self.delete_namespace_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn node_calls(&self) -> usize {
        self.node_calls.load(Ordering::SeqCst)
    }
}

fn not_found(kind: &str, name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.create_namespace_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if let Some(error) = inner.create_namespace_failure.clone() {
            return Err(error);
        }
        if !inner.namespaces.insert(name.to_string()) {
            return Err(ClusterError::AlreadyExists {
                kind: "Namespace".to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.delete_namespace_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if let Some(error) = inner.delete_namespace_failure.clone() {
            return Err(error);
        }
        if !inner.namespaces.remove(name) {
            return Err(not_found("Namespace", name));
        }
        inner.objects.remove(name);
        inner.pods.remove(name);
        inner.logs.retain(|(namespace, _), _| namespace != name);
        Ok(())
    }

    async fn create(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
    ) -> Result<(), ClusterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.lock().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        if let Some(error) = inner.create_failures.get(&descriptor.name).cloned() {
            return Err(error);
        }
        if !inner.namespaces.contains(namespace) {
            return Err(not_found("Namespace", namespace));
        }

        let key = (descriptor.kind(), descriptor.name.clone());
        let objects = inner.objects.entry(namespace.to_string()).or_default();
        if objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: descriptor.kind().as_str().to_string(),
                name: descriptor.name.clone(),
            });
        }
        objects.insert(key, descriptor.clone());

        let lag = inner.pod_lag;
        let spawned = match &descriptor.spec {
            WorkloadSpec::Pod(container) => Some((
                descriptor.name.clone(),
                container.container_name.clone(),
                PodPhase::Running,
            )),
            WorkloadSpec::Job(container) => {
                let target = inner
                    .job_outcomes
                    .get(&descriptor.name)
                    .copied()
                    .unwrap_or(PodPhase::Succeeded);
                if let Some(logs) = inner.job_logs.get(&descriptor.name).cloned() {
                    inner
                        .logs
                        .insert((namespace.to_string(), job_pod_name(&descriptor.name)), logs);
                }
                Some((
                    job_pod_name(&descriptor.name),
                    container.container_name.clone(),
                    target,
                ))
            }
            WorkloadSpec::Service(_) | WorkloadSpec::LogSink(_) => None,
        };

        if let Some((pod_name, container_name, target)) = spawned {
            let mut snapshot = PodSnapshot::new(pod_name, PodPhase::Pending)
                .with_container(container_name, false);
            snapshot.labels = descriptor.labels.clone();
            let mut pod = MockPod {
                snapshot,
                target,
                remaining_lag: lag,
            };
            if lag == 0 {
                pod.observe();
            }
            inner.pods.entry(namespace.to_string()).or_default().push(pod);
        }
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodSnapshot>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if let Some(error) = inner.list_failure.clone() {
            return Err(error);
        }
        let Some(pods) = inner.pods.get_mut(namespace) else {
            return Ok(Vec::new());
        };
        Ok(pods
            .iter_mut()
            .filter(|pod| selector.matches(&pod.snapshot.labels))
            .map(|pod| {
                let current = pod.snapshot.clone();
                pod.observe();
                current
            })
            .collect())
    }

    async fn count_nodes(&self) -> Result<usize, ClusterError> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().node_count)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<Vec<u8>, ClusterError> {
        let inner = self.lock();
        let exists = inner
            .pods
            .get(namespace)
            .is_some_and(|pods| pods.iter().any(|p| p.snapshot.name == pod));
        if !exists {
            return Err(not_found("Pod", pod));
        }
        Ok(inner
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::resources::{ContainerSpec, ServiceSpec};

    fn job(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(name, WorkloadSpec::Job(ContainerSpec::new(name, "img")))
            .with_label("app", name)
    }

    #[tokio::test]
    async fn test_namespace_lifecycle() {
        let cluster = MockCluster::new();

        cluster.create_namespace("ns").await.unwrap();
        assert!(cluster.create_namespace("ns").await.unwrap_err().is_already_exists());

        cluster.delete_namespace("ns").await.unwrap();
        assert!(cluster.delete_namespace("ns").await.unwrap_err().is_not_found());
        assert_eq!(cluster.delete_namespace_calls(), 2);
    }

    #[tokio::test]
    async fn test_pods_settle_after_lag() {
        let cluster = MockCluster::new().with_namespace("ns").with_pod_lag(2);
        cluster.create("ns", &job("emitter")).await.unwrap();
        let selector = LabelSelector::app("emitter");

        let phases: Vec<PodPhase> = {
            let mut phases = Vec::new();
            for _ in 0..4 {
                let pods = cluster.list_pods("ns", &selector).await.unwrap();
                phases.push(pods.first().unwrap().phase);
            }
            phases
        };

        assert_eq!(
            phases,
            vec![
                PodPhase::Pending,
                PodPhase::Pending,
                PodPhase::Pending,
                PodPhase::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn test_job_logs_follow_job_pod() {
        let cluster = MockCluster::new()
            .with_namespace("ns")
            .with_job_logs("observer", "Logs Received: 10\n");
        cluster.create("ns", &job("observer")).await.unwrap();

        let logs = cluster
            .pod_logs("ns", &job_pod_name("observer"))
            .await
            .unwrap();
        assert_eq!(logs, b"Logs Received: 10\n");
        assert!(cluster.pod_logs("ns", "missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_service_and_pod_may_share_a_name() {
        let cluster = MockCluster::new().with_namespace("ns");
        let service = ResourceDescriptor::new(
            "receiver",
            WorkloadSpec::Service(ServiceSpec {
                ports: Vec::new(),
                selector: BTreeMap::new(),
            }),
        )
        .with_label("app", "receiver");
        let pod = ResourceDescriptor::new(
            "receiver",
            WorkloadSpec::Pod(ContainerSpec::new("receiver", "img")),
        )
        .with_label("app", "receiver");

        cluster.create("ns", &service).await.unwrap();
        cluster.create("ns", &pod).await.unwrap();
        assert!(cluster.create("ns", &pod).await.unwrap_err().is_already_exists());

        assert_eq!(cluster.objects_in("ns").len(), 2);
        assert!(cluster.object("ns", ResourceKind::Service, "receiver").is_some());
        assert!(cluster.object("ns", ResourceKind::Pod, "receiver").is_some());
        let pods = cluster
            .list_pods("ns", &LabelSelector::app("receiver"))
            .await
            .unwrap();
        assert_eq!(pods.len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_namespace_removes_pods() {
        let cluster = MockCluster::new().with_namespace("ns");
        cluster.create("ns", &job("emitter")).await.unwrap();
        cluster.delete_namespace("ns").await.unwrap();

        let pods = cluster
            .list_pods("ns", &LabelSelector::new())
            .await
            .unwrap();
        assert!(pods.is_empty());
        assert!(cluster.objects_in("ns").is_empty());
    }
}
