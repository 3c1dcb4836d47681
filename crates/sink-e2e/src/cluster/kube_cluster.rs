//! [`ClusterClient`] backed by a real API server.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Namespace, Node, Pod, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use kube::Client;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{ClusterClient, ClusterError, ContainerReadiness, LabelSelector, PodPhase, PodSnapshot};
use crate::resources::{ContainerSpec, ResourceDescriptor, WorkloadSpec};

/// API group of the log sink custom resource.
pub const LOG_SINK_GROUP: &str = "observability.knative.dev";

/// API version of the log sink custom resource.
pub const LOG_SINK_VERSION: &str = "v1alpha1";

/// Label stamped on the namespace so stray test namespaces are identifiable.
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to find cluster credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    /// Explicit kubeconfig file. When unset, configuration is inferred
    /// (`$KUBECONFIG`, `~/.kube/config`, then in-cluster).
    pub kubeconfig: Option<PathBuf>,
    /// Cluster entry to use instead of the current context's.
    pub cluster: Option<String>,
}

/// Kubernetes-backed cluster client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Build a client from `settings`.
    pub async fn connect(settings: &ClientSettings) -> Result<Self, ClusterError> {
        let options = KubeConfigOptions {
            context: None,
            cluster: settings.cluster.clone(),
            user: None,
        };

        let mut config = match &settings.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ClusterError::Transport(format!(
                        "Failed to read kubeconfig {}: {e}",
                        path.display()
                    ))
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| {
                        ClusterError::Transport(format!("Failed to load kubeconfig: {e}"))
                    })?
            }
            None if settings.cluster.is_some() => kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ClusterError::Transport(format!("Failed to load kubeconfig: {e}")))?,
            None => kube::Config::infer().await.map_err(|e| {
                ClusterError::Transport(format!("Failed to infer cluster config: {e}"))
            })?,
        };

        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        let client = Client::try_from(config)
            .map_err(|e| ClusterError::Transport(format!("Failed to create client: {e}")))?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn create_object<K>(&self, namespace: &str, object: &K) -> Result<(), ClusterError>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + serde::de::DeserializeOwned
            + serde::Serialize
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = object.meta().name.clone().unwrap_or_default();
        api.create(&PostParams::default(), object)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(&K::kind(&()), &name, e))
    }
}

/// `ApiResource` of the log sink custom resource.
pub fn log_sink_resource() -> ApiResource {
    ApiResource {
        group: LOG_SINK_GROUP.to_string(),
        version: LOG_SINK_VERSION.to_string(),
        api_version: format!("{LOG_SINK_GROUP}/{LOG_SINK_VERSION}"),
        kind: "LogSink".to_string(),
        plural: "logsinks".to_string(),
    }
}

fn map_kube_error(kind: &str, name: &str, error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(response) if response.code == 409 => ClusterError::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 404 => ClusterError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) => ClusterError::Api {
            code: response.code,
            message: response.message,
        },
        other => ClusterError::Transport(other.to_string()),
    }
}

fn metadata(name: &str, labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: (!labels.is_empty()).then(|| labels.clone()),
        ..Default::default()
    }
}

fn container(spec: &ContainerSpec) -> Container {
    Container {
        name: spec.container_name.clone(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        env: (!spec.env.is_empty()).then(|| {
            spec.env
                .iter()
                .map(|var| EnvVar {
                    name: var.name.clone(),
                    value: Some(var.value.clone()),
                    ..Default::default()
                })
                .collect()
        }),
        ports: (!spec.ports.is_empty()).then(|| {
            spec.ports
                .iter()
                .map(|port| ContainerPort {
                    name: Some(port.name.clone()),
                    container_port: i32::from(port.port),
                    ..Default::default()
                })
                .collect()
        }),
        ..Default::default()
    }
}

fn pod_snapshot(pod: Pod) -> PodSnapshot {
    let status = pod.status.unwrap_or_default();
    PodSnapshot {
        name: pod.metadata.name.unwrap_or_default(),
        labels: pod.metadata.labels.unwrap_or_default(),
        phase: status
            .phase
            .as_deref()
            .map_or(PodPhase::Unknown, PodPhase::from),
        containers: status
            .container_statuses
            .unwrap_or_default()
            .into_iter()
            .map(|s| ContainerReadiness {
                name: s.name,
                ready: s.ready,
            })
            .collect(),
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    #[instrument(skip(self))]
    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), "sink-e2e".to_string());
        let namespace = Namespace {
            metadata: metadata(name, &labels),
            ..Default::default()
        };
        api.create(&PostParams::default(), &namespace)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error("Namespace", name, e))
    }

    #[instrument(skip(self))]
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error("Namespace", name, e))
    }

    #[instrument(
        skip(self, descriptor),
        fields(kind = %descriptor.kind(), name = %descriptor.name)
    )]
    async fn create(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
    ) -> Result<(), ClusterError> {
        let meta = metadata(&descriptor.name, &descriptor.labels);
        match &descriptor.spec {
            WorkloadSpec::Service(spec) => {
                let service = Service {
                    metadata: meta,
                    spec: Some(ServiceSpec {
                        ports: Some(
                            spec.ports
                                .iter()
                                .map(|port| ServicePort {
                                    name: Some(port.name.clone()),
                                    port: i32::from(port.port),
                                    ..Default::default()
                                })
                                .collect(),
                        ),
                        selector: Some(spec.selector.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                self.create_object(namespace, &service).await
            }
            WorkloadSpec::Pod(spec) => {
                let pod = Pod {
                    metadata: meta,
                    spec: Some(PodSpec {
                        containers: vec![container(spec)],
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                self.create_object(namespace, &pod).await
            }
            WorkloadSpec::Job(spec) => {
                let job = Job {
                    metadata: meta,
                    spec: Some(JobSpec {
                        template: PodTemplateSpec {
                            metadata: Some(ObjectMeta {
                                labels: Some(descriptor.labels.clone()),
                                ..Default::default()
                            }),
                            spec: Some(PodSpec {
                                restart_policy: Some("Never".to_string()),
                                containers: vec![container(spec)],
                                ..Default::default()
                            }),
                        },
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                self.create_object(namespace, &job).await
            }
            WorkloadSpec::LogSink(spec) => {
                let resource = log_sink_resource();
                let data = serde_json::json!({ "spec": spec });
                let mut sink = DynamicObject::new(&descriptor.name, &resource)
                    .within(namespace)
                    .data(data);
                sink.metadata.labels = meta.labels;

                let api: Api<DynamicObject> =
                    Api::namespaced_with(self.client.clone(), namespace, &resource);
                api.create(&PostParams::default(), &sink)
                    .await
                    .map(|_| ())
                    .map_err(|e| map_kube_error("LogSink", &descriptor.name, e))
            }
        }
    }

    #[instrument(skip(self, selector), fields(selector = %selector))]
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodSnapshot>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        let pods = api
            .list(&params)
            .await
            .map_err(|e| map_kube_error("Pod", "", e))?;
        debug!(count = pods.items.len(), "Listed pods");
        Ok(pods.items.into_iter().map(pod_snapshot).collect())
    }

    #[instrument(skip(self))]
    async fn count_nodes(&self) -> Result<usize, ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error("Node", "", e))?;
        Ok(nodes.items.len())
    }

    #[instrument(skip(self))]
    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<Vec<u8>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.logs(pod, &LogParams::default())
            .await
            .map(String::into_bytes)
            .map_err(|e| map_kube_error("Pod", pod, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ContainerSpec;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};

    #[test]
    fn test_log_sink_resource() {
        let resource = log_sink_resource();
        assert_eq!(resource.api_version, "observability.knative.dev/v1alpha1");
        assert_eq!(resource.plural, "logsinks");
        assert_eq!(resource.kind, "LogSink");
    }

    #[test]
    fn test_container_omits_empty_lists() {
        let bare = container(&ContainerSpec::new("emitter", "ubuntu:xenial"));
        assert_eq!(bare.image.as_deref(), Some("ubuntu:xenial"));
        assert!(bare.command.is_none());
        assert!(bare.env.is_none());
        assert!(bare.ports.is_none());

        let full = container(
            &ContainerSpec::new("receiver", "receiver:v1")
                .with_command(["bash", "-c", "true"])
                .with_env("SYSLOG_PORT", "24903")
                .with_port("syslog-port", 24903),
        );
        assert_eq!(full.command.map(|c| c.len()), Some(3));
        assert_eq!(
            full.ports.and_then(|p| p.first().map(|p| p.container_port)),
            Some(24903)
        );
    }

    #[test]
    fn test_pod_snapshot_conversion() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "fluent-bit-ds".to_string());
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("fluent-bit-abc".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "fluent-bit".to_string(),
                    ready: true,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snapshot = pod_snapshot(pod);
        assert_eq!(snapshot.name, "fluent-bit-abc");
        assert_eq!(snapshot.label("app"), Some("fluent-bit-ds"));
        assert_eq!(snapshot.phase, PodPhase::Running);
        assert!(snapshot.is_ready());
    }

    #[test]
    fn test_pod_without_status_is_unknown_and_not_ready() {
        let snapshot = pod_snapshot(Pod::default());
        assert_eq!(snapshot.phase, PodPhase::Unknown);
        assert!(!snapshot.is_ready());
    }
}
