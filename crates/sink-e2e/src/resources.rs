//! Declarative descriptions of the objects a scenario submits.
//!
//! Descriptors are plain data. The cluster client turns them into concrete
//! API objects; the mock cluster stores them as-is.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Length of the random part of a generated run prefix.
const PREFIX_RANDOM_LEN: usize = 8;

/// Kind of object a descriptor creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Service,
    Pod,
    Job,
    LogSink,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Service => "Service",
            ResourceKind::Pod => "Pod",
            ResourceKind::Job => "Job",
            ResourceKind::LogSink => "LogSink",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named port on a service or container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub port: u16,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

/// Environment variable passed to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Single-container workload (pod, or the template of a job).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub container_name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<EnvVar>,
    pub ports: Vec<PortSpec>,
}

impl ContainerSpec {
    pub fn new(container_name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            image: image.into(),
            command: Vec::new(),
            env: Vec::new(),
            ports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn with_port(mut self, name: impl Into<String>, port: u16) -> Self {
        self.ports.push(PortSpec::new(name, port));
        self
    }
}

/// Service exposing pods chosen by `selector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub ports: Vec<PortSpec>,
    pub selector: BTreeMap<String, String>,
}

/// Log sink configuration consumed by the sink controller.
///
/// Serialized as the `spec` of the custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSinkSpec {
    #[serde(rename = "type")]
    pub sink_type: String,
    pub host: String,
    pub port: u16,
}

/// Kind-specific part of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadSpec {
    Service(ServiceSpec),
    Pod(ContainerSpec),
    /// Run-to-completion job (restart policy `Never`).
    Job(ContainerSpec),
    LogSink(LogSinkSpec),
}

/// Everything needed to create one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub spec: WorkloadSpec,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, spec: WorkloadSpec) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            spec,
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        match self.spec {
            WorkloadSpec::Service(_) => ResourceKind::Service,
            WorkloadSpec::Pod(_) => ResourceKind::Pod,
            WorkloadSpec::Job(_) => ResourceKind::Job,
            WorkloadSpec::LogSink(_) => ResourceKind::LogSink,
        }
    }
}

/// Run-scoped name prefix.
///
/// Every object and `app` label a scenario creates starts with this prefix,
/// so runs sharing a cluster never observe each other's workloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPrefix(String);

impl RunPrefix {
    /// Generate a fresh `e2e-xxxxxxxx-` prefix.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let random: String = id.chars().take(PREFIX_RANDOM_LEN).collect();
        Self(format!("e2e-{random}-"))
    }

    /// Use an explicit prefix.
    ///
    /// The prefix ends up at the front of service names, so it must be empty or
    /// start with a lowercase letter and contain only lowercase alphanumerics and
    /// `-`.
    pub fn parse(value: &str) -> Result<Self, String> {
        if value.is_empty() {
            return Ok(Self(String::new()));
        }
        let starts_with_letter = value.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        let valid_chars = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !starts_with_letter || !valid_chars {
            return Err(format!(
                "run prefix {value:?} must start with a lowercase letter and contain only [a-z0-9-]"
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix `name`.
    pub fn name(&self, name: &str) -> String {
        format!("{}{}", self.0, name)
    }
}

impl fmt::Display for RunPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
