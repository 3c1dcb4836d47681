//! Idempotent object creation in the fixture namespace.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::error::E2eError;
use crate::resources::ResourceDescriptor;

/// What a create call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    /// Left behind by an earlier run; reused as-is.
    AlreadyExisted,
}

/// Creates objects in one namespace.
///
/// Objects are write-once: an object that already exists is accepted without
/// comparing or updating its spec, which lets a scenario re-enter after a run
/// that died half-way.
pub struct Provisioner<C: ?Sized> {
    client: Arc<C>,
    namespace: String,
}

impl<C: ClusterClient + ?Sized> Provisioner<C> {
    pub fn new(client: Arc<C>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Submit `descriptor`.
    ///
    /// # Errors
    ///
    /// `E2eError::Provisioning` for any failure other than "already exists". The
    /// error names no step; the scenario attributes it to the step it runs in.
    pub async fn create(&self, descriptor: &ResourceDescriptor) -> Result<Provisioned, E2eError> {
        let kind = descriptor.kind();
        match self.client.create(&self.namespace, descriptor).await {
            Ok(()) => {
                info!(
                    namespace = %self.namespace,
                    kind = %kind,
                    name = %descriptor.name,
                    "Created object"
                );
                Ok(Provisioned::Created)
            }
            Err(e) if e.is_already_exists() => {
                info!(
                    namespace = %self.namespace,
                    kind = %kind,
                    name = %descriptor.name,
                    "Object already exists, reusing"
                );
                Ok(Provisioned::AlreadyExisted)
            }
            Err(source) => {
                warn!(
                    namespace = %self.namespace,
                    kind = %kind,
                    name = %descriptor.name,
                    error = %source,
                    "Failed to create object"
                );
                Err(E2eError::Provisioning {
                    step: None,
                    kind: kind.as_str(),
                    name: descriptor.name.clone(),
                    source,
                })
            }
        }
    }
}
