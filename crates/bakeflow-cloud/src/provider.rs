//! Cloud provider trait definitions
//!
//! Each capability the pipeline needs is its own narrow trait so steps can
//! depend on exactly what they call and tests can fake one concern at a time.

use crate::capture::CaptureTemplate;
use crate::error::Result;
use crate::model::{
    CaptureParameters, DeploymentOperation, DeploymentSpec, GalleryImageVersionSpec,
    ManagedImageSpec, SnapshotSpec, Tags, VirtualMachine, VirtualNetworkSummary,
};
use crate::operation::{OperationStatus, PendingOperation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Observes long-running operations started by the other clients.
#[async_trait]
pub trait OperationClient: Send + Sync {
    /// One status check
    async fn status(&self, operation: &PendingOperation) -> Result<OperationStatus>;

    /// The output document of a finished operation, if it carries one
    async fn output(&self, operation: &PendingOperation) -> Result<Option<serde_json::Value>>;
}

#[async_trait]
pub trait ResourceGroupClient: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool>;

    async fn create_or_update(&self, name: &str, location: &str, tags: &Tags) -> Result<()>;

    /// Location of an existing group
    async fn location(&self, name: &str) -> Result<String>;

    async fn begin_delete(&self, name: &str) -> Result<PendingOperation>;
}

#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Server-side validation without creating anything
    async fn validate(
        &self,
        resource_group: &str,
        deployment: &str,
        spec: &DeploymentSpec,
    ) -> Result<()>;

    async fn begin_create(
        &self,
        resource_group: &str,
        deployment: &str,
        spec: &DeploymentSpec,
    ) -> Result<PendingOperation>;

    async fn list_operations(
        &self,
        resource_group: &str,
        deployment: &str,
    ) -> Result<Vec<DeploymentOperation>>;

    /// Delete the deployment record; its resources are not touched
    async fn begin_delete(&self, resource_group: &str, deployment: &str)
    -> Result<PendingOperation>;
}

/// Generic access to any resource by id.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn begin_delete_by_id(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> Result<PendingOperation>;
}

#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn get_virtual_machine(&self, resource_group: &str, name: &str)
    -> Result<VirtualMachine>;

    /// Stop and deallocate
    async fn begin_power_off(&self, resource_group: &str, name: &str) -> Result<PendingOperation>;

    async fn generalize(&self, resource_group: &str, name: &str) -> Result<()>;

    async fn begin_capture(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &CaptureParameters,
    ) -> Result<PendingOperation>;

    async fn image_exists(&self, resource_group: &str, name: &str) -> Result<bool>;

    async fn begin_create_image(
        &self,
        resource_group: &str,
        name: &str,
        spec: &ManagedImageSpec,
    ) -> Result<PendingOperation>;

    async fn begin_delete_disk(&self, resource_group: &str, name: &str)
    -> Result<PendingOperation>;

    async fn begin_create_snapshot(
        &self,
        resource_group: &str,
        name: &str,
        spec: &SnapshotSpec,
    ) -> Result<PendingOperation>;

    async fn gallery_image_exists(
        &self,
        resource_group: &str,
        gallery: &str,
        image: &str,
    ) -> Result<bool>;

    async fn begin_create_gallery_image_version(
        &self,
        spec: &GalleryImageVersionSpec,
    ) -> Result<PendingOperation>;
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Every virtual network in the subscription
    async fn list_virtual_networks(&self) -> Result<Vec<VirtualNetworkSummary>>;

    async fn public_ip_address(&self, resource_group: &str, name: &str) -> Result<String>;

    async fn nic_private_ip_address(&self, resource_group: &str, nic: &str) -> Result<String>;
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()>;

    /// A read-only URL for the blob that expires at `expiry`
    async fn read_only_url(&self, blob_uri: &str, expiry: DateTime<Utc>) -> Result<String>;
}

#[async_trait]
pub trait KeyVaultClient: Send + Sync {
    /// Versioned URL of a secret stored in a vault
    async fn secret_url(&self, resource_group: &str, vault: &str, secret: &str) -> Result<String>;
}

/// A complete provider implementing every capability.
#[async_trait]
pub trait CloudProvider:
    OperationClient
    + ResourceGroupClient
    + DeploymentClient
    + ResourceClient
    + ComputeClient
    + NetworkClient
    + StorageClient
    + KeyVaultClient
{
    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Subscription every request is scoped to
    fn subscription_id(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/subscription information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// The set of clients handed to steps.
#[derive(Clone)]
pub struct CloudClients {
    pub subscription_id: String,
    pub operations: Arc<dyn OperationClient>,
    pub resource_groups: Arc<dyn ResourceGroupClient>,
    pub deployments: Arc<dyn DeploymentClient>,
    pub resources: Arc<dyn ResourceClient>,
    pub compute: Arc<dyn ComputeClient>,
    pub network: Arc<dyn NetworkClient>,
    pub storage: Arc<dyn StorageClient>,
    pub key_vault: Arc<dyn KeyVaultClient>,
}

impl CloudClients {
    pub fn from_provider<P: CloudProvider + 'static>(provider: Arc<P>) -> Self {
        Self {
            subscription_id: provider.subscription_id().to_string(),
            operations: provider.clone(),
            resource_groups: provider.clone(),
            deployments: provider.clone(),
            resources: provider.clone(),
            compute: provider.clone(),
            network: provider.clone(),
            storage: provider.clone(),
            key_vault: provider,
        }
    }

    /// Fetch the capture template produced by a finished capture operation.
    pub async fn capture_template(
        &self,
        operation: &PendingOperation,
    ) -> anyhow::Result<Option<CaptureTemplate>> {
        match self.operations.output(operation).await? {
            Some(value) => Ok(Some(CaptureTemplate::from_value(value)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for CloudClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClients")
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}
