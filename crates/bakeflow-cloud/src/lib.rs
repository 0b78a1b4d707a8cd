//! bakeflow cloud boundary
//!
//! This crate defines the narrow set of provider capabilities the image
//! pipeline depends on, the resource model exchanged across that boundary
//! and the parsing of provider error payloads.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                bakeflow-builder                  │
//! │          (steps, resolver, build driver)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Arc<dyn ...Client>
//! ┌─────────────────▼───────────────────────────────┐
//! │                 bakeflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider: ResourceGroupClient │   │
//! │  │    + DeploymentClient + ComputeClient ... │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐     │
//! │  │ ErrorResponse│  │ PendingOperation      │     │
//! │  └──────────────┘  └──────────────────────┘     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │ azure (ARM REST)│
//!           └────────────────┘
//! ```

pub mod capture;
pub mod error;
pub mod error_response;
pub mod model;
pub mod operation;
pub mod provider;
pub mod resource_id;

// Re-exports
pub use capture::{CaptureDisk, CaptureOperation, CaptureTemplate};
pub use error::{CloudError, Result};
pub use error_response::ErrorResponse;
pub use model::{
    CaptureParameters, DeploymentOperation, DeploymentSpec, DiskReference,
    GalleryImageVersionSpec, ManagedImageSpec, SnapshotSpec, Tags, TargetResource,
    VirtualMachine, VirtualNetworkSummary,
};
pub use operation::{OperationState, OperationStatus, PendingOperation, PollKind};
pub use provider::{
    AuthStatus, CloudClients, CloudProvider, ComputeClient, DeploymentClient, KeyVaultClient,
    NetworkClient, OperationClient, ResourceClient, ResourceGroupClient, StorageClient,
};
pub use resource_id::ResourceId;
