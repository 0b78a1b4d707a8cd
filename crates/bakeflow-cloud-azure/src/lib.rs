//! Azure Resource Manager provider for bakeflow
//!
//! Implements every `bakeflow-cloud` client trait against the Resource
//! Manager REST API with a caller-supplied bearer token.
//!
//! # Example
//!
//! ```ignore
//! use bakeflow_cloud::{CloudClients, CloudProvider};
//! use bakeflow_cloud_azure::{AzureConfig, AzureProvider};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(AzureProvider::new(AzureConfig {
//!     subscription_id: "00000000-0000-0000-0000-000000000000".into(),
//!     access_token: token,
//!     environment: CloudEnvironment::from_name("Public")?,
//!     storage_account: None,
//!     storage_resource_group: None,
//! })?);
//!
//! let auth = provider.check_auth().await?;
//! let clients = CloudClients::from_provider(provider);
//! ```

pub mod api_version;
pub mod client;
pub mod compute;
pub mod error;
pub mod network;
pub mod provider;
pub mod storage;

pub use client::ArmClient;
pub use error::{AzureError, Result};
pub use provider::{AzureConfig, AzureProvider};
pub use storage::split_blob_url;
