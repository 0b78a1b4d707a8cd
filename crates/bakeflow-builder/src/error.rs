use bakeflow_cloud::CloudError;
use bakeflow_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("Virtual network '{0}' was not found")]
    VirtualNetworkNotFound(String),

    #[error(
        "Virtual network '{name}' is ambiguous ({count} matches), specify the resource group explicitly"
    )]
    AmbiguousVirtualNetwork { name: String, count: usize },

    #[error("Virtual network '{0}' has no subnets")]
    SubnetNotFound(String),

    #[error(
        "Virtual network '{network}' has {count} subnets, specify the subnet name explicitly"
    )]
    AmbiguousSubnet { network: String, count: usize },

    #[error("Cannot locate the resource group {0}.")]
    ResourceGroupNotFound(String),

    #[error("Cannot locate the managed image resource group {0}.")]
    ManagedImageResourceGroupNotFound(String),

    #[error("A managed image named {name} already exists in the resource group {resource_group}.")]
    ManagedImageExists {
        name: String,
        resource_group: String,
    },

    #[error("Invalid blob URL '{0}'")]
    InvalidBlobUrl(String),

    #[error("Build was cancelled.")]
    Cancelled,

    #[error("Build was halted.")]
    Halted,

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Step(#[from] anyhow::Error),
}

impl BuildError {
    /// Message with a hint on how to fix the most common failures
    pub fn user_message(&self) -> String {
        match self {
            BuildError::AmbiguousVirtualNetwork { name, .. } => format!(
                "{}\n\n\
                 Set virtual_network_resource_group_name to the group that \
                 holds the '{}' network you want to build in.",
                self, name
            ),
            BuildError::ManagedImageExists { .. } => format!(
                "{}\n\n\
                 Delete the existing image or choose another managed_image_name.",
                self
            ),
            BuildError::Cloud(CloudError::AuthenticationFailed(_)) => format!(
                "{}\n\n\
                 Pass a fresh Resource Manager token with --access-token or \
                 BAKEFLOW_ACCESS_TOKEN.",
                self
            ),
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
