use crate::error::{BuildError, Result};
use bakeflow_cloud::NetworkClient;
use bakeflow_config::BuildConfig;

/// A fully qualified network placement for the build VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTarget {
    pub virtual_network: String,
    pub resource_group: String,
    pub subnet: String,
}

/// Completes a partially specified virtual network by looking it up.
pub struct ResourceResolver<'a> {
    network: &'a dyn NetworkClient,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(network: &'a dyn NetworkClient) -> Self {
        Self { network }
    }

    /// Resolve the configured network, or `None` when the build creates its
    /// own.
    ///
    /// A name without resource group must match exactly one network in the
    /// subscription; a network without subnet must have exactly one subnet.
    pub async fn resolve(&self, config: &BuildConfig) -> Result<Option<NetworkTarget>> {
        let Some(name) = config.virtual_network_name.as_deref() else {
            return Ok(None);
        };

        if !config.needs_network_resolution() {
            return Ok(Some(NetworkTarget {
                virtual_network: name.to_string(),
                resource_group: config
                    .virtual_network_resource_group_name
                    .clone()
                    .unwrap_or_default(),
                subnet: config.virtual_network_subnet_name.clone().unwrap_or_default(),
            }));
        }

        let networks = self.network.list_virtual_networks().await?;
        let candidates: Vec<_> = networks
            .into_iter()
            .filter(|n| n.name == name)
            .filter(|n| match &config.virtual_network_resource_group_name {
                Some(group) => n.resource_group.eq_ignore_ascii_case(group),
                None => true,
            })
            .collect();

        let network = match candidates.len() {
            0 => return Err(BuildError::VirtualNetworkNotFound(name.to_string())),
            1 => &candidates[0],
            count => {
                return Err(BuildError::AmbiguousVirtualNetwork {
                    name: name.to_string(),
                    count,
                });
            }
        };

        let subnet = match &config.virtual_network_subnet_name {
            Some(subnet) => subnet.clone(),
            None => match network.subnets.as_slice() {
                [] => return Err(BuildError::SubnetNotFound(name.to_string())),
                [only] => only.clone(),
                many => {
                    return Err(BuildError::AmbiguousSubnet {
                        network: name.to_string(),
                        count: many.len(),
                    });
                }
            },
        };

        tracing::info!(
            "Resolved virtual network '{}' in resource group '{}' (subnet '{}')",
            name,
            network.resource_group,
            subnet
        );

        Ok(Some(NetworkTarget {
            virtual_network: name.to_string(),
            resource_group: network.resource_group.clone(),
            subnet,
        }))
    }
}
