//! Network lookups

use crate::api_version;
use crate::error::{AzureError, Result};
use crate::provider::AzureProvider;
use async_trait::async_trait;
use bakeflow_cloud::{NetworkClient, ResourceId, VirtualNetworkSummary};
use reqwest::Method;
use serde::Deserialize;

#[derive(Deserialize)]
struct VirtualNetworkPage {
    #[serde(default)]
    value: Vec<ApiVirtualNetwork>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct ApiVirtualNetwork {
    id: String,
    name: String,
    #[serde(default)]
    properties: ApiVirtualNetworkProperties,
}

#[derive(Deserialize, Default)]
struct ApiVirtualNetworkProperties {
    #[serde(default)]
    subnets: Vec<ApiNamed>,
}

#[derive(Deserialize)]
struct ApiNamed {
    name: String,
}

pub(crate) fn parse_virtual_network_page(
    body: &str,
) -> Result<(Vec<VirtualNetworkSummary>, Option<String>)> {
    let page: VirtualNetworkPage = serde_json::from_str(body)?;
    let mut networks = Vec::with_capacity(page.value.len());
    for vnet in page.value {
        let id: ResourceId = vnet.id.parse()?;
        networks.push(VirtualNetworkSummary {
            name: vnet.name,
            resource_group: id.resource_group,
            subnets: vnet.properties.subnets.into_iter().map(|s| s.name).collect(),
        });
    }
    Ok((networks, page.next_link))
}

pub(crate) fn private_ip_of_nic(body: &str) -> Result<String> {
    let nic: serde_json::Value = serde_json::from_str(body)?;
    nic.pointer("/properties/ipConfigurations/0/properties/privateIPAddress")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AzureError::MissingField {
            field: "privateIPAddress",
            context: "network interface".to_string(),
        })
}

#[async_trait]
impl NetworkClient for AzureProvider {
    async fn list_virtual_networks(&self) -> bakeflow_cloud::Result<Vec<VirtualNetworkSummary>> {
        let mut url = self.client.url(
            &format!(
                "{}/providers/Microsoft.Network/virtualNetworks",
                self.subscription_path()
            ),
            api_version::NETWORK,
        );
        let mut networks = Vec::new();

        loop {
            let (_, _, text) = self.client.send(Method::GET, &url, None, &[]).await?;
            let (page, next) = parse_virtual_network_page(&text)?;
            networks.extend(page);
            match next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }
        Ok(networks)
    }

    async fn public_ip_address(
        &self,
        resource_group: &str,
        name: &str,
    ) -> bakeflow_cloud::Result<String> {
        let ip: serde_json::Value = self
            .client
            .get_json(
                &format!(
                    "{}/publicIPAddresses/{}",
                    self.provider_path(resource_group, "Microsoft.Network"),
                    name
                ),
                api_version::NETWORK,
            )
            .await?;
        let address = ip
            .pointer("/properties/ipAddress")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AzureError::MissingField {
                field: "ipAddress",
                context: format!("public IP address '{}'", name),
            })?;
        Ok(address.to_string())
    }

    async fn nic_private_ip_address(
        &self,
        resource_group: &str,
        nic: &str,
    ) -> bakeflow_cloud::Result<String> {
        let url = self.client.url(
            &format!(
                "{}/networkInterfaces/{}",
                self.provider_path(resource_group, "Microsoft.Network"),
                nic
            ),
            api_version::NETWORK,
        );
        let (_, _, text) = self.client.send(Method::GET, &url, None, &[]).await?;
        Ok(private_ip_of_nic(&text)?)
    }
}
