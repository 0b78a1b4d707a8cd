use crate::keys::{HOST, NIC_NAME, PUBLIC_IP_NAME, RESOURCE_GROUP_NAME};
use crate::remote::Remote;
use async_trait::async_trait;
use bakeflow_config::BuildConfig;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// How the build machine reaches the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    /// A public IP in a network created for the build
    Public,
    /// The NIC's private address inside an existing network
    Private,
    /// A public IP attached to a VM in an existing network
    PublicInPrivateNetwork,
}

impl EndpointType {
    pub fn from_config(config: &BuildConfig) -> Self {
        match (
            config.virtual_network_name.is_some(),
            config.private_virtual_network_with_public_ip,
        ) {
            (true, true) => EndpointType::PublicInPrivateNetwork,
            (true, false) => EndpointType::Private,
            (false, _) => EndpointType::Public,
        }
    }

    pub fn has_public_ip(self) -> bool {
        self != EndpointType::Private
    }
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointType::Public => write!(f, "PublicEndpoint"),
            EndpointType::Private => write!(f, "PrivateEndpoint"),
            EndpointType::PublicInPrivateNetwork => write!(f, "PublicEndpointInPrivateNetwork"),
        }
    }
}

pub struct GetIpAddress {
    remote: Remote,
    endpoint: EndpointType,
}

impl GetIpAddress {
    pub fn new(remote: Remote, endpoint: EndpointType) -> Self {
        Self { remote, endpoint }
    }
}

#[async_trait]
impl Step for GetIpAddress {
    fn name(&self) -> &str {
        "get-ip-address"
    }

    fn reads(&self) -> &[&'static str] {
        const PUBLIC: &[&str] = &[RESOURCE_GROUP_NAME.name(), PUBLIC_IP_NAME.name()];
        const PRIVATE: &[&str] = &[RESOURCE_GROUP_NAME.name(), NIC_NAME.name()];
        if self.endpoint.has_public_ip() { PUBLIC } else { PRIVATE }
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[HOST.name()];
        WRITES
    }

    async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let network = &self.remote.clients.network;

        tracing::info!("Getting the VM's IP address ({})", self.endpoint);
        let address = if self.endpoint.has_public_ip() {
            let name = state.get(PUBLIC_IP_NAME).clone();
            network.public_ip_address(&resource_group, &name).await
        } else {
            let nic = state.get(NIC_NAME).clone();
            network.nic_private_ip_address(&resource_group, &nic).await
        };

        match address {
            Ok(address) => {
                tracing::info!("IP address: {}", address);
                state.put(HOST, address);
                StepAction::Continue
            }
            Err(e) => halt(state, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;

    fn state() -> StateBag {
        let mut state = StateBag::new();
        state.put(RESOURCE_GROUP_NAME, "rg".to_string());
        state.put(PUBLIC_IP_NAME, "bkip1".to_string());
        state.put(NIC_NAME, "bkni1".to_string());
        state
    }

    #[test]
    fn test_endpoint_type_from_config() {
        let mut config = BuildConfig::default();
        assert_eq!(EndpointType::from_config(&config), EndpointType::Public);

        config.private_virtual_network_with_public_ip = true;
        assert_eq!(EndpointType::from_config(&config), EndpointType::Public);

        config.virtual_network_name = Some("shared".into());
        assert_eq!(
            EndpointType::from_config(&config),
            EndpointType::PublicInPrivateNetwork
        );

        config.private_virtual_network_with_public_ip = false;
        assert_eq!(EndpointType::from_config(&config), EndpointType::Private);
    }

    #[tokio::test]
    async fn test_public_endpoint_uses_public_ip() {
        let cloud = FakeCloud::new();
        let mut state = state();

        GetIpAddress::new(cloud.remote(), EndpointType::PublicInPrivateNetwork)
            .run(&CancellationToken::new(), &mut state)
            .await;

        assert_eq!(state.get(HOST), "52.0.0.10");
        assert_eq!(cloud.calls(), vec!["public_ip rg bkip1"]);
    }

    #[tokio::test]
    async fn test_private_endpoint_uses_nic() {
        let cloud = FakeCloud::new();
        let mut state = state();

        GetIpAddress::new(cloud.remote(), EndpointType::Private)
            .run(&CancellationToken::new(), &mut state)
            .await;

        assert_eq!(state.get(HOST), "10.0.0.4");
        assert_eq!(cloud.calls(), vec!["private_ip rg bkni1"]);
    }

    #[tokio::test]
    async fn test_lookup_failure_halts() {
        let cloud = FakeCloud::new();
        cloud.fail_on("public_ip");
        let mut state = state();

        let action = GetIpAddress::new(cloud.remote(), EndpointType::Public)
            .run(&CancellationToken::new(), &mut state)
            .await;

        assert_eq!(action, StepAction::Halt);
    }
}
