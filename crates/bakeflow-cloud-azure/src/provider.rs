//! Azure provider implementation

use crate::api_version;
use crate::client::ArmClient;
use crate::error::Result;
use async_trait::async_trait;
use bakeflow_cloud::{
    AuthStatus, CloudProvider, DeploymentClient, DeploymentOperation, DeploymentSpec,
    OperationClient, OperationStatus, PendingOperation, ResourceClient, ResourceGroupClient, Tags,
    TargetResource,
};
use bakeflow_config::CloudEnvironment;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

/// Connection settings for [`AzureProvider`]
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub subscription_id: String,
    pub access_token: String,
    pub environment: CloudEnvironment,
    /// Storage account holding captured VHDs
    pub storage_account: Option<String>,
    /// Resource group of `storage_account`
    pub storage_resource_group: Option<String>,
}

/// Azure Resource Manager provider
pub struct AzureProvider {
    pub(crate) client: ArmClient,
    pub(crate) config: AzureConfig,
}

impl AzureProvider {
    pub fn new(config: AzureConfig) -> Result<Self> {
        Ok(Self {
            client: ArmClient::new(
                &config.environment.resource_manager_endpoint,
                config.access_token.clone(),
            )?,
            config,
        })
    }

    pub fn client(&self) -> &ArmClient {
        &self.client
    }

    pub(crate) fn subscription_path(&self) -> String {
        format!("/subscriptions/{}", self.config.subscription_id)
    }

    pub(crate) fn group_path(&self, resource_group: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}",
            self.config.subscription_id, resource_group
        )
    }

    pub(crate) fn provider_path(&self, resource_group: &str, provider: &str) -> String {
        format!("{}/providers/{}", self.group_path(resource_group), provider)
    }

    fn deployment_path(&self, resource_group: &str, deployment: &str) -> String {
        format!(
            "{}/deployments/{}",
            self.provider_path(resource_group, "Microsoft.Resources"),
            deployment
        )
    }
}

#[async_trait]
impl OperationClient for AzureProvider {
    async fn status(&self, operation: &PendingOperation) -> bakeflow_cloud::Result<OperationStatus> {
        Ok(self.client.status(operation).await?)
    }

    async fn output(
        &self,
        operation: &PendingOperation,
    ) -> bakeflow_cloud::Result<Option<serde_json::Value>> {
        Ok(self.client.output(operation).await?)
    }
}

#[derive(Deserialize)]
struct ResourceGroupBody {
    location: String,
}

#[async_trait]
impl ResourceGroupClient for AzureProvider {
    async fn exists(&self, name: &str) -> bakeflow_cloud::Result<bool> {
        let url = self.client.url(&self.group_path(name), api_version::RESOURCES);
        let (status, _, _) = self
            .client
            .send(Method::HEAD, &url, None, &[StatusCode::NOT_FOUND])
            .await?;
        Ok(status == StatusCode::NO_CONTENT || status == StatusCode::OK)
    }

    async fn create_or_update(
        &self,
        name: &str,
        location: &str,
        tags: &Tags,
    ) -> bakeflow_cloud::Result<()> {
        let url = self.client.url(&self.group_path(name), api_version::RESOURCES);
        let body = serde_json::json!({ "location": location, "tags": tags });
        self.client.send(Method::PUT, &url, Some(&body), &[]).await?;
        Ok(())
    }

    async fn location(&self, name: &str) -> bakeflow_cloud::Result<String> {
        let group: ResourceGroupBody = self
            .client
            .get_json(&self.group_path(name), api_version::RESOURCES)
            .await?;
        Ok(group.location)
    }

    async fn begin_delete(&self, name: &str) -> bakeflow_cloud::Result<PendingOperation> {
        Ok(self
            .client
            .begin(
                Method::DELETE,
                &self.group_path(name),
                api_version::RESOURCES,
                None,
                format!("delete resource group '{}'", name),
            )
            .await?)
    }
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDeploymentOperation {
    #[serde(default)]
    operation_id: String,
    properties: ApiDeploymentOperationProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDeploymentOperationProperties {
    #[serde(default)]
    provisioning_operation: String,
    #[serde(default)]
    provisioning_state: String,
    target_resource: Option<ApiTargetResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTargetResource {
    id: String,
    resource_type: String,
    resource_name: String,
}

pub(crate) fn parse_deployment_operations(body: &str) -> Result<(Vec<DeploymentOperation>, Option<String>)> {
    let list: ListResponse<ApiDeploymentOperation> = serde_json::from_str(body)?;
    let operations = list
        .value
        .into_iter()
        .map(|op| DeploymentOperation {
            operation_id: op.operation_id,
            provisioning_operation: op.properties.provisioning_operation,
            provisioning_state: op.properties.provisioning_state,
            target_resource: op.properties.target_resource.map(|t| TargetResource {
                id: t.id,
                resource_type: t.resource_type,
                resource_name: t.resource_name,
            }),
        })
        .collect();
    Ok((operations, list.next_link))
}

#[async_trait]
impl DeploymentClient for AzureProvider {
    async fn validate(
        &self,
        resource_group: &str,
        deployment: &str,
        spec: &DeploymentSpec,
    ) -> bakeflow_cloud::Result<()> {
        let path = format!("{}/validate", self.deployment_path(resource_group, deployment));
        let body = spec.to_request_body();
        let (status, _, text) = self
            .client
            .send(
                Method::POST,
                &self.client.url(&path, api_version::RESOURCES),
                Some(&body),
                &[],
            )
            .await?;

        // A 200 may still carry a validation error document
        if let Some(error) = bakeflow_cloud::ErrorResponse::parse(&text) {
            return Err(bakeflow_cloud::CloudError::Api {
                status: status.as_u16(),
                message: format!("validation of deployment '{}' failed", deployment),
                response: Some(error),
            });
        }
        Ok(())
    }

    async fn begin_create(
        &self,
        resource_group: &str,
        deployment: &str,
        spec: &DeploymentSpec,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        Ok(self
            .client
            .begin(
                Method::PUT,
                &self.deployment_path(resource_group, deployment),
                api_version::RESOURCES,
                Some(&spec.to_request_body()),
                format!("deployment '{}'", deployment),
            )
            .await?)
    }

    async fn list_operations(
        &self,
        resource_group: &str,
        deployment: &str,
    ) -> bakeflow_cloud::Result<Vec<DeploymentOperation>> {
        let path = format!("{}/operations", self.deployment_path(resource_group, deployment));
        let mut url = self.client.url(&path, api_version::RESOURCES);
        let mut operations = Vec::new();

        loop {
            let (_, _, text) = self.client.send(Method::GET, &url, None, &[]).await?;
            let (page, next) = parse_deployment_operations(&text)?;
            operations.extend(page);
            match next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }
        Ok(operations)
    }

    async fn begin_delete(
        &self,
        resource_group: &str,
        deployment: &str,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        Ok(self
            .client
            .begin(
                Method::DELETE,
                &self.deployment_path(resource_group, deployment),
                api_version::RESOURCES,
                None,
                format!("delete deployment '{}'", deployment),
            )
            .await?)
    }
}

#[async_trait]
impl ResourceClient for AzureProvider {
    async fn begin_delete_by_id(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        Ok(self
            .client
            .begin(
                Method::DELETE,
                resource_id,
                api_version::for_resource_type(resource_type),
                None,
                format!("delete {}", resource_id),
            )
            .await?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionBody {
    display_name: Option<String>,
    subscription_id: String,
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    fn subscription_id(&self) -> &str {
        &self.config.subscription_id
    }

    async fn check_auth(&self) -> bakeflow_cloud::Result<AuthStatus> {
        match self
            .client
            .get_json::<SubscriptionBody>(&self.subscription_path(), api_version::SUBSCRIPTIONS)
            .await
        {
            Ok(subscription) => Ok(AuthStatus::ok(
                subscription
                    .display_name
                    .unwrap_or(subscription.subscription_id),
            )),
            Err(e) => Ok(AuthStatus::failed(bakeflow_cloud::CloudError::from(e).to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_provider() -> AzureProvider {
    AzureProvider::new(AzureConfig {
        subscription_id: "sub-1".to_string(),
        access_token: "token".to_string(),
        environment: CloudEnvironment::from_name("Public").unwrap(),
        storage_account: Some("bakeimages".to_string()),
        storage_resource_group: Some("images".to_string()),
    })
    .unwrap()
}
