//! Blob storage and key vault access through Resource Manager
//!
//! Blob operations use short-lived service SAS tokens issued by the storage
//! account's `ListServiceSas` action, so the Resource Manager token is the
//! only credential needed.

use crate::api_version;
use crate::error::{AzureError, Result};
use crate::provider::AzureProvider;
use async_trait::async_trait;
use bakeflow_cloud::{KeyVaultClient, StorageClient};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::{Method, StatusCode, Url};

const BLOB_SERVICE_VERSION: &str = "2021-08-06";

/// Container and blob path of a blob URL
pub fn split_blob_url(blob_uri: &str) -> Result<(String, String, String)> {
    let url = Url::parse(blob_uri).map_err(|e| AzureError::InvalidUrl(format!("{}: {}", blob_uri, e)))?;
    let account = url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AzureError::InvalidUrl(blob_uri.to_string()))?;

    let path = url.path().trim_start_matches('/');
    match path.split_once('/') {
        Some((container, blob)) if !container.is_empty() && !blob.is_empty() => Ok((
            account.to_string(),
            container.to_string(),
            blob.to_string(),
        )),
        _ => Err(AzureError::InvalidUrl(blob_uri.to_string())),
    }
}

impl AzureProvider {
    fn storage_account(&self, operation: &'static str) -> Result<(&str, &str)> {
        match (
            self.config.storage_account.as_deref(),
            self.config.storage_resource_group.as_deref(),
        ) {
            (Some(account), Some(group)) => Ok((account, group)),
            _ => Err(AzureError::StorageAccountNotConfigured(operation)),
        }
    }

    /// Issue a blob SAS token with the given permissions.
    async fn blob_sas(
        &self,
        container: &str,
        blob: &str,
        permissions: &str,
        expiry: DateTime<Utc>,
    ) -> Result<String> {
        let (account, group) = self.storage_account("a blob SAS")?;
        let path = format!(
            "{}/storageAccounts/{}/ListServiceSas",
            self.provider_path(group, "Microsoft.Storage"),
            account
        );
        let body = serde_json::json!({
            "canonicalizedResource": format!("/blob/{}/{}/{}", account, container, blob),
            "signedResource": "b",
            "signedPermission": permissions,
            "signedProtocol": "https",
            "signedExpiry": expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let (_, _, text) = self
            .client
            .send(
                Method::POST,
                &self.client.url(&path, api_version::STORAGE),
                Some(&body),
                &[],
            )
            .await?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        value
            .get("serviceSasToken")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| AzureError::MissingField {
                field: "serviceSasToken",
                context: "ListServiceSas response".to_string(),
            })
    }

    fn blob_url(&self, account: &str, container: &str, blob: &str) -> String {
        format!(
            "{}{}/{}",
            self.config.environment.blob_endpoint(account),
            container,
            blob
        )
    }
}

#[async_trait]
impl StorageClient for AzureProvider {
    async fn delete_blob(&self, container: &str, blob: &str) -> bakeflow_cloud::Result<()> {
        let (account, _) = self.storage_account("deleting a blob")?;
        let sas = self
            .blob_sas(container, blob, "d", Utc::now() + Duration::minutes(15))
            .await?;
        let url = format!("{}?{}", self.blob_url(account, container, blob), sas);

        let response = self
            .client
            .http()
            .request(Method::DELETE, &url)
            .header("x-ms-version", BLOB_SERVICE_VERSION)
            .header("x-ms-delete-snapshots", "include")
            .send()
            .await
            .map_err(AzureError::from)?;

        let status = response.status();
        tracing::debug!("DELETE blob {}/{} -> {}", container, blob, status);
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(AzureError::Status {
            method: "DELETE".to_string(),
            url: self.blob_url(account, container, blob),
            status: status.as_u16(),
            response: None,
        }
        .into())
    }

    async fn read_only_url(
        &self,
        blob_uri: &str,
        expiry: DateTime<Utc>,
    ) -> bakeflow_cloud::Result<String> {
        let (_, container, blob) = split_blob_url(blob_uri)?;
        let sas = self.blob_sas(&container, &blob, "r", expiry).await?;
        Ok(format!("{}?{}", blob_uri, sas))
    }
}

#[async_trait]
impl KeyVaultClient for AzureProvider {
    async fn secret_url(
        &self,
        resource_group: &str,
        vault: &str,
        secret: &str,
    ) -> bakeflow_cloud::Result<String> {
        let value: serde_json::Value = self
            .client
            .get_json(
                &format!(
                    "{}/vaults/{}/secrets/{}",
                    self.provider_path(resource_group, "Microsoft.KeyVault"),
                    vault,
                    secret
                ),
                api_version::KEY_VAULT,
            )
            .await?;

        let url = value
            .pointer("/properties/secretUriWithVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AzureError::MissingField {
                field: "secretUriWithVersion",
                context: format!("secret '{}' in vault '{}'", secret, vault),
            })?;
        Ok(url.to_string())
    }
}
