//! Cloud environments and their endpoints

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEnvironment {
    pub name: String,
    pub resource_manager_endpoint: String,
    pub storage_endpoint_suffix: String,
    pub key_vault_dns_suffix: String,
}

impl CloudEnvironment {
    /// Resolve a user-facing environment name. Accepts the short form
    /// (`Public`), the `...Cloud` form and the `Azure...Cloud` form,
    /// case-insensitively.
    pub fn from_name(name: &str) -> Result<Self> {
        let upper = name.to_ascii_uppercase();
        let key = upper.strip_prefix("AZURE").unwrap_or(&upper);
        let key = key.strip_suffix("CLOUD").unwrap_or(key);

        let (canonical, arm, storage, vault) = match key {
            "PUBLIC" => (
                "AzurePublicCloud",
                "https://management.azure.com/",
                "core.windows.net",
                "vault.azure.net",
            ),
            "CHINA" => (
                "AzureChinaCloud",
                "https://management.chinacloudapi.cn/",
                "core.chinacloudapi.cn",
                "vault.azure.cn",
            ),
            "USGOVERNMENT" => (
                "AzureUSGovernmentCloud",
                "https://management.usgovcloudapi.net/",
                "core.usgovcloudapi.net",
                "vault.usgovcloudapi.net",
            ),
            "GERMAN" | "GERMANY" => (
                "AzureGermanCloud",
                "https://management.microsoftazure.de/",
                "core.cloudapi.de",
                "vault.microsoftazure.de",
            ),
            _ => return Err(ConfigError::UnknownCloudEnvironment(name.to_string())),
        };

        Ok(Self {
            name: canonical.to_string(),
            resource_manager_endpoint: arm.to_string(),
            storage_endpoint_suffix: storage.to_string(),
            key_vault_dns_suffix: vault.to_string(),
        })
    }

    /// Base URL of a storage account's blob service
    pub fn blob_endpoint(&self, storage_account: &str) -> String {
        format!("https://{}.blob.{}/", storage_account, self.storage_endpoint_suffix)
    }
}
