pub mod auth;
pub mod build;
pub mod validate;

use bakeflow_cloud_azure::{AzureConfig, AzureProvider};
use bakeflow_config::BuildConfig;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

/// Load and validate the configuration, or report the problems and exit.
pub(crate) fn load_or_exit(path: Option<&Path>) -> BuildConfig {
    match bakeflow_config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

pub(crate) fn connect(config: &BuildConfig, access_token: String) -> anyhow::Result<Arc<AzureProvider>> {
    let provider = AzureProvider::new(AzureConfig {
        subscription_id: config.subscription_id.clone(),
        access_token,
        environment: config.cloud_environment()?,
        storage_account: config.storage_account.clone(),
        storage_resource_group: config.resource_group_name.clone(),
    })?;
    Ok(Arc::new(provider))
}
