use super::{connect, load_or_exit};
use bakeflow_cloud::CloudProvider;
use colored::Colorize;
use std::path::Path;

pub async fn handle(path: Option<&Path>, access_token: String) -> anyhow::Result<()> {
    let config = load_or_exit(path);
    let provider = connect(&config, access_token)?;

    println!(
        "{}",
        format!("Checking access to subscription {}...", provider.subscription_id()).blue()
    );
    let status = provider.check_auth().await?;
    if status.authenticated {
        println!(
            "{} {}",
            "✓ Authenticated:".green().bold(),
            status.account_info.unwrap_or_default()
        );
        Ok(())
    } else {
        eprintln!("{}", "✗ Authentication failed".red().bold());
        if let Some(error) = status.error {
            eprintln!("  {}", error);
        }
        std::process::exit(1);
    }
}
