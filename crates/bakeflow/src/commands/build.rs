use super::{connect, load_or_exit};
use bakeflow_builder::Builder;
use bakeflow_cloud::CloudClients;
use bakeflow_step::CancellationToken;
use colored::Colorize;
use std::path::Path;

pub async fn handle(path: Option<&Path>, access_token: String, json: bool) -> anyhow::Result<()> {
    let config = load_or_exit(path);
    let clients = CloudClients::from_provider(connect(&config, access_token)?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "Interrupted, cleaning up...".yellow());
            on_interrupt.cancel();
        }
    });

    println!("{}", "Starting image build...".blue());
    match Builder::new(config, clients).run(cancel).await {
        Ok(artifact) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&artifact)?);
            } else {
                println!("{}", "✓ Build finished".green().bold());
                println!();
                for line in artifact.to_string().lines() {
                    println!("  {}", line);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Build failed".red().bold());
            for line in e.user_message().lines() {
                eprintln!("  {}", line);
            }
            std::process::exit(1);
        }
    }
}
