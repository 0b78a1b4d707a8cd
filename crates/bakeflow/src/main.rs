mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bake")]
#[command(about = "Bake Azure virtual machine images", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image from the configuration
    Build {
        /// Configuration file (defaults to bakeflow.yaml discovery)
        #[arg(short, long, env = "BAKEFLOW_CONFIG")]
        config: Option<PathBuf>,
        /// Resource Manager bearer token
        #[arg(long, env = "BAKEFLOW_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        /// Print the artifact as JSON
        #[arg(long)]
        json: bool,
        /// Show debug logs
        #[arg(short, long)]
        verbose: bool,
    },
    /// Check the configuration without touching the cloud
    Validate {
        /// Configuration file (defaults to bakeflow.yaml discovery)
        #[arg(short, long, env = "BAKEFLOW_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Check that the access token reaches the configured subscription
    Auth {
        /// Configuration file (defaults to bakeflow.yaml discovery)
        #[arg(short, long, env = "BAKEFLOW_CONFIG")]
        config: Option<PathBuf>,
        /// Resource Manager bearer token
        #[arg(long, env = "BAKEFLOW_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Build { verbose: true, .. });
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("bakeflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate { config } => {
            commands::validate::handle(config.as_deref());
        }
        Commands::Auth {
            config,
            access_token,
        } => {
            commands::auth::handle(config.as_deref(), access_token).await?;
        }
        Commands::Build {
            config,
            access_token,
            json,
            ..
        } => {
            commands::build::handle(config.as_deref(), access_token, json).await?;
        }
    }

    Ok(())
}
