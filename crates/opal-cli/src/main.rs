//! opal CLI - OpenProject bridge for AI assistants.

mod mcp;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opal_client::{OpenProjectClient, Settings};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "opal")]
#[command(author, version, about = "OpenProject MCP bridge")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// MCP server for AI assistant integration
    #[command(subcommand)]
    Mcp(McpCommands),

    /// Check connectivity to the configured OpenProject instance
    Health,
}

#[derive(Subcommand)]
enum McpCommands {
    /// Start the MCP server (communicates via stdin/stdout)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let settings = Settings::from_env()
        .context("Failed to load settings; set OPENPROJECT_URL and OPENPROJECT_API_KEY")?;

    match cli.command {
        Commands::Mcp(McpCommands::Serve) => mcp::serve(&settings).await,
        Commands::Health => health(&settings).await,
    }
}

async fn health(settings: &Settings) -> Result<()> {
    let client = OpenProjectClient::new(settings).context("Failed to initialize API client")?;
    let status = client.test_connection().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if status.success {
        Ok(())
    } else {
        anyhow::bail!("connection check failed")
    }
}
