//! Musicbox MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for Sonic Pi.
//! Lets an agent start Sonic Pi, play and stop code, and tune live-mix
//! parameters over Sonic Pi's OSC control protocol.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use musicbox_mcp::config::Config;
use musicbox_mcp::error::Result;
use musicbox_mcp::mcp::server::McpServer;
use musicbox_mcp::sonic_pi::client::SonicPiClient;
use musicbox_mcp::sonic_pi::discovery;
use musicbox_mcp::sonic_pi::process::SystemAppController;
use musicbox_mcp::sonic_pi::session::Session;
use musicbox_mcp::sonic_pi::transport::UdpTransport;

/// Musicbox MCP Server
#[derive(Parser)]
#[command(name = "musicbox-mcp")]
#[command(author, version, about = "Musicbox MCP Server - A Model Context Protocol server for Sonic Pi")]
struct Cli {
    /// Sonic Pi log to read connection tokens from
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,

    /// Shared state JSON file
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print connection diagnostics
    Debug,
    /// Parse the Sonic Pi log and print the connection parameters
    Discover,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::new()?;
    if let Some(path) = cli.log_path {
        config.log_path = path;
    }
    if let Some(path) = cli.state_path {
        config.state_path = path;
    }

    match cli.command {
        Some(Commands::Discover) => {
            let params = discovery::discover(&config.log_path).await?;
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
        Some(Commands::Debug) => {
            let session = build_session(&config);
            println!("{}", session.diagnostics().await);
        }
        None => run_server(config).await?,
    }

    Ok(())
}

fn build_session(config: &Config) -> Session {
    let client = Arc::new(SonicPiClient::new(config.host, Arc::new(UdpTransport::new())));
    let controller = Arc::new(SystemAppController::new(
        config.app_path.clone(),
        config.process_name.clone(),
    ));
    Session::new(config, client, controller)
}

async fn run_server(config: Config) -> Result<()> {
    let session = Arc::new(build_session(&config));

    if session.is_running().await {
        tracing::info!("Sonic Pi detected running");
    } else {
        tracing::warn!("Sonic Pi not running - initialize_sonic_pi will start it");
    }

    if config.state_file_exists() {
        tracing::info!("Shared state file found at {}", config.state_path.display());
    } else {
        tracing::warn!(
            "Shared state file not found at {} - will create on first change_mix",
            config.state_path.display()
        );
    }

    if !config.log_file_exists() {
        tracing::warn!("Sonic Pi log not found at {}", config.log_path.display());
    }

    tracing::info!("Ready for MCP connections");

    let mut server = McpServer::new(session);
    server.run_stdio().await?;

    Ok(())
}
