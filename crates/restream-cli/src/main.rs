//! restream CLI - supervise relay pipelines behind an HTTP API.

mod colors;
mod serve;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use restream_server::ServerConfig;

#[derive(Parser)]
#[command(name = "restream")]
#[command(about = "Relay media sources to streaming endpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Host address to bind to (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    load_env(cli.env_file.as_deref())?;
    let mut config = ServerConfig::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve::execute(config).await?;
        }

        Commands::Config => print_config(&config),
    }

    Ok(())
}

/// Load a dotenv file. A missing `./.env` is fine; a missing explicit file is not.
fn load_env(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
            tracing::debug!("Loaded environment from {}", path.display());
        }
        None => match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("failed to load .env"),
        },
    }
    Ok(())
}

fn print_config(config: &ServerConfig) {
    let pipeline = &config.supervisor.pipeline;
    println!("host            {}", config.host);
    println!("port            {}", config.port);
    println!("allowed origin  {}", config.allowed_origin);
    println!("cookies path    {}", pipeline.credentials_path.display());
    println!("grace period    {}ms", config.supervisor.grace_period.as_millis());
    println!("shell           {}", pipeline.shell);
    println!("script          {}", pipeline.script);
}
