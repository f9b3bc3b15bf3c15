mod app;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Provision a relay endpoint in the cloud, run a local proxy client
/// against it, and keep both alive.
#[derive(Parser, Debug)]
#[command(name = "azrelay", version, about)]
struct Cli {
    /// Load environment variables from this file before reading settings
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Domain list file to proxy (overrides DOMAIN_FILE)
    #[arg(long, value_name = "PATH")]
    domain_file: Option<PathBuf>,

    /// Seconds between health checks (overrides HEALTH_CHECK_INTERVAL)
    #[arg(long, value_name = "SECONDS")]
    check_interval: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)?;
    } else {
        // Default .env is optional.
        let _ = dotenvy::dotenv();
    }

    let default_filter = if cli.verbose {
        "debug,hyper=info,reqwest=info"
    } else {
        "info,hyper=warn,reqwest=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut settings = azrelay_config::Settings::from_env()?;
    if let Some(path) = cli.domain_file {
        settings.domain_file = Some(path);
    }
    if let Some(secs) = cli.check_interval {
        settings.check_interval = Duration::from_secs(secs);
    }

    app::run(settings).await
}
