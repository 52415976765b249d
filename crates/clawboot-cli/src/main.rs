//! clawboot - container bootstrap for the openclaw gateway

use clap::{Parser, Subcommand};
use clawboot_config::BootstrapConfig;
use clawboot_core::{Bootstrap, SystemRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "clawboot")]
#[command(author, version, about = "Container bootstrap for the openclaw gateway", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to ~/.config/clawboot/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mounted config directory holding the descriptors and SSH key
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<String>,

    /// Port passed to the gateway
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the environment, then run the gateway (default)
    Run,

    /// Bootstrap the environment without starting the gateway
    Prepare,

    /// Print the effective settings as TOML
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // stdout belongs to the gateway
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = load_settings(&cli);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(0)
        }
        Commands::Prepare => {
            let mut bootstrap = Bootstrap::new(config, Arc::new(SystemRunner));
            let report = bootstrap.prepare().await;
            tracing::debug!("{:?}", report);
            Ok(0)
        }
        Commands::Run => {
            let mut bootstrap = Bootstrap::new(config, Arc::new(SystemRunner));
            Ok(bootstrap.run().await)
        }
    }
}

/// Load settings and apply flag overrides. Unusable settings fall back to defaults.
fn load_settings(cli: &Cli) -> BootstrapConfig {
    let loaded = match cli.config {
        Some(ref path) => BootstrapConfig::load_from(path),
        None => BootstrapConfig::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Ignoring settings: {}", e);
        BootstrapConfig::default()
    });

    if let Some(ref dir) = cli.config_dir {
        config.paths.config_dir = dir.clone();
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    config
}
