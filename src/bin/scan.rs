use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use token_scanner::orchestrator;
use token_scanner::retry::RetryPolicy;
use token_scanner::rpc::RpcConnector;
use token_scanner::store::Store;
use token_scanner::{config, error::ScanError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scan")]
#[command(about = "Discover token contracts an account has received and fetch their balances", long_about = None)]
struct Cli {
    /// JSON array of account addresses
    #[arg(long, default_value = "addresses.json")]
    addresses: PathBuf,

    /// JSON array of network definitions
    #[arg(long, default_value = "networks.json")]
    networks: PathBuf,

    /// Where scan checkpoints are kept
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Where balance snapshots are written
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let networks = config::load_networks(&cli.networks)?;
    let addresses = config::load_addresses(&cli.addresses)?;
    info!(
        "Loaded {} network(s) and {} address(es)",
        networks.len(),
        addresses.len()
    );

    let store = Arc::new(Store::new(cli.cache_dir, cli.data_dir));
    let report = orchestrator::run(
        &networks,
        &addresses,
        store,
        Arc::new(RpcConnector),
        RetryPolicy::default(),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&report.balances)?);

    if !report.failures.is_empty() {
        for failure in &report.failures {
            // ScanFailure already carries the unit context; keep the line flat
            // for anything else.
            match &failure.error {
                e @ ScanError::ScanFailure { .. } => error!("{}", e),
                e => error!("Scan failed on {} for {}: {}", failure.network, failure.address, e),
            }
        }
        bail!("{} scan unit(s) failed", report.failures.len());
    }

    Ok(())
}
