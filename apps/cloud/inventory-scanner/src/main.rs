//! Inventory Scanner
//!
//! A service that discovers compute resources across AWS, Azure, and GCP
//! accounts, groups them into clusters, and reconciles cost history into a
//! canonical inventory snapshot. Runs as a one-shot scan; scheduling is the
//! caller's concern.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::Environment;
use domain_inventory::InMemoryInventoryStore;
use eyre::Result;
use tracing::info;

mod billing;
mod config;
mod console;
mod credentials;
mod providers;
mod scanner;

use config::Config;
use scanner::InventoryScanner;

#[derive(Parser)]
#[command(name = "inventory-scanner")]
#[command(about = "Discover compute resources and cost data across AWS, Azure, and GCP accounts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a one-time inventory scan
    Scan {
        /// Account names to scan (from the credentials file). Defaults to all.
        #[arg(short, long, value_delimiter = ',')]
        accounts: Option<Vec<String>>,

        /// Skip billing reconciliation for this run
        #[arg(long)]
        skip_billing: bool,
    },

    /// Show provider status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    // Initialize metrics
    observability::init_metrics();

    let cli = Cli::parse();

    let store = Arc::new(InMemoryInventoryStore::new());
    let scanner = InventoryScanner::new(store, config.clone());

    match cli.command {
        Commands::Scan {
            accounts,
            skip_billing,
        } => {
            info!("Starting one-time inventory scan");

            let entries = credentials::load_credentials(Path::new(&config.credentials_file))?;
            let report = scanner
                .scan(&entries, accounts.as_deref(), skip_billing)
                .await?;

            info!(
                "Scan complete: {} accounts scanned, {} failed, {} clusters, {} instances, {} expenses",
                report.accounts_scanned,
                report.accounts_failed,
                report.clusters_discovered,
                report.instances_discovered,
                report.expenses_recorded
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Status => {
            let status = scanner.get_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
