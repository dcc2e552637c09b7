//! `portwatch` daemon: periodic TCP scans of registered targets, delayed
//! verification of closed ports and hourly sync with the cloud inventory.

mod cli;
mod startup;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command, DbCommand, InventoryCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Populate the environment before clap reads env-backed flags.
    let env_file_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    startup::init_tracing();
    if env_file_loaded {
        info!("loaded .env file");
    }

    let config = startup::load_config(&cli.serve)?;

    match cli.command {
        Some(Command::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Db(DbCommand::Migrate)) => startup::run_db_migrate(&cli.serve).await,
        Some(Command::Inventory(InventoryCommand::Sync)) => {
            startup::run_inventory_sync(&cli.serve, &config).await
        }
        None => startup::run_daemon(cli.serve, config).await,
    }
}
