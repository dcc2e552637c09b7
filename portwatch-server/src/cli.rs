use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "portwatch")]
#[command(
    about = "Continuous TCP port monitor with closure verification and cloud inventory sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Config file (TOML or JSON). Falls back to PORTWATCH_CONFIG_PATH,
    /// PORTWATCH_CONFIG_JSON, then ./portwatch.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file listing the public addresses of the cloud inventory
    #[arg(long, env = "PORTWATCH_INVENTORY_FILE")]
    pub inventory_file: Option<PathBuf>,

    /// Size of the database connection pool
    #[arg(long, env = "PORTWATCH_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Skip applying migrations on startup
    #[arg(long, default_value_t = false)]
    pub skip_migrations: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(subcommand)]
    Db(DbCommand),
    #[command(subcommand)]
    Inventory(InventoryCommand),
    /// Print the effective configuration as JSON and exit
    Config,
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[derive(Debug, Subcommand)]
pub enum InventoryCommand {
    /// Run a single reconciliation pass and exit
    Sync,
}
