use std::{sync::Arc, time::Duration};

use anyhow::Context;
use portwatch_core::{
    InventoryReconciler, PortwatchConfig, ScanScheduler, ScanUnitOfWork, TriggerOutcome,
    config::ConfigSource,
    inventory::{FileInventory, InventorySource, MultiAccountInventory},
    scan::TcpProber,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::ServeArgs;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Cycle summaries and transitions at info. Override via RUST_LOG.
                "info,scan::session=info,scan::verify=info,inventory::sync=info,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve the effective configuration. An explicit `--config` wins over
/// anything found through the environment.
pub fn load_config(args: &ServeArgs) -> anyhow::Result<PortwatchConfig> {
    let (config, source) = match &args.config {
        Some(path) => {
            let config = PortwatchConfig::load_from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            (config, ConfigSource::File(path.clone()))
        }
        None => PortwatchConfig::load_from_env().context("failed to load configuration")?,
    };

    match &source {
        ConfigSource::Default => info!("no config file found; using defaults"),
        ConfigSource::EnvPath(path) => {
            info!(path = %path.display(), "configuration loaded from env path")
        }
        ConfigSource::EnvInline => info!("configuration loaded from inline environment json"),
        ConfigSource::File(path) => info!(path = %path.display(), "configuration loaded from file"),
    }

    info!(
        scanner.interval_secs = config.scanner.scan_interval().as_secs(),
        scanner.probe_timeout_ms = config.scanner.probe_timeout_ms,
        scanner.workers = config.scanner.workers(),
        scanner.ports = ?config.scanner.ports,
        scanner.verification_delay_secs = config.scanner.verification_delay_secs,
        scanner.verification_shutdown = ?config.scanner.verification_shutdown,
        reconciler.interval_secs = config.reconciler.interval().as_secs(),
        "scanner configuration in effect"
    );

    Ok(config)
}

pub async fn connect(args: &ServeArgs) -> anyhow::Result<PgPool> {
    let database_url = args
        .database_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .context("DATABASE_URL must be set (or pass --database-url)")?;

    PgPoolOptions::new()
        .max_connections(args.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    portwatch_core::MIGRATOR
        .run(pool)
        .await
        .context("database migration failed")?;
    info!("database migrations applied");
    Ok(())
}

/// Without an inventory file the reconciler runs against an empty account
/// set, which reports `NotConfigured` and leaves targets untouched.
pub fn inventory_source(args: &ServeArgs) -> Arc<dyn InventorySource> {
    match &args.inventory_file {
        Some(path) => {
            info!(path = %path.display(), "cloud inventory read from file");
            Arc::new(FileInventory::new(path.clone()))
        }
        None => {
            info!("no cloud inventory configured; reconciliation will idle");
            Arc::new(MultiAccountInventory::new())
        }
    }
}

pub async fn run_daemon(args: ServeArgs, config: PortwatchConfig) -> anyhow::Result<()> {
    let pool = connect(&args).await?;
    if args.skip_migrations {
        warn!("skipping database migrations");
    } else {
        migrate(&pool).await?;
    }

    let store = ScanUnitOfWork::from_postgres(pool.clone());
    let prober = Arc::new(TcpProber::new(config.scanner.probe_timeout()));
    let scheduler = Arc::new(ScanScheduler::new(
        config.scanner.clone(),
        store.clone(),
        prober,
    ));
    let reconciler = Arc::new(InventoryReconciler::new(
        config.reconciler.clone(),
        Arc::clone(&store.targets),
        inventory_source(&args),
    ));

    scheduler.start();
    reconciler.start();
    info!("portwatch running; send SIGUSR1 to request a scan, Ctrl+C to stop");

    wait_for_shutdown(&scheduler).await;
    info!("shutdown requested");

    reconciler.stop().await;
    scheduler.stop().await;

    if let Some(session) = scheduler.last_session() {
        info!(
            session_id = %session.id,
            status = session.status.as_str(),
            addresses = session.addresses_scanned,
            ports = session.ports_scanned,
            "last scan session"
        );
    }

    pool.close().await;
    Ok(())
}

pub async fn run_inventory_sync(args: &ServeArgs, config: &PortwatchConfig) -> anyhow::Result<()> {
    let pool = connect(args).await?;
    let store = ScanUnitOfWork::from_postgres(pool.clone());
    let reconciler = InventoryReconciler::new(
        config.reconciler.clone(),
        store.targets,
        inventory_source(args),
    );

    let report = reconciler
        .sync_now()
        .await
        .context("inventory reconciliation failed")?;
    info!(
        live = report.live,
        added = report.added,
        removed = report.removed,
        "inventory reconciled"
    );

    pool.close().await;
    Ok(())
}

pub async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let pool = connect(args).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. On unix, SIGUSR1 requests a manual scan
/// in the meantime.
#[cfg(unix)]
async fn wait_for_shutdown(scheduler: &ScanScheduler) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            None
        }
    };
    let mut manual = match signal(SignalKind::user_defined1()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(error = %err, "failed to install SIGUSR1 handler");
            None
        }
    };

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "failed to listen for Ctrl+C");
                }
                return;
            }
            Some(()) = recv_or_pending(&mut terminate) => return,
            Some(()) = recv_or_pending(&mut manual) => {
                match scheduler.trigger_manual_scan() {
                    TriggerOutcome::Accepted => info!("manual scan requested"),
                    TriggerOutcome::Busy => info!("scan already in progress; request ignored"),
                }
            }
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_scheduler: &ScanScheduler) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> ServeArgs {
        ServeArgs {
            database_url: None,
            config: None,
            inventory_file: None,
            max_connections: 10,
            skip_migrations: false,
        }
    }

    #[test]
    fn explicit_config_file_is_used() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[scanner]\nscan_interval_secs = 300\nports = [22, 443]").unwrap();

        let config = load_config(&ServeArgs {
            config: Some(file.path().to_path_buf()),
            ..args()
        })
        .unwrap();

        assert_eq!(config.scanner.scan_interval_secs, 300);
        assert_eq!(config.scanner.ports, vec![22, 443]);
        assert_eq!(config.reconciler, Default::default());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = load_config(&ServeArgs {
            config: Some("/nonexistent/portwatch.toml".into()),
            ..args()
        })
        .unwrap_err();
        assert!(err.to_string().contains("failed to load configuration"));
    }

    #[tokio::test]
    async fn connect_requires_a_database_url() {
        let err = connect(&ServeArgs {
            database_url: Some("  ".into()),
            ..args()
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[tokio::test]
    async fn unconfigured_inventory_reports_not_configured() {
        let source = inventory_source(&args());
        let err = source.public_addresses().await.unwrap_err();
        assert_eq!(err, portwatch_core::inventory::InventoryError::NotConfigured);
    }
}
