use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    net::IpAddr,
    sync::Arc,
};

use parking_lot::Mutex;
use portwatch_model::Target;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::ReconcilerConfig,
    database::ports::TargetRepository,
    error::{Result, ScanError},
    target::NewTarget,
};

use super::{InventoryError, InventorySource};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Distinct live addresses reported by the inventory.
    pub live: usize,
    pub added: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Keeps inventory-sourced targets equal to the live cloud address set.
///
/// Only targets whose source is `inventory` are ever touched; manually
/// registered targets are left alone even when they share an address.
pub struct InventoryReconciler {
    config: ReconcilerConfig,
    targets: Arc<dyn TargetRepository>,
    source: Arc<dyn InventorySource>,
    shutdown: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for InventoryReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryReconciler")
            .field("config", &self.config)
            .field("running", &self.loop_handle.lock().is_some())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl InventoryReconciler {
    pub fn new(
        config: ReconcilerConfig,
        targets: Arc<dyn TargetRepository>,
        source: Arc<dyn InventorySource>,
    ) -> Self {
        Self {
            config,
            targets,
            source,
            shutdown: CancellationToken::new(),
            loop_handle: Mutex::new(None),
        }
    }

    /// Spawn the periodic loop. The first pass runs after the startup delay.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.loop_handle.lock();
        if slot.is_some() || self.shutdown.is_cancelled() {
            warn!(target: "inventory::sync", "reconciler already started");
            return;
        }

        let reconciler = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { reconciler.run().await }));
    }

    /// Stop the loop; an in-flight pass is allowed to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            error!(target: "inventory::sync", error = %err, "reconciler loop terminated abnormally");
        }
        info!(target: "inventory::sync", "inventory reconciler stopped");
    }

    /// Run one reconciliation pass now.
    ///
    /// The live inventory is fetched before anything is written, so a failing
    /// source leaves the store untouched. Individual insert/delete failures
    /// are logged and left out of the report.
    pub async fn sync_now(&self) -> Result<ReconcileReport> {
        let live: BTreeSet<IpAddr> = self.source.public_addresses().await?.into_iter().collect();
        let managed = self.targets.list_managed_targets().await?;

        let mut tracked: HashMap<IpAddr, Vec<&Target>> = HashMap::new();
        let mut stale: Vec<&Target> = Vec::new();
        for target in &managed {
            match target.address.parse::<IpAddr>() {
                Ok(address) => tracked.entry(address).or_default().push(target),
                Err(_) => stale.push(target),
            }
        }

        let mut report = ReconcileReport {
            live: live.len(),
            ..ReconcileReport::default()
        };

        for address in live.iter().filter(|address| !tracked.contains_key(*address)) {
            let target = NewTarget::inventory(*address, self.config.description.clone());
            match self.targets.insert_target(&target).await {
                Ok(created) => {
                    debug!(target: "inventory::sync", %address, target_id = %created.id, "imported address");
                    report.added += 1;
                }
                Err(err) => warn!(
                    target: "inventory::sync",
                    %address,
                    error = %err,
                    "failed to import address"
                ),
            }
        }

        stale.extend(
            tracked
                .iter()
                .filter(|(address, _)| !live.contains(*address))
                .flat_map(|(_, targets)| targets.iter().copied()),
        );
        for target in stale {
            match self.targets.delete_target(target.id).await {
                Ok(()) => {
                    debug!(target: "inventory::sync", target_id = %target.id, address = %target.address, "removed stale target");
                    report.removed += 1;
                }
                Err(ScanError::NotFound(_)) => {}
                Err(err) => warn!(
                    target: "inventory::sync",
                    target_id = %target.id,
                    error = %err,
                    "failed to remove stale target"
                ),
            }
        }

        info!(
            target: "inventory::sync",
            live = report.live,
            added = report.added,
            removed = report.removed,
            "inventory reconciliation complete"
        );
        Ok(report)
    }

    async fn run(self: Arc<Self>) {
        info!(
            target: "inventory::sync",
            interval_secs = self.config.interval().as_secs(),
            startup_delay_secs = self.config.startup_delay().as_secs(),
            "inventory reconciler started"
        );

        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.config.startup_delay()) => {}
        }

        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }
    }

    async fn run_cycle(&self) {
        match self.sync_now().await {
            Ok(_) => {}
            Err(ScanError::Inventory(InventoryError::NotConfigured)) => {
                info!(target: "inventory::sync", "no inventory configured; skipping reconciliation");
            }
            Err(ScanError::Inventory(err)) => {
                warn!(target: "inventory::sync", error = %err, "inventory unavailable; skipping reconciliation");
            }
            Err(err) => {
                warn!(target: "inventory::sync", error = %err, "reconciliation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use portwatch_model::TargetSource;

    use super::*;
    use crate::{
        database::{InMemoryStore, StoreFault},
        inventory::MockInventorySource,
    };

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn source_returning(list: &'static [&'static str]) -> Arc<MockInventorySource> {
        let mut mock = MockInventorySource::new();
        mock.expect_public_addresses()
            .returning(move || Ok(ips(list)));
        Arc::new(mock)
    }

    fn reconciler(
        store: &Arc<InMemoryStore>,
        source: Arc<dyn InventorySource>,
    ) -> Arc<InventoryReconciler> {
        Arc::new(InventoryReconciler::new(
            ReconcilerConfig::default(),
            store.clone(),
            source,
        ))
    }

    async fn managed_addresses(store: &InMemoryStore) -> Vec<String> {
        let mut addresses: Vec<String> = store
            .list_managed_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.address)
            .collect();
        addresses.sort();
        addresses
    }

    #[tokio::test]
    async fn adds_missing_and_removes_stale() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_target(&NewTarget::inventory("52.0.0.9".parse().unwrap(), "old"))
            .await
            .unwrap();
        store
            .insert_target(&NewTarget::inventory("52.0.0.1".parse().unwrap(), "kept"))
            .await
            .unwrap();
        let manual = store
            .insert_target(&NewTarget::manual("52.0.0.9", "operator").unwrap())
            .await
            .unwrap();

        let reconciler = reconciler(&store, source_returning(&["52.0.0.1", "52.0.0.2"]));
        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                live: 2,
                added: 1,
                removed: 1
            }
        );
        assert_eq!(managed_addresses(&store).await, vec!["52.0.0.1", "52.0.0.2"]);
        assert!(store.get_target(manual.id).await.unwrap().is_some());

        let added = store
            .list_managed_targets()
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.address == "52.0.0.2")
            .unwrap();
        assert!(added.enabled);
        assert_eq!(added.source, TargetSource::Inventory);
        assert_eq!(added.description, "Auto-imported from cloud inventory");
    }

    #[tokio::test]
    async fn second_pass_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = reconciler(&store, source_returning(&["52.0.0.1", "2600:1f18::5"]));

        let first = reconciler.sync_now().await.unwrap();
        assert_eq!(first.added, 2);
        let writes = store.target_writes();

        let second = reconciler.sync_now().await.unwrap();
        assert!(second.is_noop());
        assert_eq!(store.target_writes(), writes);
    }

    #[tokio::test]
    async fn edited_descriptions_stay_managed() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = reconciler(&store, source_returning(&["52.0.0.1"]));
        reconciler.sync_now().await.unwrap();

        let target = store.list_managed_targets().await.unwrap().remove(0);
        store
            .update_description(target.id, "renamed by operator")
            .await
            .unwrap();

        let report = reconciler.sync_now().await.unwrap();
        assert!(report.is_noop());
        assert_eq!(managed_addresses(&store).await, vec!["52.0.0.1"]);
    }

    #[tokio::test]
    async fn failing_source_leaves_store_untouched() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_target(&NewTarget::inventory("52.0.0.1".parse().unwrap(), "old"))
            .await
            .unwrap();
        let writes = store.target_writes();

        let mut mock = MockInventorySource::new();
        mock.expect_public_addresses()
            .times(1)
            .returning(|| Err(InventoryError::Unavailable("timeout".into())));
        let reconciler = reconciler(&store, Arc::new(mock));

        let err = reconciler.sync_now().await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::Inventory(InventoryError::Unavailable(_))
        ));
        assert_eq!(store.target_writes(), writes);
    }

    #[tokio::test]
    async fn store_outage_aborts_before_writes() {
        let store = Arc::new(InMemoryStore::new());
        store.set_fault(StoreFault::ListTargets, true);
        let reconciler = reconciler(&store, source_returning(&["52.0.0.1"]));

        assert!(matches!(
            reconciler.sync_now().await,
            Err(ScanError::StoreUnavailable(_))
        ));
        assert_eq!(store.target_writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_waits_for_startup_delay_then_runs_hourly() {
        let store = Arc::new(InMemoryStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockInventorySource::new();
        mock.expect_public_addresses().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(InventoryError::NotConfigured)
        });
        let reconciler = reconciler(&store, Arc::new(mock));

        reconciler.start();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        reconciler.stop().await;
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.target_writes(), 0);
    }
}
