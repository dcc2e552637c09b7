use std::{net::IpAddr, sync::Arc, time::Duration};

use portwatch_core::{
    config::{ReconcilerConfig, ScannerConfig},
    database::{InMemoryStore, ScanUnitOfWork, ports::TargetRepository},
    inventory::{FileInventory, InventoryReconciler},
    model::{PortStatus, SessionStatus},
    scan::{ScanScheduler, TcpProber, TriggerOutcome},
    target::NewTarget,
};
use tokio::net::TcpListener;

const LOOPBACK: &str = "127.0.0.1";

async fn wait_for_sessions(store: &InMemoryStore, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while store
            .sessions()
            .iter()
            .filter(|s| s.status.is_finished())
            .count()
            < count
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("scan sessions did not finish in time");
}

#[tokio::test]
async fn real_sockets_are_classified_and_recorded() {
    let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
    let open_port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });
    let closed_port = {
        let spare = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        spare.local_addr().unwrap().port()
    };

    let store = Arc::new(InMemoryStore::new());
    store
        .insert_target(&NewTarget::manual(LOOPBACK, "loopback").unwrap())
        .await
        .unwrap();

    let config = ScannerConfig {
        ports: vec![open_port, closed_port],
        probe_timeout_ms: 500,
        ..ScannerConfig::default()
    };
    let prober = Arc::new(TcpProber::new(config.probe_timeout()));
    let scheduler = Arc::new(ScanScheduler::new(
        config,
        ScanUnitOfWork::in_memory(store.clone()),
        prober,
    ));

    scheduler.start();
    wait_for_sessions(&store, 1).await;

    let session = scheduler.last_session().expect("finished session");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.addresses_scanned, 1);
    assert_eq!(session.ports_scanned, 2);

    let results = store.results();
    let address: IpAddr = LOOPBACK.parse().unwrap();
    let open = results.iter().find(|r| r.port == open_port).unwrap();
    assert_eq!(open.address, address);
    assert_eq!(open.status, PortStatus::Open);
    assert!(open.response_time_ms.is_some());
    let closed = results.iter().find(|r| r.port == closed_port).unwrap();
    assert_eq!(closed.status, PortStatus::Closed);
    assert_eq!(closed.response_time_ms, None);

    // First sightings never notify.
    assert!(store.notifications().is_empty());

    assert_eq!(scheduler.trigger_manual_scan(), TriggerOutcome::Accepted);
    wait_for_sessions(&store, 2).await;

    scheduler.stop().await;
    assert!(!scheduler.is_scanning());
    assert_eq!(scheduler.verifier().pending_count(), 0);
}

#[tokio::test]
async fn imported_inventory_feeds_the_next_scan() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("inventory.json");
    std::fs::write(&export, r#"["127.0.0.1"]"#).unwrap();

    let store = Arc::new(InMemoryStore::new());
    let reconciler = InventoryReconciler::new(
        ReconcilerConfig::default(),
        store.clone(),
        Arc::new(FileInventory::new(&export)),
    );
    let report = reconciler.sync_now().await.unwrap();
    assert_eq!(report.added, 1);

    let config = ScannerConfig {
        ports: vec![9],
        probe_timeout_ms: 200,
        ..ScannerConfig::default()
    };
    let scheduler = Arc::new(ScanScheduler::new(
        config.clone(),
        ScanUnitOfWork::in_memory(store.clone()),
        Arc::new(TcpProber::new(config.probe_timeout())),
    ));
    scheduler.start();
    wait_for_sessions(&store, 1).await;
    scheduler.stop().await;

    assert_eq!(store.results().len(), 1);

    // The instance disappears from the export; its target goes, its history stays.
    std::fs::write(&export, "[]").unwrap();
    let report = reconciler.sync_now().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(store.list_targets().await.unwrap().is_empty());
    let history = store.results();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].address, "127.0.0.1".parse::<IpAddr>().unwrap());
}
