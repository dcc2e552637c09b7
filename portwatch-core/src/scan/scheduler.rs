use std::{fmt, sync::Arc};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use portwatch_model::{ScanSession, Target};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{config::ScannerConfig, database::ScanUnitOfWork, target::resolve};

use super::{
    detector::ChangeDetector,
    pool::{WorkerPool, probe_ports},
    probe::PortProber,
    verifier::ClosureVerifier,
};

/// Answer to a manual scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The request was queued and the loop will pick it up.
    Accepted,
    /// A scan is running or another request is already queued.
    Busy,
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanTotals {
    addresses: u64,
    ports: u64,
}

/// Clears the scanning flag when a cycle ends, however it ends.
struct ScanningGuard<'a>(&'a RwLock<bool>);

impl<'a> ScanningGuard<'a> {
    fn engage(flag: &'a RwLock<bool>) -> Self {
        *flag.write() = true;
        Self(flag)
    }
}

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        *self.0.write() = false;
    }
}

/// Periodic and on-demand scan driver.
///
/// One long-lived loop owns the scanning flag and runs cycles to completion
/// before it looks at the timer, the manual trigger or the stop signal
/// again, so sessions never overlap.
pub struct ScanScheduler {
    config: ScannerConfig,
    store: ScanUnitOfWork,
    prober: Arc<dyn PortProber>,
    detector: ChangeDetector,
    verifier: Arc<ClosureVerifier>,
    pool: WorkerPool,
    scanning: RwLock<bool>,
    last_session: RwLock<Option<ScanSession>>,
    manual_tx: mpsc::Sender<()>,
    manual_rx: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("workers", &self.pool.workers())
            .field("scanning", &self.is_scanning())
            .field("pending_verifications", &self.verifier.pending_count())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl ScanScheduler {
    pub fn new(
        config: ScannerConfig,
        store: ScanUnitOfWork,
        prober: Arc<dyn PortProber>,
    ) -> Self {
        let verifier = Arc::new(ClosureVerifier::new(
            Arc::clone(&prober),
            Arc::clone(&store.notifications),
            config.verification_delay(),
        ));
        let detector = ChangeDetector::new(
            Arc::clone(&store.results),
            Arc::clone(&store.notifications),
            Arc::clone(&verifier),
        );
        let (manual_tx, manual_rx) = mpsc::channel(1);

        Self {
            pool: WorkerPool::new(config.workers()),
            config,
            store,
            prober,
            detector,
            verifier,
            scanning: RwLock::new(false),
            last_session: RwLock::new(None),
            manual_tx,
            manual_rx: Mutex::new(Some(manual_rx)),
            shutdown: CancellationToken::new(),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn verifier(&self) -> &ClosureVerifier {
        &self.verifier
    }

    /// Spawn the scan loop. The first cycle starts immediately.
    ///
    /// A scheduler runs at most one loop; later calls are ignored.
    pub fn start(self: &Arc<Self>) {
        let Some(manual_rx) = self.manual_rx.lock().take() else {
            warn!(target: "scan::session", "scan scheduler already started");
            return;
        };

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run(manual_rx).await });
        *self.loop_handle.lock() = Some(handle);
    }

    /// Stop the loop, waiting for an in-flight cycle to finish, then settle
    /// pending closure verifications per `verification_shutdown`.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            error!(target: "scan::session", error = %err, "scan loop terminated abnormally");
        }

        self.verifier
            .shutdown(self.config.verification_shutdown)
            .await;
        info!(target: "scan::session", "scan scheduler stopped");
    }

    /// Queue a scan outside the periodic cadence.
    pub fn trigger_manual_scan(&self) -> TriggerOutcome {
        if self.is_scanning() {
            return TriggerOutcome::Busy;
        }

        match self.manual_tx.try_send(()) {
            Ok(()) => {
                info!(target: "scan::session", "manual scan queued");
                TriggerOutcome::Accepted
            }
            Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::Busy,
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!(target: "scan::session", "manual scan requested after shutdown");
                TriggerOutcome::Busy
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        *self.scanning.read()
    }

    /// Bookkeeping of the most recently finalized cycle.
    pub fn last_session(&self) -> Option<ScanSession> {
        self.last_session.read().clone()
    }

    async fn run(self: Arc<Self>, mut manual_rx: mpsc::Receiver<()>) {
        let period = self.config.scan_interval();
        info!(
            target: "scan::session",
            interval_secs = period.as_secs(),
            workers = self.pool.workers(),
            ports = self.config.ports.len(),
            "scan scheduler started"
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if !self.shutdown.is_cancelled() {
            self.perform_scan().await;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.perform_scan().await;
                }
                Some(()) = manual_rx.recv() => {
                    info!(target: "scan::session", "manual scan triggered");
                    self.perform_scan().await;
                }
            }
        }

        info!(target: "scan::session", "scan loop exited");
    }

    async fn perform_scan(&self) -> Option<ScanSession> {
        let _scanning = ScanningGuard::engage(&self.scanning);

        let session = match self.store.sessions.create_session().await {
            Ok(session) => session,
            Err(err) => {
                error!(target: "scan::session", error = %err, "failed to create scan session");
                return None;
            }
        };
        info!(target: "scan::session", session_id = %session.id, "scan started");

        let targets = match self.store.targets.list_enabled_targets().await {
            Ok(targets) => targets,
            Err(err) => {
                error!(
                    target: "scan::session",
                    session_id = %session.id,
                    error = %err,
                    "failed to load targets; failing session"
                );
                return self.finalize(self.store.sessions.fail_session(session.id).await);
            }
        };

        let totals = Mutex::new(ScanTotals::default());
        for target in &targets {
            self.scan_target(target, &totals).await;
        }

        let totals = totals.into_inner();
        info!(
            target: "scan::session",
            session_id = %session.id,
            targets = targets.len(),
            addresses = totals.addresses,
            ports = totals.ports,
            "scan completed"
        );
        self.finalize(
            self.store
                .sessions
                .complete_session(session.id, totals.addresses, totals.ports)
                .await,
        )
    }

    fn finalize(&self, outcome: crate::Result<ScanSession>) -> Option<ScanSession> {
        match outcome {
            Ok(session) => {
                *self.last_session.write() = Some(session.clone());
                Some(session)
            }
            Err(err) => {
                error!(target: "scan::session", error = %err, "failed to finalize scan session");
                None
            }
        }
    }

    async fn scan_target(&self, target: &Target, totals: &Mutex<ScanTotals>) {
        let addresses = match resolve(&target.address) {
            Ok(addresses) => addresses,
            Err(err) => {
                warn!(
                    target: "scan::session",
                    target_id = %target.id,
                    address = %target.address,
                    error = %err,
                    "skipping unresolvable target"
                );
                return;
            }
        };
        info!(
            target: "scan::session",
            target_id = %target.id,
            address = %target.address,
            hosts = %addresses.remaining(),
            "scanning target"
        );

        let target_id = target.id;
        let prober = self.prober.as_ref();
        let ports = self.config.ports.as_slice();
        let detector = &self.detector;

        self.pool
            .scatter_gather(addresses, move |address| async move {
                let outcomes = probe_ports(prober, address, ports).await;
                let mut persisted = 0u64;
                for outcome in outcomes {
                    match detector.observe(target_id, outcome, Utc::now()).await {
                        Ok(_) => persisted += 1,
                        Err(err) => warn!(
                            target: "scan::session",
                            %target_id,
                            %address,
                            port = outcome.port,
                            error = %err,
                            "failed to persist scan result"
                        ),
                    }
                }

                let mut totals = totals.lock();
                totals.addresses += 1;
                totals.ports += persisted;
            })
            .await;
    }
}
