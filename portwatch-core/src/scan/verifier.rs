use std::{
    collections::HashMap,
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use portwatch_model::{NewNotification, NotificationKind, PortStatus, TargetId};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    config::VerificationShutdown, database::ports::NotificationRepository,
};

use super::probe::PortProber;

/// Identity of the port whose closure is being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerificationKey {
    pub target_id: TargetId,
    pub address: IpAddr,
    pub port: u16,
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let socket = SocketAddr::new(self.address, self.port);
        write!(f, "{socket} ({})", self.target_id)
    }
}

struct PendingKey {
    generation: u64,
    token: CancellationToken,
    timers: usize,
}

#[derive(Default)]
struct PendingTable {
    keys: HashMap<VerificationKey, PendingKey>,
    next_generation: u64,
}

/// Delayed re-probe of ports that were seen going from open to closed.
///
/// Every scheduled verification is an independent timer that fires once.
/// Timers for the same key share a cancellation token so [`cancel`] can
/// abort them together; a later schedule for that key starts a fresh token.
///
/// [`cancel`]: ClosureVerifier::cancel
pub struct ClosureVerifier {
    prober: Arc<dyn PortProber>,
    notifications: Arc<dyn NotificationRepository>,
    delay: Duration,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    pending: Arc<Mutex<PendingTable>>,
}

impl fmt::Debug for ClosureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureVerifier")
            .field("delay", &self.delay)
            .field("pending", &self.tracker.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl ClosureVerifier {
    pub fn new(
        prober: Arc<dyn PortProber>,
        notifications: Arc<dyn NotificationRepository>,
        delay: Duration,
    ) -> Self {
        Self {
            prober,
            notifications,
            delay,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            pending: Arc::new(Mutex::new(PendingTable::default())),
        }
    }

    /// Arm a verification for `key`, firing once after the configured delay.
    pub fn schedule(&self, key: VerificationKey) {
        if self.shutdown.is_cancelled() {
            debug!(target: "scan::verify", %key, "verifier shut down; not scheduling");
            return;
        }

        let (generation, token) = {
            let mut table = self.pending.lock();
            let next_generation = table.next_generation;
            let entry = table.keys.entry(key).or_insert_with(|| PendingKey {
                generation: next_generation,
                token: self.shutdown.child_token(),
                timers: 0,
            });
            entry.timers += 1;
            let armed = (entry.generation, entry.token.clone());
            if armed.0 == next_generation {
                table.next_generation += 1;
            }
            armed
        };

        info!(
            target: "scan::verify",
            %key,
            delay_secs = self.delay.as_secs(),
            "port closed; verification scheduled"
        );

        let prober = Arc::clone(&self.prober);
        let notifications = Arc::clone(&self.notifications);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;

        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(target: "scan::verify", %key, "verification cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    verify(prober.as_ref(), notifications.as_ref(), key).await;
                }
            }
            release(&pending, key, generation);
        });
    }

    /// Cancel every pending timer for `key`. Returns how many were aborted.
    pub fn cancel(&self, key: &VerificationKey) -> usize {
        let removed = self.pending.lock().keys.remove(key);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                entry.timers
            }
            None => 0,
        }
    }

    /// Timers that have not finished yet, including ones mid re-probe.
    pub fn pending_count(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new verifications and settle the pending ones.
    ///
    /// No verification task is alive once this returns.
    pub async fn shutdown(&self, mode: VerificationShutdown) {
        let pending = self.pending_count();
        self.tracker.close();
        match mode {
            VerificationShutdown::Cancel => {
                self.shutdown.cancel();
                if pending > 0 {
                    info!(target: "scan::verify", pending, "cancelling pending verifications");
                }
            }
            VerificationShutdown::Drain => {
                if pending > 0 {
                    info!(target: "scan::verify", pending, "draining pending verifications");
                }
            }
        }
        self.tracker.wait().await;
        self.shutdown.cancel();
        self.pending.lock().keys.clear();
    }
}

async fn verify(
    prober: &dyn PortProber,
    notifications: &dyn NotificationRepository,
    key: VerificationKey,
) {
    let outcome = prober.probe(key.address, key.port).await;
    match outcome.status {
        PortStatus::Open => {
            info!(target: "scan::verify", %key, "port reopened; closure discarded");
        }
        PortStatus::Closed => {
            let notification = NewNotification::port_transition(
                NotificationKind::PortClosed,
                key.target_id,
                key.address,
                key.port,
            );
            match notifications.insert_notification(&notification).await {
                Ok(_) => info!(target: "scan::verify", %key, "port closure confirmed"),
                Err(err) => warn!(
                    target: "scan::verify",
                    %key,
                    error = %err,
                    "failed to record closure notification"
                ),
            }
        }
    }
}

fn release(pending: &Mutex<PendingTable>, key: VerificationKey, generation: u64) {
    let mut table = pending.lock();
    if let Some(entry) = table.keys.get_mut(&key)
        && entry.generation == generation
    {
        entry.timers -= 1;
        if entry.timers == 0 {
            table.keys.remove(&key);
        }
    }
}
