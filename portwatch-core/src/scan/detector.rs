use std::sync::Arc;

use chrono::{DateTime, Utc};
use portwatch_model::{
    NewNotification, NewScanResult, NotificationKind, PortStatus, ScanResult, TargetId,
};
use tracing::{debug, info, warn};

use crate::{
    database::ports::{NotificationRepository, ScanResultRepository},
    error::Result,
};

use super::{
    probe::ProbeOutcome,
    verifier::{ClosureVerifier, VerificationKey},
};

/// What a new observation meant relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same status as before, or a first observation of a closed port.
    Unchanged,
    /// First observation for the key, and the port is open.
    FirstSeenOpen,
    /// closed -> open; a `new_port` notification was raised.
    Opened,
    /// open -> closed; a verification was armed instead of a notification.
    ClosurePending,
}

impl Transition {
    pub fn between(prior: Option<PortStatus>, current: PortStatus) -> Self {
        match (prior, current) {
            (Some(PortStatus::Closed), PortStatus::Open) => Transition::Opened,
            (Some(PortStatus::Open), PortStatus::Closed) => Transition::ClosurePending,
            (None, PortStatus::Open) => Transition::FirstSeenOpen,
            _ => Transition::Unchanged,
        }
    }
}

/// Persists each probe result and acts on status transitions.
#[derive(Clone)]
pub struct ChangeDetector {
    results: Arc<dyn ScanResultRepository>,
    notifications: Arc<dyn NotificationRepository>,
    verifier: Arc<ClosureVerifier>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl ChangeDetector {
    pub fn new(
        results: Arc<dyn ScanResultRepository>,
        notifications: Arc<dyn NotificationRepository>,
        verifier: Arc<ClosureVerifier>,
    ) -> Self {
        Self {
            results,
            notifications,
            verifier,
        }
    }

    /// Record one observation.
    ///
    /// Fails only when the result itself could not be persisted; in that case
    /// no transition is evaluated. A failed lookup of the previous status is
    /// treated as "no previous result".
    pub async fn observe(
        &self,
        target_id: TargetId,
        outcome: ProbeOutcome,
        scanned_at: DateTime<Utc>,
    ) -> Result<(ScanResult, Transition)> {
        let prior = match self
            .results
            .latest_status(target_id, outcome.address, outcome.port)
            .await
        {
            Ok(prior) => prior,
            Err(err) => {
                warn!(
                    target: "scan::session",
                    %target_id,
                    address = %outcome.address,
                    port = outcome.port,
                    error = %err,
                    "previous status lookup failed; treating as first observation"
                );
                None
            }
        };

        let stored = self
            .results
            .insert_result(&NewScanResult {
                target_id,
                address: outcome.address,
                port: outcome.port,
                status: outcome.status,
                response_time_ms: outcome.response_time_ms,
                scanned_at,
            })
            .await?;

        let transition = Transition::between(prior, outcome.status);
        match transition {
            Transition::Opened => self.notify_opened(target_id, &outcome).await,
            Transition::ClosurePending => self.verifier.schedule(VerificationKey {
                target_id,
                address: outcome.address,
                port: outcome.port,
            }),
            Transition::FirstSeenOpen => debug!(
                target: "scan::session",
                %target_id,
                address = %outcome.address,
                port = outcome.port,
                "first observation of open port"
            ),
            Transition::Unchanged => {}
        }

        Ok((stored, transition))
    }

    async fn notify_opened(&self, target_id: TargetId, outcome: &ProbeOutcome) {
        let notification = NewNotification::port_transition(
            NotificationKind::NewPort,
            target_id,
            outcome.address,
            outcome.port,
        );
        match self.notifications.insert_notification(&notification).await {
            Ok(_) => info!(
                target: "scan::session",
                %target_id,
                address = %outcome.address,
                port = outcome.port,
                "new open port detected"
            ),
            Err(err) => warn!(
                target: "scan::session",
                %target_id,
                address = %outcome.address,
                port = outcome.port,
                error = %err,
                "failed to record new port notification"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::IpAddr, time::Duration};

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::{
        config::VerificationShutdown,
        database::{InMemoryStore, StoreFault, ports::TargetRepository},
        error::ScanError,
        scan::testing::ScriptedProber,
        target::NewTarget,
    };

    struct Harness {
        store: Arc<InMemoryStore>,
        prober: Arc<ScriptedProber>,
        verifier: Arc<ClosureVerifier>,
        detector: ChangeDetector,
        target_id: TargetId,
        address: IpAddr,
        clock: DateTime<Utc>,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let prober = Arc::new(ScriptedProber::default());
            let verifier = Arc::new(ClosureVerifier::new(
                prober.clone(),
                store.clone(),
                Duration::from_secs(60),
            ));
            let detector = ChangeDetector::new(store.clone(), store.clone(), verifier.clone());
            let target = store
                .insert_target(&NewTarget::manual("10.0.0.7", "web").unwrap())
                .await
                .unwrap();
            Self {
                store,
                prober,
                verifier,
                detector,
                target_id: target.id,
                address: "10.0.0.7".parse().unwrap(),
                clock: Utc::now(),
            }
        }

        async fn observe(&mut self, port: u16, status: PortStatus) -> Result<Transition> {
            self.clock += ChronoDuration::minutes(15);
            let outcome = match status {
                PortStatus::Open => ProbeOutcome::open(self.address, port, 4),
                PortStatus::Closed => ProbeOutcome::closed(self.address, port),
            };
            self.detector
                .observe(self.target_id, outcome, self.clock)
                .await
                .map(|(_, transition)| transition)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_observations_never_notify() {
        let mut h = Harness::new().await;
        assert_eq!(h.observe(22, PortStatus::Closed).await.unwrap(), Transition::Unchanged);
        assert_eq!(h.observe(80, PortStatus::Open).await.unwrap(), Transition::FirstSeenOpen);
        assert_eq!(h.observe(22, PortStatus::Closed).await.unwrap(), Transition::Unchanged);

        assert!(h.store.notifications().is_empty());
        assert_eq!(h.store.results().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_to_open_notifies_immediately() {
        let mut h = Harness::new().await;
        h.observe(3389, PortStatus::Closed).await.unwrap();
        assert_eq!(h.observe(3389, PortStatus::Open).await.unwrap(), Transition::Opened);

        let notifications = h.store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::NewPort);
        assert_eq!(notifications[0].title, "New Open Port Detected");
        assert_eq!(notifications[0].message, "Port 3389 is now open on 10.0.0.7");
        assert_eq!(notifications[0].target_id, Some(h.target_id));
    }

    #[tokio::test(start_paused = true)]
    async fn open_to_closed_waits_for_verification() {
        let mut h = Harness::new().await;
        h.observe(22, PortStatus::Open).await.unwrap();
        assert_eq!(
            h.observe(22, PortStatus::Closed).await.unwrap(),
            Transition::ClosurePending
        );
        assert!(h.store.notifications().is_empty());
        assert_eq!(h.verifier.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let notifications = h.store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::PortClosed);
        // The re-probe does not append a row.
        assert_eq!(h.store.results().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_port_is_suppressed() {
        let mut h = Harness::new().await;
        h.observe(22, PortStatus::Open).await.unwrap();
        h.observe(22, PortStatus::Closed).await.unwrap();
        h.prober.set(h.address, 22, PortStatus::Open);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(h.store.notifications().is_empty());
        assert_eq!(h.prober.probes_of(h.address, 22), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_is_treated_as_absent() {
        let mut h = Harness::new().await;
        h.observe(22, PortStatus::Closed).await.unwrap();
        h.store.set_fault(StoreFault::LatestStatus, true);

        assert_eq!(h.observe(22, PortStatus::Open).await.unwrap(), Transition::FirstSeenOpen);
        assert!(h.store.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_insert_drops_the_result() {
        let mut h = Harness::new().await;
        h.observe(22, PortStatus::Open).await.unwrap();
        h.store.set_fault(StoreFault::InsertResult, true);

        let err = h.observe(22, PortStatus::Closed).await.unwrap_err();
        assert!(matches!(err, ScanError::StoreUnavailable(_)));
        assert_eq!(h.verifier.pending_count(), 0);

        h.verifier.shutdown(VerificationShutdown::Cancel).await;
    }
}
