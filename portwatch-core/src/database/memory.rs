//! In-process implementation of every repository port.
//!
//! Used by the test suites and handy for dry runs without PostgreSQL. It
//! keeps the same semantics as the SQL adapter: results are append-only,
//! sessions finalize once, and the latest row per key wins by timestamp
//! (ties resolved by insertion order).

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    net::IpAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use portwatch_model::{
    LatestResult, NewNotification, NewScanResult, Notification, NotificationId, PortStatus,
    ResultId, ScanResult, ScanSession, SessionId, SessionStatus, Target, TargetId,
    TargetSource,
};

use crate::{
    database::ports::{
        NotificationRepository, ScanResultRepository, SessionRepository, TargetRepository,
    },
    error::{Result, ScanError},
    target::NewTarget,
};

/// Operations that can be forced to fail, to exercise store outages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFault {
    ListTargets,
    InsertResult,
    LatestStatus,
    CreateSession,
    InsertNotification,
}

#[derive(Debug, Default)]
struct State {
    targets: BTreeMap<TargetId, Target>,
    results: Vec<ScanResult>,
    sessions: Vec<ScanSession>,
    notifications: Vec<Notification>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    faults: RwLock<HashSet<StoreFault>>,
    target_writes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fault(&self, fault: StoreFault, enabled: bool) {
        let mut faults = self.faults.write();
        if enabled {
            faults.insert(fault);
        } else {
            faults.remove(&fault);
        }
    }

    /// Number of inserts, updates and deletes applied to targets so far.
    pub fn target_writes(&self) -> u64 {
        self.target_writes.load(Ordering::SeqCst)
    }

    pub fn results(&self) -> Vec<ScanResult> {
        self.state.read().results.clone()
    }

    pub fn sessions(&self) -> Vec<ScanSession> {
        self.state.read().sessions.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.read().notifications.clone()
    }

    fn check(&self, fault: StoreFault) -> Result<()> {
        if self.faults.read().contains(&fault) {
            return Err(ScanError::StoreUnavailable(format!(
                "injected fault: {fault:?}"
            )));
        }
        Ok(())
    }

    fn bump_target_writes(&self) {
        self.target_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn latest_by_pair(state: &State) -> Vec<LatestResult> {
        let mut latest: HashMap<(IpAddr, u16), &ScanResult> = HashMap::new();
        let mut first_open: HashMap<(IpAddr, u16), chrono::DateTime<Utc>> = HashMap::new();

        for row in &state.results {
            let key = (row.address, row.port);
            match latest.get(&key) {
                Some(existing) if existing.scanned_at > row.scanned_at => {}
                _ => {
                    latest.insert(key, row);
                }
            }
            if row.status.is_open() {
                first_open
                    .entry(key)
                    .and_modify(|at| *at = (*at).min(row.scanned_at))
                    .or_insert(row.scanned_at);
            }
        }

        let mut rows: Vec<LatestResult> = latest
            .into_iter()
            .map(|(key, row)| LatestResult {
                result: row.clone(),
                first_seen_open_at: first_open.get(&key).copied(),
            })
            .collect();
        rows.sort_by_key(|r| (r.result.address, r.result.port));
        rows
    }
}

#[async_trait]
impl TargetRepository for InMemoryStore {
    async fn list_targets(&self) -> Result<Vec<Target>> {
        self.check(StoreFault::ListTargets)?;
        let mut targets: Vec<Target> = self.state.read().targets.values().cloned().collect();
        targets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(targets)
    }

    async fn list_enabled_targets(&self) -> Result<Vec<Target>> {
        self.check(StoreFault::ListTargets)?;
        Ok(self
            .state
            .read()
            .targets
            .values()
            .filter(|t| t.enabled)
            .cloned()
            .collect())
    }

    async fn list_managed_targets(&self) -> Result<Vec<Target>> {
        self.check(StoreFault::ListTargets)?;
        Ok(self
            .state
            .read()
            .targets
            .values()
            .filter(|t| t.source == TargetSource::Inventory)
            .cloned()
            .collect())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>> {
        Ok(self.state.read().targets.get(&id).cloned())
    }

    async fn insert_target(&self, target: &NewTarget) -> Result<Target> {
        let now = Utc::now();
        let row = Target {
            id: TargetId::new(),
            address: target.address().to_string(),
            description: target.description().to_string(),
            enabled: true,
            source: target.source(),
            created_at: now,
            updated_at: now,
        };
        self.state.write().targets.insert(row.id, row.clone());
        self.bump_target_writes();
        Ok(row)
    }

    async fn update_description(&self, id: TargetId, description: &str) -> Result<Target> {
        let mut state = self.state.write();
        let target = state
            .targets
            .get_mut(&id)
            .ok_or_else(|| ScanError::NotFound(format!("target {id}")))?;
        target.description = description.to_string();
        target.updated_at = Utc::now();
        let updated = target.clone();
        drop(state);
        self.bump_target_writes();
        Ok(updated)
    }

    async fn toggle_target(&self, id: TargetId) -> Result<Target> {
        let mut state = self.state.write();
        let target = state
            .targets
            .get_mut(&id)
            .ok_or_else(|| ScanError::NotFound(format!("target {id}")))?;
        target.enabled = !target.enabled;
        target.updated_at = Utc::now();
        let updated = target.clone();
        drop(state);
        self.bump_target_writes();
        Ok(updated)
    }

    async fn delete_target(&self, id: TargetId) -> Result<()> {
        let mut state = self.state.write();
        if state.targets.remove(&id).is_none() {
            return Err(ScanError::NotFound(format!("target {id}")));
        }
        // Result history stays; notifications lose the reference.
        for notification in state.notifications.iter_mut() {
            if notification.target_id == Some(id) {
                notification.target_id = None;
            }
        }
        drop(state);
        self.bump_target_writes();
        Ok(())
    }
}

#[async_trait]
impl ScanResultRepository for InMemoryStore {
    async fn insert_result(&self, result: &NewScanResult) -> Result<ScanResult> {
        self.check(StoreFault::InsertResult)?;
        let mut state = self.state.write();
        if !state.targets.contains_key(&result.target_id) {
            return Err(ScanError::NotFound(format!(
                "target {} for scan result",
                result.target_id
            )));
        }
        let row = ScanResult {
            id: ResultId::new(),
            target_id: result.target_id,
            address: result.address,
            port: result.port,
            status: result.status,
            response_time_ms: result.response_time_ms,
            scanned_at: result.scanned_at,
        };
        state.results.push(row.clone());
        Ok(row)
    }

    async fn latest_status(
        &self,
        target_id: TargetId,
        address: IpAddr,
        port: u16,
    ) -> Result<Option<PortStatus>> {
        self.check(StoreFault::LatestStatus)?;
        let state = self.state.read();
        let mut latest: Option<&ScanResult> = None;
        for row in state
            .results
            .iter()
            .filter(|r| r.target_id == target_id && r.address == address && r.port == port)
        {
            match latest {
                Some(existing) if existing.scanned_at > row.scanned_at => {}
                _ => latest = Some(row),
            }
        }
        Ok(latest.map(|r| r.status))
    }

    async fn latest_results(&self) -> Result<Vec<LatestResult>> {
        Ok(Self::latest_by_pair(&self.state.read()))
    }

    async fn open_ports(&self) -> Result<Vec<LatestResult>> {
        Ok(Self::latest_by_pair(&self.state.read())
            .into_iter()
            .filter(|r| r.result.status.is_open())
            .collect())
    }

    async fn results_for_address(&self, address: IpAddr) -> Result<Vec<ScanResult>> {
        let mut rows: Vec<ScanResult> = self
            .state
            .read()
            .results
            .iter()
            .filter(|r| r.address == address)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.scanned_at
                .cmp(&a.scanned_at)
                .then_with(|| a.port.cmp(&b.port))
        });
        rows.truncate(100);
        Ok(rows)
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create_session(&self) -> Result<ScanSession> {
        self.check(StoreFault::CreateSession)?;
        let session = ScanSession {
            id: SessionId::new(),
            started_at: Utc::now(),
            completed_at: None,
            addresses_scanned: 0,
            ports_scanned: 0,
            status: SessionStatus::Running,
        };
        self.state.write().sessions.push(session.clone());
        Ok(session)
    }

    async fn complete_session(
        &self,
        id: SessionId,
        addresses_scanned: u64,
        ports_scanned: u64,
    ) -> Result<ScanSession> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.status == SessionStatus::Running)
            .ok_or_else(|| ScanError::NotFound(format!("running session {id}")))?;
        session.completed_at = Some(Utc::now());
        session.addresses_scanned = addresses_scanned;
        session.ports_scanned = ports_scanned;
        session.status = SessionStatus::Completed;
        Ok(session.clone())
    }

    async fn fail_session(&self, id: SessionId) -> Result<ScanSession> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.status == SessionStatus::Running)
            .ok_or_else(|| ScanError::NotFound(format!("running session {id}")))?;
        session.completed_at = Some(Utc::now());
        session.status = SessionStatus::Failed;
        Ok(session.clone())
    }

    async fn recent_sessions(&self, limit: u32) -> Result<Vec<ScanSession>> {
        let mut sessions = self.state.read().sessions.clone();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.check(StoreFault::InsertNotification)?;
        let mut state = self.state.write();
        let target_id = notification
            .target_id
            .filter(|id| state.targets.contains_key(id));
        let row = Notification {
            id: NotificationId::new(),
            kind: notification.kind,
            title: notification.title.clone(),
            message: notification.message.clone(),
            severity: notification.severity,
            address: notification.address,
            port: notification.port,
            target_id,
            read: false,
            created_at: Utc::now(),
        };
        state.notifications.push(row.clone());
        Ok(row)
    }

    async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .state
            .read()
            .notifications
            .iter()
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(100);
        Ok(rows)
    }

    async fn unread_count(&self) -> Result<u64> {
        Ok(self
            .state
            .read()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .count() as u64)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<()> {
        let mut state = self.state.write();
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| ScanError::NotFound(format!("notification {id}")))?;
        notification.read = true;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<u64> {
        let mut state = self.state.write();
        let mut changed = 0;
        for notification in state.notifications.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_notification(&self, id: NotificationId) -> Result<()> {
        let mut state = self.state.write();
        let before = state.notifications.len();
        state.notifications.retain(|n| n.id != id);
        if state.notifications.len() == before {
            return Err(ScanError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    async fn delete_read(&self) -> Result<u64> {
        let mut state = self.state.write();
        let before = state.notifications.len();
        state.notifications.retain(|n| !n.read);
        Ok((before - state.notifications.len()) as u64)
    }
}
