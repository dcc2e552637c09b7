//! Test doubles shared by the scan unit tests.

use std::{collections::HashMap, net::IpAddr, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use portwatch_model::PortStatus;

use super::probe::{PortProber, ProbeOutcome};

/// Prober answering from a table; unknown pairs are closed.
#[derive(Debug, Default)]
pub(crate) struct ScriptedProber {
    statuses: Mutex<HashMap<(IpAddr, u16), PortStatus>>,
    everywhere: Mutex<HashMap<u16, PortStatus>>,
    probes: Mutex<HashMap<(IpAddr, u16), usize>>,
    latency: Mutex<Duration>,
}

impl ScriptedProber {
    pub(crate) fn set(&self, address: IpAddr, port: u16, status: PortStatus) {
        self.statuses.lock().insert((address, port), status);
    }

    /// Status for `port` on every address without an explicit entry.
    pub(crate) fn set_everywhere(&self, port: u16, status: PortStatus) {
        self.everywhere.lock().insert(port, status);
    }

    /// Simulated time each probe takes.
    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub(crate) fn probes_of(&self, address: IpAddr, port: u16) -> usize {
        self.probes
            .lock()
            .get(&(address, port))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn total_probes(&self) -> usize {
        self.probes.lock().values().sum()
    }
}

#[async_trait]
impl PortProber for ScriptedProber {
    async fn probe(&self, address: IpAddr, port: u16) -> ProbeOutcome {
        *self.probes.lock().entry((address, port)).or_default() += 1;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let explicit = self.statuses.lock().get(&(address, port)).copied();
        let status = explicit
            .or_else(|| self.everywhere.lock().get(&port).copied())
            .unwrap_or(PortStatus::Closed);
        match status {
            PortStatus::Open => ProbeOutcome::open(address, port, 1),
            PortStatus::Closed => ProbeOutcome::closed(address, port),
        }
    }
}
