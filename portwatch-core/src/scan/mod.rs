//! Probing and scan orchestration.
//!
//! Data flows scheduler -> resolver -> [`pool::WorkerPool`] ->
//! [`probe::PortProber`] -> [`detector::ChangeDetector`], which persists each
//! observation and hands open -> closed transitions to the
//! [`verifier::ClosureVerifier`].

pub mod detector;
pub mod pool;
pub mod probe;
pub mod scheduler;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use detector::{ChangeDetector, Transition};
pub use pool::{WorkerPool, probe_ports};
pub use probe::{DEFAULT_PORTS, PortProber, ProbeOutcome, TcpProber};
pub use scheduler::{ScanScheduler, TriggerOutcome};
pub use verifier::{ClosureVerifier, VerificationKey};
