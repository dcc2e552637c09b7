//! # Portwatch Core
//!
//! Scan orchestration engine for the portwatch daemon. It continuously probes
//! a configured set of addresses and CIDR blocks for open TCP ports, records
//! every observation as an append-only time series, and raises notifications
//! when a port changes state.
//!
//! ## Architecture
//!
//! - [`target`]: expands stored target strings into concrete addresses and
//!   validates new registrations
//! - [`scan`]: the TCP prober, the bounded worker pool, the scan scheduler,
//!   and the change detector with its delayed closure verifier
//! - [`inventory`]: live cloud address sources and the reconciler that keeps
//!   auto-imported targets in sync with them
//! - [`database`]: repository ports plus PostgreSQL and in-memory adapters
//! - [`config`]: serde-backed tuning knobs with production defaults
//!
//! ## Feature Flags
//!
//! - `database` (default): PostgreSQL repositories and embedded migrations

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Configuration structs and loading helpers
pub mod config;

/// Repository ports and storage adapters
pub mod database;

/// Error types shared by the engine
pub mod error;

/// Cloud inventory sources and target reconciliation
pub mod inventory;

/// Probing, worker pool, scheduling and change detection
pub mod scan;

/// Target grammar, address expansion and validated registrations
pub mod target;

#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use config::PortwatchConfig;
pub use database::ScanUnitOfWork;
pub use error::{Result, ScanError};
pub use inventory::{InventoryReconciler, InventorySource};
pub use portwatch_model as model;
pub use scan::{ScanScheduler, TriggerOutcome};
