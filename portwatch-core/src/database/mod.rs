//! Storage layer.
//!
//! The engine only talks to the narrow repository ports in [`ports`],
//! bundled together as a [`ScanUnitOfWork`]. Two adapters implement them:
//! PostgreSQL (behind the `database` feature) and an in-process
//! [`memory::InMemoryStore`].

#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
pub mod infrastructure;
pub mod memory;
pub mod ports;
pub mod unit_of_work;

pub use memory::{InMemoryStore, StoreFault};
pub use unit_of_work::ScanUnitOfWork;
