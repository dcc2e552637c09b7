//! PostgreSQL infrastructure adapters implementing the database ports.

pub mod repositories;

pub use repositories::notifications::PostgresNotificationRepository;
pub use repositories::results::PostgresScanResultRepository;
pub use repositories::sessions::PostgresSessionRepository;
pub use repositories::targets::PostgresTargetRepository;
