use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "database")]
use sqlx::PgPool;

#[cfg(feature = "database")]
use crate::database::infrastructure::postgres::{
    PostgresNotificationRepository, PostgresScanResultRepository,
    PostgresSessionRepository, PostgresTargetRepository,
};
use crate::database::{
    memory::InMemoryStore,
    ports::{
        NotificationRepository, ScanResultRepository, SessionRepository,
        TargetRepository,
    },
};

/// Aggregates the repository ports used by the scheduler and reconciler.
#[derive(Clone)]
pub struct ScanUnitOfWork {
    pub targets: Arc<dyn TargetRepository>,
    pub results: Arc<dyn ScanResultRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl fmt::Debug for ScanUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanUnitOfWork")
            .field("targets", &type_name_of_val(self.targets.as_ref()))
            .field("results", &type_name_of_val(self.results.as_ref()))
            .field("sessions", &type_name_of_val(self.sessions.as_ref()))
            .field(
                "notifications",
                &type_name_of_val(self.notifications.as_ref()),
            )
            .finish()
    }
}

impl ScanUnitOfWork {
    /// Every port served by one shared in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            targets: store.clone(),
            results: store.clone(),
            sessions: store.clone(),
            notifications: store,
        }
    }

    /// Compose the Postgres-backed repository adapters over one pool.
    #[cfg(feature = "database")]
    pub fn from_postgres(pool: PgPool) -> Self {
        Self {
            targets: Arc::new(PostgresTargetRepository::new(pool.clone())),
            results: Arc::new(PostgresScanResultRepository::new(pool.clone())),
            sessions: Arc::new(PostgresSessionRepository::new(pool.clone())),
            notifications: Arc::new(PostgresNotificationRepository::new(pool)),
        }
    }
}
