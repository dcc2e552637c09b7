//! Repository ports (interfaces) grouped by aggregate.
//! The scan engine depends on these traits only; implementations live in
//! `database::infrastructure` and `database::memory`.

pub mod notifications;
pub mod results;
pub mod sessions;
pub mod targets;

pub use notifications::NotificationRepository;
pub use results::ScanResultRepository;
pub use sessions::SessionRepository;
pub use targets::TargetRepository;
