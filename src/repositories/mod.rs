//! # Repositories
//!
//! Database access layers encapsulating SeaORM operations for each entity.

pub mod connection;
pub mod cron_lease;
pub mod measurement;
pub mod sync_job;
pub mod system_event;

pub use connection::ConnectionRepository;
pub use cron_lease::{CronLeaseRepository, LeaseAcquisition};
pub use measurement::MeasurementRepository;
pub use sync_job::{FailureOutcome, SyncJobRepository};
pub use system_event::SystemEventRepository;
