//! Two-phase commit coordinator
//!
//! Drives a transaction spanning independent data partitions to a single
//! durable outcome: persist the participant list, fan out prepare, persist
//! the decision, fan out commit/abort until every participant acknowledges,
//! delete the record. A catalog tracks the active coordinations (at most one
//! per transaction identity) and a reporter exposes each one's current
//! phase for introspection. Recovery rebuilds coordinators from persisted
//! records after a restart.

mod catalog;
mod config;
mod coordinator;
mod error;
mod phase;
mod report;
mod service;

pub use catalog::{Catalog, CatalogEntry};
pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
pub use phase::{Phase, PhaseInfo};
pub use report::{CoordinationReport, Reporter};
pub use service::{CommitService, Outcome, RecoveredCoordination};
