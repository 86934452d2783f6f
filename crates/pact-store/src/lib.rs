//! Durable coordinator store contract
//!
//! The coordinator persists one record per in-flight coordination. The
//! record is created before any prepare is sent, the decision is recorded
//! before any terminal action is sent, and the record is deleted only after
//! every participant has acknowledged the terminal action. A restarted
//! process replays `list_all` to resume whatever was in flight.

use pact_common::{ParticipantId, TxnId};
use pact_hlc::HlcTimestamp;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// The durably recorded outcome of a coordination.
///
/// The commit variant carries its timestamp so a commit decision can never
/// be persisted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Commit, ordered after every participant's prepare timestamp
    Commit { commit_timestamp: HlcTimestamp },
    /// Abort
    Abort,
}

impl Decision {
    /// Short name for logging and introspection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Commit { .. } => "commit",
            Decision::Abort => "abort",
        }
    }
}

/// One persisted record per in-flight coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorRecord {
    /// Transaction identity (record key)
    pub txn_id: TxnId,
    /// Participant list; write-once, never changes for the life of the record
    pub participants: Vec<ParticipantId>,
    /// Decision; write-once after the prepare round completes
    pub decision: Option<Decision>,
    /// Wall-clock creation time (ms since epoch)
    pub created_at_ms: u64,
    /// Wall-clock decision time (ms since epoch)
    pub decided_at_ms: Option<u64>,
}

impl CoordinatorRecord {
    /// Create an undecided record for a fresh coordination.
    pub fn new(txn_id: TxnId, participants: Vec<ParticipantId>) -> Self {
        Self {
            txn_id,
            participants,
            decision: None,
            created_at_ms: now_ms(),
            decided_at_ms: None,
        }
    }
}

/// Wall-clock milliseconds since epoch, for record lifecycle timestamps.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Store error taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record already exists for transaction {0}")]
    AlreadyExists(TxnId),

    #[error("No record for transaction {0}")]
    NotFound(TxnId),

    #[error("Conflicting decision for transaction {txn_id}: {existing:?} already recorded, attempted {attempted:?}")]
    DecisionConflict {
        txn_id: TxnId,
        existing: Decision,
        attempted: Decision,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record encoding error: {0}")]
    Codec(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Trait for durable coordinator record storage.
///
/// Calls are synchronous commit points: the coordinator task does not start
/// the next network fan-out until the call has returned with the write
/// acknowledged durable.
pub trait CoordinatorStore: Send + Sync {
    /// Persist a fresh record. Fails with `AlreadyExists` if a record for
    /// the same transaction identity is already present.
    fn create_record(&self, record: CoordinatorRecord) -> StoreResult<()>;

    /// Persist the decision for an existing record.
    ///
    /// Replaying the identical decision is a no-op; recording a different
    /// decision fails with `DecisionConflict`.
    fn record_decision(&self, txn_id: &TxnId, decision: Decision) -> StoreResult<()>;

    /// Delete the record once every participant has acknowledged the
    /// terminal action. Fails with `NotFound` if absent.
    fn delete_record(&self, txn_id: &TxnId) -> StoreResult<()>;

    /// Iterate all persisted records. Used only at process-start recovery.
    fn list_all(&self) -> Box<dyn Iterator<Item = StoreResult<CoordinatorRecord>> + Send + '_>;
}
