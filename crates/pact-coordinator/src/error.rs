//! Error types for the coordinator

use pact_common::TxnId;
use pact_store::StoreError;
use thiserror::Error;

/// Coordinator error types
///
/// Router-visible failures are only ever abort outcomes or a declined
/// request to start coordinating (`AlreadyActive`); everything else here is
/// fatal to the in-memory coordinator instance and handed to recovery.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("A coordinator is already active for transaction {0}")]
    AlreadyActive(TxnId),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Durable store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(_)
            | StoreError::NotFound(_)
            | StoreError::DecisionConflict { .. } => {
                CoordinatorError::ProtocolViolation(e.to_string())
            }
            StoreError::Unavailable(msg) => CoordinatorError::StoreUnavailable(msg),
            StoreError::Codec(msg) => CoordinatorError::StoreUnavailable(msg),
        }
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
