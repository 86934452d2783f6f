//! Common identity types for the pact commit coordinator
//!
//! This crate defines:
//! - Session identifiers and session-scoped transaction identities
//! - Participant (partition) identifiers, validated at construction

mod participant;
mod txn;

pub use participant::ParticipantId;
pub use txn::SessionId;
pub use txn::TxnId;

use thiserror::Error;

/// Errors raised when constructing or parsing identity types.
///
/// These are the only programmer-error conditions the protocol layers are
/// allowed to surface; expected protocol outcomes are always values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid session ID: {0}")]
    InvalidSession(String),

    #[error("Invalid transaction ID: {0}")]
    InvalidTxn(String),

    #[error("Invalid participant ID: {0}")]
    InvalidParticipant(String),
}
