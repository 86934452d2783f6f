//! Participant client contract
//!
//! This crate defines typed per-phase requests and the client trait the
//! coordinator fans out through. The client translates a logical
//! "prepare/commit/abort for transaction X" into a request to a named
//! partition and normalizes the reply; expected protocol outcomes (abort
//! votes, timeouts) are values, never errors. The client holds no
//! coordinator state.

mod requests;

pub use requests::{AbortRequest, CommitRequest, PrepareRequest};

use async_trait::async_trait;
use pact_common::ParticipantId;
use pact_hlc::HlcTimestamp;
use serde::{Deserialize, Serialize};

/// A participant's reply to a prepare request, one per prepare round.
///
/// Ephemeral: only the aggregate decision is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareVote {
    /// The participant durably promises it can commit if asked, at or after
    /// the reported timestamp.
    Prepared { prepare_timestamp: HlcTimestamp },
    /// The participant cannot commit; folds into an abort decision.
    VoteAbort { reason: String },
    /// No reply before the deadline. Retried with bounded backoff; only an
    /// exhausted retry budget converts this into a vote to abort.
    Unreachable,
}

/// Outcome of delivering a terminal commit/abort action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    /// The participant applied (or had already applied) the terminal action.
    Acknowledged,
    /// No reply before the deadline; the delivery will be retried.
    Unreachable,
}

/// Client for sending protocol requests to participants.
///
/// All three operations must be idempotent at the participant: a replayed
/// prepare returns the original vote and a replayed terminal action is a
/// no-op acknowledgment. Recovery relies on both.
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    /// Ask a participant to prepare; resolves to its vote.
    async fn prepare(&self, participant: &ParticipantId, request: PrepareRequest) -> PrepareVote;

    /// Deliver the commit decision with its commit timestamp.
    async fn commit(&self, participant: &ParticipantId, request: CommitRequest) -> AckStatus;

    /// Deliver the abort decision.
    async fn abort(&self, participant: &ParticipantId, request: AbortRequest) -> AckStatus;
}
