//! Commit coordinator state machine
//!
//! Drives one transaction's participants to a unanimous outcome. Each phase
//! follows write-ahead discipline: the durable write must be acknowledged
//! before the next network fan-out begins. The participant list is durable
//! before any prepare is sent, and the decision is durable before any
//! terminal action is sent, so recovery always knows whom to re-contact and
//! what to tell them.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::phase::{Phase, PhaseInfo, PhaseTracker};
use pact_common::{ParticipantId, TxnId};
use pact_hlc::{HlcClock, HlcTimestamp};
use pact_participant::{
    AbortRequest, AckStatus, CommitRequest, ParticipantClient, PrepareRequest, PrepareVote,
};
use pact_store::{CoordinatorRecord, CoordinatorStore, Decision, StoreError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// State machine for a single coordination.
///
/// Owns exactly one durable record's lifecycle; never shared across
/// transaction identities.
pub struct Coordinator<S, P> {
    txn_id: TxnId,
    participants: Vec<ParticipantId>,
    store: Arc<S>,
    client: Arc<P>,
    clock: Arc<HlcClock>,
    config: CoordinatorConfig,
    tracker: Arc<PhaseTracker>,
}

impl<S, P> Coordinator<S, P>
where
    S: CoordinatorStore + 'static,
    P: ParticipantClient + 'static,
{
    /// Create a coordinator plus the phase receiver for the catalog entry.
    pub(crate) fn new(
        txn_id: TxnId,
        participants: Vec<ParticipantId>,
        store: Arc<S>,
        client: Arc<P>,
        clock: Arc<HlcClock>,
        config: CoordinatorConfig,
    ) -> (Self, watch::Receiver<PhaseInfo>) {
        let (tracker, phases) = PhaseTracker::new();
        (
            Self {
                txn_id,
                participants,
                store,
                client,
                clock,
                config,
                tracker,
            },
            phases,
        )
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Run a fresh coordination from the beginning.
    pub async fn run(&self) -> Result<Decision> {
        self.tracker.enter(Phase::WritingParticipantList);
        let record = CoordinatorRecord::new(self.txn_id, self.participants.clone());
        self.store.create_record(record).map_err(|e| self.fatal(e))?;

        self.run_from_prepare().await
    }

    /// Resume a coordination reconstructed from a persisted record.
    ///
    /// The participant list is already durable; with no decision the
    /// prepare round is re-run (prepare is idempotent at the participant),
    /// otherwise the terminal action is re-delivered to everyone, since
    /// which participants acknowledged before the crash is not tracked.
    pub async fn resume(&self, decision: Option<Decision>) -> Result<Decision> {
        match decision {
            None => self.run_from_prepare().await,
            Some(decision) => self.run_terminal(decision).await,
        }
    }

    async fn run_from_prepare(&self) -> Result<Decision> {
        self.tracker.enter(Phase::SendingPrepare);
        let votes = self.collect_votes().await;
        let decision = self.decide(&votes);

        self.tracker.enter(Phase::WritingDecision);
        self.store
            .record_decision(&self.txn_id, decision)
            .map_err(|e| self.fatal(e))?;
        tracing::info!(
            "recorded {} decision for transaction {}",
            decision.as_str(),
            self.txn_id
        );

        self.run_terminal(decision).await
    }

    /// Fan out prepare to every participant concurrently and wait for the
    /// full vote set; a slow or failing participant never cuts the other
    /// in-flight votes short.
    async fn collect_votes(&self) -> Vec<(ParticipantId, PrepareVote)> {
        let mut tasks = JoinSet::new();
        for participant in &self.participants {
            tasks.spawn(Self::prepare_participant(
                self.client.clone(),
                self.tracker.clone(),
                participant.clone(),
                self.txn_id,
                self.config.clone(),
            ));
        }

        let mut votes = Vec::with_capacity(self.participants.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(vote) => votes.push(vote),
                Err(e) => tracing::error!("prepare task for {} panicked: {}", self.txn_id, e),
            }
        }
        votes
    }

    /// One participant's prepare round: bounded retries with backoff while
    /// unreachable, converting to an abort vote once the budget is spent.
    async fn prepare_participant(
        client: Arc<P>,
        tracker: Arc<PhaseTracker>,
        participant: ParticipantId,
        txn_id: TxnId,
        config: CoordinatorConfig,
    ) -> (ParticipantId, PrepareVote) {
        let mut backoff = config.backoff_initial;
        let mut attempts = 0u32;

        loop {
            let request = PrepareRequest::new(txn_id, config.request_timeout);
            let vote = match timeout(config.request_timeout, client.prepare(&participant, request))
                .await
            {
                Ok(vote) => vote,
                Err(_) => PrepareVote::Unreachable,
            };

            match vote {
                PrepareVote::Unreachable => {
                    attempts += 1;
                    if attempts >= config.prepare_retry_limit {
                        tracing::warn!(
                            "participant {} unreachable for {} after {} prepare attempts, treating as abort vote",
                            participant,
                            txn_id,
                            attempts
                        );
                        return (
                            participant,
                            PrepareVote::VoteAbort {
                                reason: "participant unreachable".to_string(),
                            },
                        );
                    }
                    tracker.note_retry();
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(config.backoff_max);
                }
                vote => return (participant, vote),
            }
        }
    }

    /// Aggregate the full vote set into a decision.
    ///
    /// Unanimous prepared votes commit at a timestamp folded through the
    /// coordinator clock, so it is ordered after every partition's prepare.
    fn decide(&self, votes: &[(ParticipantId, PrepareVote)]) -> Decision {
        // A commit requires a vote from every participant; a missing vote
        // (a prepare task that panicked) is indistinguishable from a
        // participant that never prepared.
        if votes.len() < self.participants.len() {
            tracing::warn!(
                "only {} of {} prepare votes collected for {}, aborting",
                votes.len(),
                self.participants.len(),
                self.txn_id
            );
            return Decision::Abort;
        }

        let mut max_prepare: Option<HlcTimestamp> = None;

        for (participant, vote) in votes {
            match vote {
                PrepareVote::Prepared { prepare_timestamp } => {
                    max_prepare = Some(match max_prepare {
                        Some(ts) => ts.max(*prepare_timestamp),
                        None => *prepare_timestamp,
                    });
                }
                PrepareVote::VoteAbort { reason } => {
                    tracing::info!(
                        "participant {} voted to abort {}: {}",
                        participant,
                        self.txn_id,
                        reason
                    );
                    return Decision::Abort;
                }
                // collect_votes only yields settled votes; treat anything
                // else as a vote to abort rather than guessing
                PrepareVote::Unreachable => return Decision::Abort,
            }
        }

        let commit_timestamp = match max_prepare {
            Some(ts) => self.clock.observe(&ts),
            // No participants: trivially unanimous
            None => self.clock.now(),
        };
        Decision::Commit { commit_timestamp }
    }

    /// Deliver the terminal action to everyone, delete the record, finish.
    async fn run_terminal(&self, decision: Decision) -> Result<Decision> {
        match decision {
            Decision::Commit { .. } => self.tracker.enter(Phase::SendingCommit),
            Decision::Abort => self.tracker.enter(Phase::SendingAbort),
        }

        let mut tasks = JoinSet::new();
        for participant in &self.participants {
            tasks.spawn(Self::deliver_terminal(
                self.client.clone(),
                self.tracker.clone(),
                participant.clone(),
                self.txn_id,
                decision,
                self.config.clone(),
            ));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("terminal delivery task for {} panicked: {}", self.txn_id, e);
            }
        }

        self.tracker.enter(Phase::DeletingRecord);
        match self.store.delete_record(&self.txn_id) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                // The decision is durable and fully acknowledged; a missing
                // record here means someone else cleaned up. Loud, but the
                // outcome stands.
                tracing::error!(
                    "record for {} was already deleted; duplicate coordinator suspected",
                    self.txn_id
                );
            }
            Err(e) => return Err(self.fatal(e)),
        }

        self.tracker.enter(Phase::Done);
        Ok(decision)
    }

    /// One participant's terminal delivery: retried with backoff until
    /// acknowledged. The decision is already durable and irrevocable, so an
    /// unacknowledged terminal action is never abandoned.
    async fn deliver_terminal(
        client: Arc<P>,
        tracker: Arc<PhaseTracker>,
        participant: ParticipantId,
        txn_id: TxnId,
        decision: Decision,
        config: CoordinatorConfig,
    ) {
        let mut backoff = config.backoff_initial;
        let mut attempts = 0u64;

        loop {
            let delivery = match decision {
                Decision::Commit { commit_timestamp } => client.commit(
                    &participant,
                    CommitRequest::new(txn_id, commit_timestamp),
                ),
                Decision::Abort => client.abort(&participant, AbortRequest::new(txn_id)),
            };
            let status = match timeout(config.request_timeout, delivery).await {
                Ok(status) => status,
                Err(_) => AckStatus::Unreachable,
            };

            if status == AckStatus::Acknowledged {
                return;
            }

            attempts += 1;
            tracker.note_retry();
            tracing::warn!(
                "participant {} has not acknowledged {} for {} (attempt {}), retrying",
                participant,
                decision.as_str(),
                txn_id,
                attempts
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(config.backoff_max);
        }
    }

    /// A store failure is fatal to this in-memory instance; the persisted
    /// record (if any) is left in place for recovery.
    fn fatal(&self, e: StoreError) -> CoordinatorError {
        let err = CoordinatorError::from(e);
        tracing::error!("coordination for {} failed: {}", self.txn_id, err);
        err
    }
}
