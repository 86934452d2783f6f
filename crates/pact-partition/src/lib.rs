//! In-memory participant partitions
//!
//! A cluster of named partitions that follows the production partition
//! contract: idempotent prepare (a replayed prepare returns the original
//! prepare timestamp), idempotent commit/abort acknowledgments, and a
//! per-partition logical clock. Fault injection hooks let tests drive
//! unreachable participants, dropped acknowledgments, and abort votes.

use async_trait::async_trait;
use pact_common::{ParticipantId, TxnId};
use pact_hlc::{HlcClock, HlcTimestamp, NodeId};
use pact_participant::{
    AbortRequest, AckStatus, CommitRequest, ParticipantClient, PrepareRequest, PrepareVote,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-transaction state inside one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnState {
    /// Prepared and promised to commit if asked
    Prepared { prepare_timestamp: HlcTimestamp },
    /// Terminal commit applied
    Committed {
        prepare_timestamp: HlcTimestamp,
        commit_timestamp: HlcTimestamp,
    },
    /// Terminal abort applied
    Aborted,
}

struct Partition {
    clock: Arc<HlcClock>,
    txns: HashMap<TxnId, TxnState>,
    /// When set, prepare requests vote to abort with this reason
    vote_abort: Option<String>,
    /// Next N prepare requests go unanswered
    failing_prepares: u32,
    /// Next N terminal deliveries are applied but the ack is lost
    dropped_acks: u32,
    /// Terminal deliveries observed, in arrival order
    delivery_log: Vec<(TxnId, &'static str)>,
}

impl Partition {
    fn new(node: u64) -> Self {
        Self {
            clock: Arc::new(HlcClock::new(NodeId::new(node))),
            txns: HashMap::new(),
            vote_abort: None,
            failing_prepares: 0,
            dropped_acks: 0,
            delivery_log: Vec::new(),
        }
    }
}

/// In-memory cluster of participant partitions.
pub struct MemoryCluster {
    partitions: Mutex<HashMap<ParticipantId, Partition>>,
    next_node: Mutex<u64>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
            next_node: Mutex::new(1),
        }
    }

    /// Add a partition to the cluster.
    pub fn add_partition(&self, participant: ParticipantId) {
        let mut partitions = self.partitions.lock();
        let mut next_node = self.next_node.lock();
        let node = *next_node;
        *next_node += 1;
        partitions.entry(participant).or_insert_with(|| Partition::new(node));
    }

    /// Make a partition vote to abort every prepare until cleared.
    pub fn force_vote_abort(&self, participant: &ParticipantId, reason: impl Into<String>) {
        if let Some(p) = self.partitions.lock().get_mut(participant) {
            p.vote_abort = Some(reason.into());
        }
    }

    /// Clear a forced abort vote.
    pub fn clear_vote_abort(&self, participant: &ParticipantId) {
        if let Some(p) = self.partitions.lock().get_mut(participant) {
            p.vote_abort = None;
        }
    }

    /// Leave the next `count` prepare requests unanswered.
    pub fn fail_next_prepares(&self, participant: &ParticipantId, count: u32) {
        if let Some(p) = self.partitions.lock().get_mut(participant) {
            p.failing_prepares = count;
        }
    }

    /// Apply but do not acknowledge the next `count` terminal deliveries.
    pub fn drop_next_acks(&self, participant: &ParticipantId, count: u32) {
        if let Some(p) = self.partitions.lock().get_mut(participant) {
            p.dropped_acks = count;
        }
    }

    /// Current transaction state on a partition, if any.
    pub fn txn_state(&self, participant: &ParticipantId, txn_id: &TxnId) -> Option<TxnState> {
        self.partitions
            .lock()
            .get(participant)
            .and_then(|p| p.txns.get(txn_id).cloned())
    }

    /// Terminal deliveries a partition has seen, in arrival order.
    pub fn delivery_log(&self, participant: &ParticipantId) -> Vec<(TxnId, &'static str)> {
        self.partitions
            .lock()
            .get(participant)
            .map(|p| p.delivery_log.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParticipantClient for MemoryCluster {
    async fn prepare(&self, participant: &ParticipantId, request: PrepareRequest) -> PrepareVote {
        let mut partitions = self.partitions.lock();
        let Some(partition) = partitions.get_mut(participant) else {
            return PrepareVote::Unreachable;
        };

        if partition.failing_prepares > 0 {
            partition.failing_prepares -= 1;
            return PrepareVote::Unreachable;
        }

        // Idempotent replay: return whatever was already promised
        match partition.txns.get(&request.txn_id) {
            Some(TxnState::Prepared { prepare_timestamp })
            | Some(TxnState::Committed {
                prepare_timestamp, ..
            }) => {
                return PrepareVote::Prepared {
                    prepare_timestamp: *prepare_timestamp,
                };
            }
            Some(TxnState::Aborted) => {
                return PrepareVote::VoteAbort {
                    reason: "transaction already aborted".to_string(),
                };
            }
            None => {}
        }

        if let Some(reason) = partition.vote_abort.clone() {
            partition.txns.insert(request.txn_id, TxnState::Aborted);
            return PrepareVote::VoteAbort { reason };
        }

        let prepare_timestamp = partition.clock.now();
        partition
            .txns
            .insert(request.txn_id, TxnState::Prepared { prepare_timestamp });
        PrepareVote::Prepared { prepare_timestamp }
    }

    async fn commit(&self, participant: &ParticipantId, request: CommitRequest) -> AckStatus {
        let mut partitions = self.partitions.lock();
        let Some(partition) = partitions.get_mut(participant) else {
            return AckStatus::Unreachable;
        };

        partition.delivery_log.push((request.txn_id, "commit"));
        partition.clock.observe(&request.commit_timestamp);

        // Apply idempotently, even when the ack below gets dropped
        let prepare_timestamp = match partition.txns.get(&request.txn_id) {
            Some(TxnState::Prepared { prepare_timestamp }) => *prepare_timestamp,
            Some(TxnState::Committed {
                prepare_timestamp, ..
            }) => *prepare_timestamp,
            // Commit for a transaction this partition never prepared; the
            // coordinator only sends these after a unanimous vote, so the
            // prepare state was lost locally. Accept the decision.
            Some(TxnState::Aborted) | None => request.commit_timestamp,
        };
        partition.txns.insert(
            request.txn_id,
            TxnState::Committed {
                prepare_timestamp,
                commit_timestamp: request.commit_timestamp,
            },
        );

        if partition.dropped_acks > 0 {
            partition.dropped_acks -= 1;
            return AckStatus::Unreachable;
        }
        AckStatus::Acknowledged
    }

    async fn abort(&self, participant: &ParticipantId, request: AbortRequest) -> AckStatus {
        let mut partitions = self.partitions.lock();
        let Some(partition) = partitions.get_mut(participant) else {
            return AckStatus::Unreachable;
        };

        partition.delivery_log.push((request.txn_id, "abort"));
        partition.txns.insert(request.txn_id, TxnState::Aborted);

        if partition.dropped_acks > 0 {
            partition.dropped_acks -= 1;
            return AckStatus::Unreachable;
        }
        AckStatus::Acknowledged
    }
}
