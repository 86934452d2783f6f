//! Typed per-phase requests
//!
//! Every request carries the transaction identity; prepare additionally
//! carries the per-request deadline, and commit carries the decided commit
//! timestamp. Structured types rather than loose headers so a transport can
//! validate at the boundary before anything reaches a partition.

use pact_common::TxnId;
use pact_hlc::HlcTimestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// First-phase vote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Transaction identity
    pub txn_id: TxnId,
    /// How long the participant has to reply before the coordinator treats
    /// it as unreachable
    pub timeout: Duration,
}

impl PrepareRequest {
    pub fn new(txn_id: TxnId, timeout: Duration) -> Self {
        Self { txn_id, timeout }
    }
}

/// Terminal commit delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// Transaction identity
    pub txn_id: TxnId,
    /// Decided commit timestamp, ordered after every prepare timestamp
    pub commit_timestamp: HlcTimestamp,
}

impl CommitRequest {
    pub fn new(txn_id: TxnId, commit_timestamp: HlcTimestamp) -> Self {
        Self {
            txn_id,
            commit_timestamp,
        }
    }
}

/// Terminal abort delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortRequest {
    /// Transaction identity
    pub txn_id: TxnId,
}

impl AbortRequest {
    pub fn new(txn_id: TxnId) -> Self {
        Self { txn_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pact_common::SessionId;
    use pact_hlc::NodeId;

    #[test]
    fn test_requests_serialize() {
        let txn_id = TxnId::new(SessionId::new(), 9);

        let prepare = PrepareRequest::new(txn_id, Duration::from_secs(5));
        let encoded = serde_json::to_string(&prepare).unwrap();
        assert_eq!(prepare, serde_json::from_str(&encoded).unwrap());

        let commit = CommitRequest::new(txn_id, HlcTimestamp::new(100, 2, NodeId::new(3)));
        let encoded = serde_json::to_string(&commit).unwrap();
        assert_eq!(commit, serde_json::from_str(&encoded).unwrap());
    }
}
