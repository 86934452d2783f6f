//! End-to-end two-phase commit tests over in-memory partitions and store

use async_trait::async_trait;
use pact_common::{ParticipantId, SessionId, TxnId};
use pact_coordinator::{CommitService, CoordinatorConfig, CoordinatorError, Outcome, Phase};
use pact_hlc::{HlcTimestamp, NodeId};
use pact_participant::{
    AbortRequest, AckStatus, CommitRequest, ParticipantClient, PrepareRequest, PrepareVote,
};
use pact_partition::{MemoryCluster, TxnState};
use pact_store::{CoordinatorRecord, CoordinatorStore, Decision};
use pact_store_memory::{AuditEntry, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        request_timeout: Duration::from_millis(200),
        prepare_retry_limit: 3,
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
    }
}

struct Harness {
    service: Arc<CommitService<MemoryStore, MemoryCluster>>,
    store: Arc<MemoryStore>,
    cluster: Arc<MemoryCluster>,
    participants: Vec<ParticipantId>,
}

fn setup(names: &[&str]) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cluster = Arc::new(MemoryCluster::new());
    let participants: Vec<_> = names
        .iter()
        .map(|n| ParticipantId::new(*n).unwrap())
        .collect();
    for p in &participants {
        cluster.add_partition(p.clone());
    }
    let service = Arc::new(CommitService::new(
        NodeId::new(1),
        store.clone(),
        cluster.clone(),
        fast_config(),
    ));
    Harness {
        service,
        store,
        cluster,
        participants,
    }
}

fn txn() -> TxnId {
    TxnId::new(SessionId::new(), 1)
}

/// Cluster wrapper whose prepare dies mid-flight for one participant,
/// taking the whole fan-out task down with it.
struct CrashingCluster {
    inner: Arc<MemoryCluster>,
    crash_on_prepare: ParticipantId,
}

#[async_trait]
impl ParticipantClient for CrashingCluster {
    async fn prepare(&self, participant: &ParticipantId, request: PrepareRequest) -> PrepareVote {
        if *participant == self.crash_on_prepare {
            panic!("connection state poisoned for {}", participant);
        }
        self.inner.prepare(participant, request).await
    }

    async fn commit(&self, participant: &ParticipantId, request: CommitRequest) -> AckStatus {
        self.inner.commit(participant, request).await
    }

    async fn abort(&self, participant: &ParticipantId, request: AbortRequest) -> AckStatus {
        self.inner.abort(participant, request).await
    }
}

#[tokio::test]
async fn test_unanimous_prepare_commits_at_max_timestamp() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();

    let outcome = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap();
    let Outcome::Committed { commit_timestamp } = outcome else {
        panic!("expected commit, got {:?}", outcome);
    };

    // Every partition committed at the decided timestamp, which dominates
    // its own prepare timestamp
    for p in &h.participants {
        match h.cluster.txn_state(p, &id) {
            Some(TxnState::Committed {
                prepare_timestamp,
                commit_timestamp: applied,
            }) => {
                assert_eq!(applied, commit_timestamp);
                assert!(commit_timestamp > prepare_timestamp);
            }
            other => panic!("partition {} not committed: {:?}", p, other),
        }
    }

    // Record deleted only after both acknowledged; catalog drained
    assert!(h.store.is_empty());
    assert!(h.service.catalog().is_empty());

    // Write-ahead ordering: create, then decide, then delete
    let audit = h.store.audit_log();
    assert_eq!(audit.len(), 3);
    assert_eq!(audit[0], AuditEntry::Created(id));
    assert!(matches!(
        audit[1],
        AuditEntry::Decided(aid, Decision::Commit { .. }) if aid == id
    ));
    assert_eq!(audit[2], AuditEntry::Deleted(id));
}

#[tokio::test]
async fn test_single_vote_abort_aborts_everyone() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    h.cluster.force_vote_abort(&h.participants[1], "writeConflict");

    let outcome = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Aborted);

    // Both participants receive the abort, regardless of their own vote
    for p in &h.participants {
        assert_eq!(h.cluster.txn_state(p, &id), Some(TxnState::Aborted));
        assert!(h
            .cluster
            .delivery_log(p)
            .iter()
            .any(|(aid, kind)| aid == &id && *kind == "abort"));
    }

    assert!(h.store.is_empty());
    assert!(matches!(
        h.store.audit_log()[1],
        AuditEntry::Decided(_, Decision::Abort)
    ));
}

#[tokio::test]
async fn test_exhausted_prepare_retries_become_abort_vote() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    // More failures than the retry budget of 3
    h.cluster.fail_next_prepares(&h.participants[1], 10);

    let outcome = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Aborted);

    // The reachable participant prepared and was then told to abort
    assert_eq!(
        h.cluster.txn_state(&h.participants[0], &id),
        Some(TxnState::Aborted)
    );
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_transient_unreachable_within_budget_still_commits() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    // Two failures, budget of three: prepare eventually succeeds
    h.cluster.fail_next_prepares(&h.participants[1], 2);

    let outcome = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Committed { .. }));
}

#[tokio::test]
async fn test_duplicate_identity_declined_while_active() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    // Slow the first coordination down enough to observe it in flight
    h.cluster.fail_next_prepares(&h.participants[1], 2);
    h.cluster.drop_next_acks(&h.participants[1], 2);

    let service = h.service.clone();
    let participants = h.participants.clone();
    let first = tokio::spawn(async move { service.coordinate(id, participants).await });

    // Wait until the first coordination registers
    while !h.service.catalog().is_active(&id) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let second = h.service.coordinate(id, h.participants.clone()).await;
    assert!(matches!(
        second,
        Err(CoordinatorError::AlreadyActive(aid)) if aid == id
    ));

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Committed { .. }));
    assert!(h.service.catalog().is_empty());
}

#[tokio::test]
async fn test_reporter_sees_prepare_phase_and_retries() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    h.cluster.fail_next_prepares(&h.participants[1], 2);

    let service = h.service.clone();
    let participants = h.participants.clone();
    let driver = tokio::spawn(async move { service.coordinate(id, participants).await });

    let reporter = h.service.reporter();
    // Poll until the coordination is visibly retrying its prepare fan-out
    let report = loop {
        if let Some(report) = reporter.coordination(&id) {
            if report.phase == Phase::SendingPrepare && report.retries >= 1 {
                break report;
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };

    assert_eq!(report.txn_id, id);
    assert_eq!(report.participants, h.participants);
    assert!(report.phase_started_at <= std::time::SystemTime::now());

    driver.await.unwrap().unwrap();
    assert!(reporter.coordination(&id).is_none());
    assert!(reporter.active_coordinations().is_empty());
}

#[tokio::test]
async fn test_recovery_resumes_terminal_phase_and_reacks() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();

    // Reconstruct the moment just after writingDecision: both participants
    // prepared, decision durable, no acks collected yet.
    let mut prepare_max: Option<HlcTimestamp> = None;
    for p in &h.participants {
        let vote = h
            .cluster
            .prepare(p, PrepareRequest::new(id, Duration::from_millis(200)))
            .await;
        let PrepareVote::Prepared { prepare_timestamp } = vote else {
            panic!("expected prepared vote");
        };
        prepare_max = Some(prepare_max.map_or(prepare_timestamp, |ts| ts.max(prepare_timestamp)));
    }
    let commit_timestamp =
        HlcTimestamp::new(prepare_max.unwrap().physical + 1_000, 0, NodeId::new(42));

    h.store
        .create_record(CoordinatorRecord::new(id, h.participants.clone()))
        .unwrap();
    h.store
        .record_decision(&id, Decision::Commit { commit_timestamp })
        .unwrap();

    // One participant already received the commit before the "crash"
    h.cluster
        .commit(
            &h.participants[0],
            CommitRequest::new(id, commit_timestamp),
        )
        .await;

    let resumed = h.service.recover().unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].txn_id, id);

    let outcome = resumed
        .into_iter()
        .next()
        .unwrap()
        .handle
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Outcome::Committed { commit_timestamp });

    for p in &h.participants {
        assert!(matches!(
            h.cluster.txn_state(p, &id),
            Some(TxnState::Committed { .. })
        ));
    }
    // The already-acked participant saw the commit twice; the replay no-oped
    assert_eq!(h.cluster.delivery_log(&h.participants[0]).len(), 2);
    assert!(h.store.is_empty());

    // Running recovery again finds nothing left to resume
    assert!(h.service.recover().unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_reruns_prepare_for_undecided_record() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();

    // Crash happened after the participant list was persisted but before
    // any decision was recorded
    h.store
        .create_record(CoordinatorRecord::new(id, h.participants.clone()))
        .unwrap();

    let resumed = h.service.recover().unwrap();
    assert_eq!(resumed.len(), 1);
    let outcome = resumed
        .into_iter()
        .next()
        .unwrap()
        .handle
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, Outcome::Committed { .. }));

    for p in &h.participants {
        assert!(matches!(
            h.cluster.txn_state(p, &id),
            Some(TxnState::Committed { .. })
        ));
    }
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_store_unavailable_is_fatal_but_recoverable() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    h.store.set_unavailable(true);

    let err = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::StoreUnavailable(_)));

    // Fatal to the instance: removed from the catalog, nothing contacted
    assert!(h.service.catalog().is_empty());
    for p in &h.participants {
        assert_eq!(h.cluster.txn_state(p, &id), None);
    }

    // Once the store is back, the same identity can be coordinated
    h.store.set_unavailable(false);
    let outcome = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Committed { .. }));
}

#[tokio::test]
async fn test_missing_prepare_vote_forces_abort() {
    let cluster = Arc::new(MemoryCluster::new());
    let participants = vec![
        ParticipantId::new("shard-a").unwrap(),
        ParticipantId::new("shard-b").unwrap(),
    ];
    for p in &participants {
        cluster.add_partition(p.clone());
    }
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(CrashingCluster {
        inner: cluster.clone(),
        crash_on_prepare: participants[1].clone(),
    });
    let service = CommitService::new(NodeId::new(1), store.clone(), client, fast_config());
    let id = txn();

    // One vote never arrives; an incomplete vote set must never commit
    let outcome = service.coordinate(id, participants.clone()).await.unwrap();
    assert_eq!(outcome, Outcome::Aborted);

    // Everyone is told to abort, including the healthy participant that
    // had already prepared
    for p in &participants {
        assert_eq!(cluster.txn_state(p, &id), Some(TxnState::Aborted));
    }
    assert!(matches!(
        store.audit_log()[1],
        AuditEntry::Decided(_, Decision::Abort)
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_existing_record_is_a_protocol_violation() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();

    // A record for this identity is already durable, e.g. left by another
    // coordinator instance that was never recovered
    let stale = CoordinatorRecord::new(id, h.participants.clone());
    h.store.create_record(stale).unwrap();

    let err = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::ProtocolViolation(_)));

    // The existing record is left untouched for recovery, no participant
    // was contacted, and the catalog is drained
    assert!(h.store.get(&id).is_some());
    for p in &h.participants {
        assert_eq!(h.cluster.txn_state(p, &id), None);
    }
    assert!(h.service.catalog().is_empty());
}

#[tokio::test]
async fn test_lost_terminal_acks_are_retried_until_acknowledged() {
    let h = setup(&["shard-a", "shard-b"]);
    let id = txn();
    // First two commit deliveries to shard-b apply but lose their acks
    h.cluster.drop_next_acks(&h.participants[1], 2);

    let outcome = h
        .service
        .coordinate(id, h.participants.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Committed { .. }));

    // Three deliveries total: two with dropped acks, one acknowledged
    assert_eq!(h.cluster.delivery_log(&h.participants[1]).len(), 3);
    assert!(h.store.is_empty());
}
