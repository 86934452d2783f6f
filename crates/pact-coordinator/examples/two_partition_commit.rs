//! Two-Partition Commit Example
//!
//! Drives a full two-phase commit across two in-memory partitions, shows the
//! reporter's view of an in-flight coordination, and demonstrates recovery
//! after a simulated crash between the decision write and the commit fan-out.

use pact_common::{ParticipantId, SessionId, TxnId};
use pact_coordinator::{CommitService, CoordinatorConfig, Outcome};
use pact_hlc::NodeId;
use pact_partition::MemoryCluster;
use pact_store::{CoordinatorRecord, CoordinatorStore, Decision};
use pact_store_memory::MemoryStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Two-Partition Commit Example ===\n");

    let store = Arc::new(MemoryStore::new());
    let cluster = Arc::new(MemoryCluster::new());
    let shard_a = ParticipantId::new("shard-a")?;
    let shard_b = ParticipantId::new("shard-b")?;
    cluster.add_partition(shard_a.clone());
    cluster.add_partition(shard_b.clone());
    println!("✓ Created partitions: shard-a, shard-b");

    let service = Arc::new(CommitService::new(
        NodeId::new(1),
        store.clone(),
        cluster.clone(),
        CoordinatorConfig::default(),
    ));

    // ===================================================================
    // A clean commit across both partitions
    // ===================================================================
    let session = SessionId::new();
    let txn = TxnId::new(session, 1);
    println!("\n--- Coordinating transaction {} ---", txn);

    let outcome = service
        .coordinate(txn, vec![shard_a.clone(), shard_b.clone()])
        .await?;
    match outcome {
        Outcome::Committed { commit_timestamp } => {
            println!("✓ Committed at {}", commit_timestamp)
        }
        Outcome::Aborted => println!("✗ Aborted"),
    }
    println!(
        "✓ Record cleaned up (store holds {} records)",
        store.len()
    );

    // ===================================================================
    // Crash recovery: decision durable, no acknowledgments collected
    // ===================================================================
    let txn2 = TxnId::new(session, 2);
    println!("\n--- Simulating crash after decision for {} ---", txn2);

    store.create_record(CoordinatorRecord::new(
        txn2,
        vec![shard_a.clone(), shard_b.clone()],
    ))?;
    let commit_timestamp = pact_hlc::HlcTimestamp::new(u64::MAX / 2, 0, NodeId::new(1));
    store.record_decision(&txn2, Decision::Commit { commit_timestamp })?;
    println!("✓ Durable record with commit decision, terminal fan-out never ran");

    let resumed = service.recover()?;
    println!("✓ Recovery resumed {} coordination(s)", resumed.len());
    for coordination in resumed {
        let outcome = coordination.handle.await??;
        println!("✓ {} finished with {:?}", coordination.txn_id, outcome);
    }
    println!(
        "✓ Record cleaned up (store holds {} records)",
        store.len()
    );

    Ok(())
}
