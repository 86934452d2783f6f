//! Commit service facade
//!
//! The entry point a query router talks to: start a coordination for a
//! transaction identity plus participant list, recover in-flight
//! coordinations at process start, and hand out the reporter.

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::phase::PhaseInfo;
use crate::report::Reporter;
use pact_common::{ParticipantId, TxnId};
use pact_hlc::{HlcClock, HlcTimestamp, NodeId};
use pact_participant::ParticipantClient;
use pact_store::{CoordinatorStore, Decision};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Router-visible outcome of a coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every participant prepared; committed at this timestamp
    Committed { commit_timestamp: HlcTimestamp },
    /// At least one participant voted to abort (or stayed unreachable past
    /// the retry budget)
    Aborted,
}

impl From<Decision> for Outcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit { commit_timestamp } => Outcome::Committed { commit_timestamp },
            Decision::Abort => Outcome::Aborted,
        }
    }
}

/// A coordination resumed by recovery, with its driver task handle.
pub struct RecoveredCoordination {
    pub txn_id: TxnId,
    pub handle: JoinHandle<Result<Outcome>>,
}

/// Commit coordination service.
pub struct CommitService<S, P> {
    store: Arc<S>,
    client: Arc<P>,
    clock: Arc<HlcClock>,
    catalog: Arc<Catalog>,
    config: CoordinatorConfig,
}

impl<S, P> CommitService<S, P>
where
    S: CoordinatorStore + 'static,
    P: ParticipantClient + 'static,
{
    pub fn new(node_id: NodeId, store: Arc<S>, client: Arc<P>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            client,
            clock: Arc::new(HlcClock::new(node_id)),
            catalog: Arc::new(Catalog::new()),
            config,
        }
    }

    /// The catalog of active coordinations.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.clone()
    }

    /// Read-only introspection over active coordinations.
    pub fn reporter(&self) -> Reporter {
        Reporter::new(self.catalog.clone())
    }

    /// Coordinate a commit for a transaction across its participants.
    ///
    /// Fails with `AlreadyActive` while another coordination for the same
    /// identity is in flight. Once an outcome exists, calling again simply
    /// re-runs the protocol; every participant operation is idempotent, so
    /// re-delivery (including out-of-band cancellation expressed as an
    /// abort/commit retry) is safe.
    pub async fn coordinate(
        &self,
        txn_id: TxnId,
        participants: Vec<ParticipantId>,
    ) -> Result<Outcome> {
        let (coordinator, phases) = self.new_coordinator(txn_id, participants.clone());
        self.catalog
            .register(CatalogEntry::new(txn_id, participants, phases))?;

        let result = coordinator.run().await;
        self.catalog.unregister(&txn_id);
        result.map(Outcome::from)
    }

    /// Resume every persisted coordination after a restart.
    ///
    /// Records with no decision resume at the prepare round; records with a
    /// decision re-deliver the terminal action to all participants.
    /// Identities already active in the catalog are skipped, so running
    /// recovery repeatedly is idempotent.
    pub fn recover(&self) -> Result<Vec<RecoveredCoordination>> {
        let mut resumed = Vec::new();

        let records: Vec<_> = self.store.list_all().collect();
        for record in records {
            let record = record?;
            if self.catalog.is_active(&record.txn_id) {
                continue;
            }

            let txn_id = record.txn_id;
            let (coordinator, phases) =
                self.new_coordinator(txn_id, record.participants.clone());
            if self
                .catalog
                .register(CatalogEntry::new(txn_id, record.participants, phases))
                .is_err()
            {
                continue;
            }

            tracing::info!(
                "recovering coordination for {} (decision: {})",
                txn_id,
                record
                    .decision
                    .map(|d| d.as_str())
                    .unwrap_or("pending")
            );

            let catalog = self.catalog.clone();
            let handle = tokio::spawn(async move {
                let result = coordinator.resume(record.decision).await;
                catalog.unregister(&txn_id);
                result.map(Outcome::from)
            });
            resumed.push(RecoveredCoordination { txn_id, handle });
        }

        Ok(resumed)
    }

    fn new_coordinator(
        &self,
        txn_id: TxnId,
        participants: Vec<ParticipantId>,
    ) -> (Coordinator<S, P>, watch::Receiver<PhaseInfo>) {
        Coordinator::new(
            txn_id,
            participants,
            self.store.clone(),
            self.client.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }
}
