//! Observability reporter
//!
//! Read-only introspection over the catalog: for each active coordination,
//! what it is doing right now and since when. Staleness is bounded by the
//! phase watch channel, so a report never lags a transition by more than
//! the durable-write latency that gated it.

use crate::catalog::Catalog;
use crate::phase::Phase;
use pact_common::{ParticipantId, TxnId};
use std::sync::Arc;
use std::time::SystemTime;

/// Introspection row for one active coordination.
#[derive(Debug, Clone)]
pub struct CoordinationReport {
    /// Transaction identity
    pub txn_id: TxnId,
    /// Current phase; always exactly one of the defined phases
    pub phase: Phase,
    /// When the current phase was entered
    pub phase_started_at: SystemTime,
    /// Retries performed inside the current phase
    pub retries: u32,
    /// Participant set contacted by this coordination
    pub participants: Vec<ParticipantId>,
}

/// Read-only view over a catalog.
#[derive(Clone)]
pub struct Reporter {
    catalog: Arc<Catalog>,
}

impl Reporter {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Report every active coordination.
    pub fn active_coordinations(&self) -> Vec<CoordinationReport> {
        self.catalog
            .active()
            .into_iter()
            .map(|entry| {
                let info = entry.phase_info();
                CoordinationReport {
                    txn_id: entry.txn_id(),
                    phase: info.phase,
                    phase_started_at: info.started_at,
                    retries: info.retries,
                    participants: entry.participants().to_vec(),
                }
            })
            .collect()
    }

    /// Report a single coordination, if active.
    pub fn coordination(&self, txn_id: &TxnId) -> Option<CoordinationReport> {
        self.catalog.lookup(txn_id).map(|entry| {
            let info = entry.phase_info();
            CoordinationReport {
                txn_id: entry.txn_id(),
                phase: info.phase,
                phase_started_at: info.started_at,
                retries: info.retries,
                participants: entry.participants().to_vec(),
            }
        })
    }
}
