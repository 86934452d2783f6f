//! Coordinator catalog
//!
//! Process-wide registry of active coordinations, keyed by transaction
//! identity. Injectable rather than a singleton so tests can run isolated
//! catalogs. The catalog is the one shared, concurrently-accessed structure
//! in the crate; one mutex serializes register/unregister/lookup.

use crate::error::{CoordinatorError, Result};
use crate::phase::PhaseInfo;
use pact_common::{ParticipantId, TxnId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;

/// One active coordination as seen from outside the state machine.
#[derive(Clone)]
pub struct CatalogEntry {
    txn_id: TxnId,
    participants: Vec<ParticipantId>,
    phases: watch::Receiver<PhaseInfo>,
}

impl CatalogEntry {
    pub(crate) fn new(
        txn_id: TxnId,
        participants: Vec<ParticipantId>,
        phases: watch::Receiver<PhaseInfo>,
    ) -> Self {
        Self {
            txn_id,
            participants,
            phases,
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Participants this coordination contacts.
    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    /// Snapshot of the coordination's current phase.
    pub fn phase_info(&self) -> PhaseInfo {
        self.phases.borrow().clone()
    }
}

/// Registry of live coordinators.
pub struct Catalog {
    entries: Mutex<HashMap<TxnId, CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a coordination; at most one may be active per transaction
    /// identity at any instant.
    pub fn register(&self, entry: CatalogEntry) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.txn_id) {
            return Err(CoordinatorError::AlreadyActive(entry.txn_id));
        }
        entries.insert(entry.txn_id, entry);
        Ok(())
    }

    /// Remove a finished (or fatally failed) coordination.
    pub fn unregister(&self, txn_id: &TxnId) {
        self.entries.lock().remove(txn_id);
    }

    /// Look up a live coordination for diagnostics.
    pub fn lookup(&self, txn_id: &TxnId) -> Option<CatalogEntry> {
        self.entries.lock().get(txn_id).cloned()
    }

    pub fn is_active(&self, txn_id: &TxnId) -> bool {
        self.entries.lock().contains_key(txn_id)
    }

    /// Snapshot of every active coordination.
    pub fn active(&self) -> Vec<CatalogEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, PhaseInfo};
    use pact_common::SessionId;
    use std::time::SystemTime;

    fn entry(txn_id: TxnId) -> (watch::Sender<PhaseInfo>, CatalogEntry) {
        let (tx, rx) = watch::channel(PhaseInfo {
            phase: Phase::WritingParticipantList,
            started_at: SystemTime::now(),
            retries: 0,
        });
        let participants = vec![ParticipantId::new("shard-a").unwrap()];
        (tx, CatalogEntry::new(txn_id, participants, rx))
    }

    #[test]
    fn test_at_most_one_per_identity() {
        let catalog = Catalog::new();
        let txn_id = TxnId::new(SessionId::new(), 1);

        let (_tx1, first) = entry(txn_id);
        let (_tx2, second) = entry(txn_id);

        catalog.register(first).unwrap();
        assert!(matches!(
            catalog.register(second),
            Err(CoordinatorError::AlreadyActive(id)) if id == txn_id
        ));

        catalog.unregister(&txn_id);
        let (_tx3, third) = entry(txn_id);
        catalog.register(third).unwrap();
    }

    #[test]
    fn test_lookup_sees_phase_transitions() {
        let catalog = Catalog::new();
        let txn_id = TxnId::new(SessionId::new(), 2);
        let (tx, e) = entry(txn_id);
        catalog.register(e).unwrap();

        tx.send_modify(|info| info.phase = Phase::SendingPrepare);

        let looked_up = catalog.lookup(&txn_id).unwrap();
        assert_eq!(looked_up.phase_info().phase, Phase::SendingPrepare);
        assert!(catalog.lookup(&TxnId::new(SessionId::new(), 2)).is_none());
    }
}
