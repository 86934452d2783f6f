//! In-memory coordinator store
//!
//! Implements the store contract over a map behind a lock, for tests and
//! examples. Records an audit log of calls so tests can assert the
//! write-ahead ordering invariants, and carries an availability switch for
//! exercising store-unavailable failure paths.

use pact_common::TxnId;
use pact_store::{now_ms, CoordinatorRecord, CoordinatorStore, Decision, StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One store call, as observed by the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntry {
    Created(TxnId),
    Decided(TxnId, Decision),
    Deleted(TxnId),
}

/// In-memory coordinator store for testing.
pub struct MemoryStore {
    records: Mutex<BTreeMap<TxnId, CoordinatorRecord>>,
    audit: Mutex<Vec<AuditEntry>>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            audit: Mutex::new(Vec::new()),
            unavailable: Mutex::new(false),
        }
    }

    /// Flip the availability switch; while unavailable every call fails
    /// with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    /// Snapshot of the audit log of successful mutations, in call order.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().clone()
    }

    /// Fetch a record by identity (test helper).
    pub fn get(&self, txn_id: &TxnId) -> Option<CoordinatorRecord> {
        self.records.lock().get(txn_id).cloned()
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if *self.unavailable.lock() {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorStore for MemoryStore {
    fn create_record(&self, record: CoordinatorRecord) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self.records.lock();
        if records.contains_key(&record.txn_id) {
            return Err(StoreError::AlreadyExists(record.txn_id));
        }
        let txn_id = record.txn_id;
        records.insert(txn_id, record);
        self.audit.lock().push(AuditEntry::Created(txn_id));
        Ok(())
    }

    fn record_decision(&self, txn_id: &TxnId, decision: Decision) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self.records.lock();
        let record = records
            .get_mut(txn_id)
            .ok_or(StoreError::NotFound(*txn_id))?;

        match record.decision {
            Some(existing) if existing == decision => return Ok(()),
            Some(existing) => {
                return Err(StoreError::DecisionConflict {
                    txn_id: *txn_id,
                    existing,
                    attempted: decision,
                });
            }
            None => {
                record.decision = Some(decision);
                record.decided_at_ms = Some(now_ms());
            }
        }
        self.audit.lock().push(AuditEntry::Decided(*txn_id, decision));
        Ok(())
    }

    fn delete_record(&self, txn_id: &TxnId) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self.records.lock();
        records
            .remove(txn_id)
            .ok_or(StoreError::NotFound(*txn_id))?;
        self.audit.lock().push(AuditEntry::Deleted(*txn_id));
        Ok(())
    }

    fn list_all(&self) -> Box<dyn Iterator<Item = StoreResult<CoordinatorRecord>> + Send + '_> {
        if let Err(e) = self.check_available() {
            return Box::new(std::iter::once(Err(e)));
        }
        let records: Vec<_> = self.records.lock().values().cloned().map(Ok).collect();
        Box::new(records.into_iter())
    }
}
