//! Fjall-backed durable coordinator store
//!
//! One small partition holds every in-flight coordination record, keyed by
//! the transaction identity's string form and encoded as JSON. Every
//! mutation is followed by a keyspace persist so the write-ahead discipline
//! of the commit protocol holds across process crashes.

use fjall::{Keyspace, Partition, PartitionCreateOptions, PersistMode};
use pact_common::TxnId;
use pact_store::{now_ms, CoordinatorRecord, CoordinatorStore, Decision, StoreError, StoreResult};
use std::path::{Path, PathBuf};

/// Durable store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory for the fjall keyspace
    pub data_dir: PathBuf,

    /// Persistence mode applied after each mutation.
    ///
    /// The protocol requires the record to be durable before the next
    /// fan-out begins, so the default is a full sync.
    pub persist_mode: PersistMode,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            persist_mode: PersistMode::SyncAll,
        }
    }
}

fn store_err(e: fjall::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Fjall-backed coordinator store.
pub struct FjallStore {
    keyspace: Keyspace,
    records: Partition,
    config: StoreConfig,
}

impl FjallStore {
    /// Open (or create) the store under the configured directory.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::open_at_path(&config.data_dir.clone(), config)
    }

    fn open_at_path(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let keyspace = fjall::Config::new(path).open().map_err(store_err)?;

        // Records are tiny and scanned whole at recovery; small blocks, no
        // compression, like any other metadata partition.
        let records = keyspace
            .open_partition(
                "coordinators",
                PartitionCreateOptions::default()
                    .block_size(16 * 1024)
                    .compression(fjall::CompressionType::None),
            )
            .map_err(store_err)?;

        Ok(Self {
            keyspace,
            records,
            config,
        })
    }

    fn key(txn_id: &TxnId) -> Vec<u8> {
        txn_id.to_string().into_bytes()
    }

    fn encode(record: &CoordinatorRecord) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> StoreResult<CoordinatorRecord> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn get(&self, txn_id: &TxnId) -> StoreResult<Option<CoordinatorRecord>> {
        match self.records.get(Self::key(txn_id)).map_err(store_err)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &CoordinatorRecord) -> StoreResult<()> {
        self.records
            .insert(Self::key(&record.txn_id), Self::encode(record)?)
            .map_err(store_err)?;
        self.keyspace
            .persist(self.config.persist_mode)
            .map_err(store_err)
    }
}

impl CoordinatorStore for FjallStore {
    fn create_record(&self, record: CoordinatorRecord) -> StoreResult<()> {
        if self.get(&record.txn_id)?.is_some() {
            return Err(StoreError::AlreadyExists(record.txn_id));
        }
        self.put(&record)
    }

    fn record_decision(&self, txn_id: &TxnId, decision: Decision) -> StoreResult<()> {
        let mut record = self.get(txn_id)?.ok_or(StoreError::NotFound(*txn_id))?;

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
        self.put(&record)
    }

    fn delete_record(&self, txn_id: &TxnId) -> StoreResult<()> {
        if self.get(txn_id)?.is_none() {
            return Err(StoreError::NotFound(*txn_id));
        }
        self.records.remove(Self::key(txn_id)).map_err(store_err)?;
        self.keyspace
            .persist(self.config.persist_mode)
            .map_err(store_err)
    }

    fn list_all(&self) -> Box<dyn Iterator<Item = StoreResult<CoordinatorRecord>> + Send + '_> {
        // The scan only runs at process-start recovery over a handful of
        // records; materialize it so the returned iterator owns its data.
        let records: Vec<StoreResult<CoordinatorRecord>> = self
            .records
            .iter()
            .map(|entry| {
                let (_, value) = entry.map_err(store_err)?;
                Self::decode(&value)
            })
            .collect();
        Box::new(records.into_iter())
    }
}
