//! Snapshot persistence for the authority engine.
//!
//! Authority snapshots are rebuilt incrementally by walking headers, so the
//! engine only persists them on [`CHECKPOINT_INTERVAL`] boundaries. A backend
//! that loses data stays usable: a failed or missing load makes the walk
//! continue to an older checkpoint (or the genesis signer list) and replay
//! the headers in between. Keeping every checkpoint bounds that replay at
//! [`CHECKPOINT_INTERVAL`] headers after a restart or a reorg.
//!
//! Persistent backends key snapshots by [`snapshot_key`], a shared prefix
//! followed by the block hash, so they can coexist with other column data
//! in one keyspace.
//!
//! [`CHECKPOINT_INTERVAL`]: super::CHECKPOINT_INTERVAL

use super::{CliqueError, Snapshot};
use alloy_primitives::B256;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Key prefix persistent backends store snapshots under.
pub const SNAPSHOT_KEY_PREFIX: &[u8] = b"clique-";

/// Full key for a snapshot: the shared prefix followed by the block hash.
pub fn snapshot_key(hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(SNAPSHOT_KEY_PREFIX.len() + B256::len_bytes());
    key.extend_from_slice(SNAPSHOT_KEY_PREFIX);
    key.extend_from_slice(hash.as_slice());
    key
}

/// Backend that checkpoint snapshots are saved to and recovered from.
///
/// The engine calls [`load_snapshot`] only at checkpoint heights during the
/// snapshot walk and treats both `Ok(None)` and `Err` as a miss, falling
/// back to replaying headers. Implementations should reserve errors
/// ([`CliqueError::DatabaseError`]) for backend failures rather than absent
/// entries, so callers that do distinguish can.
///
/// [`load_snapshot`]: SnapshotStore::load_snapshot
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot persisted for the given block hash, if any.
    fn load_snapshot(&self, hash: B256) -> Result<Option<Snapshot>, CliqueError>;

    /// Persist a checkpoint snapshot, replacing any previous snapshot
    /// stored for the same block hash.
    fn store_snapshot(&self, snapshot: &Snapshot) -> Result<(), CliqueError>;
}

/// In-memory [`SnapshotStore`].
///
/// Keeps whole snapshots in a map keyed by [`snapshot_key`], mirroring the
/// layout a key-value backend would use. Nothing survives a restart, which
/// is fine for tests and for nodes that accept replaying headers on boot.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: RwLock<HashMap<Vec<u8>, Snapshot>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty store wrapped in an `Arc`.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Whether a snapshot is stored for the given block hash.
    pub fn contains(&self, hash: B256) -> bool {
        self.entries.read().contains_key(&snapshot_key(hash))
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_snapshot(&self, hash: B256) -> Result<Option<Snapshot>, CliqueError> {
        Ok(self.entries.read().get(&snapshot_key(hash)).cloned())
    }

    fn store_snapshot(&self, snapshot: &Snapshot) -> Result<(), CliqueError> {
        self.entries
            .write()
            .insert(snapshot_key(snapshot.hash), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clique::snapshot::CliqueConfig;
    use alloy_primitives::Address;

    fn snapshot_at(number: u64, hash: B256) -> Snapshot {
        let config = CliqueConfig {
            period: 15,
            epoch: 30000,
        };
        let signers = vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)];
        Snapshot::new(config, number, hash, signers)
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySnapshotStore::new();
        assert!(store.is_empty());

        let snapshot = snapshot_at(1024, B256::repeat_byte(0xaa));
        store.store_snapshot(&snapshot).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(snapshot.hash));

        let loaded = store.load_snapshot(snapshot.hash).unwrap().unwrap();
        assert_eq!(loaded.number, 1024);
        assert_eq!(loaded.hash, B256::repeat_byte(0xaa));
        assert_eq!(loaded.signer_count(), 2);

        // A hash never stored is a miss, not an error
        assert!(store.load_snapshot(B256::ZERO).unwrap().is_none());
        assert!(!store.contains(B256::ZERO));
    }

    #[test]
    fn test_memory_store_overwrites_by_hash() {
        let store = MemorySnapshotStore::new();
        let hash = B256::repeat_byte(0xbb);

        store.store_snapshot(&snapshot_at(1024, hash)).unwrap();
        store.store_snapshot(&snapshot_at(2048, hash)).unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.load_snapshot(hash).unwrap().unwrap();
        assert_eq!(loaded.number, 2048);
    }

    #[test]
    fn test_snapshot_key_layout() {
        let key = snapshot_key(B256::repeat_byte(0x11));
        assert!(key.starts_with(SNAPSHOT_KEY_PREFIX));
        assert!(key.ends_with(&[0x11; 32]));
    }
}
