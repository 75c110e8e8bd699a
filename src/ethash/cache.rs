//! Epoch cache bookkeeping.
//!
//! The verification caches and mining datasets grow per epoch and are
//! identified by an iterated-keccak seed. This module tracks descriptors
//! (seed, sizes, on-disk file names) and keeps a bounded number of them in
//! memory. Generating the actual cache contents is the miner's concern.

use super::{ALGORITHM_REVISION, EPOCH_LENGTH};
use alloy_primitives::{hex, keccak256, B256};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Bytes in a single hash entry.
const HASH_BYTES: u64 = 64;

/// Bytes in a single dataset mix.
const MIX_BYTES: u64 = 128;

/// Verification cache size at epoch zero.
const CACHE_INIT_BYTES: u64 = 1 << 24;

/// Verification cache growth per epoch.
const CACHE_GROWTH_BYTES: u64 = 1 << 17;

/// Mining dataset size at epoch zero.
const DATASET_INIT_BYTES: u64 = 1 << 30;

/// Mining dataset growth per epoch.
const DATASET_GROWTH_BYTES: u64 = 1 << 23;

/// Epoch a block number belongs to.
pub fn epoch(number: u64) -> u64 {
    number / EPOCH_LENGTH
}

/// Seed for the cache of the given epoch: keccak256 iterated once per epoch
/// over a zero hash.
pub fn seed_hash(epoch: u64) -> B256 {
    let mut seed = B256::ZERO;
    for _ in 0..epoch {
        seed = keccak256(seed);
    }
    seed
}

/// Verification cache size for the given epoch.
pub fn cache_size(epoch: u64) -> u64 {
    CACHE_INIT_BYTES + CACHE_GROWTH_BYTES * epoch - HASH_BYTES
}

/// Mining dataset size for the given epoch.
pub fn dataset_size(epoch: u64) -> u64 {
    DATASET_INIT_BYTES + DATASET_GROWTH_BYTES * epoch - MIX_BYTES
}

/// Descriptor of one epoch's cache and dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochCache {
    /// Epoch number.
    pub epoch: u64,
    /// Iterated-keccak seed identifying the epoch.
    pub seed: B256,
    /// Verification cache size in bytes.
    pub cache_size: u64,
    /// Mining dataset size in bytes.
    pub dataset_size: u64,
}

impl EpochCache {
    /// Build the descriptor for an epoch.
    pub fn build(epoch: u64) -> Self {
        Self {
            epoch,
            seed: seed_hash(epoch),
            cache_size: cache_size(epoch),
            dataset_size: dataset_size(epoch),
        }
    }

    /// On-disk file name for the verification cache.
    pub fn cache_file_name(&self) -> String {
        format!("cache-R{}-{}", ALGORITHM_REVISION, hex::encode(&self.seed[..8]))
    }

    /// On-disk file name for the mining dataset.
    pub fn dataset_file_name(&self) -> String {
        format!("full-R{}-{}", ALGORITHM_REVISION, hex::encode(&self.seed[..8]))
    }
}

/// Bounded in-memory set of epoch cache descriptors.
#[derive(Debug)]
pub struct EpochCaches {
    caches: Mutex<LruCache<u64, Arc<EpochCache>>>,
}

impl EpochCaches {
    /// Create a cache set keeping at most `max_in_mem` descriptors.
    pub fn new(max_in_mem: usize) -> Self {
        let capacity = NonZeroUsize::new(max_in_mem).unwrap_or(NonZeroUsize::MIN);
        Self { caches: Mutex::new(LruCache::new(capacity)) }
    }

    /// Get the descriptor for an epoch, building it on first use.
    pub fn get(&self, epoch: u64) -> Arc<EpochCache> {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(&epoch) {
            return cache.clone();
        }
        let cache = Arc::new(EpochCache::build(epoch));
        caches.put(epoch, cache.clone());
        cache
    }

    /// Number of descriptors currently held.
    pub fn cached(&self) -> usize {
        self.caches.lock().len()
    }
}
