//! Proof-of-authority consensus engine.
//!
//! Blocks are sealed by a rotating set of authorized signers instead of being
//! mined. The sealing identity travels in the header coinbase, the seal
//! signature in the last 65 bytes of extra-data, and the signer set is
//! bootstrapped from checkpoint headers that embed the full list every epoch.
//! Snapshots of the signer set are cached in memory and persisted to a store
//! at checkpoint intervals so deep reorgs do not replay the whole chain.

mod clique;
mod error;
mod snapshot;
mod store;

pub use clique::{seal_hash, Clique, SignerFn};
pub use error::CliqueError;
pub use snapshot::{checkpoint_signers, signature, CliqueConfig, Snapshot};
pub use store::{snapshot_key, MemorySnapshotStore, SnapshotStore, SNAPSHOT_KEY_PREFIX};

use alloy_primitives::{B64, U256};

/// Fixed number of extra-data prefix bytes reserved for signer vanity.
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the signer seal.
pub const EXTRA_SEAL: usize = 65;

/// Default number of blocks after which to checkpoint the signer list.
pub const EPOCH_LENGTH: u64 = 30_000;

/// Number of blocks after which to save the snapshot to the store.
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Number of recent snapshots to keep in memory.
pub const INMEMORY_SNAPSHOTS: usize = 128;

/// Number of gathered headers past which a mid-chain checkpoint is trusted
/// without walking further back.
pub const FULL_IMMUTABILITY_THRESHOLD: usize = 90_000;

/// Block difficulty for in-turn signatures.
pub const DIFF_IN_TURN: U256 = U256::from_limbs([2, 0, 0, 0]);

/// Block difficulty for out-of-turn signatures.
pub const DIFF_NO_TURN: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Magic nonce number to vote on adding a new signer.
pub const NONCE_AUTH_VOTE: B64 = B64::repeat_byte(0xff);

/// Magic nonce number to vote on removing a signer.
pub const NONCE_DROP_VOTE: B64 = B64::ZERO;

/// Random delay range (per signer) added to out-of-turn sealing, in
/// milliseconds.
pub const WIGGLE_TIME_MS: u64 = 500;

/// How often a waiting sealer rechecks the stop signal, in milliseconds.
pub const SEAL_POLL_INTERVAL_MS: u64 = 50;
