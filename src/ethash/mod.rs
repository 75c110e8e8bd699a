//! Ethash proof-of-work consensus engine.
//!
//! Covers the structural consensus rules: difficulty schedule, header and
//! uncle verification, epoch cache sizing and block rewards. The memory-hard
//! proof itself is computed by external miners; sealing exchanges work
//! packages and solutions through a mailbox.

mod cache;
mod difficulty;
mod error;
mod ethash;

pub use cache::{cache_size, dataset_size, epoch, seed_hash, EpochCache, EpochCaches};
pub use difficulty::{
    calc_difficulty, difficulty_to_target, DIFFICULTY_BOUND_DIVISOR, EXPONENTIAL_PERIOD,
    MINIMUM_DIFFICULTY,
};
pub use error::EthashError;
pub use ethash::{seal_hash, Ethash, EthashConfig, SealWork};

/// Number of blocks per verification-cache epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

/// Revision of the cache generation algorithm, embedded in on-disk file names.
pub const ALGORITHM_REVISION: u32 = 23;

/// Maximum number of extra-data bytes a proof-of-work header may carry.
pub const MAX_EXTRA_DATA_BYTES: usize = 32;

/// Seconds a header timestamp may run ahead of the local clock.
pub const ALLOWED_FUTURE_BLOCK_SECS: u64 = 15;

/// Maximum number of uncles allowed in a single block.
pub const MAX_UNCLES: usize = 2;

/// Number of generations back an uncle may reach.
pub const MAX_UNCLE_DEPTH: u64 = 7;

/// Static block reward in wei.
pub const BLOCK_REWARD_WEI: u64 = 5_000_000_000_000_000_000;

/// Interval in milliseconds at which a sealing loop polls for solutions.
pub const WORK_POLL_INTERVAL_MS: u64 = 50;
