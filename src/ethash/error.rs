//! Proof-of-work consensus errors.

use alloy_primitives::{B256, U256};
use thiserror::Error;

/// Proof-of-work consensus errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EthashError {
    /// Parent of the verified header is not known.
    #[error("unknown ancestor")]
    UnknownAncestor,

    /// Block timestamp is too far ahead of wall-clock time.
    #[error("block from future: block time {block_time}, current time {current_time}")]
    FutureBlock {
        block_time: u64,
        current_time: u64,
    },

    /// Block timestamp is not ahead of its parent.
    #[error("timestamp older than parent: parent {parent_time}, block {block_time}")]
    OlderTimestamp { parent_time: u64, block_time: u64 },

    /// Extra-data exceeds the maximum length.
    #[error("extra-data too long: {length} > {max}")]
    ExtraDataTooLong { length: usize, max: usize },

    /// Declared difficulty does not match the schedule.
    #[error("invalid difficulty: have {actual}, want {expected}")]
    InvalidDifficulty { expected: U256, actual: U256 },

    /// Sealed header declares a zero difficulty.
    #[error("non-positive difficulty")]
    NonPositiveDifficulty,

    /// Sealed header carries an empty mix digest.
    #[error("invalid mix digest")]
    InvalidMixDigest,

    /// Sealed header carries an empty nonce.
    #[error("invalid nonce")]
    InvalidNonce,

    /// Block number does not follow its parent.
    #[error("invalid block number: parent {parent}, block {number}")]
    InvalidNumber { parent: u64, number: u64 },

    /// Gas limit drifted too far from the parent.
    #[error("invalid gas limit: have {gas_limit}, parent {parent_gas_limit}")]
    InvalidGasLimit {
        gas_limit: u64,
        parent_gas_limit: u64,
    },

    /// Gas limit above the protocol maximum.
    #[error("invalid gasLimit: have {gas_limit}, max {max_gas_limit}")]
    GasLimitExceeded {
        gas_limit: u64,
        max_gas_limit: u64,
    },

    /// Gas used exceeds the gas limit.
    #[error("invalid gasUsed: have {gas_used}, gasLimit {gas_limit}")]
    GasUsedExceeded { gas_used: u64, gas_limit: u64 },

    /// Block includes more uncles than allowed.
    #[error("too many uncles: {count} > {max}")]
    TooManyUncles { count: usize, max: usize },

    /// Uncle already included, either in this block or an ancestor.
    #[error("duplicate uncle {hash}")]
    DuplicateUncle { hash: B256 },

    /// Uncle is an ancestor of the including block.
    #[error("uncle is ancestor {hash}")]
    UncleIsAncestor { hash: B256 },

    /// Uncle's parent is not a recent ancestor.
    #[error("uncle's parent unknown or too old: {hash}")]
    DanglingUncle { hash: B256 },
}
