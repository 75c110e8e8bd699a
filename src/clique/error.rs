//! Authority engine errors.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Errors raised by the proof-of-authority engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliqueError {
    /// Unknown block error.
    #[error("unknown block")]
    UnknownBlock,

    /// Block is from the future.
    #[error("block from future: block time {block_time}, current time {current_time}")]
    FutureBlock {
        block_time: u64,
        current_time: u64,
    },

    /// Unknown ancestor error.
    #[error("unknown ancestor")]
    UnknownAncestor,

    /// Invalid nonce (not 0x00..0 or 0xff..f).
    #[error("nonce not 0x00..0 or 0xff..f")]
    InvalidVote,

    /// Checkpoint block has non-zero nonce.
    #[error("nonce in checkpoint block non-zero")]
    InvalidCheckpointVote,

    /// Missing vanity in extra-data.
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    /// Missing signature in extra-data.
    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    /// Non-checkpoint block contains signer list.
    #[error("non-checkpoint block contains extra signer list")]
    ExtraSigners,

    /// Invalid signer list on checkpoint block.
    #[error("invalid signer list on checkpoint block")]
    InvalidCheckpointSigners,

    /// Mismatching signer list on checkpoint block.
    #[error("mismatching signer list on checkpoint block")]
    MismatchingCheckpointSigners,

    /// Non-zero mix digest.
    #[error("non-zero mix digest")]
    InvalidMixDigest,

    /// Non-empty uncle hash.
    #[error("non empty uncle hash")]
    InvalidUncleHash,

    /// Block contains uncles.
    #[error("uncles not allowed")]
    UnclesNotAllowed,

    /// Invalid difficulty (not 1 or 2).
    #[error("invalid difficulty: expected 1 or 2, got {difficulty}")]
    InvalidDifficulty { difficulty: U256 },

    /// Wrong difficulty for signer's turn.
    #[error("wrong difficulty: signer {signer} at block {block}, expected {expected}, got {actual}")]
    WrongDifficulty {
        signer: Address,
        block: u64,
        expected: U256,
        actual: U256,
    },

    /// Invalid timestamp (too close to parent).
    #[error("invalid timestamp: parent {parent_time} + period {period} > block {block_time}")]
    InvalidTimestamp {
        parent_time: u64,
        period: u64,
        block_time: u64,
    },

    /// Headers do not form a contiguous snapshot chain.
    #[error("invalid snapshot chain")]
    InvalidSnapshotChain,

    /// Unauthorized signer.
    #[error("unauthorized signer: {signer}")]
    UnauthorizedSigner { signer: Address },

    /// Signer recently signed.
    #[error("signer {signer} recently signed at block {recent_block}")]
    RecentlySigned {
        signer: Address,
        recent_block: u64,
    },

    /// Gas limit exceeded.
    #[error("invalid gasLimit: have {gas_limit}, max {max_gas_limit}")]
    GasLimitExceeded {
        gas_limit: u64,
        max_gas_limit: u64,
    },

    /// Gas used exceeds gas limit.
    #[error("invalid gasUsed: have {gas_used}, gasLimit {gas_limit}")]
    GasUsedExceeded { gas_used: u64, gas_limit: u64 },

    /// Gas limit drifts too far from the parent's.
    #[error("invalid gasLimit: have {gas_limit}, parent {parent_gas_limit}")]
    InvalidGasLimit {
        gas_limit: u64,
        parent_gas_limit: u64,
    },

    /// Zero-period chain with no transactions to seal.
    #[error("waiting for transactions")]
    WaitingForTransactions,

    /// No signing credentials have been authorized.
    #[error("no signer authorized")]
    SignerUnavailable,

    /// A seal signature has the wrong length.
    #[error("invalid seal signature: {length} bytes")]
    InvalidSignature { length: usize },

    /// The signing backend failed to produce a signature.
    #[error("signing failed: {message}")]
    SigningFailed { message: String },

    /// Snapshot store error.
    #[error("snapshot store error: {message}")]
    DatabaseError { message: String },
}
