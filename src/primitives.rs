//! Core block primitives shared by every consensus engine.
//!
//! # Block Structure
//!
//! ```text
//! Block
//! ├── header: Header
//! │   ├── parent_hash / uncle_hash
//! │   ├── coinbase (beneficiary, also the signer identity under authority rules)
//! │   ├── state_root / transactions_root / receipts_root
//! │   ├── difficulty / number / gas_limit / gas_used / timestamp
//! │   ├── extra_data (vanity + optional signer list + seal under authority rules)
//! │   └── mix_digest + nonce (the proof-of-work seal)
//! ├── transactions: Vec<Transaction>
//! └── uncles: Vec<Header>
//! ```
//!
//! Hashes are `keccak256` over the RLP encoding, except the per-engine seal
//! hashes which each engine computes over the subset of fields it commits to.

use alloy_primitives::{b256, keccak256, Address, Bytes, B256, B64, U256};
use alloy_rlp::{Encodable, RlpDecodable, RlpEncodable};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Minimum gas limit any block may declare.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Maximum gas limit any block may declare.
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Bound divisor for the per-block gas limit drift relative to the parent.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1_024;

/// Hash of an RLP-encoded empty uncle list.
pub const EMPTY_UNCLE_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// A block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, serde::Serialize, serde::Deserialize)]
pub struct Header {
    /// Hash of the parent block header.
    pub parent_hash: B256,
    /// Hash of the uncle list.
    pub uncle_hash: B256,
    /// Beneficiary of the block reward. Under authority rules this is also
    /// the identity of the signer that sealed the block.
    pub coinbase: Address,
    /// State root after this block.
    pub state_root: B256,
    /// Commitment over the transaction list.
    pub transactions_root: B256,
    /// Commitment over the receipt list.
    pub receipts_root: B256,
    /// Block difficulty.
    pub difficulty: U256,
    /// Block height.
    pub number: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas consumed.
    pub gas_used: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Arbitrary extra data, capped by the governing engine.
    pub extra_data: Bytes,
    /// Proof-of-work mix digest. Must be zero under authority rules.
    pub mix_digest: B256,
    /// Proof-of-work nonce. Carries the vote nonce under authority rules.
    pub nonce: B64,
}

impl Header {
    /// Compute the block hash of this header.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        keccak256(&buf)
    }
}

/// An opaque transaction payload.
///
/// Consensus never interprets transaction contents; it only commits to them.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    /// Encoded transaction bytes.
    pub payload: Bytes,
}

impl Transaction {
    /// Create a transaction from raw payload bytes.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Compute the transaction hash.
    pub fn hash(&self) -> B256 {
        keccak256(&self.payload)
    }
}

/// Execution receipt for a single transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    /// Whether execution succeeded.
    pub success: bool,
    /// Cumulative gas used up to and including this transaction.
    pub cumulative_gas_used: u64,
}

/// A complete block (header + body).
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, serde::Serialize, serde::Deserialize)]
pub struct Block {
    /// Block header.
    pub header: Header,
    /// Transactions included in the block.
    pub transactions: Vec<Transaction>,
    /// Uncle headers referenced by the block.
    pub uncles: Vec<Header>,
}

impl Block {
    /// Create a new block.
    pub fn new(header: Header, transactions: Vec<Transaction>, uncles: Vec<Header>) -> Self {
        Self { header, transactions, uncles }
    }

    /// Create a block that carries only a header.
    pub fn from_header(header: Header) -> Self {
        Self { header, transactions: Vec::new(), uncles: Vec::new() }
    }

    /// Get the block header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Compute the block hash.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }
}

/// Compute the commitment over an ordered transaction list.
pub fn transactions_root(transactions: &[Transaction]) -> B256 {
    let mut buf = Vec::new();
    for tx in transactions {
        buf.extend_from_slice(tx.hash().as_slice());
    }
    keccak256(&buf)
}

/// Compute the commitment over an ordered receipt list.
pub fn receipts_root(receipts: &[Receipt]) -> B256 {
    let mut buf = Vec::new();
    for receipt in receipts {
        receipt.encode(&mut buf);
    }
    keccak256(&buf)
}

/// Compute the hash of an uncle list.
///
/// The empty list hashes to [`EMPTY_UNCLE_HASH`].
pub fn uncles_hash(uncles: &[Header]) -> B256 {
    let mut buf = Vec::new();
    alloy_rlp::encode_list::<Header, Header>(uncles, &mut buf);
    keccak256(&buf)
}

/// Minimal balance ledger used during block finalization.
///
/// Tracks account balances so reward application produces a deterministic
/// state root. Full account state lives outside the consensus crate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    balances: BTreeMap<Address, U256>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account balance.
    pub fn add_balance(&mut self, address: Address, amount: U256) {
        let balance = self.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Get an account balance.
    pub fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    /// Number of accounts with a recorded balance.
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Whether the ledger holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Compute the deterministic state root.
    pub fn root(&self) -> B256 {
        let mut buf = Vec::new();
        for (address, balance) in &self.balances {
            buf.extend_from_slice(address.as_slice());
            buf.extend_from_slice(&balance.to_be_bytes::<32>());
        }
        keccak256(&buf)
    }
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
