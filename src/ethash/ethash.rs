//! Proof-of-work consensus engine.
//!
//! Implements the structural consensus rules of the proof-of-work chain:
//! ancestry, timestamps, the difficulty schedule, gas accounting, uncle
//! inclusion, and reward application. The memory-hard hash evaluation itself
//! lives with the miner; sealing hands out work packages through a mailbox
//! ([`Ethash::current_work`] / [`Ethash::submit_work`]) and waits for a
//! submitted solution.

use super::cache::{epoch, EpochCache, EpochCaches};
use super::difficulty::{calc_difficulty, difficulty_to_target};
use super::error::EthashError;
use super::{
    ALLOWED_FUTURE_BLOCK_SECS, BLOCK_REWARD_WEI, MAX_EXTRA_DATA_BYTES, MAX_UNCLES,
    MAX_UNCLE_DEPTH, WORK_POLL_INTERVAL_MS,
};
use crate::batch::{self, AbortHandle};
use crate::chain::ChainReader;
use crate::engine::{ApiDescriptor, Engine, StopSignal};
use crate::error::EngineError;
use crate::primitives::{
    receipts_root, transactions_root, uncles_hash, unix_now, Block, Header, Receipt, State,
    Transaction, GAS_LIMIT_BOUND_DIVISOR, MAX_GAS_LIMIT, MIN_GAS_LIMIT,
};
use alloy_primitives::{keccak256, Address, B256, B64, U256};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Proof-of-work engine configuration.
#[derive(Debug, Clone)]
pub struct EthashConfig {
    /// Directory to store verification caches in, if any.
    pub cache_dir: Option<PathBuf>,
    /// Number of verification cache descriptors kept in memory.
    pub caches_in_mem: usize,
    /// Number of verification caches kept on disk.
    pub caches_on_disk: usize,
    /// Directory to store mining datasets in, if any.
    pub dag_dir: Option<PathBuf>,
    /// Number of mining datasets kept in memory.
    pub dags_in_mem: usize,
    /// Number of mining datasets kept on disk.
    pub dags_on_disk: usize,
}

impl EthashConfig {
    /// Create a configuration with the default sizing.
    pub fn new() -> Self {
        Self {
            cache_dir: None,
            caches_in_mem: 2,
            caches_on_disk: 3,
            dag_dir: None,
            dags_in_mem: 1,
            dags_on_disk: 2,
        }
    }

    /// Set the verification cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the mining dataset directory.
    pub fn with_dag_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dag_dir = Some(dir.into());
        self
    }
}

impl Default for EthashConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A sealing work package handed out to miners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealWork {
    /// Height of the block being sealed.
    pub number: u64,
    /// Commitment the proof must be computed over.
    pub seal_hash: B256,
    /// Hash target the proof must stay below.
    pub target: U256,
}

#[derive(Debug, Clone)]
struct SealSolution {
    seal_hash: B256,
    nonce: B64,
    mix_digest: B256,
}

#[derive(Debug)]
struct EthashInner {
    config: EthashConfig,
    caches: EpochCaches,
    work: RwLock<Option<SealWork>>,
    found: Mutex<Option<SealSolution>>,
}

/// Proof-of-work consensus engine.
///
/// Cheap to clone; clones share caches and the sealing mailbox.
#[derive(Clone, Debug)]
pub struct Ethash {
    inner: Arc<EthashInner>,
}

impl Ethash {
    /// Create a new proof-of-work engine.
    pub fn new(config: EthashConfig) -> Self {
        let caches = EpochCaches::new(config.caches_in_mem.max(1));
        Self {
            inner: Arc::new(EthashInner {
                config,
                caches,
                work: RwLock::new(None),
                found: Mutex::new(None),
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EthashConfig {
        &self.inner.config
    }

    /// Get the cache descriptor for the epoch the given block belongs to.
    pub fn epoch_cache(&self, number: u64) -> Arc<EpochCache> {
        self.inner.caches.get(epoch(number))
    }

    /// Path of the on-disk verification cache for the given block, if a
    /// cache directory is configured.
    pub fn cache_path(&self, number: u64) -> Option<PathBuf> {
        let cache = self.epoch_cache(number);
        self.inner
            .config
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(cache.cache_file_name()))
    }

    /// Path of the on-disk mining dataset for the given block, if a dataset
    /// directory is configured.
    pub fn dataset_path(&self, number: u64) -> Option<PathBuf> {
        let cache = self.epoch_cache(number);
        self.inner
            .config
            .dag_dir
            .as_ref()
            .map(|dir| dir.join(cache.dataset_file_name()))
    }

    /// The work package currently waiting for a proof, if any.
    pub fn current_work(&self) -> Option<SealWork> {
        self.inner.work.read().clone()
    }

    /// Submit a mined proof for the current work package.
    ///
    /// The solution is accepted if `seal_hash` matches the outstanding work;
    /// checking the proof itself is the responsibility of the miner that
    /// produced it. Returns whether the solution was accepted.
    pub fn submit_work(&self, nonce: B64, mix_digest: B256, seal_hash: B256) -> bool {
        let work = self.inner.work.read();
        match work.as_ref() {
            Some(current) if current.seal_hash == seal_hash => {
                *self.inner.found.lock() = Some(SealSolution { seal_hash, nonce, mix_digest });
                debug!(
                    target: "consensus::ethash",
                    number = current.number,
                    %nonce,
                    "accepted mined solution"
                );
                true
            }
            Some(current) => {
                debug!(
                    target: "consensus::ethash",
                    number = current.number,
                    %seal_hash,
                    "rejected stale solution"
                );
                false
            }
            None => false,
        }
    }

    /// Verify a header against its parent.
    fn verify_parented(&self, header: &Header, parent: &Header) -> Result<(), EthashError> {
        if header.extra_data.len() > MAX_EXTRA_DATA_BYTES {
            return Err(EthashError::ExtraDataTooLong {
                length: header.extra_data.len(),
                max: MAX_EXTRA_DATA_BYTES,
            });
        }

        let now = unix_now();
        if header.timestamp > now + ALLOWED_FUTURE_BLOCK_SECS {
            return Err(EthashError::FutureBlock {
                block_time: header.timestamp,
                current_time: now,
            });
        }
        if header.timestamp <= parent.timestamp {
            return Err(EthashError::OlderTimestamp {
                parent_time: parent.timestamp,
                block_time: header.timestamp,
            });
        }

        let expected = calc_difficulty(parent, header.timestamp);
        if header.difficulty != expected {
            return Err(EthashError::InvalidDifficulty {
                expected,
                actual: header.difficulty,
            });
        }

        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(EthashError::GasLimitExceeded {
                gas_limit: header.gas_limit,
                max_gas_limit: MAX_GAS_LIMIT,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(EthashError::GasUsedExceeded {
                gas_used: header.gas_used,
                gas_limit: header.gas_limit,
            });
        }
        let drift = parent.gas_limit.abs_diff(header.gas_limit);
        let allowed = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
        if drift >= allowed.max(1) || header.gas_limit < MIN_GAS_LIMIT {
            return Err(EthashError::InvalidGasLimit {
                gas_limit: header.gas_limit,
                parent_gas_limit: parent.gas_limit,
            });
        }

        if header.number != parent.number + 1 {
            return Err(EthashError::InvalidNumber {
                parent: parent.number,
                number: header.number,
            });
        }

        Ok(())
    }

    /// Check the committed seal fields of a header.
    fn check_seal(&self, header: &Header) -> Result<(), EthashError> {
        if header.difficulty.is_zero() {
            return Err(EthashError::NonPositiveDifficulty);
        }
        if header.mix_digest == B256::ZERO {
            return Err(EthashError::InvalidMixDigest);
        }
        if header.nonce == B64::ZERO {
            return Err(EthashError::InvalidNonce);
        }
        Ok(())
    }

    fn verify_uncle_set(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), EthashError> {
        if block.uncles.len() > MAX_UNCLES {
            return Err(EthashError::TooManyUncles {
                count: block.uncles.len(),
                max: MAX_UNCLES,
            });
        }
        if block.uncles.is_empty() {
            return Ok(());
        }

        // Gather the recent ancestors along with the uncles they already
        // included. The walk tolerates gaps; missing ancestors simply shrink
        // the window.
        let mut ancestors: HashMap<B256, Header> = HashMap::new();
        let mut included: HashSet<B256> = HashSet::new();
        let mut hash = block.header.parent_hash;
        let mut number = block.number();
        for _ in 0..MAX_UNCLE_DEPTH {
            if number == 0 {
                break;
            }
            let Some(ancestor) = chain.get_block(hash, number - 1) else {
                break;
            };
            for uncle in &ancestor.uncles {
                included.insert(uncle.hash());
            }
            let next = ancestor.header.parent_hash;
            ancestors.insert(hash, ancestor.header);
            hash = next;
            number -= 1;
        }

        let block_hash = block.hash();
        let mut seen: HashSet<B256> = HashSet::new();
        for uncle in &block.uncles {
            let hash = uncle.hash();
            if included.contains(&hash) || !seen.insert(hash) {
                return Err(EthashError::DuplicateUncle { hash });
            }
            if ancestors.contains_key(&hash) || hash == block_hash {
                return Err(EthashError::UncleIsAncestor { hash });
            }
            let parent = ancestors
                .get(&uncle.parent_hash)
                .filter(|_| uncle.parent_hash != block.header.parent_hash)
                .ok_or(EthashError::DanglingUncle { hash })?;

            self.verify_parented(uncle, parent)?;
            self.check_seal(uncle)?;
        }
        Ok(())
    }
}

/// Compute the commitment a proof of work is evaluated over: the header
/// minus its seal fields.
pub fn seal_hash(header: &Header) -> B256 {
    let mut data = Vec::new();
    data.extend_from_slice(header.parent_hash.as_slice());
    data.extend_from_slice(header.uncle_hash.as_slice());
    data.extend_from_slice(header.coinbase.as_slice());
    data.extend_from_slice(header.state_root.as_slice());
    data.extend_from_slice(header.transactions_root.as_slice());
    data.extend_from_slice(header.receipts_root.as_slice());
    data.extend_from_slice(&header.difficulty.to_be_bytes::<32>());
    data.extend_from_slice(&header.number.to_be_bytes());
    data.extend_from_slice(&header.gas_limit.to_be_bytes());
    data.extend_from_slice(&header.gas_used.to_be_bytes());
    data.extend_from_slice(&header.timestamp.to_be_bytes());
    data.extend_from_slice(&header.extra_data);
    keccak256(&data)
}

/// Credit the block reward plus uncle and nephew rewards.
fn accumulate_rewards(state: &mut State, header: &Header, uncles: &[Header]) {
    let block_reward = U256::from(BLOCK_REWARD_WEI);
    let mut reward = block_reward;
    for uncle in uncles {
        // Uncle reward shrinks with inclusion depth.
        let depth_factor = U256::from((uncle.number + 8).saturating_sub(header.number));
        let uncle_reward = depth_factor * block_reward / U256::from(8u64);
        state.add_balance(uncle.coinbase, uncle_reward);

        reward += block_reward / U256::from(32u64);
    }
    state.add_balance(header.coinbase, reward);
}

impl Engine for Ethash {
    fn author(&self, header: &Header) -> Result<Address, EngineError> {
        Ok(header.coinbase)
    }

    fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), EngineError> {
        if header.number == 0 {
            return Ok(());
        }
        let parent = chain
            .get_header(header.parent_hash, header.number - 1)
            .ok_or(EthashError::UnknownAncestor)?;
        self.verify_parented(header, &parent)?;
        if seal {
            self.check_seal(header)?;
        }
        Ok(())
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (AbortHandle, mpsc::Receiver<Result<(), EngineError>>) {
        let engine = self.clone();
        batch::spawn(headers, seals, move |header, parents, seal| {
            // Prefer the in-batch parent for headers not yet in the chain.
            match parents.last() {
                Some(parent)
                    if header.number > 0
                        && parent.number + 1 == header.number
                        && parent.hash() == header.parent_hash =>
                {
                    engine.verify_parented(header, parent)?;
                    if seal {
                        engine.check_seal(header)?;
                    }
                    Ok(())
                }
                _ => engine.verify_header(chain.as_ref(), header, seal),
            }
        })
    }

    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), EngineError> {
        Ok(self.verify_uncle_set(chain, block)?)
    }

    fn verify_seal(&self, _chain: &dyn ChainReader, header: &Header) -> Result<(), EngineError> {
        Ok(self.check_seal(header)?)
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), EngineError> {
        let parent = chain
            .get_header(header.parent_hash, header.number.saturating_sub(1))
            .ok_or(EthashError::UnknownAncestor)?;
        header.difficulty = calc_difficulty(&parent, header.timestamp);
        Ok(())
    }

    fn finalize(
        &self,
        _chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut State,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError> {
        accumulate_rewards(state, header, &uncles);
        header.state_root = state.root();
        header.transactions_root = transactions_root(&transactions);
        header.receipts_root = receipts_root(receipts);
        header.uncle_hash = uncles_hash(&uncles);
        Ok(Block::new(header.clone(), transactions, uncles))
    }

    fn seal(
        &self,
        _chain: &dyn ChainReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<Option<Block>, EngineError> {
        let work = SealWork {
            number: block.number(),
            seal_hash: seal_hash(&block.header),
            target: difficulty_to_target(block.header.difficulty),
        };
        let expected = work.seal_hash;
        debug!(
            target: "consensus::ethash",
            number = work.number,
            seal_hash = %work.seal_hash,
            "published sealing work"
        );
        *self.inner.work.write() = Some(work);

        let solution = loop {
            if stop.is_stopped() {
                self.inner.work.write().take();
                debug!(target: "consensus::ethash", number = block.number(), "sealing stopped");
                return Ok(None);
            }
            // Solutions for superseded work packages are dropped.
            if let Some(found) = self.inner.found.lock().take() {
                if found.seal_hash == expected {
                    break found;
                }
            }
            thread::sleep(Duration::from_millis(WORK_POLL_INTERVAL_MS));
        };

        self.inner.work.write().take();
        let mut sealed = block;
        sealed.header.nonce = solution.nonce;
        sealed.header.mix_digest = solution.mix_digest;
        Ok(Some(sealed))
    }

    fn apis(&self) -> Vec<ApiDescriptor> {
        Vec::new()
    }
}
