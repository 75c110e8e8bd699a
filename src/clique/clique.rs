//! Proof-of-authority consensus engine implementation.

use super::{
    error::CliqueError,
    snapshot::{checkpoint_signers, signature, CliqueConfig, Snapshot},
    store::SnapshotStore,
    CHECKPOINT_INTERVAL, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, EXTRA_VANITY,
    FULL_IMMUTABILITY_THRESHOLD, INMEMORY_SNAPSHOTS, NONCE_AUTH_VOTE, NONCE_DROP_VOTE,
    SEAL_POLL_INTERVAL_MS, WIGGLE_TIME_MS,
};
use crate::batch::{self, AbortHandle};
use crate::chain::ChainReader;
use crate::engine::{ApiDescriptor, Engine, StopSignal};
use crate::error::EngineError;
use crate::primitives::{
    receipts_root, transactions_root, unix_now, Block, Header, Receipt, State, Transaction,
    EMPTY_UNCLE_HASH, GAS_LIMIT_BOUND_DIVISOR, MAX_GAS_LIMIT, MIN_GAS_LIMIT,
};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use lru::LruCache;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Callback producing a 65-byte seal signature over a seal hash.
pub type SignerFn = Arc<dyn Fn(Address, B256) -> Result<Bytes, CliqueError> + Send + Sync>;

struct Authorization {
    signer: Address,
    sign_fn: SignerFn,
}

struct CliqueInner {
    config: CliqueConfig,

    /// Store for snapshot checkpoints.
    store: Arc<dyn SnapshotStore>,

    /// Snapshots for recent blocks to speed up reorgs.
    recents: RwLock<LruCache<B256, Snapshot>>,

    /// Current list of proposals we want surfaced through the API.
    proposals: RwLock<HashMap<Address, bool>>,

    /// Sealing identity and its signing backend.
    authorization: RwLock<Option<Authorization>>,

    /// Skip difficulty verification (for testing).
    fake_diff: bool,
}

/// Proof-of-authority consensus engine.
///
/// Cheap to clone; clones share snapshots, proposals and the sealing key.
#[derive(Clone)]
pub struct Clique {
    inner: Arc<CliqueInner>,
}

impl Clique {
    /// Create a new proof-of-authority engine.
    pub fn new(config: CliqueConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_options(config, store, false)
    }

    /// Create a new engine that skips difficulty verification (for testing).
    pub fn new_fake_diff(config: CliqueConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_options(config, store, true)
    }

    fn with_options(config: CliqueConfig, store: Arc<dyn SnapshotStore>, fake_diff: bool) -> Self {
        Self {
            inner: Arc::new(CliqueInner {
                config,
                store,
                recents: RwLock::new(LruCache::new(
                    NonZeroUsize::new(INMEMORY_SNAPSHOTS).unwrap_or(NonZeroUsize::MIN),
                )),
                proposals: RwLock::new(HashMap::new()),
                authorization: RwLock::new(None),
                fake_diff,
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &CliqueConfig {
        &self.inner.config
    }

    /// Inject the sealing identity and its signing backend.
    pub fn authorize(&self, signer: Address, sign_fn: SignerFn) {
        *self.inner.authorization.write() = Some(Authorization { signer, sign_fn });
        info!(target: "consensus::clique", %signer, "authorized sealing key");
    }

    /// Get the current sealing identity.
    pub fn signer(&self) -> Option<Address> {
        self.inner.authorization.read().as_ref().map(|auth| auth.signer)
    }

    /// Propose to authorize or deauthorize an address.
    pub fn propose(&self, address: Address, authorize: bool) {
        self.inner.proposals.write().insert(address, authorize);
    }

    /// Remove a proposal.
    pub fn discard(&self, address: Address) {
        self.inner.proposals.write().remove(&address);
    }

    /// Get the current proposals.
    pub fn proposals(&self) -> HashMap<Address, bool> {
        self.inner.proposals.read().clone()
    }

    /// Retrieve the authorization snapshot at a given point in time.
    ///
    /// `parents` may carry not-yet-stored ancestors (newest last); the walk
    /// consumes them before falling back to the chain.
    pub fn snapshot(
        &self,
        chain: &dyn ChainReader,
        number: u64,
        hash: B256,
        parents: &[Header],
    ) -> Result<Snapshot, CliqueError> {
        let mut headers: Vec<Header> = Vec::new();
        let mut current_number = number;
        let mut current_hash = hash;
        let mut pending = parents;
        let mut snap: Option<Snapshot> = None;

        while snap.is_none() {
            // Check the in-memory cache
            if let Some(cached) = self.inner.recents.write().get(&current_hash) {
                snap = Some(cached.clone());
                break;
            }

            // Check the store for a persisted checkpoint
            if current_number % CHECKPOINT_INTERVAL == 0 {
                if let Ok(Some(mut stored)) = self.inner.store.load_snapshot(current_hash) {
                    trace!(
                        target: "consensus::clique",
                        number = current_number,
                        "loaded snapshot from store"
                    );
                    stored.config = self.inner.config;
                    snap = Some(stored);
                    break;
                }
            }

            // At genesis, or at a checkpoint with enough headers piled up that
            // a reorg across it is no longer possible, seed a fresh snapshot
            // from the checkpoint's signer list
            if current_number == 0
                || (current_number % self.inner.config.epoch == 0
                    && headers.len() > FULL_IMMUTABILITY_THRESHOLD)
            {
                if let Some(checkpoint) = chain.get_header_by_number(current_number) {
                    let signers = checkpoint_signers(&checkpoint)?;
                    let new_snap = Snapshot::new(
                        self.inner.config,
                        current_number,
                        checkpoint.hash(),
                        signers,
                    );
                    let _ = self.inner.store.store_snapshot(&new_snap);
                    info!(
                        target: "consensus::clique",
                        number = current_number,
                        hash = %new_snap.hash,
                        "stored checkpoint snapshot"
                    );
                    snap = Some(new_snap);
                    break;
                }
            }

            // No snapshot yet, gather the header and move backward
            let header = if let Some((last, rest)) = pending.split_last() {
                if last.hash() != current_hash || last.number != current_number {
                    return Err(CliqueError::UnknownAncestor);
                }
                pending = rest;
                last.clone()
            } else {
                chain
                    .get_header(current_hash, current_number)
                    .ok_or(CliqueError::UnknownAncestor)?
            };

            current_hash = header.parent_hash;
            current_number = current_number.saturating_sub(1);
            headers.push(header);
        }

        let mut snap = snap.ok_or(CliqueError::UnknownBlock)?;

        // Apply the gathered headers, oldest first, on top of the snapshot
        headers.reverse();
        if !headers.is_empty() {
            snap = snap.apply(&headers)?;
        }

        // Cache the result, and persist it on checkpoint boundaries
        self.inner.recents.write().put(snap.hash, snap.clone());

        if snap.number % CHECKPOINT_INTERVAL == 0 && !headers.is_empty() {
            let _ = self.inner.store.store_snapshot(&snap);
            debug!(
                target: "consensus::clique",
                number = snap.number,
                "persisted snapshot checkpoint"
            );
        }

        Ok(snap)
    }

    fn verify_header_inner(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), CliqueError> {
        // Don't waste time checking blocks from the future
        let now = unix_now();
        if header.timestamp > now {
            return Err(CliqueError::FutureBlock {
                block_time: header.timestamp,
                current_time: now,
            });
        }

        // Nonces must be one of the two vote magics, zero on checkpoints
        let checkpoint = (header.number % self.inner.config.epoch) == 0;
        if header.nonce != NONCE_AUTH_VOTE && header.nonce != NONCE_DROP_VOTE {
            return Err(CliqueError::InvalidVote);
        }
        if checkpoint && header.nonce != NONCE_DROP_VOTE {
            return Err(CliqueError::InvalidCheckpointVote);
        }

        // Check that the extra-data contains both the vanity and signature
        if header.extra_data.len() < EXTRA_VANITY {
            return Err(CliqueError::MissingVanity);
        }
        if header.extra_data.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(CliqueError::MissingSignature);
        }

        // A signer list belongs in checkpoint blocks and nowhere else
        let signer_bytes = header.extra_data.len() - EXTRA_VANITY - EXTRA_SEAL;
        if !checkpoint && signer_bytes != 0 {
            return Err(CliqueError::ExtraSigners);
        }
        if checkpoint && signer_bytes % 20 != 0 {
            return Err(CliqueError::InvalidCheckpointSigners);
        }

        // The proof-of-work seal fields must stay vacant
        if header.mix_digest != B256::ZERO {
            return Err(CliqueError::InvalidMixDigest);
        }
        if header.uncle_hash != EMPTY_UNCLE_HASH {
            return Err(CliqueError::InvalidUncleHash);
        }

        // The difficulty must be one of the two turn values; whether it is
        // the correct one is checked against the snapshot later
        if header.number > 0
            && header.difficulty != DIFF_IN_TURN
            && header.difficulty != DIFF_NO_TURN
        {
            return Err(CliqueError::InvalidDifficulty {
                difficulty: header.difficulty,
            });
        }

        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(CliqueError::GasLimitExceeded {
                gas_limit: header.gas_limit,
                max_gas_limit: MAX_GAS_LIMIT,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(CliqueError::GasUsedExceeded {
                gas_used: header.gas_used,
                gas_limit: header.gas_limit,
            });
        }

        // All basic checks passed, verify cascading fields
        self.verify_cascading_fields(chain, header, parents)
    }

    fn verify_cascading_fields(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), CliqueError> {
        let number = header.number;

        // The genesis block is the always valid dead-end
        if number == 0 {
            return Ok(());
        }

        // Ensure the parent exists and joins up
        let parent = match parents.last() {
            Some(parent) => parent.clone(),
            None => chain
                .get_header(header.parent_hash, number - 1)
                .ok_or(CliqueError::UnknownAncestor)?,
        };
        if parent.number != number - 1 || parent.hash() != header.parent_hash {
            return Err(CliqueError::UnknownAncestor);
        }

        if parent.timestamp + self.inner.config.period > header.timestamp {
            return Err(CliqueError::InvalidTimestamp {
                parent_time: parent.timestamp,
                period: self.inner.config.period,
                block_time: header.timestamp,
            });
        }

        // Gas limit must stay within bounds of the parent's
        let drift = parent.gas_limit.abs_diff(header.gas_limit);
        let allowed = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
        if drift >= allowed.max(1) || header.gas_limit < MIN_GAS_LIMIT {
            return Err(CliqueError::InvalidGasLimit {
                gas_limit: header.gas_limit,
                parent_gas_limit: parent.gas_limit,
            });
        }

        // Retrieve the snapshot needed to verify this header
        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents)?;

        // On checkpoints, the embedded signer list must match the snapshot
        if number % self.inner.config.epoch == 0
            && checkpoint_signers(header)? != snap.signers_list()
        {
            return Err(CliqueError::MismatchingCheckpointSigners);
        }

        // All basic checks passed, verify the seal
        self.verify_seal_with(&snap, header)
    }

    /// Verify the seal of a header against a snapshot.
    fn verify_seal_with(&self, snap: &Snapshot, header: &Header) -> Result<(), CliqueError> {
        let number = header.number;

        // The genesis block is not a sealed block
        if number == 0 {
            return Err(CliqueError::UnknownBlock);
        }

        // An all-zero seal means the header was never signed
        let seal = signature(header)?;
        if seal.iter().all(|byte| *byte == 0) {
            return Err(CliqueError::MissingSignature);
        }

        // The sealing identity travels in the coinbase field
        let signer = header.coinbase;
        if !snap.is_signer(&signer) {
            return Err(CliqueError::UnauthorizedSigner { signer });
        }

        // Check recent signers for spam protection
        for (&recent_block, &recent_signer) in &snap.recents {
            if recent_signer == signer {
                let limit = (snap.signer_count() / 2 + 1) as u64;
                if recent_block > number.saturating_sub(limit) {
                    return Err(CliqueError::RecentlySigned {
                        signer,
                        recent_block,
                    });
                }
            }
        }

        // Ensure the difficulty corresponds to the turn-ness of the signer
        if !self.inner.fake_diff {
            let expected = snap.calc_difficulty(number, signer);
            if header.difficulty != expected {
                return Err(CliqueError::WrongDifficulty {
                    signer,
                    block: number,
                    expected,
                    actual: header.difficulty,
                });
            }
        }

        Ok(())
    }
}

/// Compute the hash a seal signature commits to: the header minus the
/// signature bytes themselves.
pub fn seal_hash(header: &Header) -> B256 {
    let mut data = Vec::new();
    data.extend_from_slice(header.parent_hash.as_slice());
    data.extend_from_slice(&header.number.to_be_bytes());
    data.extend_from_slice(&header.timestamp.to_be_bytes());
    data.extend_from_slice(header.coinbase.as_slice());
    data.extend_from_slice(&header.difficulty.to_be_bytes::<32>());
    if header.extra_data.len() >= EXTRA_SEAL {
        data.extend_from_slice(&header.extra_data[..header.extra_data.len() - EXTRA_SEAL]);
    }
    keccak256(&data)
}

impl Engine for Clique {
    fn author(&self, header: &Header) -> Result<Address, EngineError> {
        Ok(header.coinbase)
    }

    fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        _seal: bool,
    ) -> Result<(), EngineError> {
        // The authority rules always cover the seal; the flag carries no
        // weight here
        Ok(self.verify_header_inner(chain, header, &[])?)
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (AbortHandle, mpsc::Receiver<Result<(), EngineError>>) {
        let engine = self.clone();
        batch::spawn(headers, seals, move |header, parents, _seal| {
            Ok(engine.verify_header_inner(chain.as_ref(), header, parents)?)
        })
    }

    fn verify_uncles(&self, _chain: &dyn ChainReader, block: &Block) -> Result<(), EngineError> {
        if !block.uncles.is_empty() {
            return Err(CliqueError::UnclesNotAllowed.into());
        }
        Ok(())
    }

    fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<(), EngineError> {
        if header.number == 0 {
            return Err(CliqueError::UnknownBlock.into());
        }
        let snap = self.snapshot(chain, header.number - 1, header.parent_hash, &[])?;
        Ok(self.verify_seal_with(&snap, header)?)
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), EngineError> {
        let signer = self.signer().ok_or(CliqueError::SignerUnavailable)?;
        let number = header.number;
        if number == 0 {
            return Err(CliqueError::UnknownBlock.into());
        }
        let parent = chain
            .get_header(header.parent_hash, number - 1)
            .ok_or(CliqueError::UnknownAncestor)?;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;

        // The sealing identity travels in the coinbase; no votes are cast
        header.coinbase = signer;
        header.nonce = NONCE_DROP_VOTE;
        header.difficulty = snap.calc_difficulty(number, signer);

        // Vanity prefix, signer list on checkpoints, room for the seal
        let mut extra: Vec<u8> = header.extra_data.iter().copied().take(EXTRA_VANITY).collect();
        extra.resize(EXTRA_VANITY, 0);
        if number % self.inner.config.epoch == 0 {
            for candidate in snap.signers_list() {
                extra.extend_from_slice(candidate.as_slice());
            }
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
        header.extra_data = extra.into();

        header.mix_digest = B256::ZERO;
        header.timestamp = (parent.timestamp + self.inner.config.period).max(unix_now());
        Ok(())
    }

    fn finalize(
        &self,
        _chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut State,
        transactions: Vec<Transaction>,
        _uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError> {
        // No block rewards in proof-of-authority, and uncles are dropped
        header.state_root = state.root();
        header.transactions_root = transactions_root(&transactions);
        header.receipts_root = receipts_root(receipts);
        header.uncle_hash = EMPTY_UNCLE_HASH;
        Ok(Block::new(header.clone(), transactions, Vec::new()))
    }

    fn seal(
        &self,
        chain: &dyn ChainReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<Option<Block>, EngineError> {
        let number = block.number();

        // Sealing the genesis block is not supported
        if number == 0 {
            return Err(CliqueError::UnknownBlock.into());
        }
        // For 0-period chains, refuse to seal empty blocks
        if self.inner.config.period == 0 && block.transactions.is_empty() {
            return Err(CliqueError::WaitingForTransactions.into());
        }
        if block.header.extra_data.len() < EXTRA_SEAL {
            return Err(CliqueError::MissingSignature.into());
        }

        let (signer, sign_fn) = {
            let auth = self.inner.authorization.read();
            let auth = auth.as_ref().ok_or(CliqueError::SignerUnavailable)?;
            (auth.signer, auth.sign_fn.clone())
        };

        let snap = self.snapshot(chain, number - 1, block.header.parent_hash, &[])?;
        if !snap.is_signer(&signer) {
            return Err(CliqueError::UnauthorizedSigner { signer }.into());
        }

        // If we are among the recent signers, back off until others had
        // their turn
        for (&recent_block, &recent_signer) in &snap.recents {
            if recent_signer == signer {
                let limit = (snap.signer_count() / 2 + 1) as u64;
                if recent_block > number.saturating_sub(limit) {
                    info!(
                        target: "consensus::clique",
                        %signer,
                        number,
                        "signed recently, must wait for others"
                    );
                    return Ok(None);
                }
            }
        }

        // Wait until the block is due; out-of-turn signers add a random
        // wiggle so the in-turn signer gets a head start
        let mut delay_ms = block.header.timestamp.saturating_sub(unix_now()) * 1_000;
        if block.header.difficulty == DIFF_NO_TURN {
            let wiggle_ms = (snap.signer_count() as u64 / 2 + 1) * WIGGLE_TIME_MS;
            delay_ms += rand::thread_rng().gen_range(0..wiggle_ms);
            debug!(
                target: "consensus::clique",
                number,
                delay_ms,
                "out-of-turn signing, wiggling"
            );
        }

        let deadline = Instant::now() + Duration::from_millis(delay_ms);
        loop {
            if stop.is_stopped() {
                debug!(target: "consensus::clique", number, "sealing stopped");
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(Duration::from_millis(SEAL_POLL_INTERVAL_MS)));
        }

        let mut sealed = block;
        let signature = sign_fn(signer, seal_hash(&sealed.header))?;
        if signature.len() != EXTRA_SEAL {
            return Err(CliqueError::InvalidSignature {
                length: signature.len(),
            }
            .into());
        }

        // Splice the signature into the extra-data seal slot
        let mut extra = sealed.header.extra_data.to_vec();
        let seal_start = extra.len() - EXTRA_SEAL;
        extra[seal_start..].copy_from_slice(&signature);
        sealed.header.extra_data = extra.into();

        debug!(
            target: "consensus::clique",
            number,
            hash = %sealed.header.hash(),
            "sealed block"
        );
        Ok(Some(sealed))
    }

    fn apis(&self) -> Vec<ApiDescriptor> {
        vec![ApiDescriptor::new("clique", "1.0", false)]
    }
}
