//! Read-only chain access for consensus engines.
//!
//! Engines never persist chain state themselves; they look ancestors up
//! through [`ChainReader`]. The [`MemoryChain`] implementation backs tests
//! and light-weight embedding.

use crate::primitives::{Block, Header};
use alloy_primitives::B256;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Read-only header and block access.
pub trait ChainReader: Send + Sync {
    /// Get the current head header.
    fn current_header(&self) -> Option<Header>;

    /// Get a header by hash and number.
    fn get_header(&self, hash: B256, number: u64) -> Option<Header>;

    /// Get a canonical header by number.
    fn get_header_by_number(&self, number: u64) -> Option<Header>;

    /// Get a header by hash.
    fn get_header_by_hash(&self, hash: B256) -> Option<Header>;

    /// Get a block by hash and number.
    fn get_block(&self, hash: B256, number: u64) -> Option<Block>;
}

#[derive(Debug, Default)]
struct ChainState {
    blocks: HashMap<B256, Block>,
    canonical: BTreeMap<u64, B256>,
    head: Option<B256>,
}

/// In-memory chain storage.
///
/// Blocks are indexed by hash; the highest inserted number is tracked as the
/// canonical head. Sufficient for tests and for driving the engines without
/// a persistent backend.
#[derive(Debug, Default)]
pub struct MemoryChain {
    state: RwLock<ChainState>,
}

impl MemoryChain {
    /// Create a new empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty chain wrapped in an [`Arc`].
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert a block, updating the canonical index and head.
    pub fn insert(&self, block: Block) {
        let hash = block.hash();
        let number = block.number();

        let mut state = self.state.write();
        state.canonical.insert(number, hash);

        let is_head = state
            .head
            .and_then(|head| state.blocks.get(&head))
            .map(|head| number >= head.number())
            .unwrap_or(true);
        if is_head {
            state.head = Some(hash);
        }

        state.blocks.insert(hash, block);
    }

    /// Insert a header-only block.
    pub fn insert_header(&self, header: Header) {
        self.insert(Block::from_header(header));
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Whether the chain holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }
}

impl ChainReader for MemoryChain {
    fn current_header(&self) -> Option<Header> {
        let state = self.state.read();
        let head = state.head?;
        state.blocks.get(&head).map(|block| block.header.clone())
    }

    fn get_header(&self, hash: B256, number: u64) -> Option<Header> {
        let state = self.state.read();
        state
            .blocks
            .get(&hash)
            .filter(|block| block.number() == number)
            .map(|block| block.header.clone())
    }

    fn get_header_by_number(&self, number: u64) -> Option<Header> {
        let state = self.state.read();
        let hash = state.canonical.get(&number)?;
        state.blocks.get(hash).map(|block| block.header.clone())
    }

    fn get_header_by_hash(&self, hash: B256) -> Option<Header> {
        self.state.read().blocks.get(&hash).map(|block| block.header.clone())
    }

    fn get_block(&self, hash: B256, number: u64) -> Option<Block> {
        let state = self.state.read();
        state
            .blocks
            .get(&hash)
            .filter(|block| block.number() == number)
            .cloned()
    }
}
