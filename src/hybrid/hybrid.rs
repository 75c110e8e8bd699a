//! Height-routed hybrid consensus engine.

use super::config::{HybridConfig, Route, SwitchHeight};
use crate::batch::{self, AbortHandle};
use crate::chain::ChainReader;
use crate::clique::{Clique, SnapshotStore};
use crate::engine::{ApiDescriptor, Engine, StopSignal};
use crate::error::EngineError;
use crate::ethash::Ethash;
use crate::primitives::{Block, Header, Receipt, State, Transaction};
use alloy_primitives::Address;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, trace};

/// Consensus engine that delegates each block to proof-of-work or
/// proof-of-authority depending on its height.
///
/// Every routed operation looks at exactly one block number: the header's own
/// for header operations, the including block's for uncle and sealing
/// operations. [`author`](Engine::author) and [`apis`](Engine::apis) are not
/// routed at all.
pub struct HybridEngine<P, A> {
    pow: Arc<P>,
    authority: Arc<A>,
    switch: SwitchHeight,
}

impl<P, A> Clone for HybridEngine<P, A> {
    fn clone(&self) -> Self {
        Self {
            pow: self.pow.clone(),
            authority: self.authority.clone(),
            switch: self.switch,
        }
    }
}

impl HybridEngine<Ethash, Clique> {
    /// Create the production delegate pair from one configuration and a
    /// shared snapshot store.
    pub fn new(config: HybridConfig, store: Arc<dyn SnapshotStore>) -> Self {
        info!(
            target: "consensus::hybrid",
            switch_height = config.switch_height.height(),
            period = config.clique.period,
            epoch = config.clique.epoch,
            "starting hybrid consensus"
        );
        Self {
            pow: Arc::new(Ethash::new(config.ethash)),
            authority: Arc::new(Clique::new(config.clique, store)),
            switch: config.switch_height,
        }
    }
}

impl<P, A> HybridEngine<P, A> {
    /// Assemble a hybrid engine from existing delegates.
    pub fn from_parts(pow: P, authority: A, switch: SwitchHeight) -> Self {
        Self {
            pow: Arc::new(pow),
            authority: Arc::new(authority),
            switch,
        }
    }

    /// The height at which authority sealing takes over.
    pub fn switch_height(&self) -> SwitchHeight {
        self.switch
    }

    /// The proof-of-work delegate.
    pub fn pow(&self) -> &P {
        &self.pow
    }

    /// The proof-of-authority delegate.
    pub fn authority(&self) -> &A {
        &self.authority
    }
}

impl<P: Engine, A: Engine> HybridEngine<P, A> {
    /// The delegate governing a block number.
    pub fn engine_for(&self, number: u64) -> &dyn Engine {
        let route = self.switch.route(number);
        trace!(target: "consensus::hybrid", number, ?route, "routed block");
        match route {
            Route::Pow => self.pow.as_ref(),
            Route::Authority => self.authority.as_ref(),
        }
    }
}

impl<P: Engine, A: Engine> Engine for HybridEngine<P, A> {
    fn author(&self, header: &Header) -> Result<Address, EngineError> {
        // Both delegates read the author off the coinbase, so there is
        // nothing to route
        Ok(header.coinbase)
    }

    fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), EngineError> {
        self.engine_for(header.number).verify_header(chain, header, seal)
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (AbortHandle, mpsc::Receiver<Result<(), EngineError>>) {
        // Each header routes on its own number; ancestors are resolved from
        // the chain through the single-header delegate path
        let engine = self.clone();
        batch::spawn(headers, seals, move |header, _parents, seal| {
            engine
                .engine_for(header.number)
                .verify_header(chain.as_ref(), header, seal)
        })
    }

    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), EngineError> {
        // Uncles follow the rules of the block that includes them, whatever
        // heights the uncles themselves have
        self.engine_for(block.number()).verify_uncles(chain, block)
    }

    fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<(), EngineError> {
        self.engine_for(header.number).verify_seal(chain, header)
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), EngineError> {
        self.engine_for(header.number).prepare(chain, header)
    }

    fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut State,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError> {
        self.engine_for(header.number)
            .finalize(chain, header, state, transactions, uncles, receipts)
    }

    fn seal(
        &self,
        chain: &dyn ChainReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<Option<Block>, EngineError> {
        self.engine_for(block.number()).seal(chain, block, stop)
    }

    fn apis(&self) -> Vec<ApiDescriptor> {
        // Management APIs always come from the authority delegate
        self.authority.apis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::clique::{CliqueError, MemorySnapshotStore};
    use crate::engine::stop_channel;
    use crate::ethash::{calc_difficulty, MINIMUM_DIFFICULTY};
    use alloy_primitives::U256;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;

    /// Test delegate that records every routed call.
    #[derive(Clone)]
    struct RecordingEngine {
        namespace: &'static str,
        calls: Arc<Mutex<Vec<(&'static str, u64)>>>,
        fail: Option<EngineError>,
        permits: Option<Arc<Mutex<std_mpsc::Receiver<()>>>>,
    }

    impl RecordingEngine {
        fn new(namespace: &'static str) -> Self {
            Self {
                namespace,
                calls: Arc::new(Mutex::new(Vec::new())),
                fail: None,
                permits: None,
            }
        }

        fn failing(mut self, error: EngineError) -> Self {
            self.fail = Some(error);
            self
        }

        /// Gate each header verification on a permit so abort timing is
        /// deterministic.
        fn gated(namespace: &'static str) -> (Self, std_mpsc::Sender<()>) {
            let (permit_tx, permit_rx) = std_mpsc::channel();
            let mut engine = Self::new(namespace);
            engine.permits = Some(Arc::new(Mutex::new(permit_rx)));
            (engine, permit_tx)
        }

        fn record(&self, op: &'static str, number: u64) {
            self.calls.lock().unwrap().push((op, number));
        }

        fn calls(&self) -> Vec<(&'static str, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Engine for RecordingEngine {
        fn author(&self, header: &Header) -> Result<Address, EngineError> {
            self.record("author", header.number);
            Ok(header.coinbase)
        }

        fn verify_header(
            &self,
            _chain: &dyn ChainReader,
            header: &Header,
            _seal: bool,
        ) -> Result<(), EngineError> {
            if let Some(permits) = &self.permits {
                permits.lock().unwrap().recv().unwrap();
            }
            self.record("verify_header", header.number);
            match &self.fail {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        fn verify_headers(
            &self,
            chain: Arc<dyn ChainReader>,
            headers: Vec<Header>,
            seals: Vec<bool>,
        ) -> (AbortHandle, mpsc::Receiver<Result<(), EngineError>>) {
            let engine = self.clone();
            batch::spawn(headers, seals, move |header, _parents, seal| {
                engine.verify_header(chain.as_ref(), header, seal)
            })
        }

        fn verify_uncles(
            &self,
            _chain: &dyn ChainReader,
            block: &Block,
        ) -> Result<(), EngineError> {
            self.record("verify_uncles", block.number());
            Ok(())
        }

        fn verify_seal(
            &self,
            _chain: &dyn ChainReader,
            header: &Header,
        ) -> Result<(), EngineError> {
            self.record("verify_seal", header.number);
            Ok(())
        }

        fn prepare(&self, _chain: &dyn ChainReader, header: &mut Header) -> Result<(), EngineError> {
            self.record("prepare", header.number);
            Ok(())
        }

        fn finalize(
            &self,
            _chain: &dyn ChainReader,
            header: &mut Header,
            _state: &mut State,
            transactions: Vec<Transaction>,
            uncles: Vec<Header>,
            _receipts: &[Receipt],
        ) -> Result<Block, EngineError> {
            self.record("finalize", header.number);
            Ok(Block::new(header.clone(), transactions, uncles))
        }

        fn seal(
            &self,
            _chain: &dyn ChainReader,
            block: Block,
            stop: StopSignal,
        ) -> Result<Option<Block>, EngineError> {
            let op = if stop.is_stopped() { "seal(stopped)" } else { "seal" };
            self.record(op, block.number());
            Ok(Some(block))
        }

        fn apis(&self) -> Vec<ApiDescriptor> {
            self.record("apis", 0);
            vec![ApiDescriptor::new(self.namespace, "1.0", true)]
        }
    }

    fn recording_pair(switch: u64) -> (RecordingEngine, RecordingEngine, HybridEngine<RecordingEngine, RecordingEngine>) {
        let pow = RecordingEngine::new("pow");
        let authority = RecordingEngine::new("authority");
        let hybrid =
            HybridEngine::from_parts(pow.clone(), authority.clone(), SwitchHeight::new(switch));
        (pow, authority, hybrid)
    }

    fn numbered(number: u64) -> Header {
        Header { number, ..Default::default() }
    }

    #[test]
    fn test_construction_is_infallible() {
        let engine = HybridEngine::new(HybridConfig::default(), MemorySnapshotStore::new_arc());
        assert_eq!(engine.switch_height().height(), 360_374);
        assert_eq!(engine.authority().config().period, 15);
        assert_eq!(engine.authority().config().epoch, 30_000);
        assert_eq!(engine.pow().config().caches_in_mem, 2);
    }

    #[test]
    fn test_verify_header_routes_around_the_switch() {
        let (pow, authority, hybrid) = recording_pair(100);
        let chain = MemoryChain::new();

        for number in [0, 99, 100, 101] {
            hybrid.verify_header(&chain, &numbered(number), true).unwrap();
        }

        assert_eq!(pow.calls(), vec![("verify_header", 0), ("verify_header", 99)]);
        assert_eq!(
            authority.calls(),
            vec![("verify_header", 100), ("verify_header", 101)]
        );
    }

    #[test]
    fn test_author_reads_coinbase_without_routing() {
        let (pow, authority, hybrid) = recording_pair(100);
        let beneficiary = Address::repeat_byte(0x07);

        for number in [99, 100] {
            let header = Header { number, coinbase: beneficiary, ..Default::default() };
            assert_eq!(hybrid.author(&header).unwrap(), beneficiary);
        }

        assert!(pow.calls().is_empty());
        assert!(authority.calls().is_empty());
    }

    #[test]
    fn test_apis_always_come_from_authority() {
        let (pow, authority, hybrid) = recording_pair(100);

        assert_eq!(hybrid.apis(), vec![ApiDescriptor::new("authority", "1.0", true)]);
        assert!(pow.calls().is_empty());
        assert_eq!(authority.calls(), vec![("apis", 0)]);
    }

    #[test]
    fn test_uncles_route_by_including_block() {
        let (pow, authority, hybrid) = recording_pair(100);
        let chain = MemoryChain::new();

        // A pre-switch uncle inside a post-switch block is the authority
        // delegate's problem
        let block = Block::new(numbered(100), Vec::new(), vec![numbered(99)]);
        hybrid.verify_uncles(&chain, &block).unwrap();

        let block = Block::new(numbered(99), Vec::new(), vec![numbered(97)]);
        hybrid.verify_uncles(&chain, &block).unwrap();

        assert_eq!(pow.calls(), vec![("verify_uncles", 99)]);
        assert_eq!(authority.calls(), vec![("verify_uncles", 100)]);
    }

    #[test]
    fn test_remaining_operations_route_by_block_number() {
        let (pow, authority, hybrid) = recording_pair(100);
        let chain = MemoryChain::new();

        hybrid.verify_seal(&chain, &numbered(99)).unwrap();
        hybrid.prepare(&chain, &mut numbered(100)).unwrap();

        let mut header = numbered(99);
        let block = hybrid
            .finalize(&chain, &mut header, &mut State::new(), Vec::new(), Vec::new(), &[])
            .unwrap();
        assert_eq!(block.number(), 99);

        assert_eq!(pow.calls(), vec![("verify_seal", 99), ("finalize", 99)]);
        assert_eq!(authority.calls(), vec![("prepare", 100)]);
    }

    #[test]
    fn test_seal_routes_and_forwards_the_stop_signal() {
        let (pow, authority, hybrid) = recording_pair(100);
        let chain = MemoryChain::new();

        let (stop, signal) = stop_channel();
        stop.stop();
        let sealed = hybrid
            .seal(&chain, Block::from_header(numbered(100)), signal)
            .unwrap();
        assert_eq!(sealed, Some(Block::from_header(numbered(100))));

        hybrid
            .seal(&chain, Block::from_header(numbered(99)), StopSignal::never())
            .unwrap();

        assert_eq!(authority.calls(), vec![("seal(stopped)", 100)]);
        assert_eq!(pow.calls(), vec![("seal", 99)]);
    }

    #[test]
    fn test_batch_results_arrive_in_input_order_across_the_switch() {
        let (pow, authority, hybrid) = recording_pair(3);
        let headers: Vec<Header> = (1..=5).map(numbered).collect();

        let (_abort, mut results) =
            hybrid.verify_headers(MemoryChain::new_arc(), headers, vec![true; 5]);

        for _ in 0..5 {
            results.blocking_recv().unwrap().unwrap();
        }
        assert!(results.blocking_recv().is_none());

        assert_eq!(pow.calls(), vec![("verify_header", 1), ("verify_header", 2)]);
        assert_eq!(
            authority.calls(),
            vec![("verify_header", 3), ("verify_header", 4), ("verify_header", 5)]
        );
    }

    #[test]
    fn test_batch_failures_stay_in_position() {
        let pow = RecordingEngine::new("pow");
        let authority = RecordingEngine::new("authority")
            .failing(CliqueError::UnknownBlock.into());
        let hybrid =
            HybridEngine::from_parts(pow, authority, SwitchHeight::new(3));

        let headers: Vec<Header> = (1..=5).map(numbered).collect();
        let (_abort, mut results) =
            hybrid.verify_headers(MemoryChain::new_arc(), headers, vec![true; 5]);

        for number in 1..=5u64 {
            let outcome = results.blocking_recv().unwrap();
            assert_eq!(outcome.is_ok(), number < 3, "result {number} out of position");
        }
        assert!(results.blocking_recv().is_none());
    }

    #[test]
    fn test_batch_abort_before_any_result() {
        let (pow, permits) = RecordingEngine::gated("pow");
        let hybrid =
            HybridEngine::from_parts(pow, RecordingEngine::new("authority"), SwitchHeight::new(100));

        let headers: Vec<Header> = (0..3).map(numbered).collect();
        let (abort, mut results) =
            hybrid.verify_headers(MemoryChain::new_arc(), headers, vec![true; 3]);

        abort.abort();
        for _ in 0..3 {
            permits.send(()).unwrap();
        }

        assert!(results.blocking_recv().is_none());
    }

    #[test]
    fn test_batch_abort_after_all_but_one() {
        let (pow, permits) = RecordingEngine::gated("pow");
        let hybrid =
            HybridEngine::from_parts(pow, RecordingEngine::new("authority"), SwitchHeight::new(100));

        let headers: Vec<Header> = (0..4).map(numbered).collect();
        let (abort, mut results) =
            hybrid.verify_headers(MemoryChain::new_arc(), headers, vec![true; 4]);

        for _ in 0..3 {
            permits.send(()).unwrap();
            results.blocking_recv().unwrap().unwrap();
        }

        abort.abort();
        permits.send(()).unwrap();

        assert!(results.blocking_recv().is_none());
    }

    #[test]
    fn test_switch_block_forbids_uncles_with_real_delegates() {
        let config = HybridConfig::new().with_switch_height(100);
        let engine = HybridEngine::new(config, MemorySnapshotStore::new_arc());
        let chain = MemoryChain::new();

        // The authority delegate rejects the pre-switch uncle outright
        let block = Block::new(numbered(100), Vec::new(), vec![numbered(98)]);
        let err = engine.verify_uncles(&chain, &block).unwrap_err();
        assert_eq!(err, EngineError::Authority(CliqueError::UnclesNotAllowed));

        // An uncle-free pre-switch block is fine
        let block = Block::from_header(numbered(99));
        engine.verify_uncles(&chain, &block).unwrap();
    }

    #[test]
    fn test_prepare_reaches_each_real_delegate() {
        let config = HybridConfig::new().with_switch_height(2);
        let engine = HybridEngine::new(config, MemorySnapshotStore::new_arc());
        let chain = MemoryChain::new();

        let genesis = Header {
            difficulty: U256::from(MINIMUM_DIFFICULTY),
            gas_limit: 30_000_000,
            timestamp: 1_600_000_000,
            ..Default::default()
        };
        chain.insert_header(genesis.clone());

        // Below the switch the work engine fills in the difficulty
        let mut header = Header {
            parent_hash: genesis.hash(),
            number: 1,
            gas_limit: genesis.gas_limit,
            timestamp: genesis.timestamp + 13,
            ..Default::default()
        };
        engine.prepare(&chain, &mut header).unwrap();
        assert_eq!(header.difficulty, calc_difficulty(&genesis, header.timestamp));

        // At the switch the authority engine wants a sealing key first
        let mut header = numbered(2);
        let err = engine.prepare(&chain, &mut header).unwrap_err();
        assert_eq!(err, EngineError::Authority(CliqueError::SignerUnavailable));
    }

    #[test]
    fn test_usable_as_trait_object() {
        let engine: Arc<dyn Engine> =
            Arc::new(HybridEngine::new(HybridConfig::default(), MemorySnapshotStore::new_arc()));
        let header = Header { coinbase: Address::repeat_byte(0x01), ..Default::default() };
        assert_eq!(engine.author(&header).unwrap(), Address::repeat_byte(0x01));
        assert_eq!(engine.apis(), vec![ApiDescriptor::new("clique", "1.0", false)]);
    }
}
