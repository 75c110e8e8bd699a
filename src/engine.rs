//! The uniform consensus engine interface.
//!
//! Every engine in this crate exposes the same [`Engine`] surface, whether
//! it implements the rules itself or routes to a delegate, so callers can
//! swap one for another without code changes.

use crate::batch::AbortHandle;
use crate::chain::ChainReader;
use crate::error::EngineError;
use crate::primitives::{Block, Header, Receipt, State, Transaction};
use alloy_primitives::Address;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A blockchain consensus engine.
pub trait Engine: Send + Sync + 'static {
    /// Return the address of the account that minted the given block.
    fn author(&self, header: &Header) -> Result<Address, EngineError>;

    /// Check whether a header conforms to the consensus rules. `seal`
    /// controls whether the seal is verified along with the structure.
    fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), EngineError>;

    /// Verify a batch of headers concurrently.
    ///
    /// Headers are verified sequentially in submission order on a dedicated
    /// worker; one result per header arrives on the returned channel in the
    /// same order. Dropping the [`AbortHandle`] lets the batch run to
    /// completion; calling [`AbortHandle::abort`] stops the worker before it
    /// publishes any further results.
    fn verify_headers(
        &self,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (AbortHandle, mpsc::Receiver<Result<(), EngineError>>);

    /// Verify that the uncles of the given block conform to the consensus
    /// rules.
    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), EngineError>;

    /// Check whether the seal carried by a header satisfies the consensus
    /// rules.
    fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<(), EngineError>;

    /// Initialize the consensus fields of a header in preparation for
    /// sealing. The changes are applied in place.
    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), EngineError>;

    /// Run post-transaction state modifications (e.g. reward application),
    /// update the header commitments, and assemble the final block.
    fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut State,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError>;

    /// Generate a sealed block from the given input block.
    ///
    /// Blocks until a seal is produced or `stop` fires; returns `Ok(None)`
    /// when sealing was stopped before completion.
    fn seal(
        &self,
        chain: &dyn ChainReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<Option<Block>, EngineError>;

    /// Describe the RPC APIs this engine exposes.
    fn apis(&self) -> Vec<ApiDescriptor>;
}

/// Description of an RPC namespace an engine exposes.
///
/// Carries routing metadata only; transports live outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApiDescriptor {
    /// RPC namespace, e.g. `clique`.
    pub namespace: String,
    /// API version.
    pub version: String,
    /// Whether the namespace is exposed publicly.
    pub public: bool,
}

impl ApiDescriptor {
    /// Create a new API descriptor.
    pub fn new(namespace: impl Into<String>, version: impl Into<String>, public: bool) -> Self {
        Self { namespace: namespace.into(), version: version.into(), public }
    }
}

/// Sending half of a sealing stop signal.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request that the sealing operation stop.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Get another signal observing this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal { rx: self.tx.subscribe() }
    }
}

/// Receiving half of a sealing stop signal.
///
/// Engines poll this while waiting inside [`Engine::seal`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Create a connected stop handle/signal pair.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_channel_fires() {
        let (handle, signal) = stop_channel();
        assert!(!signal.is_stopped());

        handle.stop();
        assert!(signal.is_stopped());

        // Signals derived after the fact observe the stop too.
        assert!(handle.signal().is_stopped());
    }

    #[test]
    fn test_stop_signal_never() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());
        assert!(!signal.clone().is_stopped());
    }

    #[test]
    fn test_stop_survives_handle_drop() {
        let (handle, signal) = stop_channel();
        handle.stop();
        drop(handle);
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_api_descriptor() {
        let api = ApiDescriptor::new("clique", "1.0", false);
        assert_eq!(api.namespace, "clique");
        assert_eq!(api.version, "1.0");
        assert!(!api.public);
    }
}
