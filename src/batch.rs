//! Ordered batch header verification.
//!
//! [`spawn`] runs one dedicated worker that verifies headers sequentially in
//! submission order and publishes one result per header, in that order, to a
//! channel buffered to the batch length. After each verification the worker
//! checks for an abort before publishing; once aborted it never publishes
//! again, leaving the remaining headers unverified.

use crate::error::EngineError;
use crate::primitives::Header;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, trace};

/// Handle used to abort an in-flight batch verification.
///
/// Dropping the handle without calling [`abort`](Self::abort) lets the batch
/// run to completion.
#[derive(Debug)]
pub struct AbortHandle {
    tx: oneshot::Sender<()>,
}

impl AbortHandle {
    /// Abort the batch. Results already published remain readable; no
    /// further results will arrive.
    pub fn abort(self) {
        let _ = self.tx.send(());
    }
}

/// Spawn the batch verification worker.
///
/// `verify` is invoked once per header, in order, with the header, the batch
/// headers preceding it (so engines can resolve ancestors that are not in the
/// chain yet) and its seal flag. Missing seal flags default to full
/// verification.
pub fn spawn<F>(
    headers: Vec<Header>,
    seals: Vec<bool>,
    verify: F,
) -> (AbortHandle, mpsc::Receiver<Result<(), EngineError>>)
where
    F: Fn(&Header, &[Header], bool) -> Result<(), EngineError> + Send + 'static,
{
    // Buffered to the batch length so publishing never blocks the worker.
    let (results_tx, results_rx) = mpsc::channel(headers.len().max(1));
    let (abort_tx, mut abort_rx) = oneshot::channel();

    thread::spawn(move || {
        for index in 0..headers.len() {
            let header = &headers[index];
            let seal = seals.get(index).copied().unwrap_or(true);
            let outcome = verify(header, &headers[..index], seal);
            trace!(
                target: "consensus::batch",
                index,
                number = header.number,
                ok = outcome.is_ok(),
                "verified batch header"
            );

            match abort_rx.try_recv() {
                Ok(()) => {
                    debug!(
                        target: "consensus::batch",
                        verified = index + 1,
                        total = headers.len(),
                        "batch verification aborted"
                    );
                    return;
                }
                // A dropped handle is not an abort.
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {}
            }

            if results_tx.blocking_send(outcome).is_err() {
                // Receiver dropped, nobody is reading results anymore.
                return;
            }
        }
    });

    (AbortHandle { tx: abort_tx }, results_rx)
}
