//! Consensus engine errors.

use crate::clique::CliqueError;
use crate::ethash::EthashError;
use thiserror::Error;

/// Error returned by any consensus engine operation.
///
/// The hybrid router never raises errors of its own; whatever the governing
/// engine reports passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Proof-of-work engine error.
    #[error(transparent)]
    Pow(#[from] EthashError),

    /// Proof-of-authority engine error.
    #[error(transparent)]
    Authority(#[from] CliqueError),
}
