//! Hybrid proof-of-work / proof-of-authority consensus.
//!
//! Chains start out mined and switch to authority sealing at a fixed height.
//! [`HybridEngine`] owns one delegate of each kind and routes every consensus
//! operation to whichever governs the block in question; the routing
//! predicate lives in [`SwitchHeight`].

mod config;
mod hybrid;

pub use config::{HybridConfig, Route, SwitchHeight, DEFAULT_SWITCH_HEIGHT};
pub use hybrid::HybridEngine;
