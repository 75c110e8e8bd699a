//! Hybrid consensus engine.
//!
//! A chain governed by this crate starts out under proof-of-work and hands
//! over to proof-of-authority at a fixed block height. [`HybridEngine`]
//! routes every consensus operation to the delegate governing the block in
//! question; both delegates implement the same [`Engine`] trait and work on
//! their own as well.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         HybridEngine                          │
//! │                                                               │
//! │     number < switch height       number >= switch height      │
//! │     ┌───────────────────┐        ┌───────────────────┐        │
//! │     │      Ethash       │        │      Clique       │        │
//! │     │ (proof-of-work)   │        │ (proof-of-auth.)  │        │
//! │     └─────────┬─────────┘        └─────────┬─────────┘        │
//! │               │                            │                  │
//! │               ▼                            ▼                  │
//! │        epoch caches,                signer snapshots,         │
//! │        seal-work mailbox            snapshot store            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Engine`]: the consensus interface every engine implements
//! - [`HybridEngine`]: height-based router over the two delegates
//! - [`Ethash`](ethash::Ethash): structural proof-of-work validation and sealing
//! - [`Clique`](clique::Clique): authority-based validation and sealing
//! - [`ChainReader`]: read access to headers and blocks during validation
//!
//! # Modules
//!
//! - [`primitives`]: headers, blocks, transactions and world state
//! - [`chain`]: chain read access and an in-memory implementation
//! - [`engine`]: the [`Engine`] trait and sealing stop signals
//! - [`batch`]: ordered, abortable batch header verification
//! - [`ethash`]: the proof-of-work delegate
//! - [`clique`]: the proof-of-authority delegate
//! - [`hybrid`]: the height-routed combination of the two

#![warn(unused_crate_dependencies)]

pub mod batch;
pub mod chain;
pub mod clique;
pub mod engine;
pub mod error;
pub mod ethash;
pub mod hybrid;
pub mod primitives;

pub use chain::{ChainReader, MemoryChain};
pub use engine::{stop_channel, ApiDescriptor, Engine, StopHandle, StopSignal};
pub use error::EngineError;

pub use clique::{Clique, CliqueConfig};
pub use ethash::{Ethash, EthashConfig};
pub use hybrid::{HybridConfig, HybridEngine, SwitchHeight, DEFAULT_SWITCH_HEIGHT};
