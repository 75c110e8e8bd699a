//! Hybrid engine configuration and block routing.

use crate::clique::CliqueConfig;
use crate::ethash::EthashConfig;

/// Default block height at which authority sealing takes over from work.
pub const DEFAULT_SWITCH_HEIGHT: u64 = 360_374;

/// Which delegate engine governs a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The proof-of-work engine, below the switch height.
    Pow,
    /// The proof-of-authority engine, at and above the switch height.
    Authority,
}

/// The height where consensus switches from proof-of-work to
/// proof-of-authority.
///
/// The switch block itself is already an authority block; only blocks
/// strictly below it remain proof-of-work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchHeight(u64);

impl SwitchHeight {
    /// Wrap a block height.
    pub const fn new(height: u64) -> Self {
        Self(height)
    }

    /// The raw height.
    pub const fn height(&self) -> u64 {
        self.0
    }

    /// Route a block number to its governing engine.
    pub const fn route(&self, number: u64) -> Route {
        if number < self.0 {
            Route::Pow
        } else {
            Route::Authority
        }
    }
}

impl Default for SwitchHeight {
    fn default() -> Self {
        Self(DEFAULT_SWITCH_HEIGHT)
    }
}

impl From<u64> for SwitchHeight {
    fn from(height: u64) -> Self {
        Self(height)
    }
}

/// Configuration for the hybrid engine and both of its delegates.
#[derive(Debug, Clone, Default)]
pub struct HybridConfig {
    /// Height at which authority sealing takes over.
    pub switch_height: SwitchHeight,
    /// Proof-of-work delegate configuration.
    pub ethash: EthashConfig,
    /// Proof-of-authority delegate configuration.
    pub clique: CliqueConfig,
}

impl HybridConfig {
    /// Create a configuration with the default switch height and delegate
    /// settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the switch height.
    pub fn with_switch_height(mut self, height: u64) -> Self {
        self.switch_height = SwitchHeight::new(height);
        self
    }

    /// Set the proof-of-work delegate configuration.
    pub fn with_ethash(mut self, ethash: EthashConfig) -> Self {
        self.ethash = ethash;
        self
    }

    /// Set the proof-of-authority delegate configuration.
    pub fn with_clique(mut self, clique: CliqueConfig) -> Self {
        self.clique = clique;
        self
    }
}
