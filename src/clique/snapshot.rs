//! Authority snapshot - the set of authorized signers at a given point in time.

use super::{CliqueError, DIFF_IN_TURN, DIFF_NO_TURN, EPOCH_LENGTH, EXTRA_SEAL, EXTRA_VANITY};
use crate::primitives::Header;
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Authority engine configuration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliqueConfig {
    /// Number of seconds between blocks to enforce.
    pub period: u64,
    /// Number of blocks between checkpoint blocks.
    pub epoch: u64,
}

impl Default for CliqueConfig {
    fn default() -> Self {
        Self {
            period: 15,
            epoch: EPOCH_LENGTH,
        }
    }
}

/// Snapshot of the authorized signers at a given point in time.
///
/// The signer set itself only changes through checkpoint blocks; applying
/// headers tracks which signer sealed which block for spam protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Consensus engine configuration.
    #[serde(skip)]
    pub config: CliqueConfig,

    /// Block number where the snapshot was created.
    pub number: u64,

    /// Block hash where the snapshot was created.
    pub hash: B256,

    /// Set of authorized signers at this moment.
    pub signers: BTreeSet<Address>,

    /// Set of recent signers for spam protection (block number -> signer).
    pub recents: HashMap<u64, Address>,
}

impl Snapshot {
    /// Create a new snapshot with the specified startup parameters.
    ///
    /// This method does not initialize the set of recent signers, so only
    /// use it for genesis and checkpoint blocks.
    pub fn new(config: CliqueConfig, number: u64, hash: B256, signers: Vec<Address>) -> Self {
        Self {
            config,
            number,
            hash,
            signers: signers.into_iter().collect(),
            recents: HashMap::new(),
        }
    }

    /// Get the list of authorized signers in ascending order.
    pub fn signers_list(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    /// Check if an address is an authorized signer.
    pub fn is_signer(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// Get the number of signers.
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// Check if a signer at a given block height is in-turn.
    pub fn inturn(&self, number: u64, signer: Address) -> bool {
        let signers = self.signers_list();
        if signers.is_empty() {
            return false;
        }
        let Some(offset) = signers.iter().position(|s| *s == signer) else {
            return false;
        };
        (number % signers.len() as u64) == offset as u64
    }

    /// Calculate the expected difficulty for a signer at a given block.
    pub fn calc_difficulty(&self, number: u64, signer: Address) -> U256 {
        if self.inturn(number, signer) {
            DIFF_IN_TURN
        } else {
            DIFF_NO_TURN
        }
    }

    /// Apply a list of headers on top of this snapshot.
    ///
    /// The headers must be contiguous and start right after the snapshot.
    /// The sealing signer of each header is taken from its coinbase field.
    pub fn apply(&self, headers: &[Header]) -> Result<Snapshot, CliqueError> {
        if headers.is_empty() {
            return Ok(self.clone());
        }

        // Sanity check that the headers can be applied
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(CliqueError::InvalidSnapshotChain);
            }
        }
        if headers[0].number != self.number + 1 {
            return Err(CliqueError::InvalidSnapshotChain);
        }

        let mut snap = self.clone();

        for header in headers {
            let number = header.number;

            // Delete the oldest signer from the recent list to allow it
            // signing again
            let limit = (snap.signers.len() / 2 + 1) as u64;
            if number >= limit {
                snap.recents.remove(&(number - limit));
            }

            let signer = header.coinbase;
            if !snap.signers.contains(&signer) {
                return Err(CliqueError::UnauthorizedSigner { signer });
            }
            for (&recent_block, &recent_signer) in &snap.recents {
                if recent_signer == signer {
                    return Err(CliqueError::RecentlySigned {
                        signer,
                        recent_block,
                    });
                }
            }
            snap.recents.insert(number, signer);

            snap.number = number;
            snap.hash = header.hash();
        }

        Ok(snap)
    }
}

/// Extract the signer list from a checkpoint block's extra-data.
pub fn checkpoint_signers(header: &Header) -> Result<Vec<Address>, CliqueError> {
    if header.extra_data.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(CliqueError::MissingSignature);
    }

    let signer_bytes = &header.extra_data[EXTRA_VANITY..header.extra_data.len() - EXTRA_SEAL];
    if signer_bytes.len() % 20 != 0 {
        return Err(CliqueError::InvalidCheckpointSigners);
    }

    Ok(signer_bytes.chunks(20).map(Address::from_slice).collect())
}

/// Get the seal signature from a header's extra-data.
pub fn signature(header: &Header) -> Result<&[u8], CliqueError> {
    if header.extra_data.len() < EXTRA_SEAL {
        return Err(CliqueError::MissingSignature);
    }
    Ok(&header.extra_data[header.extra_data.len() - EXTRA_SEAL..])
}
