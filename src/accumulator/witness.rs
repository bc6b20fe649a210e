use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::hashing;
use crate::{
    data_structures::{Denomination, OutputId},
    errors::{EngineError, EngineResult},
};

/// Accumulator state of one denomination after `sequence` mints
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Checkpoint {
    pub denomination: Denomination,
    /// Number of accumulated mints
    pub sequence: u64,
    /// Height of the last accumulated mint, 0 when empty
    pub height: u64,
    pub value: [u8; 32],
}

impl Checkpoint {
    pub fn empty(denomination: Denomination) -> Self {
        Self {
            denomination,
            sequence: 0,
            height: 0,
            value: hashing::genesis(denomination),
        }
    }
}

/// A confirmed Zerocoin mint
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct MintRecord {
    pub output_id: OutputId,
    pub denomination: Denomination,
    pub commitment: [u8; 32],
    pub height: u64,
}

impl MintRecord {
    pub fn new(
        output_id: OutputId,
        denomination: Denomination,
        commitment: [u8; 32],
        height: u64,
    ) -> Self {
        Self {
            output_id,
            denomination,
            commitment,
            height,
        }
    }
}

/// Membership proof of a minted coin at a checkpoint
///
/// `prefix` is the accumulator value just before the coin was added and
/// `suffix` the commitments accumulated after it, up to the checkpoint.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Witness {
    pub output_id: OutputId,
    pub denomination: Denomination,
    pub commitment: [u8; 32],
    /// Zero-based mint position within the denomination
    pub position: u64,
    pub prefix: [u8; 32],
    pub suffix: Vec<[u8; 32]>,
    pub checkpoint: Checkpoint,
}

impl Witness {
    /// Accumulator value implied by this witness
    pub fn accumulated_value(&self) -> [u8; 32] {
        let with_coin = hashing::fold(self.denomination, &self.prefix, &self.commitment);
        hashing::fold_all(self.denomination, with_coin, &self.suffix)
    }

    /// Mints accumulated since this witness was built
    pub fn lag_behind(&self, current: &Checkpoint) -> u64 {
        current.sequence.saturating_sub(self.checkpoint.sequence)
    }

    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|e| EngineError::WitnessDecode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        borsh::from_slice(bytes).map_err(|e| EngineError::WitnessDecode(e.to_string()))
    }
}
