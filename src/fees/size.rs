//! Serialized size estimates per coin type

use crate::data_structures::CoinType;

/// Version, lock time, type byte and input/output counts
pub const TX_OVERHEAD: usize = 12;

pub const PLAIN_INPUT_SIZE: usize = 148;
/// Outpoint, value commitment and signature
pub const CT_INPUT_SIZE: usize = 180;
/// Coin spend proof dominates any Zerocoin transaction
pub const ZEROCOIN_SPEND_SIZE: usize = 6_500;

pub const PLAIN_OUTPUT_SIZE: usize = 34;
/// Commitment, ephemeral key and range proof
pub const BLINDED_OUTPUT_SIZE: usize = 742;
/// Coin commitment plus mint proof
pub const MINT_OUTPUT_SIZE: usize = 200;

/// Key image plus ring members and their offsets
pub fn ring_ct_input_size(ring_size: usize) -> usize {
    33 + (ring_size + 1) * 32 + ring_size * 4
}

pub fn input_size(coin_type: CoinType, ring_size: usize) -> usize {
    match coin_type {
        CoinType::Plain => PLAIN_INPUT_SIZE,
        CoinType::Ct => CT_INPUT_SIZE,
        CoinType::RingCt => ring_ct_input_size(ring_size),
        CoinType::Zerocoin => ZEROCOIN_SPEND_SIZE,
    }
}

/// Zerocoin outputs are mints
pub fn output_size(coin_type: CoinType) -> usize {
    match coin_type {
        CoinType::Plain => PLAIN_OUTPUT_SIZE,
        CoinType::Ct | CoinType::RingCt => BLINDED_OUTPUT_SIZE,
        CoinType::Zerocoin => MINT_OUTPUT_SIZE,
    }
}

pub fn estimate_size(inputs: &[CoinType], ring_size: usize, outputs: &[CoinType]) -> usize {
    TX_OVERHEAD
        + inputs
            .iter()
            .map(|t| input_size(*t, ring_size))
            .sum::<usize>()
        + outputs.iter().map(|t| output_size(*t)).sum::<usize>()
}
