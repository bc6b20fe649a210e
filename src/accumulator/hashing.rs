//! Hash-chain accumulator primitives
//!
//! Every denomination has its own chain. The genesis value and every fold
//! step are domain separated so values from different denominations can never
//! collide.

use blake2::{Blake2b, Digest};
use digest::consts::U32;

use crate::data_structures::Denomination;

type Blake2b256 = Blake2b<U32>;

const GENESIS_DOMAIN: &[u8] = b"private_spend_engine.accumulator.genesis";
const FOLD_DOMAIN: &[u8] = b"private_spend_engine.accumulator.fold";
const SERIAL_DOMAIN: &[u8] = b"private_spend_engine.mint.serial";

fn finish(hasher: Blake2b256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Accumulator value of a denomination with no mints
pub fn genesis(denomination: Denomination) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(GENESIS_DOMAIN);
    hasher.update(denomination.coins().to_le_bytes());
    finish(hasher)
}

/// Accumulate one coin commitment onto `previous`
pub fn fold(denomination: Denomination, previous: &[u8; 32], commitment: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(FOLD_DOMAIN);
    hasher.update(denomination.coins().to_le_bytes());
    hasher.update(previous);
    hasher.update(commitment);
    finish(hasher)
}

pub fn fold_all<'a>(
    denomination: Denomination,
    start: [u8; 32],
    commitments: impl IntoIterator<Item = &'a [u8; 32]>,
) -> [u8; 32] {
    commitments
        .into_iter()
        .fold(start, |acc, c| fold(denomination, &acc, c))
}

/// Serial commitment for a freshly minted coin
pub fn serial_commitment(denomination: Denomination, serial: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(SERIAL_DOMAIN);
    hasher.update(denomination.coins().to_le_bytes());
    hasher.update(serial);
    finish(hasher)
}
