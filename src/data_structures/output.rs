use std::fmt;

use serde::{Deserialize, Serialize};

use super::denomination::Denomination;

/// Amount in base units
pub type Amount = u64;

/// Base units per coin
pub const COIN: Amount = 100_000_000;

/// Transaction id plus output position
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
)]
pub struct OutputId {
    pub txid: [u8; 32],
    pub index: u32,
}

impl OutputId {
    pub fn new(txid: [u8; 32], index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

/// Output representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CoinType {
    /// Transparent basecoin
    Plain,
    /// Confidential transaction (blinded value)
    Ct,
    /// Ring confidential transaction (spent through a decoy ring)
    RingCt,
    /// Fixed-denomination accumulator token
    Zerocoin,
}

impl CoinType {
    /// Preference order when a caller does not name a type: cheapest anonymity first,
    /// transparent last.
    pub const PREFERENCE: [CoinType; 4] = [
        CoinType::RingCt,
        CoinType::Ct,
        CoinType::Zerocoin,
        CoinType::Plain,
    ];

    pub fn is_blinded(&self) -> bool {
        matches!(self, CoinType::Ct | CoinType::RingCt)
    }
}

/// Reference to the wallet key owning an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRef {
    pub account: u32,
    pub index: u32,
}

/// An output known to the output index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: OutputId,
    pub coin_type: CoinType,
    /// Set for Zerocoin outputs only
    pub denomination: Option<Denomination>,
    /// Explicit for Plain/Zerocoin; known to the owner for CT/RingCT
    pub value: Amount,
    /// Value commitment for blinded outputs, public coin commitment for Zerocoin
    pub commitment: [u8; 32],
    /// Height of the confirming block
    pub confirmed_height: u64,
    /// First height at which the output may be spent
    pub maturity_height: u64,
    pub spent: bool,
    /// User lock; excluded from automatic selection
    pub locked: bool,
    /// `None` for foreign outputs that are only decoy candidates
    pub owner: Option<KeyRef>,
    /// Position in the global RingCT output history
    pub ring_index: Option<u64>,
}

impl Output {
    fn base(id: OutputId, coin_type: CoinType, value: Amount, confirmed_height: u64) -> Self {
        Self {
            id,
            coin_type,
            denomination: None,
            value,
            commitment: [0u8; 32],
            confirmed_height,
            maturity_height: confirmed_height,
            spent: false,
            locked: false,
            owner: None,
            ring_index: None,
        }
    }

    pub fn plain(id: OutputId, value: Amount, confirmed_height: u64) -> Self {
        Self::base(id, CoinType::Plain, value, confirmed_height)
    }

    pub fn ct(id: OutputId, value: Amount, commitment: [u8; 32], confirmed_height: u64) -> Self {
        Self {
            commitment,
            ..Self::base(id, CoinType::Ct, value, confirmed_height)
        }
    }

    pub fn ring_ct(
        id: OutputId,
        value: Amount,
        commitment: [u8; 32],
        ring_index: u64,
        confirmed_height: u64,
    ) -> Self {
        Self {
            commitment,
            ring_index: Some(ring_index),
            ..Self::base(id, CoinType::RingCt, value, confirmed_height)
        }
    }

    pub fn zerocoin(
        id: OutputId,
        denomination: Denomination,
        commitment: [u8; 32],
        confirmed_height: u64,
    ) -> Self {
        Self {
            denomination: Some(denomination),
            commitment,
            ..Self::base(id, CoinType::Zerocoin, denomination.amount(), confirmed_height)
        }
    }

    pub fn with_owner(mut self, owner: KeyRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_maturity(mut self, maturity_height: u64) -> Self {
        self.maturity_height = maturity_height;
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_mature_at(&self, height: u64) -> bool {
        height >= self.maturity_height
    }

    /// Confirmations at `tip`, counting the confirming block
    pub fn confirmations_at(&self, tip: u64) -> u64 {
        if tip < self.confirmed_height {
            0
        } else {
            tip - self.confirmed_height + 1
        }
    }
}
