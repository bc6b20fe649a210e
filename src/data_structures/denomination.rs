use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::output::{Amount, COIN};

/// Zerocoin denominations, in whole coins
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
pub enum Denomination {
    Ten,
    OneHundred,
    OneThousand,
    TenThousand,
}

impl Denomination {
    /// Smallest first
    pub const ALL: [Denomination; 4] = [
        Denomination::Ten,
        Denomination::OneHundred,
        Denomination::OneThousand,
        Denomination::TenThousand,
    ];

    /// Whole coins
    pub fn coins(&self) -> u64 {
        match self {
            Denomination::Ten => 10,
            Denomination::OneHundred => 100,
            Denomination::OneThousand => 1_000,
            Denomination::TenThousand => 10_000,
        }
    }

    /// Base units
    pub fn amount(&self) -> Amount {
        self.coins() * COIN
    }

    pub fn from_coins(coins: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.coins() == coins)
    }

    pub fn smallest() -> Self {
        Denomination::Ten
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coins())
    }
}

/// Tie-breaking among denomination combinations of equal total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecompositionStrategy {
    /// Fewest coins: as many of the largest denomination as fit, then the next
    #[default]
    LargestFirst,
    /// One of every denomination (11110) per round while the amount allows,
    /// then largest-first on the rest. Avoids holding only the top denomination.
    Spread,
}

/// Result of splitting an amount into denominations
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decomposition {
    pub counts: BTreeMap<Denomination, u64>,
    /// Base units left below the smallest denomination
    pub remainder: Amount,
}

impl Decomposition {
    pub fn count(&self, denomination: Denomination) -> u64 {
        self.counts.get(&denomination).copied().unwrap_or(0)
    }

    pub fn minted_amount(&self) -> Amount {
        self.counts.iter().map(|(d, n)| d.amount() * n).sum()
    }

    /// Non-empty buckets, largest denomination first
    pub fn buckets(&self) -> Vec<(Denomination, u64)> {
        self.counts
            .iter()
            .rev()
            .filter(|(_, n)| **n > 0)
            .map(|(d, n)| (*d, *n))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|n| *n == 0)
    }
}

/// Split `amount` into denominations, rounding down to a multiple of the smallest one.
pub fn decompose(amount: Amount, strategy: DecompositionStrategy) -> Decomposition {
    let mut counts: BTreeMap<Denomination, u64> = BTreeMap::new();
    let mut remaining = amount;

    if strategy == DecompositionStrategy::Spread {
        let full_set: Amount = Denomination::ALL.iter().map(|d| d.amount()).sum();
        let rounds = remaining / full_set;
        if rounds > 0 {
            for d in Denomination::ALL {
                *counts.entry(d).or_insert(0) += rounds;
            }
            remaining -= rounds * full_set;
        }
    }

    for d in Denomination::ALL.iter().rev() {
        let n = remaining / d.amount();
        if n > 0 {
            *counts.entry(*d).or_insert(0) += n;
            remaining -= n * d.amount();
        }
    }

    Decomposition {
        counts,
        remainder: remaining,
    }
}
