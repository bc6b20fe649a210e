//! Turns a mintable balance into per-denomination mint buckets

use serde::Serialize;

use crate::{
    config::AutomintPolicy,
    data_structures::{decompose, Amount, Denomination},
};

/// Why a tick minted nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    Disabled,
    /// No owned, mature, confirmed plain outputs
    NothingMintable,
    /// User reservations cover the whole mintable pool
    AllReserved,
    /// Mintable balance after fees is below the smallest useful mint
    BelowDenomination {
        mintable: Amount,
        denomination: Denomination,
    },
    /// Every planned bucket was deferred for lack of fundable inputs
    Unfunded { deferred: usize },
}

/// Mints of one denomination built into a single plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MintBucket {
    pub denomination: Denomination,
    pub count: u64,
}

impl MintBucket {
    pub fn amount(&self) -> Amount {
        self.denomination.amount().saturating_mul(self.count)
    }
}

/// Buckets to mint this tick, largest denomination first
pub fn plan_buckets(mintable: Amount, policy: &AutomintPolicy) -> Result<Vec<MintBucket>, SkipReason> {
    if policy.full_balance_automint {
        let decomposition = decompose(mintable, policy.decomposition_strategy);
        if decomposition.is_empty() {
            return Err(SkipReason::BelowDenomination {
                mintable,
                denomination: Denomination::smallest(),
            });
        }
        Ok(decomposition
            .buckets()
            .into_iter()
            .map(|(denomination, count)| MintBucket {
                denomination,
                count: count.min(policy.max_mints_per_plan),
            })
            .collect())
    } else {
        let denomination = policy.fixed_denomination;
        if mintable < denomination.amount() {
            return Err(SkipReason::BelowDenomination {
                mintable,
                denomination,
            });
        }
        Ok(vec![MintBucket {
            denomination,
            count: 1,
        }])
    }
}
