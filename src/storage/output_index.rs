//! Output index trait definition
//!
//! This module defines the `OutputIndex` trait, the engine's view of the
//! external store of outputs. Besides queries it owns the reservation lease
//! table: it is the single authority that arbitrates between concurrent spend
//! plans and the automint task.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    data_structures::{CoinType, Denomination, Output, OutputId},
    errors::EngineResult,
};

/// Query filters for retrieving eligible outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputQuery {
    /// Filter by coin type
    pub coin_type: Option<CoinType>,
    /// Filter by Zerocoin denomination
    pub denomination: Option<Denomination>,
    /// Only outputs mature at this height
    pub mature_at: Option<u64>,
    /// Only outputs with at least this many confirmations at the index tip
    pub min_confirmations: Option<u64>,
    /// Skip user-locked outputs
    pub exclude_locked: bool,
    /// Skip outputs held by a live lease
    pub exclude_reserved: bool,
    /// Only outputs owned by this wallet
    pub owned_only: bool,
}

impl OutputQuery {
    /// Create a new filter for one coin type
    pub fn new(coin_type: CoinType) -> Self {
        Self {
            coin_type: Some(coin_type),
            ..Self::default()
        }
    }

    /// Spendable wallet outputs: owned, unlocked, unreserved and mature at `height`
    pub fn spendable(coin_type: CoinType, height: u64) -> Self {
        Self::new(coin_type)
            .mature_at(height)
            .exclude_locked()
            .exclude_reserved()
            .owned_only()
    }

    pub fn with_denomination(mut self, denomination: Denomination) -> Self {
        self.denomination = Some(denomination);
        self
    }

    pub fn mature_at(mut self, height: u64) -> Self {
        self.mature_at = Some(height);
        self
    }

    pub fn with_min_confirmations(mut self, confirmations: u64) -> Self {
        self.min_confirmations = Some(confirmations);
        self
    }

    pub fn exclude_locked(mut self) -> Self {
        self.exclude_locked = true;
        self
    }

    pub fn exclude_reserved(mut self) -> Self {
        self.exclude_reserved = true;
        self
    }

    pub fn owned_only(mut self) -> Self {
        self.owned_only = true;
        self
    }

    /// Check the output-local conditions of this query
    pub fn matches(&self, output: &Output, tip: u64) -> bool {
        if output.spent {
            return false;
        }
        if self.coin_type.is_some_and(|t| t != output.coin_type) {
            return false;
        }
        if self.denomination.is_some() && self.denomination != output.denomination {
            return false;
        }
        if self.mature_at.is_some_and(|h| !output.is_mature_at(h)) {
            return false;
        }
        if self
            .min_confirmations
            .is_some_and(|c| output.confirmations_at(tip) < c)
        {
            return false;
        }
        if self.exclude_locked && output.locked {
            return false;
        }
        if self.owned_only && !output.is_owned() {
            return false;
        }
        true
    }
}

/// Proof of a live reservation over a set of outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    pub id: u64,
    pub outputs: Vec<OutputId>,
    pub expires_at: tokio::time::Instant,
}

impl LeaseToken {
    pub fn covers(&self, id: &OutputId) -> bool {
        self.outputs.contains(id)
    }
}

/// Trait for output index backends
#[async_trait]
pub trait OutputIndex: Send + Sync {
    /// Outputs matching `query`, ordered by RingCT index then output id
    async fn query_eligible(&self, query: &OutputQuery) -> EngineResult<Vec<Output>>;

    /// Reserve all of `ids` or none of them
    async fn reserve(&self, ids: &[OutputId], ttl: Duration) -> EngineResult<LeaseToken>;

    /// Release a lease; releasing an expired or already released lease is a no-op
    async fn release(&self, lease: &LeaseToken) -> EngineResult<()>;

    /// Convert a live lease into spent outputs
    async fn mark_spent(&self, ids: &[OutputId], lease: &LeaseToken) -> EngineResult<()>;

    /// Current best-chain height known to the index
    async fn tip_height(&self) -> EngineResult<u64>;

    /// Outputs currently held by a live lease
    async fn reserved_outputs(&self) -> EngineResult<HashSet<OutputId>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{KeyRef, COIN};

    #[test]
    fn spendable_query_filters_output_state() {
        let owner = KeyRef {
            account: 0,
            index: 1,
        };
        let query = OutputQuery::spendable(CoinType::Plain, 100);
        let ok = Output::plain(OutputId::new([1u8; 32], 0), COIN, 90).with_owner(owner);
        assert!(query.matches(&ok, 100));

        assert!(!query.matches(&ok.clone().with_maturity(101), 100));
        assert!(!query.matches(&ok.clone().with_locked(true), 100));
        assert!(!query.matches(
            &Output::plain(OutputId::new([2u8; 32], 0), COIN, 90),
            100
        ));

        let mut spent = ok.clone();
        spent.spent = true;
        assert!(!query.matches(&spent, 100));

        let confirmed = OutputQuery::new(CoinType::Plain).with_min_confirmations(20);
        assert!(!confirmed.matches(&ok, 100));
        assert!(confirmed.matches(&ok, 109));
    }
}
