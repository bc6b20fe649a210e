use crate::{
    data_structures::{Amount, CoinType, Denomination, Output, SpendPlan},
    storage::LeaseToken,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendPurpose {
    /// Pay `amount` into an output of `recipient_type`
    Payment { recipient_type: CoinType },
    /// Mint `count` coins of `denomination` from plain outputs
    Mint {
        denomination: Denomination,
        count: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRequest {
    pub amount: Amount,
    pub purpose: SpendPurpose,
    /// Input types; every type in preference order when empty
    pub allowed_types: Vec<CoinType>,
    /// Defaults to the configured ring size
    pub ring_size: Option<usize>,
    pub security_level: u32,
    /// Let inputs span Plain, CT and RingCT
    pub conversion: bool,
    /// Accept fees above the configured maximum
    pub allow_high_fee: bool,
    /// Owned outputs not yet in the index, such as change of a plan committed
    /// moments ago; selectable alongside indexed outputs but never reserved
    pub carried_inputs: Vec<Output>,
}

impl SpendRequest {
    pub fn payment(amount: Amount, recipient_type: CoinType) -> Self {
        Self {
            amount,
            purpose: SpendPurpose::Payment { recipient_type },
            allowed_types: Vec::new(),
            ring_size: None,
            security_level: crate::anonymity::SecurityLevel::DEFAULT.get(),
            conversion: false,
            allow_high_fee: false,
            carried_inputs: Vec::new(),
        }
    }

    pub fn mint(denomination: Denomination, count: u64) -> Self {
        Self {
            amount: denomination.amount().saturating_mul(count),
            purpose: SpendPurpose::Mint {
                denomination,
                count,
            },
            allowed_types: vec![CoinType::Plain],
            ..Self::payment(0, CoinType::Zerocoin)
        }
    }

    pub fn with_allowed_types(mut self, types: Vec<CoinType>) -> Self {
        self.allowed_types = types;
        self
    }

    pub fn with_ring_size(mut self, ring_size: usize) -> Self {
        self.ring_size = Some(ring_size);
        self
    }

    pub fn with_security_level(mut self, level: u32) -> Self {
        self.security_level = level;
        self
    }

    pub fn as_conversion(mut self) -> Self {
        self.conversion = true;
        self
    }

    pub fn allow_high_fee(mut self) -> Self {
        self.allow_high_fee = true;
        self
    }

    pub fn with_carried_inputs(mut self, outputs: Vec<Output>) -> Self {
        self.carried_inputs = outputs;
        self
    }

    pub fn is_mint(&self) -> bool {
        matches!(self.purpose, SpendPurpose::Mint { .. })
    }
}

/// A built plan whose indexed inputs are held by a lease until commit or abort
#[derive(Debug)]
pub struct PendingSpend {
    pub(crate) plan: SpendPlan,
    pub(crate) lease: Option<LeaseToken>,
}

impl PendingSpend {
    pub fn plan(&self) -> &SpendPlan {
        &self.plan
    }

    /// `None` when every input was carried into the plan
    pub fn lease(&self) -> Option<&LeaseToken> {
        self.lease.as_ref()
    }
}
