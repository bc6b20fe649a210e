//! Fee and change calculation
//!
//! Fees are charged per kilobyte of estimated transaction size, doubled when
//! RingCT inputs are present and never below the minimum relay fee.

pub mod change;
pub mod size;

use crate::{
    config::EngineConfig,
    data_structures::{Amount, CoinType},
    errors::{EngineError, EngineResult},
};

pub use change::{ChangeKeyAllocator, FeeAndChange};

#[derive(Debug, Clone)]
pub struct FeeCalculator {
    fee_rate_per_kb: Amount,
    min_relay_fee: Amount,
    max_fee: Amount,
    anon_fee_multiplier: u64,
    dust_threshold: Amount,
}

impl FeeCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fee_rate_per_kb: config.fee_rate_per_kb,
            min_relay_fee: config.min_relay_fee,
            max_fee: config.max_fee,
            anon_fee_multiplier: config.anon_fee_multiplier,
            dust_threshold: config.dust_threshold,
        }
    }

    pub fn dust_threshold(&self) -> Amount {
        self.dust_threshold
    }

    pub fn fee_for_size(&self, size: usize, has_ring_inputs: bool) -> Amount {
        let base = (size as u64)
            .saturating_mul(self.fee_rate_per_kb)
            .div_ceil(1000);
        let fee = if has_ring_inputs {
            base.saturating_mul(self.anon_fee_multiplier)
        } else {
            base
        };
        fee.max(self.min_relay_fee)
    }

    /// Fee of a transaction spending `inputs` into `outputs`
    pub fn estimate(&self, inputs: &[CoinType], ring_size: usize, outputs: &[CoinType]) -> Amount {
        let size = size::estimate_size(inputs, ring_size, outputs);
        self.fee_for_size(size, inputs.contains(&CoinType::RingCt))
    }

    /// Reject absurd fees unless the caller explicitly allows them
    pub fn check_max(&self, fee: Amount, allow_high_fee: bool) -> EngineResult<()> {
        if fee > self.max_fee && !allow_high_fee {
            return Err(EngineError::FeeTooHigh {
                fee,
                max: self.max_fee,
            });
        }
        Ok(())
    }
}
