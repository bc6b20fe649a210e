//! Engine configuration
//!
//! [`EngineConfig`] carries every tunable bound used by selection, ring
//! construction, fee calculation and leases. [`AutomintPolicy`] configures the
//! background minting task. Both can be loaded from JSON and adjusted with
//! `with_*` builders.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    data_structures::{Amount, DecompositionStrategy, Denomination},
    errors::{EngineError, EngineResult},
};

/// Smallest ring accepted by consensus
pub const MIN_RING_SIZE: usize = 3;
/// Largest ring accepted by consensus
pub const MAX_RING_SIZE: usize = 32;
pub const DEFAULT_RING_SIZE: usize = 11;
/// Maximum inputs signed together in one RingCT transaction
pub const MAX_ANON_INPUTS: usize = 32;
pub const MAX_ZEROCOIN_SPENDS_PER_TX: usize = 20;
/// Zerocoin outputs one mint transaction may create
pub const MAX_ZEROCOIN_MINTS_PER_TX: u64 = 9;
/// Fee multiplier applied when RingCT inputs are present
pub const ANON_FEE_MULTIPLIER: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_ring_size: usize,
    pub max_ring_size: usize,
    pub default_ring_size: usize,
    /// Blocks a RingCT output must be buried before it is used as a decoy
    pub min_decoy_depth: u64,
    /// Size of the most recent slice of the decoy window favoured by the draw
    pub recent_decoy_window: usize,
    /// Chance (percent) that a decoy is drawn from the recent slice
    pub recent_decoy_bias_percent: u8,
    pub dust_threshold: Amount,
    pub fee_rate_per_kb: Amount,
    pub min_relay_fee: Amount,
    /// Plans whose fee exceeds this are rejected unless overridden
    pub max_fee: Amount,
    pub anon_fee_multiplier: u64,
    pub max_inputs_per_spend: usize,
    pub max_zerocoin_spends_per_tx: usize,
    pub max_zerocoin_mints_per_tx: u64,
    pub lease_ttl_secs: u64,
    /// Mints a witness may lag behind the current checkpoint before it must be regenerated
    pub witness_catch_up_window: u64,
    /// Confirmations before plain outputs count as mintable
    pub min_mint_confirmations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_ring_size: MIN_RING_SIZE,
            max_ring_size: MAX_RING_SIZE,
            default_ring_size: DEFAULT_RING_SIZE,
            min_decoy_depth: 14,
            recent_decoy_window: 2_400,
            recent_decoy_bias_percent: 50,
            dust_threshold: 10_000,
            fee_rate_per_kb: 10_000,
            min_relay_fee: 1_000,
            max_fee: 10_000_000,
            anon_fee_multiplier: ANON_FEE_MULTIPLIER,
            max_inputs_per_spend: MAX_ANON_INPUTS,
            max_zerocoin_spends_per_tx: MAX_ZEROCOIN_SPENDS_PER_TX,
            max_zerocoin_mints_per_tx: MAX_ZEROCOIN_MINTS_PER_TX,
            lease_ttl_secs: 120,
            witness_catch_up_window: 10,
            min_mint_confirmations: 10,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ring_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_ring_size = min;
        self.max_ring_size = max;
        self
    }

    pub fn with_default_ring_size(mut self, ring_size: usize) -> Self {
        self.default_ring_size = ring_size;
        self
    }

    pub fn with_min_decoy_depth(mut self, depth: u64) -> Self {
        self.min_decoy_depth = depth;
        self
    }

    pub fn with_dust_threshold(mut self, dust: Amount) -> Self {
        self.dust_threshold = dust;
        self
    }

    pub fn with_fee_rate(mut self, fee_rate_per_kb: Amount) -> Self {
        self.fee_rate_per_kb = fee_rate_per_kb;
        self
    }

    pub fn with_min_relay_fee(mut self, fee: Amount) -> Self {
        self.min_relay_fee = fee;
        self
    }

    pub fn with_max_fee(mut self, fee: Amount) -> Self {
        self.max_fee = fee;
        self
    }

    pub fn with_max_inputs(mut self, max_inputs: usize) -> Self {
        self.max_inputs_per_spend = max_inputs;
        self
    }

    pub fn with_max_zerocoin_spends(mut self, max: usize) -> Self {
        self.max_zerocoin_spends_per_tx = max;
        self
    }

    pub fn with_max_zerocoin_mints(mut self, max: u64) -> Self {
        self.max_zerocoin_mints_per_tx = max;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_witness_catch_up_window(mut self, mints: u64) -> Self {
        self.witness_catch_up_window = mints;
        self
    }

    pub fn with_min_mint_confirmations(mut self, confirmations: u64) -> Self {
        self.min_mint_confirmations = confirmations;
        self
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.min_ring_size < 2 || self.min_ring_size > self.max_ring_size {
            return Err(EngineError::InvalidConfig(format!(
                "ring bounds [{}, {}] are invalid",
                self.min_ring_size, self.max_ring_size
            )));
        }
        if self.default_ring_size < self.min_ring_size
            || self.default_ring_size > self.max_ring_size
        {
            return Err(EngineError::InvalidConfig(format!(
                "default ring size {} outside [{}, {}]",
                self.default_ring_size, self.min_ring_size, self.max_ring_size
            )));
        }
        if self.recent_decoy_bias_percent > 100 {
            return Err(EngineError::InvalidConfig(
                "recent_decoy_bias_percent must be at most 100".to_string(),
            ));
        }
        if self.min_relay_fee > self.max_fee {
            return Err(EngineError::InvalidConfig(format!(
                "min relay fee {} exceeds max fee {}",
                self.min_relay_fee, self.max_fee
            )));
        }
        if self.max_inputs_per_spend == 0 || self.lease_ttl_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "max_inputs_per_spend and lease_ttl_secs must be non-zero".to_string(),
            ));
        }
        if self.max_zerocoin_spends_per_tx == 0 {
            return Err(EngineError::InvalidConfig(
                "max_zerocoin_spends_per_tx must be non-zero".to_string(),
            ));
        }
        if self.max_zerocoin_mints_per_tx == 0
            || self.max_zerocoin_mints_per_tx > MAX_ZEROCOIN_MINTS_PER_TX
        {
            return Err(EngineError::InvalidConfig(format!(
                "max_zerocoin_mints_per_tx must be in [1, {MAX_ZEROCOIN_MINTS_PER_TX}]"
            )));
        }
        Ok(())
    }
}

/// Background minting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomintPolicy {
    pub enabled: bool,
    /// Denomination minted each tick when not minting the full balance
    pub fixed_denomination: Denomination,
    /// Mint the whole mintable balance each tick
    pub full_balance_automint: bool,
    pub interval_seconds: u64,
    /// Cap on mints carried by one plan
    pub max_mints_per_plan: u64,
    pub decomposition_strategy: DecompositionStrategy,
}

impl Default for AutomintPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            fixed_denomination: Denomination::Ten,
            full_balance_automint: false,
            interval_seconds: 300,
            max_mints_per_plan: 9,
            decomposition_strategy: DecompositionStrategy::LargestFirst,
        }
    }
}

impl AutomintPolicy {
    pub fn fixed(denomination: Denomination) -> Self {
        Self {
            enabled: true,
            fixed_denomination: denomination,
            ..Self::default()
        }
    }

    pub fn full_balance() -> Self {
        Self {
            enabled: true,
            full_balance_automint: true,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let policy: Self =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    pub fn with_max_mints_per_plan(mut self, max: u64) -> Self {
        self.max_mints_per_plan = max;
        self
    }

    pub fn with_strategy(mut self, strategy: DecompositionStrategy) -> Self {
        self.decomposition_strategy = strategy;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.interval_seconds == 0 {
            return Err(EngineError::InvalidConfig(
                "automint interval must be non-zero".to_string(),
            ));
        }
        if self.max_mints_per_plan == 0 || self.max_mints_per_plan > MAX_ZEROCOIN_MINTS_PER_TX {
            return Err(EngineError::InvalidConfig(format!(
                "max_mints_per_plan must be in [1, {MAX_ZEROCOIN_MINTS_PER_TX}]"
            )));
        }
        Ok(())
    }
}
