//! Error types for the spend engine
//!
//! Every failure path in the engine returns an [`EngineError`] variant that a
//! caller can branch on. [`EngineError::category`] groups the variants into the
//! taxonomy used by callers to decide whether to retry, adjust parameters or
//! give up.

use thiserror::Error;

use crate::data_structures::{CoinType, Denomination, OutputId};

/// Result alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;

/// Broad error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad request parameters; rejected immediately, never retried
    Input,
    /// Not enough funds or anonymity; caller may adjust parameters or wait
    ResourceExhaustion,
    /// Witness or accumulator mismatch; fatal to the current plan
    CryptographicIntegrity,
    /// Lease contention or expiry
    Concurrency,
    /// A configured bound was exceeded
    Policy,
    /// Backing store failure
    Storage,
    /// External signer refused or failed
    Signer,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    // === Input errors ===
    #[error("Amount {amount} is below the dust threshold {dust_threshold}")]
    AmountTooSmall { amount: u64, dust_threshold: u64 },

    #[error("Invalid coin type combination: {0}")]
    InvalidCoinTypeMix(String),

    #[error("Security level {level} out of range [{min}, {max}]")]
    InvalidSecurityLevel { level: u32, min: u32, max: u32 },

    #[error("Output {output} is {actual:?}, expected denomination {expected}")]
    DenominationMismatch {
        output: OutputId,
        expected: Denomination,
        actual: Option<Denomination>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mint of {count} coins exceeds the per-transaction maximum {max}")]
    TooManyMints { count: u64, max: u64 },

    // === Resource exhaustion ===
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Insufficient funds after fee: inputs {inputs}, outputs {outputs}, fee {fee}")]
    InsufficientFundsAfterFee { inputs: u64, outputs: u64, fee: u64 },

    #[error("Selection needs more than {max} inputs of type {coin_type:?}")]
    TooManyInputs { coin_type: CoinType, max: usize },

    #[error("Anonymity set exhausted: pool {pool_size}, last pick {last_pick}, required {required}")]
    AnonymitySetExhausted {
        pool_size: usize,
        last_pick: u64,
        required: usize,
    },

    // === Cryptographic integrity ===
    #[error("Witness not found for output {0}")]
    WitnessNotFound(OutputId),

    #[error("Accumulator witness invalid for output {0}")]
    AccumulatorWitnessInvalid(OutputId),

    #[error("Witness checkpoint {witness_sequence} is stale (current {current_sequence}, window {window})")]
    AccumulatorCheckpointStale {
        witness_sequence: u64,
        current_sequence: u64,
        window: u64,
    },

    #[error("Mint {0} already accumulated")]
    DuplicateMintIndex(String),

    #[error("Mint at height {height} precedes accumulated height {last_height}")]
    OutOfOrderMint { height: u64, last_height: u64 },

    #[error("Witness data corrupt: {0}")]
    WitnessDecode(String),

    #[error("Spend plan does not balance: inputs {inputs}, outputs {outputs}, fee {fee}")]
    PlanImbalance { inputs: u64, outputs: u64, fee: u64 },

    // === Concurrency ===
    #[error("Output {0} is reserved by another plan")]
    LeaseContention(OutputId),

    #[error("Lease {0} expired before commit")]
    LeaseTimeout(u64),

    #[error("Lease {0} is unknown")]
    UnknownLease(u64),

    // === Policy ===
    #[error("Fee {fee} exceeds maximum {max}")]
    FeeTooHigh { fee: u64, max: u64 },

    #[error("Ring size {requested} out of range [{min}, {max}]")]
    RingSizeOutOfRange {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("Zerocoin spend count {count} exceeds maximum {max}")]
    TooManyZerocoinSpends { count: usize, max: usize },

    // === Storage / signer ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Output {0} not found")]
    OutputNotFound(OutputId),

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("Signer error: {0}")]
    Signer(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        use EngineError::*;
        match self {
            AmountTooSmall { .. }
            | InvalidCoinTypeMix(_)
            | InvalidSecurityLevel { .. }
            | DenominationMismatch { .. }
            | InvalidConfig(_)
            | TooManyMints { .. } => ErrorCategory::Input,
            InsufficientFunds { .. }
            | InsufficientFundsAfterFee { .. }
            | TooManyInputs { .. }
            | AnonymitySetExhausted { .. } => ErrorCategory::ResourceExhaustion,
            WitnessNotFound(_)
            | AccumulatorWitnessInvalid(_)
            | AccumulatorCheckpointStale { .. }
            | DuplicateMintIndex(_)
            | OutOfOrderMint { .. }
            | WitnessDecode(_)
            | PlanImbalance { .. } => ErrorCategory::CryptographicIntegrity,
            LeaseContention(_) | LeaseTimeout(_) | UnknownLease(_) => ErrorCategory::Concurrency,
            FeeTooHigh { .. } | RingSizeOutOfRange { .. } | TooManyZerocoinSpends { .. } => {
                ErrorCategory::Policy
            }
            Storage(_) | OutputNotFound(_) => ErrorCategory::Storage,
            WalletLocked | Signer(_) => ErrorCategory::Signer,
        }
    }

    /// Whether the caller can expect success by adjusting parameters, waiting or retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::ResourceExhaustion | ErrorCategory::Concurrency
        )
    }

    pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> Self {
        EngineError::Storage("lock poisoned".to_string())
    }
}
