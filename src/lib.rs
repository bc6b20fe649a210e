//! Private spend construction engine
//!
//! This crate builds unsigned spend plans for a wallet holding four kinds of
//! outputs: transparent (Plain), confidential (CT), ring-confidential (RingCT)
//! and fixed-denomination accumulator tokens (Zerocoin).
//!
//! ## Components
//!
//! - [`selection`]: greedy coin selection with per-type homogeneity rules
//! - [`anonymity`]: RingCT decoy rings and Zerocoin accumulator witnesses
//! - [`accumulator`]: per-denomination accumulator state, verification and rollback
//! - [`fees`]: size-based fees, dust folding and change outputs
//! - [`orchestrator`]: composes the above into an atomic [`SpendPlan`]
//! - [`automint`]: periodic minting of plain balance into Zerocoin
//!
//! Outputs are read from, and reserved through, an injected
//! [`storage::OutputIndex`]. Signing is left to a [`signing::PlanSigner`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use private_spend_engine::{
//!     accumulator::AccumulatorStateManager,
//!     config::EngineConfig,
//!     data_structures::{CoinType, COIN},
//!     orchestrator::{SpendOrchestrator, SpendRequest},
//!     storage::InMemoryOutputIndex,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Arc::new(InMemoryOutputIndex::with_tip(1_000));
//! let accumulator = Arc::new(AccumulatorStateManager::default());
//! let orchestrator = SpendOrchestrator::new(index, accumulator, EngineConfig::default())?;
//!
//! let pending = orchestrator
//!     .build(&SpendRequest::payment(5 * COIN, CoinType::Ct))
//!     .await?;
//! // hand pending.plan() to the signer, then
//! orchestrator.commit(pending).await?;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod anonymity;
pub mod automint;
pub mod config;
pub mod data_structures;
pub mod errors;
pub mod events;
pub mod fees;
pub mod orchestrator;
pub mod selection;
pub mod signing;
pub mod storage;

pub use config::{AutomintPolicy, EngineConfig};
pub use data_structures::{
    Amount, CoinType, Denomination, Output, OutputId, SpendPlan, COIN,
};
pub use errors::*;
pub use orchestrator::{PendingSpend, SpendOrchestrator, SpendPurpose, SpendRequest};
