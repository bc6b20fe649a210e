//! Input selection
//!
//! Greedy, largest-first selection over spendable outputs. Inputs stay of a
//! single coin type unless a conversion spend is requested. Selection has no
//! side effects; the orchestrator reserves what was picked.

pub mod coin_selector;

pub use coin_selector::{CoinSelector, InputSet, SelectionRequest};
