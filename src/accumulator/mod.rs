//! Zerocoin accumulator
//!
//! A Blake2b-256 hash chain per denomination stands in for the accumulator
//! value. Mints fold their coin commitment onto the chain; a witness carries
//! the value before the coin and the commitments after it, so membership is
//! checked by recomputing the chain up to the witness checkpoint.

pub mod hashing;
pub mod state;
pub mod store;
pub mod witness;

pub use state::{AccumulatorStateManager, RollbackReport};
pub use store::AccumulatorStore;
pub use witness::{Checkpoint, MintRecord, Witness};
