//! Anonymity material for inputs
//!
//! RingCT inputs are hidden in decoy rings built by [`RingBuilder`]; Zerocoin
//! inputs are proven through accumulator witnesses served by
//! [`WitnessProvider`].

pub mod ring;
pub mod security;
pub mod witness;

pub use ring::{decoy_query, DecoySet, RingBuilder, RingMember};
pub use security::{required_pool_size, SecurityLevel};
pub use witness::WitnessProvider;
