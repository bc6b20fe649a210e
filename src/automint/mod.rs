//! Automatic minting of plain balance into Zerocoin denominations

pub mod planner;
pub mod scheduler;

pub use planner::{plan_buckets, MintBucket, SkipReason};
pub use scheduler::{AutomintHandle, AutomintScheduler, MintedBucket, TickOutcome};
