//! Spend construction entry point

pub mod request;
pub mod spend_orchestrator;

pub use request::{PendingSpend, SpendPurpose, SpendRequest};
pub use spend_orchestrator::SpendOrchestrator;
