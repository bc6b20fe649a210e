//! Signer boundary
//!
//! The engine never signs. A finished [`SpendPlan`] is handed to a
//! [`PlanSigner`] which signs it with wallet keys and broadcasts the result.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    data_structures::SpendPlan,
    errors::{EngineError, EngineResult},
};

/// External signer and broadcaster
#[async_trait]
pub trait PlanSigner: Send + Sync {
    /// Sign and submit `plan`, returning the transaction id
    async fn sign_and_submit(&self, plan: &SpendPlan) -> EngineResult<[u8; 32]>;
}

/// Signer that records plans instead of signing them
///
/// Can be told to fail a number of upcoming calls to exercise retry paths.
#[derive(Debug, Default, Clone)]
pub struct RecordingSigner {
    submitted: Arc<Mutex<Vec<SpendPlan>>>,
    failures_remaining: Arc<Mutex<usize>>,
    locked: bool,
}

impl RecordingSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signer whose wallet is locked; every call fails with `WalletLocked`
    pub fn locked() -> Self {
        Self {
            locked: true,
            ..Self::default()
        }
    }

    pub fn fail_next(&self, calls: usize) -> EngineResult<()> {
        *self
            .failures_remaining
            .lock()
            .map_err(EngineError::poisoned)? = calls;
        Ok(())
    }

    pub fn submitted(&self) -> EngineResult<Vec<SpendPlan>> {
        Ok(self
            .submitted
            .lock()
            .map_err(EngineError::poisoned)?
            .clone())
    }
}

#[async_trait]
impl PlanSigner for RecordingSigner {
    async fn sign_and_submit(&self, plan: &SpendPlan) -> EngineResult<[u8; 32]> {
        if self.locked {
            return Err(EngineError::WalletLocked);
        }
        {
            let mut remaining = self
                .failures_remaining
                .lock()
                .map_err(EngineError::poisoned)?;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EngineError::Signer(format!(
                    "broadcast of plan {} rejected",
                    plan.id()
                )));
            }
        }

        let mut txid = [0u8; 32];
        txid[..8].copy_from_slice(&plan.id().to_le_bytes());
        self.submitted
            .lock()
            .map_err(EngineError::poisoned)?
            .push(plan.clone());
        Ok(txid)
    }
}
