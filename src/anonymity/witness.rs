use std::sync::Arc;

use tracing::debug;

use crate::{
    accumulator::{AccumulatorStore, Witness},
    data_structures::{Denomination, Output},
    errors::{EngineError, EngineResult},
};

/// Looks up accumulator witnesses for Zerocoin inputs
pub struct WitnessProvider {
    store: Arc<dyn AccumulatorStore>,
    catch_up_window: u64,
}

impl WitnessProvider {
    pub fn new(store: Arc<dyn AccumulatorStore>, catch_up_window: u64) -> Self {
        Self {
            store,
            catch_up_window,
        }
    }

    /// Stored witness of `output`, rejected when it lags the current checkpoint
    /// by more than the catch-up window
    pub async fn get_witness(
        &self,
        output: &Output,
        denomination: Denomination,
    ) -> EngineResult<Witness> {
        if output.denomination != Some(denomination) {
            return Err(EngineError::DenominationMismatch {
                output: output.id,
                expected: denomination,
                actual: output.denomination,
            });
        }

        let bytes = self
            .store
            .fetch_witness_data(&output.id)
            .await?
            .ok_or(EngineError::WitnessNotFound(output.id))?;
        let witness = Witness::from_bytes(&bytes)?;
        if witness.denomination != denomination {
            return Err(EngineError::DenominationMismatch {
                output: output.id,
                expected: denomination,
                actual: Some(witness.denomination),
            });
        }

        let current = self.store.current_checkpoint(denomination).await?;
        let lag = witness.lag_behind(&current);
        if lag > self.catch_up_window {
            debug!(output = %output.id, lag, "Witness is stale");
            return Err(EngineError::AccumulatorCheckpointStale {
                witness_sequence: witness.checkpoint.sequence,
                current_sequence: current.sequence,
                window: self.catch_up_window,
            });
        }
        Ok(witness)
    }
}
