use async_trait::async_trait;

use super::{state::AccumulatorStateManager, witness::Checkpoint};
use crate::{
    data_structures::{Denomination, OutputId},
    errors::EngineResult,
};

/// Read access to accumulator checkpoints and raw witness data
#[async_trait]
pub trait AccumulatorStore: Send + Sync {
    async fn current_checkpoint(&self, denomination: Denomination) -> EngineResult<Checkpoint>;

    /// Borsh-encoded witness, `None` if the output was never minted
    async fn fetch_witness_data(&self, output_id: &OutputId) -> EngineResult<Option<Vec<u8>>>;
}

#[async_trait]
impl AccumulatorStore for AccumulatorStateManager {
    async fn current_checkpoint(&self, denomination: Denomination) -> EngineResult<Checkpoint> {
        Ok(AccumulatorStateManager::current_checkpoint(self, denomination).await)
    }

    async fn fetch_witness_data(&self, output_id: &OutputId) -> EngineResult<Option<Vec<u8>>> {
        self.stored_witness(output_id)
            .await
            .map(|w| w.to_bytes())
            .transpose()
    }
}
