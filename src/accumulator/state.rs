//! Accumulator state manager
//!
//! Holds the append-only accumulator of every denomination together with the
//! stored witness of each minted output. Verification takes the read lock;
//! `advance` and `rollback_to_height` take the write lock, so mints are applied
//! one at a time in confirmation order.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    hashing,
    witness::{Checkpoint, MintRecord, Witness},
};
use crate::{
    config::EngineConfig,
    data_structures::{CoinType, Denomination, Output, OutputId},
    errors::{EngineError, EngineResult},
};

#[derive(Debug)]
struct DenominationState {
    denomination: Denomination,
    mints: Vec<MintRecord>,
    /// `history[n]` is the accumulator value after `n` mints
    history: Vec<[u8; 32]>,
}

impl DenominationState {
    fn new(denomination: Denomination) -> Self {
        Self {
            denomination,
            mints: Vec::new(),
            history: vec![hashing::genesis(denomination)],
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        let sequence = self.mints.len() as u64;
        Checkpoint {
            denomination: self.denomination,
            sequence,
            height: self.mints.last().map(|m| m.height).unwrap_or(0),
            value: self.history[self.mints.len()],
        }
    }

    fn last_height(&self) -> Option<u64> {
        self.mints.last().map(|m| m.height)
    }

    fn witness_at_tip(&self, position: usize) -> Witness {
        let mint = &self.mints[position];
        Witness {
            output_id: mint.output_id,
            denomination: self.denomination,
            commitment: mint.commitment,
            position: position as u64,
            prefix: self.history[position],
            suffix: self.mints[position + 1..]
                .iter()
                .map(|m| m.commitment)
                .collect(),
            checkpoint: self.checkpoint(),
        }
    }

    fn push(&mut self, mint: MintRecord) {
        let previous = self.history[self.mints.len()];
        self.history
            .push(hashing::fold(self.denomination, &previous, &mint.commitment));
        self.mints.push(mint);
    }

    /// Drop mints above `height`, returning them
    fn truncate_above(&mut self, height: u64) -> Vec<MintRecord> {
        let keep = self.mints.partition_point(|m| m.height <= height);
        let removed = self.mints.split_off(keep);
        self.history.truncate(keep + 1);
        removed
    }
}

#[derive(Debug, Default)]
struct AccumulatorInner {
    denominations: BTreeMap<Denomination, DenominationState>,
    /// Minted output -> (denomination, position)
    minted: HashMap<OutputId, (Denomination, usize)>,
    witnesses: HashMap<OutputId, Witness>,
}

impl AccumulatorInner {
    fn state(&self, denomination: Denomination) -> Option<&DenominationState> {
        self.denominations.get(&denomination)
    }

    fn checkpoint(&self, denomination: Denomination) -> Checkpoint {
        self.state(denomination)
            .map(DenominationState::checkpoint)
            .unwrap_or_else(|| Checkpoint::empty(denomination))
    }
}

/// Summary of a reorganization rollback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub height: u64,
    pub removed_mints: Vec<OutputId>,
    pub rebuilt_witnesses: usize,
}

#[derive(Debug)]
pub struct AccumulatorStateManager {
    inner: RwLock<AccumulatorInner>,
    catch_up_window: u64,
}

impl Default for AccumulatorStateManager {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl AccumulatorStateManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inner: RwLock::new(AccumulatorInner::default()),
            catch_up_window: config.witness_catch_up_window,
        }
    }

    /// Mints a witness may lag behind before it is considered stale
    pub fn catch_up_window(&self) -> u64 {
        self.catch_up_window
    }

    /// Accumulate a confirmed mint and store a witness for it
    ///
    /// A mint already accumulated is rejected with `DuplicateMintIndex` and the
    /// state is left untouched, so replaying a block is harmless.
    pub async fn advance(
        &self,
        denomination: Denomination,
        mint: MintRecord,
    ) -> EngineResult<Checkpoint> {
        if mint.denomination != denomination {
            return Err(EngineError::DenominationMismatch {
                output: mint.output_id,
                expected: denomination,
                actual: Some(mint.denomination),
            });
        }

        let mut inner = self.inner.write().await;
        if inner.minted.contains_key(&mint.output_id) {
            debug!(output = %mint.output_id, "Ignoring duplicate mint");
            return Err(EngineError::DuplicateMintIndex(mint.output_id.to_string()));
        }
        if let Some(last_height) = inner.state(denomination).and_then(|s| s.last_height()) {
            if mint.height < last_height {
                return Err(EngineError::OutOfOrderMint {
                    height: mint.height,
                    last_height,
                });
            }
        }

        let output_id = mint.output_id;
        let state = inner
            .denominations
            .entry(denomination)
            .or_insert_with(|| DenominationState::new(denomination));
        state.push(mint);
        let position = state.mints.len() - 1;
        let witness = state.witness_at_tip(position);
        let checkpoint = state.checkpoint();

        inner.minted.insert(output_id, (denomination, position));
        inner.witnesses.insert(output_id, witness);

        debug!(
            denomination = %denomination,
            sequence = checkpoint.sequence,
            height = checkpoint.height,
            "Accumulator advanced"
        );
        Ok(checkpoint)
    }

    pub async fn current_checkpoint(&self, denomination: Denomination) -> Checkpoint {
        self.inner.read().await.checkpoint(denomination)
    }

    pub async fn mint_count(&self, denomination: Denomination) -> u64 {
        self.current_checkpoint(denomination).await.sequence
    }

    pub async fn is_minted(&self, output_id: &OutputId) -> bool {
        self.inner.read().await.minted.contains_key(output_id)
    }

    /// Stored witness of a minted output, possibly behind the current checkpoint
    pub async fn stored_witness(&self, output_id: &OutputId) -> Option<Witness> {
        self.inner.read().await.witnesses.get(output_id).cloned()
    }

    /// Check a witness against the accumulator history; never mutates state
    ///
    /// Fails closed: any mismatch, unknown checkpoint or foreign output yields `false`.
    pub async fn verify(&self, witness: &Witness, output: &Output) -> bool {
        if output.coin_type != CoinType::Zerocoin
            || output.id != witness.output_id
            || output.denomination != Some(witness.denomination)
            || output.commitment != witness.commitment
            || witness.checkpoint.denomination != witness.denomination
        {
            return false;
        }

        let inner = self.inner.read().await;
        let Some(state) = inner.state(witness.denomination) else {
            return false;
        };
        let (Ok(sequence), Ok(position)) = (
            usize::try_from(witness.checkpoint.sequence),
            usize::try_from(witness.position),
        ) else {
            return false;
        };
        if sequence > state.mints.len() || position >= sequence {
            return false;
        }
        if witness.suffix.len() != sequence - position - 1
            || state.history[position] != witness.prefix
            || state.history[sequence] != witness.checkpoint.value
        {
            return false;
        }
        witness.accumulated_value() == witness.checkpoint.value
    }

    /// Rebuild the witness of a minted output at the current checkpoint
    pub async fn regenerate_witness(&self, output_id: &OutputId) -> EngineResult<Witness> {
        let mut inner = self.inner.write().await;
        let (denomination, position) = *inner
            .minted
            .get(output_id)
            .ok_or(EngineError::WitnessNotFound(*output_id))?;
        let witness = inner
            .state(denomination)
            .map(|state| state.witness_at_tip(position))
            .ok_or(EngineError::WitnessNotFound(*output_id))?;
        inner.witnesses.insert(*output_id, witness.clone());
        debug!(
            output = %output_id,
            sequence = witness.checkpoint.sequence,
            "Regenerated witness"
        );
        Ok(witness)
    }

    /// Undo every mint above `height`
    ///
    /// Witnesses of removed mints are discarded and the stored witness of every
    /// surviving mint is rebuilt at the new tip.
    pub async fn rollback_to_height(&self, height: u64) -> RollbackReport {
        let mut inner = self.inner.write().await;
        let mut report = RollbackReport {
            height,
            ..RollbackReport::default()
        };

        let mut touched = Vec::new();
        for (denomination, state) in inner.denominations.iter_mut() {
            let removed = state.truncate_above(height);
            if !removed.is_empty() {
                touched.push(*denomination);
                report
                    .removed_mints
                    .extend(removed.into_iter().map(|m| m.output_id));
            }
        }
        for output_id in &report.removed_mints {
            inner.minted.remove(output_id);
            inner.witnesses.remove(output_id);
        }

        let mut rebuilt = Vec::new();
        for denomination in touched {
            if let Some(state) = inner.state(denomination) {
                rebuilt.extend(
                    (0..state.mints.len())
                        .map(|position| (state.mints[position].output_id, state.witness_at_tip(position))),
                );
            }
        }
        report.rebuilt_witnesses = rebuilt.len();
        inner.witnesses.extend(rebuilt);

        if report.removed_mints.is_empty() {
            debug!(height, "Rollback removed no mints");
        } else {
            warn!(
                height,
                removed = report.removed_mints.len(),
                rebuilt = report.rebuilt_witnesses,
                "Accumulator rolled back"
            );
        }
        info!(height, "Accumulator rollback complete");
        report
    }
}
