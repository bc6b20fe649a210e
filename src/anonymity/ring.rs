//! RingCT decoy ring construction
//!
//! Decoys come from a bounded window of the eligible pool that starts just
//! after the last pick and wraps at the end of the RingCT index. Within a large
//! window part of the draw is biased towards the most recent outputs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use super::security::{required_pool_size, SecurityLevel};
use crate::{
    config::EngineConfig,
    data_structures::{CoinType, Output, OutputId},
    errors::{EngineError, EngineResult},
    storage::{OutputIndex, OutputQuery},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingMember {
    pub output_id: OutputId,
    pub ring_index: u64,
    pub commitment: [u8; 32],
}

impl RingMember {
    fn from_output(output: &Output, ring_index: u64) -> Self {
        Self {
            output_id: output.id,
            ring_index,
            commitment: output.commitment,
        }
    }
}

/// Ordered ring with exactly one real member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoySet {
    members: Vec<RingMember>,
    real_position: usize,
}

impl DecoySet {
    pub fn members(&self) -> &[RingMember] {
        &self.members
    }

    pub fn ring_size(&self) -> usize {
        self.members.len()
    }

    pub fn real_position(&self) -> usize {
        self.real_position
    }

    pub fn real_member(&self) -> &RingMember {
        &self.members[self.real_position]
    }

    pub fn decoys(&self) -> impl Iterator<Item = &RingMember> {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.real_position)
            .map(|(_, m)| m)
    }

    pub fn contains(&self, id: &OutputId) -> bool {
        self.members.iter().any(|m| m.output_id == *id)
    }
}

/// RingCT outputs usable as decoys at `tip`
pub fn decoy_query(tip: u64, config: &EngineConfig) -> OutputQuery {
    OutputQuery::new(CoinType::RingCt)
        .mature_at(tip)
        .with_min_confirmations(config.min_decoy_depth)
        .exclude_locked()
}

#[derive(Debug)]
struct DrawState {
    last_pick: u64,
    rng: StdRng,
}

pub struct RingBuilder {
    index: Arc<dyn OutputIndex>,
    config: EngineConfig,
    state: Mutex<DrawState>,
}

impl RingBuilder {
    pub fn new(index: Arc<dyn OutputIndex>, config: EngineConfig) -> Self {
        Self::with_rng(index, config, StdRng::from_entropy())
    }

    /// Deterministic draws for tests and reproducible simulations
    pub fn with_seed(index: Arc<dyn OutputIndex>, config: EngineConfig, seed: u64) -> Self {
        Self::with_rng(index, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(index: Arc<dyn OutputIndex>, config: EngineConfig, rng: StdRng) -> Self {
        Self {
            index,
            config,
            state: Mutex::new(DrawState { last_pick: 0, rng }),
        }
    }

    /// RingCT index of the newest decoy window end
    pub fn last_pick(&self) -> EngineResult<u64> {
        Ok(self.state.lock().map_err(EngineError::poisoned)?.last_pick)
    }

    pub fn check_ring_size(&self, ring_size: usize) -> EngineResult<()> {
        let (min, max) = (self.config.min_ring_size, self.config.max_ring_size);
        if ring_size < min || ring_size > max {
            return Err(EngineError::RingSizeOutOfRange {
                requested: ring_size,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Eligible decoy candidates, ordered by RingCT index
    pub async fn eligible_pool(&self, exclusions: &HashSet<OutputId>) -> EngineResult<Vec<Output>> {
        let tip = self.index.tip_height().await?;
        let query = decoy_query(tip, &self.config);
        let mut pool = self.index.query_eligible(&query).await?;
        pool.retain(|o| o.ring_index.is_some() && !exclusions.contains(&o.id));
        Ok(pool)
    }

    /// Hide `true_output` in a ring of `ring_size` members
    ///
    /// `exclusions` holds every real input of the transaction; none of them is
    /// used as a decoy.
    pub async fn build_ring(
        &self,
        true_output: &Output,
        ring_size: usize,
        level: SecurityLevel,
        exclusions: &HashSet<OutputId>,
    ) -> EngineResult<DecoySet> {
        self.check_ring_size(ring_size)?;
        let real_ring_index = match (true_output.coin_type, true_output.ring_index) {
            (CoinType::RingCt, Some(i)) => i,
            _ => {
                return Err(EngineError::InvalidCoinTypeMix(format!(
                    "output {} cannot be hidden in a RingCT ring",
                    true_output.id
                )))
            }
        };

        let mut excluded = exclusions.clone();
        excluded.insert(true_output.id);
        let pool = self.eligible_pool(&excluded).await?;

        let needed = ring_size - 1;
        let required = required_pool_size(level).max(needed);

        let mut state = self.state.lock().map_err(EngineError::poisoned)?;
        if pool.len() < required {
            return Err(EngineError::AnonymitySetExhausted {
                pool_size: pool.len(),
                last_pick: state.last_pick,
                required,
            });
        }

        let last_pick = state.last_pick;
        let start = pool.partition_point(|o| o.ring_index.unwrap_or(0) <= last_pick);
        let mut window: Vec<&Output> = (0..required)
            .map(|i| &pool[(start + i) % pool.len()])
            .collect();
        let window_end = window
            .last()
            .and_then(|o| o.ring_index)
            .unwrap_or(last_pick);
        window.sort_by_key(|o| o.ring_index);

        let recent_from = if window.len() > self.config.recent_decoy_window {
            window.len() - self.config.recent_decoy_window
        } else {
            window.len()
        };
        let mut candidates: Vec<(usize, &Output)> = window.into_iter().enumerate().collect();
        let mut decoys = Vec::with_capacity(needed);
        while decoys.len() < needed {
            let recent: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, (pos, _))| *pos >= recent_from)
                .map(|(i, _)| i)
                .collect();
            let biased = !recent.is_empty()
                && state.rng.gen_range(0..100u8) < self.config.recent_decoy_bias_percent;
            let pick = if biased {
                recent[state.rng.gen_range(0..recent.len())]
            } else {
                state.rng.gen_range(0..candidates.len())
            };
            let (_, output) = candidates.swap_remove(pick);
            decoys.push(output);
        }

        let real_position = state.rng.gen_range(0..ring_size);
        let mut members: Vec<RingMember> = decoys
            .into_iter()
            .map(|o| RingMember::from_output(o, o.ring_index.unwrap_or(0)))
            .collect();
        members.insert(
            real_position,
            RingMember::from_output(true_output, real_ring_index),
        );
        state.last_pick = window_end;

        debug!(
            output = %true_output.id,
            ring_size,
            pool_size = pool.len(),
            window = required,
            last_pick = window_end,
            "Built decoy ring"
        );
        Ok(DecoySet {
            members,
            real_position,
        })
    }
}
