//! In-memory output index
//!
//! Reference [`OutputIndex`] backend used by tests and embedders without a
//! persistent store. All output and lease state sits behind a single mutex so
//! reservation is atomic across the whole requested set. Expired leases are
//! swept lazily at the start of every operation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    output_index::{LeaseToken, OutputIndex, OutputQuery},
    output_status::OutputStatus,
};
use crate::{
    data_structures::{Output, OutputId},
    errors::{EngineError, EngineResult},
};

/// Simulated failure modes for testing error conditions
#[derive(Debug, Clone, Default)]
pub struct IndexFailureModes {
    /// Fail next query_eligible call
    pub fail_query: bool,
    /// Fail next reserve call
    pub fail_reserve: bool,
    /// Fail next mark_spent call
    pub fail_mark_spent: bool,
}

#[derive(Debug)]
struct Lease {
    outputs: Vec<OutputId>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct IndexState {
    outputs: BTreeMap<OutputId, Output>,
    leases: HashMap<u64, Lease>,
    reserved: HashMap<OutputId, u64>,
    /// Leases removed by the sweeper rather than by their holder
    expired: HashSet<u64>,
    next_lease: u64,
    tip: u64,
    failure_modes: IndexFailureModes,
}

impl IndexState {
    fn sweep_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for lease_id in expired {
            if let Some(lease) = self.leases.remove(&lease_id) {
                for output in &lease.outputs {
                    self.reserved.remove(output);
                }
                debug!(
                    lease = lease_id,
                    outputs = lease.outputs.len(),
                    "Force-released expired lease"
                );
                self.expired.insert(lease_id);
            }
        }
    }

    fn drop_lease(&mut self, lease_id: u64) -> Option<Lease> {
        let lease = self.leases.remove(&lease_id)?;
        for output in &lease.outputs {
            self.reserved.remove(output);
        }
        Some(lease)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOutputIndex {
    state: Mutex<IndexState>,
}

impl InMemoryOutputIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tip(tip: u64) -> Self {
        let index = Self::new();
        if let Ok(mut state) = index.state.lock() {
            state.tip = tip;
        }
        index
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, IndexState>> {
        self.state.lock().map_err(EngineError::poisoned)
    }

    /// Insert or replace an output
    pub fn insert(&self, output: Output) -> EngineResult<()> {
        self.lock()?.outputs.insert(output.id, output);
        Ok(())
    }

    pub fn insert_many(&self, outputs: impl IntoIterator<Item = Output>) -> EngineResult<()> {
        let mut state = self.lock()?;
        for output in outputs {
            state.outputs.insert(output.id, output);
        }
        Ok(())
    }

    pub fn set_tip(&self, tip: u64) -> EngineResult<()> {
        self.lock()?.tip = tip;
        Ok(())
    }

    /// Set or clear the user lock on an output
    pub fn set_locked(&self, id: &OutputId, locked: bool) -> EngineResult<()> {
        let mut state = self.lock()?;
        let output = state
            .outputs
            .get_mut(id)
            .ok_or(EngineError::OutputNotFound(*id))?;
        output.locked = locked;
        Ok(())
    }

    pub fn get(&self, id: &OutputId) -> EngineResult<Option<Output>> {
        Ok(self.lock()?.outputs.get(id).cloned())
    }

    pub fn status(&self, id: &OutputId) -> EngineResult<OutputStatus> {
        let mut state = self.lock()?;
        state.sweep_expired(Instant::now());
        let output = state
            .outputs
            .get(id)
            .ok_or(EngineError::OutputNotFound(*id))?;
        Ok(OutputStatus::of(output, state.reserved.contains_key(id)))
    }

    pub fn active_lease_count(&self) -> EngineResult<usize> {
        let mut state = self.lock()?;
        state.sweep_expired(Instant::now());
        Ok(state.leases.len())
    }

    /// Set failure mode for testing error conditions
    pub fn set_failure_modes(&self, modes: IndexFailureModes) -> EngineResult<()> {
        self.lock()?.failure_modes = modes;
        Ok(())
    }
}

#[async_trait]
impl OutputIndex for InMemoryOutputIndex {
    async fn query_eligible(&self, query: &OutputQuery) -> EngineResult<Vec<Output>> {
        let mut state = self.lock()?;
        if std::mem::take(&mut state.failure_modes.fail_query) {
            return Err(EngineError::Storage("simulated query failure".to_string()));
        }
        state.sweep_expired(Instant::now());

        let tip = state.tip;
        let mut outputs: Vec<Output> = state
            .outputs
            .values()
            .filter(|o| query.matches(o, tip))
            .filter(|o| !(query.exclude_reserved && state.reserved.contains_key(&o.id)))
            .cloned()
            .collect();
        outputs.sort_by_key(|o| (o.ring_index, o.id));
        Ok(outputs)
    }

    async fn reserve(&self, ids: &[OutputId], ttl: Duration) -> EngineResult<LeaseToken> {
        let now = Instant::now();
        let mut state = self.lock()?;
        if std::mem::take(&mut state.failure_modes.fail_reserve) {
            return Err(EngineError::Storage("simulated reserve failure".to_string()));
        }
        state.sweep_expired(now);

        for id in ids {
            let output = state
                .outputs
                .get(id)
                .ok_or(EngineError::OutputNotFound(*id))?;
            if output.spent || state.reserved.contains_key(id) {
                return Err(EngineError::LeaseContention(*id));
            }
        }

        state.next_lease += 1;
        let lease_id = state.next_lease;
        let expires_at = now + ttl;
        for id in ids {
            state.reserved.insert(*id, lease_id);
        }
        state.leases.insert(
            lease_id,
            Lease {
                outputs: ids.to_vec(),
                expires_at,
            },
        );
        debug!(lease = lease_id, outputs = ids.len(), "Reserved outputs");

        Ok(LeaseToken {
            id: lease_id,
            outputs: ids.to_vec(),
            expires_at,
        })
    }

    async fn release(&self, lease: &LeaseToken) -> EngineResult<()> {
        let mut state = self.lock()?;
        state.sweep_expired(Instant::now());
        if state.drop_lease(lease.id).is_some() {
            debug!(lease = lease.id, "Released lease");
        }
        Ok(())
    }

    async fn mark_spent(&self, ids: &[OutputId], lease: &LeaseToken) -> EngineResult<()> {
        let mut state = self.lock()?;
        if std::mem::take(&mut state.failure_modes.fail_mark_spent) {
            return Err(EngineError::Storage(
                "simulated mark_spent failure".to_string(),
            ));
        }
        state.sweep_expired(Instant::now());

        let Some(held) = state.leases.get(&lease.id) else {
            if state.expired.contains(&lease.id) {
                warn!(lease = lease.id, "Commit attempted on expired lease");
                return Err(EngineError::LeaseTimeout(lease.id));
            }
            return Err(EngineError::UnknownLease(lease.id));
        };
        if let Some(uncovered) = ids.iter().find(|id| !held.outputs.contains(id)) {
            return Err(EngineError::LeaseContention(*uncovered));
        }

        for id in ids {
            if let Some(output) = state.outputs.get_mut(id) {
                output.spent = true;
            }
        }
        state.drop_lease(lease.id);
        debug!(lease = lease.id, outputs = ids.len(), "Marked outputs spent");
        Ok(())
    }

    async fn tip_height(&self) -> EngineResult<u64> {
        Ok(self.lock()?.tip)
    }

    async fn reserved_outputs(&self) -> EngineResult<HashSet<OutputId>> {
        let mut state = self.lock()?;
        state.sweep_expired(Instant::now());
        Ok(state.reserved.keys().copied().collect())
    }
}
