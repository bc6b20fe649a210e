//! Spend orchestrator
//!
//! Composes selection, reservation, anonymity material and fee settlement
//! into one immutable [`SpendPlan`]. Every failure after the reservation
//! releases it before the error is returned, so a failed build never leaves
//! outputs held.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, SeedableRng};
use rand_core::RngCore;
use tracing::{debug, info, warn};

use super::request::{PendingSpend, SpendPurpose, SpendRequest};
use crate::{
    accumulator::{hashing, AccumulatorStateManager},
    anonymity::{RingBuilder, SecurityLevel, WitnessProvider},
    config::EngineConfig,
    data_structures::{
        AnonymityMaterial, CoinType, OutputId, PlannedInput, PlannedOutput, SpendPlan,
    },
    errors::{EngineError, EngineResult},
    events::{emit, EngineEvent, SharedDispatcher},
    fees::{ChangeKeyAllocator, FeeCalculator},
    selection::{CoinSelector, InputSet, SelectionRequest},
    storage::{LeaseToken, OutputIndex},
};

pub struct SpendOrchestrator {
    index: Arc<dyn OutputIndex>,
    accumulator: Arc<AccumulatorStateManager>,
    selector: CoinSelector,
    rings: Arc<RingBuilder>,
    witnesses: WitnessProvider,
    fees: FeeCalculator,
    change_keys: ChangeKeyAllocator,
    config: EngineConfig,
    events: Option<SharedDispatcher>,
    next_plan_id: AtomicU64,
    rng: Mutex<StdRng>,
}

impl SpendOrchestrator {
    pub fn new(
        index: Arc<dyn OutputIndex>,
        accumulator: Arc<AccumulatorStateManager>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        Self::build_with(index, accumulator, config, StdRng::from_entropy(), None)
    }

    /// Deterministic rings, blindings and serials
    pub fn with_seed(
        index: Arc<dyn OutputIndex>,
        accumulator: Arc<AccumulatorStateManager>,
        config: EngineConfig,
        seed: u64,
    ) -> EngineResult<Self> {
        Self::build_with(
            index,
            accumulator,
            config,
            StdRng::seed_from_u64(seed),
            Some(seed),
        )
    }

    fn build_with(
        index: Arc<dyn OutputIndex>,
        accumulator: Arc<AccumulatorStateManager>,
        config: EngineConfig,
        rng: StdRng,
        ring_seed: Option<u64>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let rings = Arc::new(match ring_seed {
            Some(seed) => RingBuilder::with_seed(index.clone(), config.clone(), seed),
            None => RingBuilder::new(index.clone(), config.clone()),
        });
        Ok(Self {
            selector: CoinSelector::with_ring_builder(index.clone(), config.clone(), rings.clone()),
            witnesses: WitnessProvider::new(accumulator.clone(), config.witness_catch_up_window),
            fees: FeeCalculator::new(&config),
            change_keys: ChangeKeyAllocator::default(),
            rings,
            index,
            accumulator,
            config,
            events: None,
            next_plan_id: AtomicU64::new(1),
            rng: Mutex::new(rng),
        })
    }

    pub fn with_events(mut self, dispatcher: SharedDispatcher) -> Self {
        self.events = Some(dispatcher);
        self
    }

    pub fn with_change_account(mut self, account: u32) -> Self {
        self.change_keys = ChangeKeyAllocator::new(account);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn OutputIndex> {
        &self.index
    }

    pub fn ring_builder(&self) -> &RingBuilder {
        &self.rings
    }

    /// Build a plan and hold its inputs until `commit` or `abort`
    pub async fn build(&self, request: &SpendRequest) -> EngineResult<PendingSpend> {
        let ring_size = request.ring_size.unwrap_or(self.config.default_ring_size);
        self.rings.check_ring_size(ring_size)?;
        let level = SecurityLevel::new(request.security_level)?;
        let outputs = self.planned_outputs(request)?;

        let target: u64 = outputs.iter().map(|o| o.value).sum();
        let mut selection = SelectionRequest::new(
            target,
            self.allowed_types(request),
            outputs.iter().map(|o| o.coin_type).collect(),
        )
        .with_security_level(level)
        .with_ring_size(ring_size)
        .with_carried(request.carried_inputs.clone());
        match request.purpose {
            SpendPurpose::Payment { recipient_type } if request.conversion => {
                selection = selection.converting_to(recipient_type);
            }
            SpendPurpose::Mint { .. } => {
                selection = selection.with_min_confirmations(self.config.min_mint_confirmations);
            }
            SpendPurpose::Payment { .. } => {}
        }

        let (inputs, lease) = self.select_and_reserve(&selection).await?;
        match self
            .assemble(request, &inputs, outputs, ring_size, level)
            .await
        {
            Ok(plan) => {
                info!(
                    plan = plan.id(),
                    inputs = plan.inputs().len(),
                    fee = plan.fee(),
                    lease = ?lease.as_ref().map(|l| l.id),
                    "Built spend plan"
                );
                emit(self.events.as_ref(), EngineEvent::plan_built(&plan)).await;
                Ok(PendingSpend { plan, lease })
            }
            Err(e) => {
                if let Some(lease) = &lease {
                    self.release_after_failure(lease, &e).await;
                }
                Err(e)
            }
        }
    }

    /// Mark the plan's inputs spent
    ///
    /// An expired lease is re-acquired once; if that fails the commit fails
    /// with `LeaseTimeout`.
    pub async fn commit(&self, pending: PendingSpend) -> EngineResult<SpendPlan> {
        let PendingSpend { plan, lease } = pending;
        if let Some(lease) = &lease {
            self.mark_spent(lease).await?;
        }
        info!(plan = plan.id(), inputs = plan.inputs().len(), "Committed spend plan");
        emit(
            self.events.as_ref(),
            EngineEvent::PlanCommitted { plan_id: plan.id() },
        )
        .await;
        Ok(plan)
    }

    async fn mark_spent(&self, lease: &LeaseToken) -> EngineResult<()> {
        let ids = &lease.outputs;
        match self.index.mark_spent(ids, lease).await {
            Ok(()) => Ok(()),
            Err(EngineError::LeaseTimeout(expired)) => {
                debug!(lease = expired, "Lease expired before commit, re-acquiring");
                let renewed = self
                    .index
                    .reserve(ids, self.config.lease_ttl())
                    .await
                    .map_err(|_| EngineError::LeaseTimeout(expired))?;
                self.index.mark_spent(ids, &renewed).await
            }
            Err(e) => Err(e),
        }
    }

    /// Release the plan's inputs; completes before returning
    pub async fn abort(&self, pending: PendingSpend) -> EngineResult<()> {
        if let Some(lease) = &pending.lease {
            self.index.release(lease).await?;
        }
        info!(plan = pending.plan.id(), "Aborted spend plan");
        emit(
            self.events.as_ref(),
            EngineEvent::PlanAborted {
                plan_id: pending.plan.id(),
            },
        )
        .await;
        Ok(())
    }

    fn allowed_types(&self, request: &SpendRequest) -> Vec<CoinType> {
        if request.is_mint() {
            vec![CoinType::Plain]
        } else if request.allowed_types.is_empty() {
            CoinType::PREFERENCE.to_vec()
        } else {
            request.allowed_types.clone()
        }
    }

    /// Reject malformed requests before anything is locked or reserved
    fn check_purpose(&self, request: &SpendRequest) -> EngineResult<()> {
        match request.purpose {
            SpendPurpose::Payment { recipient_type } => {
                if recipient_type == CoinType::Zerocoin {
                    return Err(EngineError::InvalidCoinTypeMix(
                        "payments cannot create Zerocoin outputs".to_string(),
                    ));
                }
                if request.amount < self.config.dust_threshold {
                    return Err(EngineError::AmountTooSmall {
                        amount: request.amount,
                        dust_threshold: self.config.dust_threshold,
                    });
                }
            }
            SpendPurpose::Mint { count, .. } => {
                if count == 0 {
                    return Err(EngineError::AmountTooSmall {
                        amount: 0,
                        dust_threshold: self.config.dust_threshold,
                    });
                }
                if count > self.config.max_zerocoin_mints_per_tx {
                    return Err(EngineError::TooManyMints {
                        count,
                        max: self.config.max_zerocoin_mints_per_tx,
                    });
                }
            }
        }
        if request
            .carried_inputs
            .iter()
            .any(|o| o.coin_type == CoinType::Zerocoin)
        {
            return Err(EngineError::InvalidCoinTypeMix(
                "Zerocoin outputs cannot be carried into a plan".to_string(),
            ));
        }
        Ok(())
    }

    fn planned_outputs(&self, request: &SpendRequest) -> EngineResult<Vec<PlannedOutput>> {
        self.check_purpose(request)?;
        let mut rng = self.rng.lock().map_err(EngineError::poisoned)?;
        Ok(match request.purpose {
            SpendPurpose::Payment { recipient_type } => {
                let blinding = recipient_type.is_blinded().then(|| random_bytes(&mut *rng));
                vec![PlannedOutput::payment(
                    recipient_type,
                    request.amount,
                    blinding,
                )]
            }
            SpendPurpose::Mint {
                denomination,
                count,
            } => (0..count)
                .map(|_| {
                    let serial = random_bytes(&mut *rng);
                    PlannedOutput::mint(
                        denomination,
                        hashing::serial_commitment(denomination, &serial),
                    )
                })
                .collect(),
        })
    }

    /// Select and reserve, re-selecting once on contention
    ///
    /// Carried inputs are not in the index and are never reserved; a plan
    /// funded only by them has no lease.
    async fn select_and_reserve(
        &self,
        selection: &SelectionRequest,
    ) -> EngineResult<(InputSet, Option<LeaseToken>)> {
        let ttl = self.config.lease_ttl();
        let carried: HashSet<OutputId> = selection.carried.iter().map(|o| o.id).collect();
        let mut attempt = 0;
        loop {
            let inputs = self.selector.select(selection).await?;
            let ids: Vec<OutputId> = inputs
                .outputs
                .iter()
                .map(|o| o.id)
                .filter(|id| !carried.contains(id))
                .collect();
            if ids.is_empty() {
                return Ok((inputs, None));
            }
            match self.index.reserve(&ids, ttl).await {
                Ok(lease) => return Ok((inputs, Some(lease))),
                Err(EngineError::LeaseContention(id)) if attempt == 0 => {
                    debug!(output = %id, "Reservation contended, re-selecting");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn assemble(
        &self,
        request: &SpendRequest,
        inputs: &InputSet,
        mut outputs: Vec<PlannedOutput>,
        ring_size: usize,
        level: SecurityLevel,
    ) -> EngineResult<SpendPlan> {
        let planned_inputs = self.anonymity_material(inputs, ring_size, level).await?;

        let settled = {
            let mut rng = self.rng.lock().map_err(EngineError::poisoned)?;
            self.fees.settle(
                &inputs.input_types(),
                inputs.total_value,
                &outputs,
                ring_size,
                inputs.change_type,
                &self.change_keys,
                &mut *rng,
                request.allow_high_fee,
            )?
        };
        outputs.extend(settled.change);

        SpendPlan::assemble(
            self.next_plan_id.fetch_add(1, Ordering::Relaxed),
            planned_inputs,
            outputs,
            settled.fee,
            inputs.privacy_warning,
        )
    }

    async fn anonymity_material(
        &self,
        inputs: &InputSet,
        ring_size: usize,
        level: SecurityLevel,
    ) -> EngineResult<Vec<PlannedInput>> {
        let real_inputs: HashSet<OutputId> = inputs.outputs.iter().map(|o| o.id).collect();
        let mut planned = Vec::with_capacity(inputs.outputs.len());
        for output in &inputs.outputs {
            let material = match output.coin_type {
                CoinType::Plain | CoinType::Ct => AnonymityMaterial::Direct,
                CoinType::RingCt => AnonymityMaterial::Ring(
                    self.rings
                        .build_ring(output, ring_size, level, &real_inputs)
                        .await?,
                ),
                CoinType::Zerocoin => {
                    let denomination = output.denomination.ok_or_else(|| {
                        EngineError::WitnessNotFound(output.id)
                    })?;
                    let witness = self.witnesses.get_witness(output, denomination).await?;
                    if !self.accumulator.verify(&witness, output).await {
                        return Err(EngineError::AccumulatorWitnessInvalid(output.id));
                    }
                    AnonymityMaterial::Witness(witness)
                }
            };
            planned.push(PlannedInput {
                output: output.clone(),
                material,
            });
        }
        Ok(planned)
    }

    async fn release_after_failure(&self, lease: &LeaseToken, cause: &EngineError) {
        debug!(lease = lease.id, error = %cause, "Releasing reservation after failed build");
        if let Err(e) = self.index.release(lease).await {
            warn!(lease = lease.id, error = %e, "Failed to release reservation");
        }
    }
}

fn random_bytes(rng: &mut dyn RngCore) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    bytes
}
