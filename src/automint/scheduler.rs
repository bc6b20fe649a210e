//! Background automint scheduler
//!
//! Each tick measures the mintable plain balance, plans mint buckets and runs
//! them through the spend orchestrator one plan at a time. Change from a plan
//! committed earlier in the tick is offered to the later buckets, so a single
//! large output funds the whole decomposition. A bucket that cannot be funded
//! is deferred; any other failure is reported and stops the tick. The next
//! tick starts over from the current balance, which is how both are retried.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::planner::{plan_buckets, MintBucket, SkipReason};
use crate::{
    config::AutomintPolicy,
    data_structures::{Amount, CoinType, Denomination, Output, OutputId, SpendPlan},
    errors::{EngineError, EngineResult, ErrorCategory},
    events::{emit, AutomintStatus, EngineEvent, SharedDispatcher},
    fees::FeeCalculator,
    orchestrator::{SpendOrchestrator, SpendRequest},
    signing::PlanSigner,
    storage::OutputQuery,
};

/// A bucket minted and committed during a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintedBucket {
    pub denomination: Denomination,
    pub count: u64,
    pub plan_id: u64,
    pub txid: [u8; 32],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub minted: Vec<MintedBucket>,
    /// Buckets left for a later tick because no inputs could fund them
    pub deferred: Vec<MintBucket>,
    pub skipped: Option<SkipReason>,
    pub failure: Option<EngineError>,
}

impl TickOutcome {
    fn skip(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn plans_built(&self) -> usize {
        self.minted.len()
    }

    pub fn minted_amount(&self) -> Amount {
        self.minted
            .iter()
            .map(|m| m.denomination.amount().saturating_mul(m.count))
            .sum()
    }
}

pub struct AutomintScheduler {
    orchestrator: Arc<SpendOrchestrator>,
    signer: Arc<dyn PlanSigner>,
    policy: AutomintPolicy,
    events: Option<SharedDispatcher>,
    status: Mutex<AutomintStatus>,
    tick_lock: tokio::sync::Mutex<()>,
}

impl AutomintScheduler {
    pub fn new(
        orchestrator: Arc<SpendOrchestrator>,
        signer: Arc<dyn PlanSigner>,
        policy: AutomintPolicy,
    ) -> EngineResult<Self> {
        policy.validate()?;
        let max = orchestrator.config().max_zerocoin_mints_per_tx;
        if policy.max_mints_per_plan > max {
            return Err(EngineError::InvalidConfig(format!(
                "max_mints_per_plan {} exceeds the engine limit {max}",
                policy.max_mints_per_plan
            )));
        }
        Ok(Self {
            orchestrator,
            signer,
            policy,
            events: None,
            status: Mutex::new(AutomintStatus::Idle),
            tick_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_events(mut self, dispatcher: SharedDispatcher) -> Self {
        self.events = Some(dispatcher);
        self
    }

    pub fn policy(&self) -> &AutomintPolicy {
        &self.policy
    }

    pub fn status(&self) -> EngineResult<AutomintStatus> {
        Ok(self.status.lock().map_err(EngineError::poisoned)?.clone())
    }

    async fn report(&self, status: AutomintStatus) {
        match self.status.lock() {
            Ok(mut current) => *current = status.clone(),
            Err(e) => warn!(error = %e, "Automint status lock poisoned"),
        }
        emit(self.events.as_ref(), EngineEvent::Automint(status)).await;
    }

    /// Mintable plain balance, net of an upper bound on mint fees
    async fn mintable_balance(&self) -> EngineResult<Result<Amount, SkipReason>> {
        let index = self.orchestrator.index();
        let config = self.orchestrator.config();
        let tip = index.tip_height().await?;
        let query = OutputQuery::new(CoinType::Plain)
            .mature_at(tip)
            .with_min_confirmations(config.min_mint_confirmations)
            .exclude_locked()
            .owned_only();

        let pool = index.query_eligible(&query).await?;
        if pool.is_empty() {
            return Ok(Err(SkipReason::NothingMintable));
        }
        let available = index.query_eligible(&query.exclude_reserved()).await?;
        if available.is_empty() {
            return Ok(Err(SkipReason::AllReserved));
        }

        let balance: Amount = available.iter().map(|o| o.value).sum();
        let inputs = vec![CoinType::Plain; available.len().min(config.max_inputs_per_spend)];
        let mut outputs = vec![CoinType::Zerocoin; self.policy.max_mints_per_plan as usize];
        outputs.push(CoinType::Plain);
        let per_plan = FeeCalculator::new(config).estimate(&inputs, 0, &outputs);
        let reserve = per_plan.saturating_mul(Denomination::ALL.len() as u64);
        Ok(Ok(balance.saturating_sub(reserve)))
    }

    /// Run one evaluation; safe to call directly
    ///
    /// Overlapping calls are serialized, and nothing stays reserved once the
    /// tick returns.
    pub async fn tick(&self) -> EngineResult<TickOutcome> {
        if !self.policy.enabled {
            return Ok(TickOutcome::skip(SkipReason::Disabled));
        }
        let _guard = self.tick_lock.lock().await;

        let mintable = match self.mintable_balance().await? {
            Ok(mintable) => mintable,
            Err(SkipReason::AllReserved) => {
                debug!("Mintable outputs are all reserved, skipping tick");
                return Ok(TickOutcome::skip(SkipReason::AllReserved));
            }
            Err(reason) => {
                debug!(reason = ?reason, "Nothing to mint");
                self.report(AutomintStatus::Idle).await;
                return Ok(TickOutcome::skip(reason));
            }
        };
        let buckets = match plan_buckets(mintable, &self.policy) {
            Ok(buckets) => buckets,
            Err(reason) => {
                debug!(reason = ?reason, "Nothing to mint");
                self.report(AutomintStatus::Idle).await;
                return Ok(TickOutcome::skip(reason));
            }
        };

        let tip = self.orchestrator.index().tip_height().await?;
        let mut carried: Vec<Output> = Vec::new();
        let mut outcome = TickOutcome::default();
        for bucket in buckets {
            self.report(AutomintStatus::Minting {
                denomination: bucket.denomination,
                amount: bucket.amount(),
            })
            .await;
            match self.mint_bucket(bucket, &carried).await {
                Ok((minted, plan)) => {
                    let spent = plan.input_ids();
                    carried.retain(|o| !spent.contains(&o.id));
                    carried.extend(committed_change(&plan, minted.txid, tip));
                    outcome.minted.push(minted);
                }
                Err(e) if e.category() == ErrorCategory::ResourceExhaustion => {
                    info!(
                        denomination = %bucket.denomination,
                        count = bucket.count,
                        error = %e,
                        "Mint bucket deferred to a later tick"
                    );
                    outcome.deferred.push(bucket);
                }
                Err(e) => {
                    error!(
                        denomination = %bucket.denomination,
                        count = bucket.count,
                        error = %e,
                        "Automint failed, retrying next tick"
                    );
                    self.report(AutomintStatus::Failed {
                        reason: e.to_string(),
                    })
                    .await;
                    outcome.failure = Some(e);
                    return Ok(outcome);
                }
            }
        }

        if outcome.minted.is_empty() {
            outcome.skipped = Some(SkipReason::Unfunded {
                deferred: outcome.deferred.len(),
            });
        }
        info!(
            plans = outcome.plans_built(),
            amount = outcome.minted_amount(),
            deferred = outcome.deferred.len(),
            "Automint tick complete"
        );
        self.report(AutomintStatus::Idle).await;
        Ok(outcome)
    }

    async fn mint_bucket(
        &self,
        bucket: MintBucket,
        carried: &[Output],
    ) -> EngineResult<(MintedBucket, SpendPlan)> {
        let request = SpendRequest::mint(bucket.denomination, bucket.count)
            .with_carried_inputs(carried.to_vec());
        let pending = self.orchestrator.build(&request).await?;
        let plan_id = pending.plan().id();

        let txid = match self.signer.sign_and_submit(pending.plan()).await {
            Ok(txid) => txid,
            Err(e) => {
                if let Err(release) = self.orchestrator.abort(pending).await {
                    warn!(plan = plan_id, error = %release, "Failed to abort mint plan");
                }
                return Err(e);
            }
        };
        let plan = self.orchestrator.commit(pending).await?;

        let minted = MintedBucket {
            denomination: bucket.denomination,
            count: bucket.count,
            plan_id,
            txid,
        };
        Ok((minted, plan))
    }

    /// Run `tick` every `interval_seconds` until the handle is shut down
    pub fn spawn(self: Arc<Self>) -> AutomintHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let period = self.policy.interval();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.tick().await {
                            warn!(error = %e, "Automint tick errored");
                            self.report(AutomintStatus::Failed { reason: e.to_string() }).await;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Automint scheduler stopping");
                            break;
                        }
                    }
                }
            }
        });
        AutomintHandle { shutdown, task }
    }
}

/// Plain change of a submitted plan as outputs of transaction `txid`
fn committed_change(plan: &SpendPlan, txid: [u8; 32], tip: u64) -> Vec<Output> {
    plan.outputs()
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_change() && o.coin_type == CoinType::Plain)
        .filter_map(|(vout, o)| {
            let vout = u32::try_from(vout).ok()?;
            let mut output = Output::plain(OutputId::new(txid, vout), o.value, tip);
            output.owner = o.key;
            Some(output)
        })
        .collect()
}

/// Cancellable handle to a spawned scheduler
pub struct AutomintHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutomintHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for an in-flight tick to finish
    pub async fn shutdown(self) -> EngineResult<()> {
        // a send error means the loop already exited
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| EngineError::Storage(format!("automint task failed: {e}")))
    }
}
