use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    anonymity::{required_pool_size, RingBuilder, SecurityLevel},
    config::EngineConfig,
    data_structures::{Amount, CoinType, Output},
    errors::{EngineError, EngineResult},
    fees::{change::change_coin_type, FeeCalculator},
    storage::{OutputIndex, OutputQuery},
};

/// What the selector must fund
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub target: Amount,
    /// Candidate input types; tried in [`CoinType::PREFERENCE`] order
    pub allowed_types: Vec<CoinType>,
    pub security_level: SecurityLevel,
    /// Ring size used to estimate RingCT input sizes
    pub ring_size: usize,
    /// Coin types of the planned outputs, change excluded
    pub output_types: Vec<CoinType>,
    /// Convert into this type; inputs may then span Plain, CT and RingCT
    pub conversion: Option<CoinType>,
    /// Confirmations required of every indexed input
    pub min_confirmations: Option<u64>,
    /// Owned outputs outside the index, offered as extra candidates
    pub carried: Vec<Output>,
}

impl SelectionRequest {
    pub fn new(target: Amount, allowed_types: Vec<CoinType>, output_types: Vec<CoinType>) -> Self {
        Self {
            target,
            allowed_types,
            security_level: SecurityLevel::default(),
            ring_size: crate::config::DEFAULT_RING_SIZE,
            output_types,
            conversion: None,
            min_confirmations: None,
            carried: Vec::new(),
        }
    }

    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    pub fn with_ring_size(mut self, ring_size: usize) -> Self {
        self.ring_size = ring_size;
        self
    }

    pub fn converting_to(mut self, coin_type: CoinType) -> Self {
        self.conversion = Some(coin_type);
        self
    }

    pub fn with_min_confirmations(mut self, confirmations: u64) -> Self {
        self.min_confirmations = Some(confirmations);
        self
    }

    pub fn with_carried(mut self, outputs: Vec<Output>) -> Self {
        self.carried = outputs;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSet {
    pub outputs: Vec<Output>,
    pub requires_change_output: bool,
    pub total_value: Amount,
    pub fee_without_change: Amount,
    pub fee_with_change: Amount,
    /// Coin type of any change output
    pub change_type: CoinType,
    /// Set when transparent outputs are spent
    pub privacy_warning: bool,
}

impl InputSet {
    pub fn fee(&self) -> Amount {
        if self.requires_change_output {
            self.fee_with_change
        } else {
            self.fee_without_change
        }
    }

    pub fn input_types(&self) -> Vec<CoinType> {
        self.outputs.iter().map(|o| o.coin_type).collect()
    }

    pub fn has_type(&self, coin_type: CoinType) -> bool {
        self.outputs.iter().any(|o| o.coin_type == coin_type)
    }
}

/// Outcome of one greedy pass
enum Pass {
    Selected(InputSet),
    Failed(EngineError),
}

pub struct CoinSelector {
    index: Arc<dyn OutputIndex>,
    config: EngineConfig,
    fees: FeeCalculator,
    rings: Arc<RingBuilder>,
}

impl CoinSelector {
    pub fn new(index: Arc<dyn OutputIndex>, config: EngineConfig) -> Self {
        let rings = Arc::new(RingBuilder::new(index.clone(), config.clone()));
        Self::with_ring_builder(index, config, rings)
    }

    /// Selector whose RingCT pool check shares the cursor of `rings`
    pub fn with_ring_builder(
        index: Arc<dyn OutputIndex>,
        config: EngineConfig,
        rings: Arc<RingBuilder>,
    ) -> Self {
        let fees = FeeCalculator::new(&config);
        Self {
            index,
            config,
            fees,
            rings,
        }
    }

    /// Pick a minimal valid input set; never reserves
    pub async fn select(&self, request: &SelectionRequest) -> EngineResult<InputSet> {
        if request.target < self.config.dust_threshold {
            return Err(EngineError::AmountTooSmall {
                amount: request.target,
                dust_threshold: self.config.dust_threshold,
            });
        }
        if request.allowed_types.is_empty() {
            return Err(EngineError::InvalidCoinTypeMix(
                "no coin type allowed".to_string(),
            ));
        }

        let tip = self.index.tip_height().await?;
        let result = match request.conversion {
            Some(target_type) => self.select_conversion(request, target_type, tip).await,
            None => self.select_homogeneous(request, tip).await,
        };

        match &result {
            Ok(set) => info!(
                inputs = set.outputs.len(),
                total = set.total_value,
                fee = set.fee(),
                change = set.requires_change_output,
                privacy_warning = set.privacy_warning,
                "Selected inputs"
            ),
            Err(e) => debug!(error = %e, target = request.target, "Selection failed"),
        }
        result
    }

    /// Decoy pool check for spending `first`, applied the way the ring builder will
    async fn ring_pool_shortfall(
        &self,
        request: &SelectionRequest,
        first: &Output,
    ) -> EngineResult<Option<EngineError>> {
        let excluded = HashSet::from([first.id]);
        let pool = self.rings.eligible_pool(&excluded).await?;
        let required = required_pool_size(request.security_level)
            .max(request.ring_size.saturating_sub(1));
        if pool.len() < required {
            let last_pick = self.rings.last_pick()?;
            debug!(pool = pool.len(), required, last_pick, "RingCT pool below security level");
            return Ok(Some(EngineError::AnonymitySetExhausted {
                pool_size: pool.len(),
                last_pick,
                required,
            }));
        }
        Ok(None)
    }

    async fn candidates(
        &self,
        request: &SelectionRequest,
        coin_type: CoinType,
        tip: u64,
    ) -> EngineResult<Vec<Output>> {
        let mut query = OutputQuery::spendable(coin_type, tip);
        query.min_confirmations = request.min_confirmations;
        let mut outputs = self.index.query_eligible(&query).await?;
        outputs.extend(
            request
                .carried
                .iter()
                .filter(|o| o.coin_type == coin_type && !o.spent)
                .cloned(),
        );
        outputs.sort_by(|a, b| b.value.cmp(&a.value).then(a.id.cmp(&b.id)));
        Ok(outputs)
    }

    async fn select_homogeneous(
        &self,
        request: &SelectionRequest,
        tip: u64,
    ) -> EngineResult<InputSet> {
        let mut failures = Vec::new();
        for coin_type in CoinType::PREFERENCE
            .into_iter()
            .filter(|t| request.allowed_types.contains(t))
        {
            let candidates = self.candidates(request, coin_type, tip).await?;
            let Some(first) = candidates.first() else {
                continue;
            };
            if coin_type == CoinType::RingCt {
                if let Some(exhausted) = self.ring_pool_shortfall(request, first).await? {
                    failures.push(exhausted);
                    continue;
                }
            }
            let max_inputs = match coin_type {
                CoinType::Zerocoin => self
                    .config
                    .max_inputs_per_spend
                    .min(self.config.max_zerocoin_spends_per_tx),
                _ => self.config.max_inputs_per_spend,
            };
            match self.greedy(request, candidates, max_inputs, change_coin_type(coin_type)) {
                Pass::Selected(set) => return Ok(set),
                Pass::Failed(e) => failures.push(e),
            }
        }
        Err(Self::pick_failure(failures, request.target))
    }

    async fn select_conversion(
        &self,
        request: &SelectionRequest,
        target_type: CoinType,
        tip: u64,
    ) -> EngineResult<InputSet> {
        if request.allowed_types.contains(&CoinType::Zerocoin) || target_type == CoinType::Zerocoin
        {
            return Err(EngineError::InvalidCoinTypeMix(
                "Zerocoin cannot take part in a conversion spend".to_string(),
            ));
        }

        let mut failures = Vec::new();
        let mut candidates = Vec::new();
        for coin_type in CoinType::PREFERENCE
            .into_iter()
            .filter(|t| request.allowed_types.contains(t))
        {
            let owned = self.candidates(request, coin_type, tip).await?;
            let Some(first) = owned.first() else {
                continue;
            };
            if coin_type == CoinType::RingCt {
                if let Some(exhausted) = self.ring_pool_shortfall(request, first).await? {
                    failures.push(exhausted);
                    continue;
                }
            }
            candidates.extend(owned);
        }
        candidates.sort_by(|a, b| b.value.cmp(&a.value).then(a.id.cmp(&b.id)));

        match self.greedy(
            request,
            candidates,
            self.config.max_inputs_per_spend,
            target_type,
        ) {
            Pass::Selected(set) => Ok(set),
            Pass::Failed(e) => {
                failures.push(e);
                Err(Self::pick_failure(failures, request.target))
            }
        }
    }

    /// Accumulate candidates, largest first, until target plus fee is covered
    fn greedy(
        &self,
        request: &SelectionRequest,
        candidates: Vec<Output>,
        max_inputs: usize,
        change_type: CoinType,
    ) -> Pass {
        let target = request.target;
        let dust = self.config.dust_threshold;
        let mut outputs_with_change = request.output_types.clone();
        outputs_with_change.push(change_type);

        let mut selected: Vec<Output> = Vec::new();
        let mut input_types = Vec::new();
        let mut total_value: Amount = 0;
        let mut fee_without_change = 0;
        let mut fee_with_change = 0;

        for output in candidates {
            if selected.len() == max_inputs {
                let coin_type = selected.first().map(|o| o.coin_type).unwrap_or(change_type);
                return Pass::Failed(if coin_type == CoinType::Zerocoin
                    && max_inputs == self.config.max_zerocoin_spends_per_tx
                {
                    EngineError::TooManyZerocoinSpends {
                        count: max_inputs + 1,
                        max: max_inputs,
                    }
                } else {
                    EngineError::TooManyInputs {
                        coin_type,
                        max: max_inputs,
                    }
                });
            }

            total_value = total_value.saturating_add(output.value);
            input_types.push(output.coin_type);
            selected.push(output);

            fee_without_change =
                self.fees
                    .estimate(&input_types, request.ring_size, &request.output_types);
            let exact = target.saturating_add(fee_without_change);
            if total_value >= exact && total_value - exact <= dust {
                return Pass::Selected(self.finish(
                    selected,
                    false,
                    total_value,
                    fee_without_change,
                    fee_without_change,
                    change_type,
                ));
            }

            fee_with_change = self
                .fees
                .estimate(&input_types, request.ring_size, &outputs_with_change);
            if total_value > target.saturating_add(fee_with_change).saturating_add(dust) {
                return Pass::Selected(self.finish(
                    selected,
                    true,
                    total_value,
                    fee_without_change,
                    fee_with_change,
                    change_type,
                ));
            }
        }

        // leftover too small for change but above dust: the fee absorbs it
        if !selected.is_empty() && total_value >= target.saturating_add(fee_without_change) {
            return Pass::Selected(self.finish(
                selected,
                false,
                total_value,
                fee_without_change,
                fee_without_change,
                change_type,
            ));
        }

        Pass::Failed(EngineError::InsufficientFunds {
            available: total_value,
            required: target.saturating_add(fee_with_change.max(fee_without_change)),
        })
    }

    fn finish(
        &self,
        outputs: Vec<Output>,
        requires_change_output: bool,
        total_value: Amount,
        fee_without_change: Amount,
        fee_with_change: Amount,
        change_type: CoinType,
    ) -> InputSet {
        let privacy_warning = outputs.iter().any(|o| o.coin_type == CoinType::Plain);
        InputSet {
            outputs,
            requires_change_output,
            total_value,
            fee_without_change,
            fee_with_change,
            change_type,
            privacy_warning,
        }
    }

    /// Most informative failure across all tried coin types
    fn pick_failure(failures: Vec<EngineError>, target: Amount) -> EngineError {
        let rank = |e: &EngineError| match e {
            EngineError::AnonymitySetExhausted { .. } => 0,
            EngineError::TooManyZerocoinSpends { .. } => 1,
            EngineError::TooManyInputs { .. } => 2,
            EngineError::InsufficientFunds { .. } => 3,
            _ => 4,
        };
        let best_insufficient = failures
            .iter()
            .filter_map(|e| match e {
                EngineError::InsufficientFunds {
                    available,
                    required,
                } => Some((*available, *required)),
                _ => None,
            })
            .max_by_key(|(available, _)| *available);

        match failures.into_iter().min_by_key(|e| rank(e)) {
            Some(EngineError::InsufficientFunds { .. }) | None => {
                let (available, required) = best_insufficient.unwrap_or((0, target));
                EngineError::InsufficientFunds {
                    available,
                    required,
                }
            }
            Some(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{KeyRef, OutputId, COIN},
        storage::InMemoryOutputIndex,
    };

    const OWNER: KeyRef = KeyRef {
        account: 0,
        index: 0,
    };

    fn id(tag: u8, n: u64) -> OutputId {
        let mut txid = [tag; 32];
        txid[..8].copy_from_slice(&n.to_le_bytes());
        OutputId::new(txid, 0)
    }

    fn selector(outputs: Vec<Output>) -> CoinSelector {
        let index = Arc::new(InMemoryOutputIndex::with_tip(1_000));
        index.insert_many(outputs).unwrap();
        CoinSelector::new(index, EngineConfig::default())
    }

    fn decoys(count: u64) -> impl Iterator<Item = Output> {
        (0..count).map(|n| Output::ring_ct(id(9, n), COIN, [1u8; 32], n, 10))
    }

    #[tokio::test]
    async fn greedy_takes_largest_first() {
        let selector = selector(vec![
            Output::ct(id(1, 1), 2 * COIN, [0u8; 32], 10).with_owner(OWNER),
            Output::ct(id(1, 2), 7 * COIN, [0u8; 32], 10).with_owner(OWNER),
            Output::ct(id(1, 3), 5 * COIN, [0u8; 32], 10).with_owner(OWNER),
        ]);
        let request = SelectionRequest::new(10 * COIN, vec![CoinType::Ct], vec![CoinType::Ct]);
        let set = selector.select(&request).await.unwrap();

        let values: Vec<Amount> = set.outputs.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![7 * COIN, 5 * COIN]);
        assert!(set.requires_change_output);
        assert!(set.total_value >= request.target + set.fee());
        assert!(!set.privacy_warning);
    }

    #[tokio::test]
    async fn ring_ct_needs_a_large_enough_pool() {
        let owned = Output::ring_ct(id(2, 1), 50 * COIN, [2u8; 32], 500, 10).with_owner(OWNER);
        let ct = Output::ct(id(2, 2), 50 * COIN, [3u8; 32], 10).with_owner(OWNER);
        let request = SelectionRequest::new(COIN, vec![CoinType::RingCt, CoinType::Ct], vec![
            CoinType::RingCt,
        ]);

        let small = selector(decoys(5).chain([owned.clone(), ct.clone()]).collect());
        let set = small.select(&request).await.unwrap();
        assert_eq!(set.input_types(), vec![CoinType::Ct]);

        let only_ring = SelectionRequest::new(COIN, vec![CoinType::RingCt], vec![CoinType::RingCt]);
        let err = small.select(&only_ring).await.unwrap_err();
        assert!(matches!(err, EngineError::AnonymitySetExhausted { required: 20, .. }));

        let large = selector(decoys(30).chain([owned, ct]).collect());
        let set = large.select(&request).await.unwrap();
        assert_eq!(set.input_types(), vec![CoinType::RingCt]);
        assert_eq!(set.change_type, CoinType::RingCt);
    }

    #[tokio::test]
    async fn carried_outputs_join_the_candidates_unfiltered() {
        let selector = selector(vec![Output::plain(id(5, 1), COIN, 10).with_owner(OWNER)]);
        // too recent to pass the confirmation filter if it were indexed
        let carried = Output::plain(id(5, 2), 8 * COIN, 995).with_owner(OWNER);
        let request = SelectionRequest::new(5 * COIN, vec![CoinType::Plain], vec![
            CoinType::Zerocoin,
        ])
        .with_min_confirmations(10)
        .with_carried(vec![carried.clone()]);

        let set = selector.select(&request).await.unwrap();
        assert_eq!(set.outputs, vec![carried]);
        assert!(set.requires_change_output);
    }

    #[tokio::test]
    async fn plain_selection_warns_and_respects_limits() {
        let plain: Vec<Output> = (0..5)
            .map(|n| Output::plain(id(3, n), COIN, 10).with_owner(OWNER))
            .collect();
        let index = Arc::new(InMemoryOutputIndex::with_tip(1_000));
        index.insert_many(plain).unwrap();
        let limited = CoinSelector::new(index.clone(), EngineConfig::default().with_max_inputs(3));

        let request = SelectionRequest::new(2 * COIN, vec![CoinType::Plain], vec![CoinType::Plain]);
        let set = limited.select(&request).await.unwrap();
        assert!(set.privacy_warning);
        assert_eq!(set.outputs.len(), 3);

        let too_many = SelectionRequest::new(4 * COIN, vec![CoinType::Plain], vec![CoinType::Plain]);
        let err = limited.select(&too_many).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::TooManyInputs {
                coin_type: CoinType::Plain,
                max: 3
            }
        );

        let unlimited = CoinSelector::new(index, EngineConfig::default());
        let err = unlimited
            .select(&SelectionRequest::new(9 * COIN, vec![CoinType::Plain], vec![CoinType::Plain]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds { available, .. } if available == 5 * COIN
        ));

        let err = unlimited
            .select(&SelectionRequest::new(1, vec![CoinType::Plain], vec![CoinType::Plain]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AmountTooSmall { .. }));
    }

    #[tokio::test]
    async fn conversion_spans_transparent_and_confidential_inputs() {
        let selector = selector(vec![
            Output::plain(id(4, 1), 3 * COIN, 10).with_owner(OWNER),
            Output::ct(id(4, 2), 2 * COIN, [4u8; 32], 10).with_owner(OWNER),
        ]);
        let request = SelectionRequest::new(4 * COIN, vec![CoinType::Plain, CoinType::Ct], vec![
            CoinType::Ct,
        ])
        .converting_to(CoinType::Ct);
        let set = selector.select(&request).await.unwrap();
        assert!(set.has_type(CoinType::Plain) && set.has_type(CoinType::Ct));
        assert!(set.privacy_warning);
        assert_eq!(set.change_type, CoinType::Ct);

        let homogeneous = SelectionRequest::new(4 * COIN, vec![CoinType::Plain, CoinType::Ct], vec![
            CoinType::Ct,
        ]);
        assert!(matches!(
            selector.select(&homogeneous).await,
            Err(EngineError::InsufficientFunds { .. })
        ));

        let zerocoin = request.clone();
        let zerocoin = SelectionRequest {
            allowed_types: vec![CoinType::Zerocoin, CoinType::Ct],
            ..zerocoin
        };
        assert!(matches!(
            selector.select(&zerocoin).await,
            Err(EngineError::InvalidCoinTypeMix(_))
        ));
    }
}
