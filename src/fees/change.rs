use std::sync::atomic::{AtomicU32, Ordering};

use rand_core::RngCore;
use tracing::debug;

use super::FeeCalculator;
use crate::{
    data_structures::{Amount, CoinType, KeyRef, OutputKind, PlannedOutput},
    errors::{EngineError, EngineResult},
};

/// Hands out change keys that the engine never reuses
#[derive(Debug)]
pub struct ChangeKeyAllocator {
    account: u32,
    next: AtomicU32,
}

impl ChangeKeyAllocator {
    pub fn new(account: u32) -> Self {
        Self {
            account,
            next: AtomicU32::new(0),
        }
    }

    pub fn next_key(&self) -> KeyRef {
        KeyRef {
            account: self.account,
            index: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for ChangeKeyAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Coin type of the change output when spending `spent`
///
/// Zerocoin leftovers cannot form a partial denomination and become CT change.
pub fn change_coin_type(spent: CoinType) -> CoinType {
    match spent {
        CoinType::Zerocoin => CoinType::Ct,
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeAndChange {
    pub fee: Amount,
    pub change: Option<PlannedOutput>,
    /// Leftover added to the fee instead of creating dust change
    pub folded_dust: Amount,
}

impl FeeCalculator {
    /// Settle fee and change for a fixed input set
    ///
    /// Leftovers at or below the dust threshold are folded into the fee.
    #[allow(clippy::too_many_arguments)]
    pub fn settle(
        &self,
        inputs: &[CoinType],
        input_total: Amount,
        outputs: &[PlannedOutput],
        ring_size: usize,
        change_type: CoinType,
        keys: &ChangeKeyAllocator,
        rng: &mut dyn RngCore,
        allow_high_fee: bool,
    ) -> EngineResult<FeeAndChange> {
        let output_total: Amount = outputs.iter().map(|o| o.value).sum();
        let mut output_types: Vec<CoinType> = outputs.iter().map(|o| o.coin_type).collect();

        let fee_without_change = self.estimate(inputs, ring_size, &output_types);
        let spent = output_total.saturating_add(fee_without_change);
        if input_total < spent {
            return Err(EngineError::InsufficientFundsAfterFee {
                inputs: input_total,
                outputs: output_total,
                fee: fee_without_change,
            });
        }

        let leftover = input_total - spent;
        let settled = if leftover <= self.dust_threshold {
            FeeAndChange {
                fee: fee_without_change + leftover,
                change: None,
                folded_dust: leftover,
            }
        } else {
            output_types.push(change_type);
            let fee_with_change = self.estimate(inputs, ring_size, &output_types);
            let change_value = input_total
                .saturating_sub(output_total)
                .saturating_sub(fee_with_change);
            if change_value <= self.dust_threshold {
                FeeAndChange {
                    fee: input_total - output_total,
                    change: None,
                    folded_dust: leftover,
                }
            } else {
                let blinding = change_type.is_blinded().then(|| {
                    let mut blinding = [0u8; 32];
                    rng.fill_bytes(&mut blinding);
                    blinding
                });
                FeeAndChange {
                    fee: fee_with_change,
                    change: Some(PlannedOutput {
                        kind: OutputKind::Change,
                        coin_type: change_type,
                        value: change_value,
                        blinding,
                        key: Some(keys.next_key()),
                    }),
                    folded_dust: 0,
                }
            }
        };

        self.check_max(settled.fee, allow_high_fee)?;
        debug!(
            fee = settled.fee,
            folded_dust = settled.folded_dust,
            change = settled.change.as_ref().map(|c| c.value).unwrap_or(0),
            "Settled fee and change"
        );
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, data_structures::COIN};
    use rand::{rngs::StdRng, SeedableRng};

    fn calculator() -> FeeCalculator {
        FeeCalculator::new(&EngineConfig::default())
    }

    fn payment(value: Amount) -> Vec<PlannedOutput> {
        vec![PlannedOutput::payment(CoinType::Ct, value, Some([1u8; 32]))]
    }

    #[test]
    fn dust_leftover_is_folded_into_fee() {
        let calc = calculator();
        let keys = ChangeKeyAllocator::default();
        let mut rng = StdRng::seed_from_u64(1);
        let base = calc.estimate(&[CoinType::Ct], 0, &[CoinType::Ct]);

        let settled = calc
            .settle(
                &[CoinType::Ct],
                COIN + base + 500,
                &payment(COIN),
                0,
                CoinType::Ct,
                &keys,
                &mut rng,
                false,
            )
            .unwrap();
        assert_eq!(settled.change, None);
        assert_eq!(settled.folded_dust, 500);
        assert_eq!(settled.fee, base + 500);
    }

    #[test]
    fn blinded_change_gets_fresh_blinding_and_key() {
        let calc = calculator();
        let keys = ChangeKeyAllocator::new(3);
        let mut rng = StdRng::seed_from_u64(1);

        let first = calc
            .settle(&[CoinType::Ct], 5 * COIN, &payment(COIN), 0, CoinType::Ct, &keys, &mut rng, false)
            .unwrap();
        let second = calc
            .settle(&[CoinType::Ct], 5 * COIN, &payment(COIN), 0, CoinType::Ct, &keys, &mut rng, false)
            .unwrap();

        let (a, b) = (first.change.unwrap(), second.change.unwrap());
        assert_eq!(a.value, 5 * COIN - COIN - first.fee);
        assert_ne!(a.blinding, b.blinding);
        assert_ne!(a.key, b.key);
        assert_eq!(a.key.map(|k| k.account), Some(3));
    }

    #[test]
    fn short_inputs_and_absurd_fees_are_rejected() {
        let calc = FeeCalculator::new(&EngineConfig::default().with_max_fee(5_000));
        let keys = ChangeKeyAllocator::default();
        let mut rng = StdRng::seed_from_u64(1);

        let err = calc
            .settle(&[CoinType::Ct], COIN, &payment(COIN), 0, CoinType::Ct, &keys, &mut rng, false)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFundsAfterFee { .. }));

        let err = calc
            .settle(&[CoinType::Ct], 2 * COIN, &payment(COIN), 0, CoinType::Ct, &keys, &mut rng, false)
            .unwrap_err();
        assert!(matches!(err, EngineError::FeeTooHigh { .. }));
    }

    #[test]
    fn zerocoin_change_is_confidential() {
        assert_eq!(change_coin_type(CoinType::Zerocoin), CoinType::Ct);
        assert_eq!(change_coin_type(CoinType::Plain), CoinType::Plain);
        assert_eq!(change_coin_type(CoinType::RingCt), CoinType::RingCt);
    }
}
