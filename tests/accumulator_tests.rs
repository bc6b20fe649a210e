//! Zerocoin spends, witness freshness and reorganization handling

mod common;

use common::*;
use private_spend_engine::{
    accumulator::Witness,
    config::EngineConfig,
    data_structures::{AnonymityMaterial, CoinType, Denomination, Output, COIN},
    errors::{EngineError, ErrorCategory},
    orchestrator::SpendRequest,
    storage::OutputStatus,
};

const D: Denomination = Denomination::OneHundred;

async fn mint_into(h: &Harness, n: u64, height: u64) -> Output {
    let (output, record) = zerocoin(n, D, height);
    h.accumulator.advance(D, record).await.unwrap();
    h.index.insert(output.clone()).unwrap();
    output
}

fn zerocoin_payment(amount: u64) -> SpendRequest {
    SpendRequest::payment(amount, CoinType::Ct).with_allowed_types(vec![CoinType::Zerocoin])
}

#[tokio::test]
async fn test_witness_verifies_only_at_or_after_its_mint() {
    let h = harness(EngineConfig::default());
    let before = h.accumulator.current_checkpoint(D).await;
    let coin = mint_into(&h, 1, 100).await;

    let fresh = h.accumulator.stored_witness(&coin.id).await.unwrap();
    assert!(h.accumulator.verify(&fresh, &coin).await);

    let premint = Witness {
        checkpoint: before,
        ..fresh.clone()
    };
    assert!(!h.accumulator.verify(&premint, &coin).await);

    let decoded = Witness::from_bytes(&fresh.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, fresh);
    let err = Witness::from_bytes(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, EngineError::WitnessDecode(_)));
}

#[tokio::test]
async fn test_advance_is_idempotent_for_replayed_mints() {
    let h = harness(EngineConfig::default());
    let (_, record) = zerocoin(1, D, 100);
    let checkpoint = h.accumulator.advance(D, record.clone()).await.unwrap();

    for _ in 0..3 {
        let err = h.accumulator.advance(D, record.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateMintIndex(_)));
    }
    assert_eq!(h.accumulator.current_checkpoint(D).await, checkpoint);
    assert_eq!(h.accumulator.mint_count(D).await, 1);
}

#[tokio::test]
async fn test_zerocoin_spend_carries_a_verified_witness() {
    let h = harness(EngineConfig::default());
    let coin = mint_into(&h, 1, 100).await;
    mint_into(&h, 2, 110).await;

    let spend = h.orchestrator.build(&zerocoin_payment(60 * COIN)).await.unwrap();
    let plan = spend.plan();
    assert_eq!(plan.inputs().len(), 1);
    let input = &plan.inputs()[0];
    let AnonymityMaterial::Witness(witness) = &input.material else {
        panic!("Zerocoin input without witness");
    };
    assert!(h.accumulator.verify(witness, &input.output).await);
    // stored at mint time and still within the catch-up window
    assert_eq!(witness.checkpoint.sequence, 1);

    // leftover of a fixed denomination comes back as confidential change
    let change: Vec<_> = plan.change_outputs().collect();
    assert_eq!(change.len(), 1);
    assert_eq!(change[0].coin_type, CoinType::Ct);
    assert!(plan.is_balanced());

    let committed = h.orchestrator.commit(spend).await.unwrap();
    assert_eq!(committed.input_ids(), vec![coin.id]);
}

#[tokio::test]
async fn test_stale_witness_is_rejected_until_regenerated() {
    let h = harness(EngineConfig::default().with_witness_catch_up_window(10));
    let coin = mint_into(&h, 1, 100).await;
    // foreign mints push the accumulator past the catch-up window
    for n in 2..=12 {
        let (_, record) = zerocoin(n, D, 100 + n);
        h.accumulator.advance(D, record).await.unwrap();
    }

    let err = h.orchestrator.build(&zerocoin_payment(50 * COIN)).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::AccumulatorCheckpointStale {
            witness_sequence: 1,
            current_sequence: 12,
            window: 10
        }
    );
    assert_eq!(err.category(), ErrorCategory::CryptographicIntegrity);
    assert_eq!(h.index.active_lease_count().unwrap(), 0);

    let regenerated = h.accumulator.regenerate_witness(&coin.id).await.unwrap();
    assert_eq!(regenerated.checkpoint.sequence, 12);

    let spend = h.orchestrator.build(&zerocoin_payment(50 * COIN)).await.unwrap();
    assert_eq!(spend.plan().input_ids(), vec![coin.id]);
    h.orchestrator.abort(spend).await.unwrap();
}

#[tokio::test]
async fn test_rollback_discards_reorged_mints_and_rebuilds_witnesses() {
    let h = harness(EngineConfig::default());
    let early = mint_into(&h, 1, 100).await;
    mint_into(&h, 2, 200).await;
    let reorged = mint_into(&h, 3, 300).await;
    let stale = h.accumulator.regenerate_witness(&early.id).await.unwrap();
    assert_eq!(stale.checkpoint.sequence, 3);

    let report = h.accumulator.rollback_to_height(250).await;
    assert_eq!(report.removed_mints, vec![reorged.id]);
    assert_eq!(report.rebuilt_witnesses, 2);
    assert!(!h.accumulator.is_minted(&reorged.id).await);
    assert_eq!(h.accumulator.mint_count(D).await, 2);

    // a witness built against the orphaned branch no longer verifies
    assert!(!h.accumulator.verify(&stale, &early).await);
    let rebuilt = h.accumulator.stored_witness(&early.id).await.unwrap();
    assert_eq!(rebuilt.checkpoint.sequence, 2);
    assert!(h.accumulator.verify(&rebuilt, &early).await);

    let err = h
        .accumulator
        .regenerate_witness(&reorged.id)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::WitnessNotFound(reorged.id));

    // keep the orphaned coin out of selection
    h.index.set_locked(&reorged.id, true).unwrap();
    let spend = h.orchestrator.build(&zerocoin_payment(150 * COIN)).await.unwrap();
    let AnonymityMaterial::Witness(witness) = &spend.plan().inputs()[0].material else {
        panic!("Zerocoin input without witness");
    };
    assert_eq!(witness.checkpoint.sequence, 2);
    h.orchestrator.abort(spend).await.unwrap();
}

#[tokio::test]
async fn test_commitment_mismatch_fails_the_plan_and_releases_inputs() {
    let h = harness(EngineConfig::default());
    let (minted, record) = zerocoin(1, D, 100);
    h.accumulator.advance(D, record).await.unwrap();
    // the index reports a commitment the accumulator never saw
    let tampered = Output {
        commitment: [9u8; 32],
        ..minted
    };
    h.index.insert(tampered.clone()).unwrap();

    let err = h
        .orchestrator
        .build(&zerocoin_payment(50 * COIN))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::AccumulatorWitnessInvalid(tampered.id));
    assert_eq!(err.category(), ErrorCategory::CryptographicIntegrity);
    assert!(!err.is_recoverable());
    assert_eq!(h.index.active_lease_count().unwrap(), 0);
    assert_eq!(
        h.index.status(&tampered.id).unwrap(),
        OutputStatus::Available
    );
}

#[tokio::test]
async fn test_zerocoin_spend_count_is_capped() {
    let h = harness(EngineConfig::default().with_max_zerocoin_spends(2));
    for n in 1..=3 {
        mint_into(&h, n, 100 + n).await;
    }

    // three hundred-coin inputs are needed but only two are allowed
    let err = h
        .orchestrator
        .build(&zerocoin_payment(250 * COIN))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::TooManyZerocoinSpends { count: 3, max: 2 });
    assert_eq!(err.category(), ErrorCategory::Policy);
    assert_eq!(h.index.active_lease_count().unwrap(), 0);

    let spend = h
        .orchestrator
        .build(&zerocoin_payment(150 * COIN))
        .await
        .unwrap();
    assert_eq!(spend.plan().inputs().len(), 2);
    h.orchestrator.abort(spend).await.unwrap();
}
