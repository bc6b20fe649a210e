//! Plan lifecycle: validation, reservation, commit, abort and events

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use private_spend_engine::{
    config::EngineConfig,
    data_structures::{CoinType, Denomination, COIN},
    errors::{EngineError, ErrorCategory},
    events::EngineEvent,
    orchestrator::SpendRequest,
    storage::{IndexFailureModes, OutputStatus},
};

#[tokio::test]
async fn test_invalid_parameters_are_rejected_before_reserving() {
    let h = harness(EngineConfig::default());
    h.index.insert_many(decoys(1..=40)).unwrap();
    h.index.insert(owned_ring_ct(100, 5 * COIN)).unwrap();

    let err = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::RingCt).with_ring_size(1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::RingSizeOutOfRange {
            requested: 1,
            min: 3,
            max: 32
        }
    );
    assert_eq!(err.category(), ErrorCategory::Policy);
    assert_eq!(h.index.active_lease_count().unwrap(), 0);

    let err = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::RingCt).with_security_level(0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSecurityLevel { level: 0, .. }));

    let err = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Zerocoin))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCoinTypeMix(_)));
    assert_eq!(h.index.active_lease_count().unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_mint_is_rejected_and_engine_stays_usable() {
    let h = harness(EngineConfig::default());
    h.index.insert(owned_plain(1, 500 * COIN)).unwrap();

    for count in [10, u64::MAX] {
        let err = h
            .orchestrator
            .build(&SpendRequest::mint(Denomination::Ten, count))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::TooManyMints { count, max: 9 });
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(h.index.active_lease_count().unwrap(), 0);
    }

    let mint = h
        .orchestrator
        .build(&SpendRequest::mint(Denomination::Ten, 9))
        .await
        .unwrap();
    assert_eq!(mint.plan().mint_outputs().count(), 9);
    h.orchestrator.abort(mint).await.unwrap();

    let payment = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    h.orchestrator.commit(payment).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builds_never_share_an_output() {
    for round in 0..20u64 {
        let h = harness(EngineConfig::default());
        h.index.insert(owned_ct(round, 10 * COIN)).unwrap();
        let orchestrator = Arc::new(h.orchestrator);

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .build(&SpendRequest::payment(COIN, CoinType::Ct))
                        .await
                })
            })
            .collect();

        let mut built = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(pending) => built.push(pending),
                Err(e) => assert!(
                    matches!(
                        e,
                        EngineError::InsufficientFunds { .. } | EngineError::LeaseContention(_)
                    ),
                    "unexpected error {e:?}"
                ),
            }
        }
        assert_eq!(built.len(), 1, "round {round}");
        assert_eq!(h.index.active_lease_count().unwrap(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_commit_after_expiry_reacquires_free_outputs() {
    let h = harness(EngineConfig::default().with_lease_ttl(Duration::from_secs(30)));
    let input = owned_plain(1, 5 * COIN);
    h.index.insert(input.clone()).unwrap();

    let pending = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(h.index.status(&input.id).unwrap(), OutputStatus::Available);

    let plan = h.orchestrator.commit(pending).await.unwrap();
    assert_eq!(plan.input_ids(), vec![input.id]);
    assert_eq!(h.index.status(&input.id).unwrap(), OutputStatus::Spent);
    assert_eq!(h.index.active_lease_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_commit_after_expiry_fails_when_outputs_were_taken() {
    let h = harness(EngineConfig::default().with_lease_ttl(Duration::from_secs(30)));
    let input = owned_plain(1, 5 * COIN);
    h.index.insert(input.clone()).unwrap();

    let first = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    let first_lease = first.lease().unwrap().id;
    tokio::time::advance(Duration::from_secs(31)).await;

    let second = h
        .orchestrator
        .build(&SpendRequest::payment(2 * COIN, CoinType::Plain))
        .await
        .unwrap();
    assert_eq!(second.plan().input_ids(), vec![input.id]);

    let err = h.orchestrator.commit(first).await.unwrap_err();
    assert_eq!(err, EngineError::LeaseTimeout(first_lease));
    assert!(err.is_recoverable());

    h.orchestrator.commit(second).await.unwrap();
    assert_eq!(h.index.status(&input.id).unwrap(), OutputStatus::Spent);
}

#[tokio::test]
async fn test_fee_ceiling_and_explicit_override() {
    let config = EngineConfig::default().with_max_fee(2_000);
    let h = harness(config);
    h.index.insert(owned_plain(1, 5 * COIN)).unwrap();

    let err = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FeeTooHigh { max: 2_000, fee } if fee > 2_000));
    assert_eq!(h.index.active_lease_count().unwrap(), 0);

    let pending = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain).allow_high_fee())
        .await
        .unwrap();
    assert!(pending.plan().fee() > 2_000);
    assert!(pending.plan().is_balanced());
    h.orchestrator.abort(pending).await.unwrap();
}

#[tokio::test]
async fn test_dust_leftover_is_folded_into_the_fee() {
    let h = harness(EngineConfig::default());
    // payment + fee without change, plus 5_000 units of dust
    let fee = 10 * (12 + 148 + 34);
    h.index
        .insert(owned_plain(1, COIN + fee + 5_000))
        .unwrap();

    let pending = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    let plan = pending.plan();
    assert_eq!(plan.change_outputs().count(), 0);
    assert_eq!(plan.fee(), fee + 5_000);
    assert!(plan.is_balanced());
    h.orchestrator.abort(pending).await.unwrap();
}

#[tokio::test]
async fn test_storage_failures_surface_to_the_caller() {
    let h = harness(EngineConfig::default());
    h.index.insert(owned_plain(1, 5 * COIN)).unwrap();

    h.index
        .set_failure_modes(IndexFailureModes {
            fail_reserve: true,
            ..Default::default()
        })
        .unwrap();
    let err = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Storage);

    let pending = h
        .orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    h.index
        .set_failure_modes(IndexFailureModes {
            fail_mark_spent: true,
            ..Default::default()
        })
        .unwrap();
    assert!(pending.lease().unwrap().covers(&output_id(1, 1)));
    let err = h.orchestrator.commit(pending).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));
    // a failed commit leaves the inputs held rather than spent
    assert_eq!(
        h.index.status(&output_id(1, 1)).unwrap(),
        OutputStatus::Reserved
    );
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let (dispatcher, captured) = capturing_dispatcher();
    let h = harness(EngineConfig::default());
    let orchestrator = h.orchestrator.with_events(dispatcher);
    h.index
        .insert_many([owned_plain(1, 5 * COIN), owned_plain(2, 5 * COIN)])
        .unwrap();

    let committed = orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    let committed_id = committed.plan().id();
    orchestrator.commit(committed).await.unwrap();

    let aborted = orchestrator
        .build(&SpendRequest::payment(COIN, CoinType::Plain))
        .await
        .unwrap();
    let aborted_id = aborted.plan().id();
    orchestrator.abort(aborted).await.unwrap();

    assert_eq!(
        event_types(&captured),
        vec!["PlanBuilt", "PlanCommitted", "PlanBuilt", "PlanAborted"]
    );
    let events = captured.lock().unwrap().clone();
    assert!(matches!(
        events[0],
        EngineEvent::PlanBuilt { plan_id, inputs: 1, privacy_warning: true, .. } if plan_id == committed_id
    ));
    assert_eq!(events[3], EngineEvent::PlanAborted { plan_id: aborted_id });
    assert!(events[1].to_json().unwrap().contains("PlanCommitted"));
}
