//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use private_spend_engine::{
    accumulator::{hashing, AccumulatorStateManager, MintRecord},
    config::EngineConfig,
    data_structures::{Amount, Denomination, KeyRef, Output, OutputId},
    events::{listeners::MockEventListener, EngineEvent, EventDispatcher, SharedDispatcher},
    orchestrator::SpendOrchestrator,
    storage::InMemoryOutputIndex,
};

pub const OWNER: KeyRef = KeyRef {
    account: 0,
    index: 0,
};
pub const TIP: u64 = 1_000;
pub const CONFIRMED_AT: u64 = 100;

/// Opt-in log output: `RUST_LOG=private_spend_engine=debug cargo test`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Distinct id per `(tag, n)`
pub fn output_id(tag: u8, n: u64) -> OutputId {
    let mut txid = [tag; 32];
    txid[..8].copy_from_slice(&n.to_le_bytes());
    OutputId::new(txid, 0)
}

pub fn owned_plain(n: u64, value: Amount) -> Output {
    Output::plain(output_id(1, n), value, CONFIRMED_AT).with_owner(OWNER)
}

pub fn owned_ct(n: u64, value: Amount) -> Output {
    Output::ct(output_id(2, n), value, [n as u8; 32], CONFIRMED_AT).with_owner(OWNER)
}

pub fn owned_ring_ct(ring_index: u64, value: Amount) -> Output {
    Output::ring_ct(
        output_id(3, ring_index),
        value,
        [ring_index as u8; 32],
        ring_index,
        CONFIRMED_AT,
    )
    .with_owner(OWNER)
}

/// Foreign RingCT output usable only as a decoy
pub fn decoy(ring_index: u64) -> Output {
    Output::ring_ct(
        output_id(4, ring_index),
        1,
        [ring_index as u8; 32],
        ring_index,
        CONFIRMED_AT,
    )
}

pub fn decoys(range: std::ops::RangeInclusive<u64>) -> impl Iterator<Item = Output> {
    range.map(decoy)
}

/// Owned Zerocoin output and the mint record that accumulates it
pub fn zerocoin(n: u64, denomination: Denomination, height: u64) -> (Output, MintRecord) {
    let id = output_id(5, n);
    let commitment = hashing::serial_commitment(denomination, &id.txid);
    (
        Output::zerocoin(id, denomination, commitment, height).with_owner(OWNER),
        MintRecord::new(id, denomination, commitment, height),
    )
}

pub struct Harness {
    pub index: Arc<InMemoryOutputIndex>,
    pub accumulator: Arc<AccumulatorStateManager>,
    pub orchestrator: SpendOrchestrator,
}

pub fn harness(config: EngineConfig) -> Harness {
    init_tracing();
    let index = Arc::new(InMemoryOutputIndex::with_tip(TIP));
    let accumulator = Arc::new(AccumulatorStateManager::new(&config));
    let orchestrator =
        SpendOrchestrator::with_seed(index.clone(), accumulator.clone(), config, 42)
            .expect("valid config");
    Harness {
        index,
        accumulator,
        orchestrator,
    }
}

/// Dispatcher with one capturing listener registered
pub fn capturing_dispatcher() -> (SharedDispatcher, Arc<std::sync::Mutex<Vec<EngineEvent>>>) {
    let mut dispatcher = EventDispatcher::new();
    let listener = MockEventListener::new();
    let captured = listener.get_captured_events();
    dispatcher
        .register(Box::new(listener))
        .expect("first listener registers");
    (dispatcher.shared(), captured)
}

pub fn event_types(captured: &Arc<std::sync::Mutex<Vec<EngineEvent>>>) -> Vec<&'static str> {
    captured
        .lock()
        .unwrap()
        .iter()
        .map(EngineEvent::event_type)
        .collect()
}
