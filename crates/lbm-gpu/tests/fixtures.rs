//! Fixture generation and replay.

use lbm_gpu::fixtures::FixtureStore;
use lbm_gpu::prelude::*;
use tempfile::TempDir;

fn params() -> FlowParams {
    FlowParams::default().with_grid(20, 18)
}

#[test]
fn test_generate_and_replay_cpu() {
    let tmp = TempDir::new().unwrap();
    let store = FixtureStore::new(tmp.path().join("fixtures"));
    let p = params();

    let written = store.generate(&p, 2).unwrap();
    assert_eq!(written, 16);

    let fixtures = store.load_all().unwrap();
    assert_eq!(fixtures.len(), 16);
    assert_eq!(fixtures[0].stage, KernelStage::Outflow);
    assert_eq!(fixtures[15].stage, KernelStage::Streaming);
    assert_eq!(fixtures[8].iteration, 1);

    let cpu = CpuBackend::for_params(&p).unwrap();
    let comparisons = store.replay(&cpu).unwrap();
    assert_eq!(comparisons.len(), 20);
    for c in &comparisons {
        assert!(c.norm < DEFAULT_TOLERANCE, "{c:?}");
    }
}

#[test]
fn test_fixtures_chain() {
    let tmp = TempDir::new().unwrap();
    let store = FixtureStore::new(tmp.path());
    store.generate(&params(), 1).unwrap();

    let fixtures = store.load_all().unwrap();
    for pair in fixtures.windows(2) {
        assert_eq!(pair[0].output, pair[1].input);
        assert_eq!(pair[0].sequence + 1, pair[1].sequence);
    }
}

#[test]
fn test_replay_detects_corrupted_output() {
    let tmp = TempDir::new().unwrap();
    let store = FixtureStore::new(tmp.path());
    store.generate(&params(), 1).unwrap();

    let mut fixtures = store.load_all().unwrap();
    let collision = fixtures
        .iter_mut()
        .find(|f| f.stage == KernelStage::Collision)
        .unwrap();
    collision.output.fout.set(0, 5, 5, 123.0);
    store.write(collision).unwrap();

    let comparisons = store.replay(&ReferenceBackend::default()).unwrap();
    let bad: Vec<_> = comparisons
        .iter()
        .filter(|c| c.norm >= DEFAULT_TOLERANCE)
        .collect();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].stage, KernelStage::Collision);
    assert_eq!(bad[0].field, FieldId::Fout);
}

#[test]
fn test_missing_directory() {
    let tmp = TempDir::new().unwrap();
    let store = FixtureStore::new(tmp.path().join("absent"));
    assert!(matches!(store.load_all().unwrap_err(), LbmError::Io(_)));
}

#[test]
fn test_truncated_buffer_rejected_on_load() {
    let tmp = TempDir::new().unwrap();
    let store = FixtureStore::new(tmp.path());
    store.generate(&params(), 1).unwrap();

    let path = tmp.path().join("002-macroscopic.json");
    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let data = json["input"]["fin"]["data"].as_array_mut().unwrap();
    data.truncate(10);
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    assert!(matches!(
        store.load_all().unwrap_err(),
        LbmError::Serialization(_)
    ));
    let cpu = CpuBackend::for_params(&params()).unwrap();
    assert!(store.replay(&cpu).is_err());
}
