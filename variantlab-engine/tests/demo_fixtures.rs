//! The shipped demo files parse and behave as documented.

use std::path::PathBuf;

use chrono::Utc;

use variantlab_core::domain::{Experiment, VariantId};
use variantlab_core::inspect_split;
use variantlab_engine::{
    compile_results, simulate, EngineConfig, ExperimentFixture, SimulationConfig,
};

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("demos")
}

#[test]
fn demo_config_parses() {
    let config = EngineConfig::from_file(&demos_dir().join("variantlab.toml")).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn checkout_fixture_simulates() {
    let fixture = ExperimentFixture::from_file(&demos_dir().join("checkout_button.toml")).unwrap();
    assert!(inspect_split(&fixture.experiment.variants).is_well_formed());

    let config = SimulationConfig {
        visitors: 30_000,
        seed: 7,
        ..SimulationConfig::default()
    };
    let report = simulate(&fixture, &config, EngineConfig::default(), Utc::now()).unwrap();
    assert_eq!(report.allocated, 30_000);
    assert_eq!(report.results.variants.len(), 3);
}

#[test]
fn pricing_snapshot_has_a_winner() {
    let json = std::fs::read_to_string(demos_dir().join("pricing_page.json")).unwrap();
    let experiment: Experiment = serde_json::from_str(&json).unwrap();
    let results = compile_results(&experiment, &EngineConfig::default().statistics);

    let winner = results.winner.unwrap();
    assert_eq!(winner.variant_id, VariantId::from("pricing-value"));
}
