//! Results through the engine: conversions feed counters, the compiler picks
//! the winner and the export reflects it.

use std::sync::Arc;

use variantlab_core::domain::{Experiment, ExperimentId, ExperimentStatus, Variant, VariantId, VisitorId};
use variantlab_core::stats::{ConfidenceLevel, SampleCounts};
use variantlab_engine::{
    export_variants_csv, EngineConfig, ExperimentEngine, InMemoryAllocationCache,
    InMemoryRepository, Recommendation,
};

fn engine(experiment: Experiment) -> (Arc<InMemoryRepository>, ExperimentEngine) {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert(experiment);
    let engine = ExperimentEngine::new(
        repo.clone(),
        Arc::new(InMemoryAllocationCache::new()),
        EngineConfig::default(),
    );
    (repo, engine)
}

#[test]
fn recorded_conversions_produce_a_winner() {
    let (repo, engine) = engine(Experiment::new(
        "hero",
        ExperimentStatus::Running,
        vec![
            Variant::control("hero-a", "Old hero", 50.0).with_counts(2_000, 0),
            Variant::new("hero-b", "New hero", 50.0).with_counts(2_000, 0),
        ],
    ));
    let exp = ExperimentId::from("hero");
    let a = VariantId::from("hero-a");
    let b = VariantId::from("hero-b");

    for i in 0..100 {
        engine.record_conversion(&exp, &a, &VisitorId::new(format!("a-{i}")), Some(30.0));
    }
    for i in 0..180 {
        engine.record_conversion(&exp, &b, &VisitorId::new(format!("b-{i}")), Some(30.0));
    }

    let stored = repo.variant(&exp, &b).unwrap();
    assert!((stored.conversion_rate - 0.09).abs() < 1e-12);

    let results = engine.get_experiment_results(&exp).unwrap().unwrap();
    let winner = results.winner.as_ref().unwrap();
    assert_eq!(winner.variant_id, b);
    assert!((winner.lift - 80.0).abs() < 1e-9);
    assert!(winner.p_value < 0.05);
    assert_eq!(results.variants[0].variant_id, b);
    assert_eq!(results.variants[0].rank, 1);
    assert!(matches!(
        results.recommendations.first(),
        Some(Recommendation::RollOutWinner { .. })
    ));

    let csv_text = export_variants_csv(&results).unwrap();
    assert_eq!(csv_text.lines().count(), 3);
}

#[test]
fn equal_rates_have_no_winner() {
    let (_repo, engine) = engine(Experiment::new(
        "flat",
        ExperimentStatus::Completed,
        vec![
            Variant::control("flat-a", "A", 50.0).with_counts(3_000, 150),
            Variant::new("flat-b", "B", 50.0).with_counts(3_000, 150),
        ],
    ));
    let results = engine
        .get_experiment_results(&ExperimentId::from("flat"))
        .unwrap()
        .unwrap();
    assert!(results.winner.is_none());
    assert_eq!(results.recommendations, vec![Recommendation::EndNoClearWinner]);
}

#[test]
fn five_vs_six_percent_lift_is_twenty() {
    let (_repo, engine) = engine(Experiment::new("x", ExperimentStatus::Draft, vec![]));
    let r = engine.calculate_statistical_significance(
        SampleCounts::new(10_000, 500),
        SampleCounts::new(10_000, 600),
        ConfidenceLevel::default(),
    );
    assert!((r.lift - 20.0).abs() < 1e-9);
    assert!(r.is_significant);
    assert!(r.p_value > 0.0 && r.p_value < 0.01);
}

#[test]
fn small_samples_are_never_significant() {
    let (_repo, engine) = engine(Experiment::new("x", ExperimentStatus::Draft, vec![]));
    let r = engine.calculate_statistical_significance(
        SampleCounts::new(10, 1),
        SampleCounts::new(10, 9),
        ConfidenceLevel::default(),
    );
    assert_eq!(r.p_value, 1.0);
    assert!(!r.is_significant);
}

#[test]
fn interval_bounds_are_clamped_percentages() {
    let (_repo, engine) = engine(Experiment::new("x", ExperimentStatus::Draft, vec![]));
    let level = ConfidenceLevel::default();

    let zero = engine.calculate_confidence_interval(0, 0, level);
    assert_eq!((zero.lower, zero.upper), (0.0, 0.0));

    let tiny = engine.calculate_confidence_interval(1, 10, level);
    assert!(tiny.lower >= 0.0 && tiny.upper <= 100.0);
    assert!(tiny.lower < 10.0 && tiny.upper > 10.0);
}
