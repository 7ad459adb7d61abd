//! Criterion benchmarks for VariantLab hot paths.
//!
//! Benchmarks:
//! 1. Bucketing (BLAKE3 over experiment + visitor id)
//! 2. Bucket → variant selection over growing variant lists
//! 3. Two-proportion significance test
//! 4. Confidence interval

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use variantlab_core::domain::{ExperimentId, Variant, VisitorId};
use variantlab_core::stats::{confidence_interval, ConfidenceLevel, SampleCounts, SignificanceTest};
use variantlab_core::{bucket_for, select_variant};

// ── Helpers ──────────────────────────────────────────────────────────

fn even_split(n: usize) -> Vec<Variant> {
    let pct = 100.0 / n as f64;
    (0..n)
        .map(|i| Variant::new(format!("v{i}"), format!("V{i}"), pct))
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_bucketing(c: &mut Criterion) {
    let exp = ExperimentId::from("exp-checkout-redesign");
    let visitors: Vec<VisitorId> = (0..1_000)
        .map(|i| VisitorId::new(format!("visitor-{i:08}")))
        .collect();

    c.bench_function("bucket_for_1000_visitors", |b| {
        b.iter(|| {
            for v in &visitors {
                black_box(bucket_for(black_box(&exp), v));
            }
        })
    });
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_variant");
    for n in [2usize, 4, 8, 16] {
        let variants = even_split(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &variants, |b, variants| {
            b.iter(|| {
                for bucket in (0..10_000).step_by(37) {
                    black_box(select_variant(variants, bucket));
                }
            })
        });
    }
    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let test = SignificanceTest::default();
    let control = SampleCounts::new(10_000, 512);
    let variant = SampleCounts::new(10_000, 587);

    c.bench_function("two_proportion_test", |b| {
        b.iter(|| black_box(test.compare(black_box(&control), black_box(&variant))))
    });

    let level = ConfidenceLevel::default();
    c.bench_function("confidence_interval", |b| {
        b.iter(|| black_box(confidence_interval(black_box(512), black_box(10_000), level)))
    });
}

criterion_group!(benches, bench_bucketing, bench_selection, bench_statistics);
criterion_main!(benches);
