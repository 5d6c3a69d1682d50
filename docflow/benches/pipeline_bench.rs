//! Benchmarks for the deterministic pipeline hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docflow::merge::{MergeEngine, MergeStrategy};
use docflow::planner::{PreferenceWeights, PriorityPlanner, SuccessHistory};
use docflow::processor::{FragmentProcessor, ValidatedFragment};
use docflow::registry::default_registry;
use docflow::testing::sample_resume_document;

fn bench_merge(c: &mut Criterion) {
    let engine = MergeEngine::new();
    let document = sample_resume_document();
    let fragment = ValidatedFragment {
        feature_id: "experience-bullets".to_string(),
        content: "<ul><li>Shipped v2.</li><li>Cut latency 40%.</li></ul>".to_string(),
        score: 1.0,
        warnings: Vec::new(),
    };
    let strategy = MergeStrategy::insert_after(r#"<section class="experience""#);

    c.bench_function("merge_insert_after", |b| {
        b.iter(|| {
            engine.merge(
                black_box(&document),
                black_box(&fragment),
                black_box(&strategy),
            )
        });
    });

    let fallback = MergeStrategy::insert_after(r#"<section class="missing""#);
    c.bench_function("merge_fallback_to_append", |b| {
        b.iter(|| {
            engine.merge(
                black_box(&document),
                black_box(&fragment),
                black_box(&fallback),
            )
        });
    });
}

fn bench_planner(c: &mut Criterion) {
    let planner = PriorityPlanner::default();
    let registry = default_registry();
    let requested: Vec<String> = registry.ids().map(ToString::to_string).collect();
    let history = SuccessHistory::new()
        .with_rate("experience-bullets", 0.9)
        .with_rate("skills-matrix", 0.6);
    let preferences = PreferenceWeights::new().with_boost("professional-summary", 0.8);

    c.bench_function("planner_plan", |b| {
        b.iter(|| {
            planner.plan(
                black_box(&registry),
                black_box(&requested),
                black_box(&history),
                black_box(&preferences),
            )
        });
    });
}

fn bench_processor(c: &mut Criterion) {
    let processor = FragmentProcessor::new();
    let content = "  <ul>\n    <li>Shipped   v2.</li>\n    <li>Cut latency.</li>\n  </ul>  ";

    c.bench_function("processor_normalize", |b| {
        b.iter(|| processor.normalize(black_box(content)));
    });

    c.bench_function("processor_validate", |b| {
        b.iter(|| processor.validate(black_box("<ul><li>Shipped v2.</li></ul>")));
    });
}

criterion_group!(benches, bench_merge, bench_planner, bench_processor);
criterion_main!(benches);
