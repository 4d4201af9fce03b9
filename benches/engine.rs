//! Criterion benchmarks for the KPI engine.
//!
//! - Cache hit through the engine
//! - Parameter hashing
//! - Blob codec encode/decode

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kpi_engine::cache::{MemoryCache, SnapshotCodec};
use kpi_engine::core::TimeWindow;
use kpi_engine::engine::AnalyticsEngine;
use kpi_engine::kpi::{Formula, KpiDefinition, KpiParams, KpiRegistry, KpiUnit};
use kpi_engine::source::{SourceMetric, StaticSource};
use std::sync::Arc;
use std::time::Duration;

fn july() -> KpiParams {
    let window = TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(),
    )
    .unwrap();
    KpiParams::new(window)
        .with_filter("region", "north")
        .with_filter("sales_rep", "alice")
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut registry = KpiRegistry::new();
    registry
        .register(KpiDefinition::new(
            "close_rate",
            Formula::Percentage {
                numerator: SourceMetric::LeadsConverted,
                denominator: SourceMetric::LeadsCreated,
            },
            30.0,
            Duration::from_secs(3600),
            KpiUnit::Percent,
        ))
        .unwrap();
    let source = StaticSource::new()
        .with_value(SourceMetric::LeadsConverted, 12.0)
        .with_value(SourceMetric::LeadsCreated, 48.0);
    let engine = AnalyticsEngine::new(
        Arc::new(registry),
        Arc::new(source),
        Arc::new(MemoryCache::new()),
    );
    let params = july();
    rt.block_on(engine.compute("close_rate", &params)).unwrap();

    c.bench_function("engine_cache_hit", |b| {
        b.iter(|| rt.block_on(engine.compute(black_box("close_rate"), black_box(&params))))
    });
}

fn bench_param_hash(c: &mut Criterion) {
    let params = july();
    c.bench_function("param_hash", |b| b.iter(|| black_box(&params).param_hash()));
}

fn bench_codec(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut registry = KpiRegistry::new();
    registry
        .register(KpiDefinition::new(
            "pipeline_value",
            Formula::Total(SourceMetric::PipelineValue),
            250_000.0,
            Duration::from_secs(600),
            KpiUnit::Currency,
        ))
        .unwrap();
    let engine = AnalyticsEngine::new(
        Arc::new(registry),
        Arc::new(StaticSource::new().with_value(SourceMetric::PipelineValue, 180_000.0)),
        Arc::new(MemoryCache::new()),
    );
    let snapshot = rt.block_on(engine.compute("pipeline_value", &july())).unwrap();
    let expires_at = snapshot.computed_at + chrono::Duration::seconds(600);
    let encoded = SnapshotCodec::encode(&snapshot, expires_at).unwrap();

    c.bench_function("codec_encode", |b| {
        b.iter(|| SnapshotCodec::encode(black_box(&snapshot), expires_at))
    });
    c.bench_function("codec_decode", |b| b.iter(|| SnapshotCodec::decode(black_box(&encoded))));
}

criterion_group!(benches, bench_cache_hit, bench_param_hash, bench_codec);
criterion_main!(benches);
