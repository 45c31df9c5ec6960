// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

/// Benchmarks for filter compilation, SQL rendering and in-process matching
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use vecs::core::metadata_filter::compile;
use vecs::core::types::Metadata;
use vecs::storage::sql::{render_predicate, SqlParams};

/// `$and` of `width` field clauses, alternating operators.
fn wide_filter(width: usize) -> Value {
    let clauses: Vec<Value> = (0..width)
        .map(|i| match i % 4 {
            0 => json!({ format!("f{}", i): { "$eq": i } }),
            1 => json!({ format!("f{}", i): { "$gte": i } }),
            2 => json!({ format!("f{}", i): { "$in": [i, i + 1, i + 2] } }),
            _ => json!({ format!("f{}", i): { "$contains": "tag" } }),
        })
        .collect();
    json!({ "$and": clauses })
}

/// `$or` nested `depth` levels deep.
fn deep_filter(depth: usize) -> Value {
    (0..depth).fold(json!({"leaf": {"$ne": 0}}), |inner, i| {
        json!({ "$or": [inner, { format!("f{}", i): { "$lt": i } }] })
    })
}

fn document(width: usize) -> Metadata {
    let mut doc = Metadata::new();
    for i in 0..width {
        let value = match i % 4 {
            3 => json!(["tag", "other"]),
            _ => json!(i),
        };
        doc.insert(format!("f{}", i), value);
    }
    doc
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for width in [1, 8, 64] {
        let filter = wide_filter(width);
        group.bench_with_input(BenchmarkId::new("wide", width), &filter, |b, f| {
            b.iter(|| compile(black_box(f)))
        });
    }
    for depth in [4, 32] {
        let filter = deep_filter(depth);
        group.bench_with_input(BenchmarkId::new("deep", depth), &filter, |b, f| {
            b.iter(|| compile(black_box(f)))
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_sql");
    for width in [8, 64] {
        let predicate = match compile(&wide_filter(width)) {
            Ok(p) => p,
            Err(e) => panic!("benchmark filter does not compile: {}", e),
        };
        group.bench_with_input(BenchmarkId::new("wide", width), &predicate, |b, p| {
            b.iter(|| {
                let mut params = SqlParams::new();
                let sql = render_predicate(black_box(p), &mut params);
                (sql, params.len())
            })
        });
    }
    group.finish();
}

fn bench_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("matches");
    for width in [8, 64] {
        let predicate = match compile(&wide_filter(width)) {
            Ok(p) => p,
            Err(e) => panic!("benchmark filter does not compile: {}", e),
        };
        let doc = document(width);
        group.bench_with_input(BenchmarkId::new("wide", width), &doc, |b, d| {
            b.iter(|| predicate.matches(black_box(d)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_render, bench_matches);
criterion_main!(benches);
