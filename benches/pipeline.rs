//! Throughput benchmarks for common pipeline shapes.

use cascade::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_filter_map_sum(c: &mut Criterion) {
    let data: Vec<i64> = (0..10_000).collect();

    c.bench_function("filter_map_sum_10k", |b| {
        let seq = Sequence::from_vec(data.clone());
        b.iter(|| {
            let total = seq
                .filter(predicate(|n: &i64, _| n % 3 == 0))
                .map(mapper(|n: i64, _| n * 2))
                .sum()
                .unwrap();
            black_box(total)
        })
    });
}

fn bench_chunk_collapse(c: &mut Criterion) {
    let data: Vec<i64> = (0..10_000).collect();

    c.bench_function("chunk_collapse_10k", |b| {
        let seq = Sequence::from_vec(data.clone());
        b.iter(|| {
            let round_trip = seq.chunk(64).collapse().count().unwrap();
            black_box(round_trip)
        })
    });
}

fn bench_reverse(c: &mut Criterion) {
    let data: Vec<i64> = (0..10_000).collect();

    c.bench_function("reverse_10k", |b| {
        let seq = Sequence::from_vec(data.clone());
        b.iter(|| {
            let first = seq.reverse().first().unwrap();
            black_box(first)
        })
    });
}

fn bench_group_by(c: &mut Criterion) {
    let data: Vec<i64> = (0..10_000).collect();

    c.bench_function("group_by_10k", |b| {
        let seq = Sequence::from_vec(data.clone());
        b.iter(|| {
            let buckets = seq.group_by(selector(|n: &i64, _| n % 16)).count().unwrap();
            black_box(buckets)
        })
    });
}

criterion_group!(
    benches,
    bench_filter_map_sum,
    bench_chunk_collapse,
    bench_reverse,
    bench_group_by
);
criterion_main!(benches);
