//! Benchmarks for the LCS diff and collection change derivation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::diff::{apply, diff, CollectionChange};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

/// A pair of sequences sharing most elements, with a few edits every 10th slot.
fn edited_pair(len: usize) -> (Vec<u32>, Vec<u32>) {
    let old: Vec<u32> = (0..len as u32).collect();
    let new: Vec<u32> = old
        .iter()
        .filter(|n| *n % 10 != 3)
        .flat_map(|n| {
            if n % 10 == 7 {
                vec![*n, n + 1_000_000]
            } else {
                vec![*n]
            }
        })
        .collect();
    (old, new)
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for len in [16, 128, 512] {
        let (old, new) = edited_pair(len);

        group.bench_with_input(BenchmarkId::new("steps", len), &len, |b, _| {
            b.iter(|| diff(black_box(&old), black_box(&new)));
        });

        group.bench_with_input(BenchmarkId::new("collection_change", len), &len, |b, _| {
            b.iter(|| CollectionChange::from_diff(black_box(&old), new.clone()));
        });

        let steps = diff(&old, &new);
        group.bench_with_input(BenchmarkId::new("apply", len), &len, |b, _| {
            b.iter(|| apply(old.clone(), black_box(&steps)));
        });
    }

    group.finish();
}
