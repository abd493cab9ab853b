//! Benchmark for the exact nearest-neighbor scan.
//!
//! The flat index trades throughput for simplicity: search is O(n) over all
//! stored vectors under the granularity lock. This benchmark tracks how the
//! scan behaves at a realistic room-history size so regressions in the hot
//! loop are visible.
//!
//! Uses 1,000 vectors for CI speed. Set `BENCH_FULL_SCALE=1` to run with
//! 50,000 vectors:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p palaver-vector
//! ```

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use palaver_vector::embedding::{Embedder, MockEmbedder};
use palaver_vector::index::FlatIndex;

const CI_VECTOR_COUNT: usize = 1_000;
const FULL_SCALE_VECTOR_COUNT: usize = 50_000;

fn vector_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_VECTOR_COUNT
    } else {
        CI_VECTOR_COUNT
    }
}

/// Build an index populated with deterministic mock embeddings.
fn build_index(dir: &tempfile::TempDir, count: usize) -> FlatIndex<Uuid> {
    let embedder = MockEmbedder::new();
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut index = FlatIndex::open(
        384,
        dir.path().join("bench.vec"),
        dir.path().join("bench.map.json"),
    )
    .unwrap();

    // One batched add keeps setup time (and per-add persistence) out of the
    // measured section.
    let texts: Vec<String> = (0..count)
        .map(|i| format!("room message number {} about deployment status", i))
        .collect();
    let vectors = runtime.block_on(embedder.embed_batch(&texts)).unwrap();
    let ids: Vec<Uuid> = (0..count).map(|_| Uuid::new_v4()).collect();
    index.add(&vectors, ids).unwrap();

    index
}

fn bench_exact_search(c: &mut Criterion) {
    let count = vector_count();
    let dir = tempfile::tempdir().unwrap();
    let index = build_index(&dir, count);

    let embedder = MockEmbedder::new();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let query = runtime
        .block_on(embedder.embed("deployment status for message 42"))
        .unwrap();

    let mut group = c.benchmark_group("flat_index");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(&format!("search_k20_n{}", count), |b| {
        b.iter(|| index.search(std::hint::black_box(&query), 20).unwrap())
    });

    group.bench_function(&format!("search_k1_n{}", count), |b| {
        b.iter(|| index.search(std::hint::black_box(&query), 1).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_exact_search);
criterion_main!(benches);
