//! Benchmarks for chunking and hashing
//!
//! Run with: cargo bench --package chunkvault-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chunkvault_core::{Chunker, ChunkerConfig, ChunkingAlgorithm, HashPool};
use rand::{rngs::StdRng, RngCore, SeedableRng};

/// Generate pseudo-random test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    StdRng::seed_from_u64(7).fill_bytes(&mut data);
    data
}

/// Benchmark each boundary algorithm over the same buffer
fn bench_chunkers(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    for size in [
        1024 * 1024,      // 1 MB
        16 * 1024 * 1024, // 16 MB
    ] {
        let data = generate_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        for algorithm in [
            ChunkingAlgorithm::Fixed,
            ChunkingAlgorithm::Rabin,
            ChunkingAlgorithm::FastCdc,
        ] {
            let chunker =
                Chunker::new(ChunkerConfig::default().with_algorithm(algorithm)).unwrap();
            group.bench_with_input(
                BenchmarkId::new(algorithm.as_str(), format!("{}MB", size / (1024 * 1024))),
                &data,
                |b, data| b.iter(|| chunker.cut_points(black_box(data))),
            );
        }
    }

    group.finish();
}

/// Benchmark the hashing stage at different pool sizes
fn bench_hash_pool(c: &mut Criterion) {
    let data = generate_data(16 * 1024 * 1024);
    let chunker = Chunker::default();
    let chunks = chunker.split_into_chunks(&data);

    let mut group = c.benchmark_group("hash_pool");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for threads in [1, 2, 4, 8] {
        let pool = HashPool::new(threads, 10).unwrap();
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            &chunks,
            |b, chunks| b.iter(|| pool.hash_chunks(black_box(chunks))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_chunkers, bench_hash_pool);
criterion_main!(benches);
