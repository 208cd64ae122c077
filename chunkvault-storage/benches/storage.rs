//! Benchmarks for storage backends
//!
//! Run with: cargo bench --package chunkvault-storage --bench storage

use bytes::Bytes;
use chunkvault_core::chunk::ChunkId;
use chunkvault_storage::backend::{StorageBackend, StorageBackendSync};
use chunkvault_storage::{FileBackend, MemoryBackend, SledBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Generate a unique chunk key
fn chunk_key(seed: u64) -> String {
    ChunkId::from_data(&seed.to_le_bytes()).storage_key()
}

fn format_size(size: usize) -> String {
    if size >= 1024 * 1024 {
        format!("{}MB", size / (1024 * 1024))
    } else {
        format!("{}KB", size / 1024)
    }
}

const SIZES: [usize; 3] = [
    4 * 1024,   // 4 KB (minimum chunk)
    32 * 1024,  // 32 KB (target chunk)
    64 * 1024,  // 64 KB (maximum chunk)
];

/// Benchmark put on the synchronous backends
fn bench_put_sync(c: &mut Criterion) {
    let memory = MemoryBackend::new();
    let sled = SledBackend::open_temporary().unwrap();
    let backends: [(&str, &dyn StorageBackendSync); 2] = [("memory", &memory), ("sled", &sled)];

    let mut group = c.benchmark_group("put");

    for size in SIZES {
        let data = Bytes::from(generate_data(size));
        group.throughput(Throughput::Bytes(size as u64));

        for (name, backend) in backends {
            group.bench_with_input(BenchmarkId::new(name, format_size(size)), &data, |b, data| {
                let mut counter = 0u64;
                b.iter(|| {
                    counter += 1;
                    backend.put(&chunk_key(counter), black_box(data.clone())).unwrap()
                })
            });
        }
    }

    group.finish();
}

/// Benchmark put and get on the file backend
fn bench_file_backend(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let backend = runtime
        .block_on(FileBackend::open(temp_dir.path()))
        .unwrap();

    let mut group = c.benchmark_group("file_backend");

    for size in SIZES {
        let data = Bytes::from(generate_data(size));
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("put", format_size(size)), &data, |b, data| {
            let mut counter = 0u64;
            b.iter(|| {
                counter += 1;
                let key = chunk_key(counter);
                runtime
                    .block_on(backend.put(&key, black_box(data.clone())))
                    .unwrap()
            })
        });

        let key = chunk_key(u64::MAX - size as u64);
        runtime.block_on(backend.put(&key, data.clone())).unwrap();
        group.bench_function(BenchmarkId::new("get", format_size(size)), |b| {
            b.iter(|| runtime.block_on(backend.get(black_box(&key))).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put_sync, bench_file_backend);
criterion_main!(benches);
