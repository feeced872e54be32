//! Benchmarks for QFS compression and container saves

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use sc4_dbpf::core::compression::{compress_with, decompress};
use sc4_dbpf::core::subfile::{PlumbingSimulatorFile, Record};
use sc4_dbpf::{Dbpf, FileType, Tgi};

/// Grid-like data: long zero runs broken by short random spans
fn record_like(len: usize) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5C4);
    let mut data = vec![0u8; len];
    let mut pos = 0;
    while pos < len {
        pos += rng.gen_range(16..256);
        let span = rng.gen_range(1..24).min(len.saturating_sub(pos));
        for byte in data.iter_mut().skip(pos).take(span) {
            *byte = rng.gen();
        }
        pos += span;
    }
    data
}

fn benchmark_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("qfs_compress");

    for size in [4 * 1024, 64 * 1024, 256 * 1024].iter() {
        let data = record_like(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        for chain in [8usize, 64, 512] {
            group.bench_with_input(
                BenchmarkId::new(format!("chain_{}", chain), size),
                &data,
                |b, data| b.iter(|| compress_with(black_box(data), chain)),
            );
        }
    }

    group.finish();
}

fn benchmark_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("qfs_decompress");

    for size in [4 * 1024, 64 * 1024, 256 * 1024].iter() {
        let data = record_like(*size);
        let packed = compress_with(&data, 64);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &packed, |b, packed| {
            b.iter(|| decompress(black_box(packed), *size).unwrap());
        });
    }

    group.finish();
}

fn benchmark_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("dbpf_save");

    for size in [64u32, 128, 256].iter() {
        let mut dbpf = Dbpf::new();
        dbpf.add(
            Tgi::new(FileType::PlumbingSimulator.id(), 0, 0),
            Record::PlumbingSimulator(PlumbingSimulatorFile::new(*size).unwrap()),
        )
        .unwrap();
        let bytes = dbpf.to_bytes().unwrap();

        group.bench_with_input(BenchmarkId::new("unmodified", size), &bytes, |b, bytes| {
            b.iter(|| {
                let mut dbpf = Dbpf::from_bytes(black_box(bytes)).unwrap();
                dbpf.to_bytes().unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("dirty", size), &bytes, |b, bytes| {
            b.iter(|| {
                let mut dbpf = Dbpf::from_bytes(black_box(bytes)).unwrap();
                dbpf.subfile_mut::<PlumbingSimulatorFile>()
                    .unwrap()
                    .unwrap()
                    .cells
                    .fill(0x1F);
                dbpf.to_bytes().unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_compress,
    benchmark_decompress,
    benchmark_save
);
criterion_main!(benches);
