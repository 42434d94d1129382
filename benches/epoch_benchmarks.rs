// benches/epoch_benchmarks.rs
//! Benchmarks for the per-sample epoch path and block finalization

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use band_core::epoch::block::block_checksum;
use band_core::epoch::{sqrt_rounded, EpochAccumulator, EpochBlock, EpochSample, Pedometer};
use band_core::hal::AccelSample;

fn benchmark_sqrt(c: &mut Criterion) {
    let mut group = c.benchmark_group("sqrt_rounded");
    group.throughput(Throughput::Elements(1024));
    group.bench_function("sweep", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for i in 0..1024u32 {
                acc = acc.wrapping_add(sqrt_rounded(black_box(i * 4_194_301)));
            }
            acc
        })
    });
    group.finish();
}

fn benchmark_epoch_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("epoch_add");
    // One second of samples at the default rate
    group.throughput(Throughput::Elements(50));
    group.bench_function("walking_second", |b| {
        let mut accumulator = EpochAccumulator::new(AccelSample::new(0, 0, 4096));
        let mut pedometer = Pedometer::new(4096);
        let samples: Vec<AccelSample> = (0..50)
            .map(|i| {
                let swing = ((i % 40) as i16 - 20) * 150;
                AccelSample::new(0, 0, 4096 + swing)
            })
            .collect();
        b.iter(|| {
            for sample in &samples {
                accumulator.add(black_box(*sample), &mut pedometer);
            }
            accumulator.sum()
        })
    });
    group.finish();
}

fn benchmark_block_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_checksum");
    group.throughput(Throughput::Bytes(512));
    group.bench_function("full_block", |b| {
        let mut block = EpochBlock::fresh(7);
        for i in 0..60u16 {
            block.samples[i as usize] = EpochSample::pack(90, 21, 0, i, 12_000 + u32::from(i));
        }
        block.info.data_length = 60;
        let bytes = block.to_bytes();
        b.iter(|| block_checksum(black_box(&bytes)))
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_sqrt,
    benchmark_epoch_add,
    benchmark_block_checksum
);
criterion_main!(benches);
