//! Throughput benchmarks for the bit codecs
//!
//! Measures typed writes into a growable codec and typed reads from the
//! forward and reverse fixed codecs across field widths.

use criarc_core::bitstream::{BitCodec, BitRead, BitWrite, FixedBitCodec, ReverseBitCodec};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

const FIELD_COUNT: usize = 64 * 1024;

/// Pseudo-random bytes from a fixed seed
fn random_bytes(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
    for _ in 0..size {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        data.push((seed >> 32) as u8);
    }
    data
}

fn bench_write_widths(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitcodec_write");

    for width in [1u32, 5, 13, 32] {
        group.throughput(Throughput::Bytes((FIELD_COUNT * width as usize / 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| {
                let mut codec = BitCodec::new();
                for i in 0..FIELD_COUNT {
                    codec.write_u32(i as u32, width).unwrap();
                }
                black_box(codec.take_buffer())
            });
        });
    }

    group.finish();
}

fn bench_read_widths(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitcodec_read");
    let data = random_bytes(FIELD_COUNT * 4);

    for width in [1u32, 8, 13, 32] {
        let fields = data.len() * 8 / width as usize;
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("forward", width), &data, |b, data| {
            b.iter(|| {
                let mut codec = FixedBitCodec::new(data.as_slice());
                let mut acc = 0u64;
                for _ in 0..fields {
                    acc = acc.wrapping_add(codec.read_u32(width).unwrap().into());
                }
                black_box(acc)
            });
        });
        group.bench_with_input(BenchmarkId::new("reverse", width), &data, |b, data| {
            b.iter(|| {
                let mut codec = ReverseBitCodec::new(data.as_slice());
                let mut acc = 0u64;
                for _ in 0..fields {
                    acc = acc.wrapping_add(codec.read_u32(width).unwrap().into());
                }
                black_box(acc)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_widths, bench_read_widths);
criterion_main!(benches);
