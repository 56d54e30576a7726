//! Performance benchmarks for CRILAYLA decoding
//!
//! Frames are synthesized from literal-heavy and match-heavy token streams so
//! both decoder paths are measured.

use criarc_core::bitstream::{BitCodec, BitWrite};
use criarc_crilayla::{TAIL_SIZE, decompress};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// Build a frame of `raw_size` literal bytes
fn literal_frame(raw_size: usize) -> Vec<u8> {
    let mut bits = BitCodec::new();
    let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
    for _ in 0..raw_size {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        bits.write_bit(false).unwrap();
        bits.write_u8((seed >> 32) as u8, 8).unwrap();
    }
    finish(bits, raw_size)
}

/// Build a frame made of 3 literals followed by long zero-distance matches
fn match_frame(raw_size: usize) -> Vec<u8> {
    let mut bits = BitCodec::new();
    for byte in [b'x', b'y', b'z'] {
        bits.write_bit(false).unwrap();
        bits.write_u8(byte, 8).unwrap();
    }
    let mut remaining = raw_size - 3;
    while remaining > 0 {
        if remaining < 3 {
            bits.write_bit(false).unwrap();
            bits.write_u8(b'x', 8).unwrap();
            remaining -= 1;
            continue;
        }
        // 3 + 3 + 7 + 31 + 0 = 44 bytes per match
        let length = match remaining {
            45 | 46 => 41,
            n => n.min(44),
        };
        bits.write_bit(true).unwrap();
        bits.write_u16(0, 13).unwrap();
        write_length(&mut bits, length);
        remaining -= length;
    }
    finish(bits, raw_size)
}

fn write_length(bits: &mut BitCodec, length: usize) {
    let mut rest = length - 3;
    for width in [2u32, 3, 5, 8] {
        let max = (1usize << width) - 1;
        let value = rest.min(max);
        bits.write_u8(value as u8, width).unwrap();
        rest -= value;
        if value < max {
            return;
        }
    }
    loop {
        let value = rest.min(255);
        bits.write_u8(value as u8, 8).unwrap();
        rest -= value;
        if value < 255 {
            return;
        }
    }
}

fn finish(mut bits: BitCodec, raw_size: usize) -> Vec<u8> {
    let mut stream = bits.take_buffer();
    stream.reverse();
    let mut frame = b"CRILAYLA".to_vec();
    frame.extend_from_slice(&(raw_size as u32).to_le_bytes());
    frame.extend_from_slice(&(stream.len() as u32).to_le_bytes());
    frame.extend_from_slice(&stream);
    frame.extend_from_slice(&[0u8; TAIL_SIZE]);
    frame
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("crilayla_decode");

    for size in [4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let declared = (size + TAIL_SIZE) as u64;
        group.throughput(Throughput::Bytes(declared));

        let literals = literal_frame(size);
        group.bench_with_input(BenchmarkId::new("literals", size), &literals, |b, frame| {
            b.iter(|| black_box(decompress(frame, declared).unwrap()));
        });

        let matches = match_frame(size);
        group.bench_with_input(BenchmarkId::new("matches", size), &matches, |b, frame| {
            b.iter(|| black_box(decompress(frame, declared).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
