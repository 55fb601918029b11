//! Criterion benchmarks for day-file decoding.
//!
//! Benchmarks:
//! 1. Record decoding (raw bytes to normalized bars)
//! 2. Frame building (bars to a Polars frame)

use ashare_core::tdx::{bars_to_frame, decode_records, RawDayRecord};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// ── Helpers ──────────────────────────────────────────────────────────

/// `n` consecutive records, about one per trading day.
fn make_day_bytes(n: usize) -> Vec<u8> {
    (0..n)
        .flat_map(|i| {
            let close = 1000 + (i as i32 % 200);
            RawDayRecord {
                date: 20070104 + i as i32,
                open: close - 3,
                high: close + 15,
                low: close - 15,
                close,
                amount: 2.5e8,
                vol: 1_200_000,
            }
            .encode()
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_records");
    for n in [250, 4_000] {
        let bytes = make_day_bytes(n);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &bytes, |b, bytes| {
            b.iter(|| decode_records(black_box(bytes)))
        });
    }
    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let bars = decode_records(&make_day_bytes(4_000)).unwrap();
    c.bench_function("bars_to_frame_4000", |b| {
        b.iter(|| bars_to_frame(black_box("600000.SH"), black_box(&bars)))
    });
}

criterion_group!(benches, bench_decode, bench_frame);
criterion_main!(benches);
