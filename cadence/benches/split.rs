//! Microbenchmarks for splitting and merging segments on the write path.
//!
//! Run with: `cargo bench -p cadence -- split`

#![allow(missing_docs, clippy::cast_precision_loss)]

use std::sync::Arc;

use cadence::segment::merge;
use cadence::split::{DEFAULT_SPLIT_THRESHOLD, split};
use cadence::{
    ChannelDescriptor, ChannelKey, DataType, Rate, SampleBuffer, Size, TimeStamp, TypedSegment,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Builds a float64 segment of `samples` samples on a 10 kHz channel.
fn setup_segment(samples: usize) -> TypedSegment {
    let channel = Arc::new(ChannelDescriptor::new(
        ChannelKey::new(1),
        "vibration",
        1,
        Rate::khz(10.0),
        DataType::Float64,
    ));
    let values: Vec<f64> = (0..samples).map(|i| i as f64).collect();
    TypedSegment::from_buffer(
        channel,
        TimeStamp::seconds(1_700_000_000),
        &SampleBuffer::from(values),
    )
    .unwrap()
}

fn bench_split_default_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("split/default_threshold");

    // 1M samples is 8 MB: two full pieces at the default 4 MB threshold.
    for samples in [1_000, 100_000, 1_000_000] {
        let segment = setup_segment(samples);
        group.throughput(Throughput::Bytes(segment.size().value()));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &segment, |b, seg| {
            b.iter(|| split(black_box(seg.clone()), black_box(DEFAULT_SPLIT_THRESHOLD)).unwrap());
        });
    }

    group.finish();
}

fn bench_split_small_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("split/threshold");
    let segment = setup_segment(100_000);

    for threshold in [Size::kilobytes(1), Size::kilobytes(64), Size::megabytes(1)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threshold),
            &threshold,
            |b, &threshold| {
                b.iter(|| split(black_box(segment.clone()), black_box(threshold)).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_merge_pieces(c: &mut Criterion) {
    let pieces = split(setup_segment(100_000), Size::kilobytes(64)).unwrap();

    c.bench_function("merge/100k_samples_64kb_pieces", |b| {
        b.iter(|| merge(black_box(pieces.clone())).unwrap());
    });
}

criterion_group!(
    benches,
    bench_split_default_threshold,
    bench_split_small_threshold,
    bench_merge_pieces,
);
criterion_main!(benches);
