//! Benchmarks for motion estimation and its helpers.
//!
//! Run with: cargo bench
//! Run with parallel block matching: cargo bench --features rayon

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use flowmotion::{
    BlockMatching, FlowAlgorithm, Frame, LumaPlane, MotionEstimator, Orientation,
    PresentationTime,
};

fn noise(width: u32, height: u32, seed: u32) -> Vec<u8> {
    (0..width * height)
        .map(|i| {
            let mut v = i.wrapping_mul(2_654_435_761) ^ seed;
            v ^= v >> 15;
            v = v.wrapping_mul(0x2c1b_3c6d);
            (v >> 24) as u8
        })
        .collect()
}

fn frame_pair(width: u32, height: u32) -> (Frame, Frame) {
    let base = noise(width, height, 1);
    let mut moved = base.clone();
    moved.rotate_right(3);
    (
        Frame::from_gray(width, height, base, PresentationTime::new(0, 30.0)).unwrap(),
        Frame::from_gray(width, height, moved, PresentationTime::new(1, 30.0)).unwrap(),
    )
}

fn benchmark_block_matching(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("block matching");
    group.sample_size(20);

    for (width, height) in [(160, 120), (320, 240), (640, 360)] {
        let (previous, current) = frame_pair(width, height);
        let (before, now) = (previous.luma(), current.luma());
        let algorithm = BlockMatching::new();

        group.bench_with_input(
            BenchmarkId::new("compute", format!("{width}x{height}")),
            &(before, now),
            |bencher, (before, now)| {
                bencher.iter(|| algorithm.compute(black_box(before), black_box(now)).unwrap());
            },
        );
    }

    let (previous, current) = frame_pair(320, 240);
    for search_range in [2, 4, 8] {
        let estimator = MotionEstimator::new(BlockMatching::new().with_search_range(search_range));
        group.bench_function(BenchmarkId::new("search range", search_range), |bencher| {
            bencher.iter(|| {
                estimator
                    .estimate(black_box(&previous), black_box(&current), Orientation::Up)
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_orientation(criterion: &mut Criterion) {
    let data = noise(640, 360, 2).into_iter().map(|v| v as f32 / 255.0).collect();
    let plane = LumaPlane::new(640, 360, data).unwrap();

    for orientation in [Orientation::Down, Orientation::Right, Orientation::LeftMirrored] {
        criterion.bench_function(&format!("orient 640x360 {orientation}"), |bencher| {
            bencher.iter(|| orientation.apply(black_box(&plane)));
        });
    }
}

fn benchmark_visualization(criterion: &mut Criterion) {
    let (previous, current) = frame_pair(640, 360);
    let field = MotionEstimator::default()
        .estimate(&previous, &current, Orientation::Up)
        .unwrap();

    criterion.bench_function("flow field to rgb 640x360", |bencher| {
        bencher.iter(|| black_box(&field).to_rgb_image());
    });

    criterion.bench_function("luma of gray 640x360", |bencher| {
        bencher.iter(|| black_box(&current).luma());
    });
}

criterion::criterion_group!(
    benches,
    benchmark_block_matching,
    benchmark_orientation,
    benchmark_visualization,
);
criterion::criterion_main!(benches);
