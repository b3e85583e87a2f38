//! Benchmark: host-side SDF evaluation and rasterization.
//!
//! The block-culled traversal should beat the dense walk by a wide
//! margin once the shape covers a minority of the grid.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::Vec3;
use kerf::prelude::*;

fn generate_points(count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let t = i as f32 / count as f32;
            Vec3::new(
                (t * 123.456).sin() * 8.0,
                (t * 234.567).sin() * 8.0,
                (t * 345.678).sin() * 8.0,
            )
        })
        .collect()
}

fn bench_sdf_eval(c: &mut Criterion) {
    let shapes = [
        ("cylinder", Shape::cylinder(Vec3::ZERO, Vec3::Z, 2.0, 6.0).unwrap()),
        (
            "long_hole",
            Shape::long_hole(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), Vec3::Z, 1.5, 6.0).unwrap(),
        ),
        (
            "oriented_box",
            Shape::oriented_box(Vec3::ZERO, [Vec3::X * 2.0, Vec3::Y * 3.0, Vec3::Z * 4.0])
                .unwrap(),
        ),
    ];

    let points = generate_points(10_000);
    let mut group = c.benchmark_group("sdf_eval");
    group.throughput(Throughput::Elements(points.len() as u64));
    for (name, shape) in &shapes {
        group.bench_with_input(BenchmarkId::from_parameter(name), shape, |b, shape| {
            b.iter(|| {
                let mut acc = 0.0f32;
                for &p in &points {
                    acc += shape.sdf(black_box(p));
                }
                black_box(acc)
            })
        });
    }
    group.finish();
}

fn bench_fill_shape(c: &mut Criterion) {
    let shape = Shape::cylinder(Vec3::new(32.0, 32.0, 8.0), Vec3::Z, 10.0, 48.0).unwrap();
    let mut group = c.benchmark_group("fill_shape");
    for n in [32u32, 64] {
        group.throughput(Throughput::Elements(u64::from(n).pow(3)));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut grid: HostGrid<u32> = HostGrid::new(1.0, [n, n, n], Vec3::ZERO).unwrap();
                grid.fill_shape(&shape, 1, RoundMode::Outside);
                black_box(grid.count())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sdf_eval, bench_fill_shape);
criterion_main!(benches);
