// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use airway_laplace::assembly::SystemBuilder;
use airway_laplace::core::VoxelGrid;
use airway_laplace::labels::BoundaryConditions;
use airway_laplace::landmarks::CuttingPlane;
use airway_laplace::pipeline::AirwayLaplaceSolver;

/// Cylinder of radius `n/3` along z in an `n x n x len` grid.
fn make_cylinder(n: usize, len: usize) -> VoxelGrid<u8> {
    let mut seg = VoxelGrid::filled([n, n, len], [1.0; 3], [0.0; 3], 0u8).unwrap();
    let c = (n / 2) as f64;
    let r = (n / 3) as f64;
    for i in 0..n {
        for j in 0..n {
            if (i as f64 - c).powi(2) + (j as f64 - c).powi(2) <= r * r {
                for k in 2..len - 2 {
                    seg.set([i, j, k], 1);
                }
            }
        }
    }
    seg
}

fn make_solver(n: usize, len: usize, threads: usize) -> AirwayLaplaceSolver {
    let c = (n / 2) as f64;
    let nose = CuttingPlane::new([c, c, 4.0], [0.0, 0.0, 1.0]).unwrap();
    let trachea = CuttingPlane::new([c, c, (len - 5) as f64], [0.0, 0.0, -1.0]).unwrap();
    AirwayLaplaceSolver::new(nose, trachea)
        .with_region_radius(c)
        .unwrap()
        .with_threads(threads)
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Boundary labeling alone: 64x64x256 cylinder.
fn bench_labeling(c: &mut Criterion) {
    let seg = make_cylinder(64, 256);
    let solver = make_solver(64, 256, num_cpus());
    c.bench_function("label_64x64x256", |b| {
        b.iter(|| black_box(solver.label(&seg).unwrap()));
    });
}

/// System assembly from a prepared label grid.
fn bench_assembly(c: &mut Criterion) {
    let seg = make_cylinder(64, 256);
    let labels = make_solver(64, 256, num_cpus()).label(&seg).unwrap().labels;
    let conditions = BoundaryConditions::default();
    c.bench_function("assemble_64x64x256", |b| {
        b.iter(|| black_box(SystemBuilder::new(&conditions).assemble(&labels).unwrap()));
    });
}

/// Full pipeline with varying thread counts.
fn bench_thread_scaling(c: &mut Criterion) {
    let cpus = num_cpus();
    let seg = make_cylinder(32, 128);
    let mut group = c.benchmark_group("solve_32x32x128");
    group.sample_size(10);
    for &threads in &[1, 2, 4, 8] {
        if threads <= cpus {
            let solver = make_solver(32, 128, threads);
            group.bench_function(format!("{}threads", threads), |b| {
                b.iter(|| black_box(solver.solve(&seg).unwrap()));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_labeling, bench_assembly, bench_thread_scaling);
criterion_main!(benches);
