//! Benchmarks for one simulation step and the grid rebuild.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use boidgrid::grid::{build_cell_heads, build_cell_ranges, index_particles, sort_by_cell};
use boidgrid::{FlockConfig, GridParams, Simulation, Strategy};
use std::sync::atomic::AtomicU32;

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    group.sample_size(20);

    for count in [1_000u32, 5_000] {
        for strategy in Strategy::ALL {
            // Brute force is quadratic; keep it to the small flock
            if strategy == Strategy::BruteForce && count > 1_000 {
                continue;
            }
            group.bench_with_input(BenchmarkId::new(strategy.name(), count), &count, |b, &count| {
                let config = FlockConfig::new()
                    .with_particle_count(count)
                    .with_seed(1)
                    .with_initial_speed(1.0)
                    .with_strategy(strategy);
                let mut sim = Simulation::initialize(config).unwrap();
                b.iter(|| sim.step(black_box(1.0)).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_grid_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_rebuild");

    for count in [5_000u32, 50_000] {
        let config = FlockConfig::new().with_particle_count(count).with_seed(2);
        let grid = GridParams::from_config(&config).unwrap();
        let mut sim = Simulation::initialize(config).unwrap();
        let positions = sim.snapshot().unwrap().positions().to_vec();

        let n = count as usize;
        let mut particle_index = vec![0u32; n];
        let mut grid_index = vec![0u32; n];
        let mut start = vec![0u32; n];
        let mut end = vec![0u32; n];
        let heads: Vec<AtomicU32> = (0..grid.cell_count).map(|_| AtomicU32::new(0)).collect();
        let mut scratch = Vec::with_capacity(n);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                index_particles(&grid, &positions, &mut particle_index, &mut grid_index);
                sort_by_cell(&mut grid_index, &mut particle_index, &mut scratch);
                build_cell_ranges(&grid_index, &mut start, &mut end);
                build_cell_heads(&grid_index, &start, &heads);
                black_box(&heads);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_grid_rebuild);
criterion_main!(benches);
