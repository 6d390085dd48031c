//! GPU backend against the CPU backend. Every test returns early when the
//! machine has no usable adapter.

use boidgrid::{Backend, FlockConfig, GpuContext, Simulation, Strategy, Vec3};

fn gpu_available() -> bool {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::new() {
        Ok(_) => true,
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            false
        }
    }
}

fn config(backend: Backend) -> FlockConfig {
    FlockConfig::new()
        .with_particle_count(1000)
        .with_half_extent(25.0)
        .with_seed(17)
        .with_initial_speed(0.8)
        .with_backend(backend)
}

#[test]
fn test_gpu_pair_at_unit_distance() {
    if !gpu_available() {
        return;
    }
    for strategy in Strategy::ALL {
        let mut sim = Simulation::from_state(
            FlockConfig::new().with_backend(Backend::Gpu),
            vec![Vec3::ZERO, Vec3::X],
            vec![Vec3::ZERO; 2],
        )
        .unwrap();
        sim.step_with(strategy, 1.0).unwrap();

        let snapshot = sim.snapshot().unwrap();
        assert!(snapshot.velocities()[0].abs_diff_eq(Vec3::new(-0.09, 0.0, 0.0), 1e-5), "{:?}", snapshot.velocities()[0]);
        assert!(snapshot.positions()[1].abs_diff_eq(Vec3::new(1.09, 0.0, 0.0), 1e-5), "{:?}", snapshot.positions()[1]);
    }
}

#[test]
fn test_gpu_matches_cpu_for_every_strategy() {
    if !gpu_available() {
        return;
    }
    for strategy in Strategy::ALL {
        let mut cpu = Simulation::initialize(config(Backend::Cpu).with_strategy(strategy)).unwrap();
        let mut gpu = Simulation::initialize(config(Backend::Gpu).with_strategy(strategy)).unwrap();
        for _ in 0..2 {
            cpu.step(1.0).unwrap();
            gpu.step(1.0).unwrap();
        }

        let a = cpu.snapshot().unwrap();
        let b = gpu.snapshot().unwrap();
        for (pa, pb) in a.positions().iter().zip(b.positions()) {
            assert!(pa.abs_diff_eq(*pb, 1e-3), "{:?} vs {:?}", pa, *pb);
        }
        for (va, vb) in a.velocities().iter().zip(b.velocities()) {
            assert!(va.abs_diff_eq(*vb, 1e-3), "{:?} vs {:?}", va, *vb);
        }
    }
}

#[test]
fn test_gpu_snapshot_before_step_returns_seeded_state() {
    if !gpu_available() {
        return;
    }
    let mut cpu = Simulation::initialize(config(Backend::Cpu)).unwrap();
    let mut gpu = Simulation::initialize(config(Backend::Gpu)).unwrap();
    assert_eq!(cpu.snapshot().unwrap().positions(), gpu.snapshot().unwrap().positions());
    assert!(gpu.grid_tables().is_none());
}
