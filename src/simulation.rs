//! Simulation driver.
//!
//! A [`Simulation`] owns the particle state and advances it one frame per
//! [`step`](Simulation::step) on the configured backend:
//!
//! ```ignore
//! let mut sim = Simulation::initialize(FlockConfig::new().with_seed(7))?;
//! for _ in 0..100 {
//!     sim.step(1.0)?;
//! }
//! let snapshot = sim.snapshot()?;
//! println!("{:?}", snapshot.positions()[0]);
//! sim.teardown();
//! ```

use glam::Vec3;
use std::time::Instant;

use crate::config::{Backend, FlockConfig, Strategy};
use crate::cpu::{worker_pool, CpuFlock};
use crate::error::{try_alloc, SimulationError};
use crate::gpu::GpuFlock;
use crate::grid::GridTables;
use crate::spatial::GridParams;
use crate::spawn::seed_particles;

/// Lifecycle state of a [`Simulation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimState {
    /// Buffers allocated and seeded, no step run yet.
    Initialized,
    /// At least one step has completed.
    Stepping,
    /// Buffers released. Stepping again panics.
    TornDown,
}

enum Engine {
    Cpu(CpuFlock),
    Gpu(Box<GpuFlock>),
}

/// Read-only view of the particle state in canonical id order.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    positions: &'a [Vec3],
    velocities: &'a [Vec3],
    frame: u64,
}

impl<'a> Snapshot<'a> {
    pub fn positions(&self) -> &'a [Vec3] {
        self.positions
    }

    pub fn velocities(&self) -> &'a [Vec3] {
        self.velocities
    }

    /// Number of completed steps when the snapshot was taken.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A flock of particles in a cubic, wrapping domain.
pub struct Simulation {
    config: FlockConfig,
    grid: GridParams,
    strategy: Strategy,
    state: SimState,
    frame: u64,
    engine: Option<Engine>,
    // Host copies of GPU state, refreshed by `snapshot`
    host_positions: Vec<Vec3>,
    host_velocities: Vec<Vec3>,
    warned_displacement: bool,
}

impl Simulation {
    /// Allocate buffers, derive the grid and seed every particle from
    /// `config.seed`. Seeding runs on the same worker pool as stepping.
    pub fn initialize(config: FlockConfig) -> Result<Self, SimulationError> {
        config.validate()?;

        let n = config.particle_count as usize;
        let mut positions = try_alloc("positions", n, Vec3::ZERO)?;
        let mut velocities = try_alloc("velocities", n, Vec3::ZERO)?;
        let pool = worker_pool(&config)?;
        pool.install(|| seed_particles(&config, &mut positions, &mut velocities));

        Self::build(config, pool, positions, velocities)
    }

    /// Start from explicit particle state. The particle count is taken from
    /// `positions`; every position must lie inside the domain.
    pub fn from_state(
        config: FlockConfig,
        positions: Vec<Vec3>,
        velocities: Vec<Vec3>,
    ) -> Result<Self, SimulationError> {
        if positions.len() != velocities.len() {
            return Err(SimulationError::InvalidConfig(format!(
                "{} positions but {} velocities",
                positions.len(),
                velocities.len()
            )));
        }
        let count = u32::try_from(positions.len()).map_err(|_| {
            SimulationError::InvalidConfig(format!("{} particles exceed 32-bit ids", positions.len()))
        })?;

        let config = config.with_particle_count(count);
        config.validate()?;

        let h = config.half_extent;
        if let Some(id) = positions
            .iter()
            .position(|p| !p.is_finite() || p.abs().max_element() > h)
        {
            return Err(SimulationError::InvalidConfig(format!(
                "particle {} at {} lies outside [-{}, {}]³",
                id, positions[id], h, h
            )));
        }
        if let Some(id) = velocities.iter().position(|v| !v.is_finite()) {
            return Err(SimulationError::InvalidConfig(format!("particle {} has a non-finite velocity", id)));
        }

        let pool = worker_pool(&config)?;
        Self::build(config, pool, positions, velocities)
    }

    fn build(
        config: FlockConfig,
        pool: rayon::ThreadPool,
        positions: Vec<Vec3>,
        velocities: Vec<Vec3>,
    ) -> Result<Self, SimulationError> {
        let grid = GridParams::from_config(&config)?;

        let (engine, host_positions, host_velocities) = match config.backend {
            Backend::Cpu => {
                let flock = CpuFlock::new(pool, &grid, positions, velocities)?;
                log::info!(
                    "Initialized {} particles on the CPU backend ({} workers)",
                    config.particle_count,
                    flock.worker_count()
                );
                (Engine::Cpu(flock), Vec::new(), Vec::new())
            }
            Backend::Gpu => {
                let flock = GpuFlock::new(&grid, &config.rules, &positions, &velocities)?;
                log::info!(
                    "Initialized {} particles on the GPU backend ({})",
                    config.particle_count,
                    flock.adapter_name()
                );
                (Engine::Gpu(Box::new(flock)), positions, velocities)
            }
        };
        log::info!(
            "Grid: {}³ cells ({} total) of width {}, min corner {}",
            grid.side_count,
            grid.cell_count,
            grid.cell_width,
            grid.grid_min.x
        );

        Ok(Self {
            strategy: config.strategy,
            config,
            grid,
            state: SimState::Initialized,
            frame: 0,
            engine: Some(engine),
            host_positions,
            host_velocities,
            warned_displacement: false,
        })
    }

    /// Advance one frame with the current strategy.
    pub fn step(&mut self, dt: f32) -> Result<(), SimulationError> {
        self.step_with(self.strategy, dt)
    }

    /// Advance one frame with `strategy`, leaving the current strategy
    /// unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the simulation has been torn down.
    pub fn step_with(&mut self, strategy: Strategy, dt: f32) -> Result<(), SimulationError> {
        assert!(self.state != SimState::TornDown, "Simulation::step called after teardown");

        if !dt.is_finite() {
            return Err(SimulationError::InvalidConfig(format!("time step must be finite, got {}", dt)));
        }

        let displacement = self.config.rules.max_speed * dt.abs();
        if displacement >= 2.0 * self.config.half_extent && !self.warned_displacement {
            log::warn!(
                "max_speed * dt = {} spans the whole domain; a single wrap may leave particles outside it",
                displacement
            );
            self.warned_displacement = true;
        }

        let started = Instant::now();
        let sweep = self.config.sweep;
        match self.engine.as_mut() {
            Some(Engine::Cpu(flock)) => flock.step(strategy, sweep, &self.grid, &self.config.rules, dt),
            Some(Engine::Gpu(flock)) => flock.step(strategy, sweep, dt)?,
            None => unreachable!("engine is only released at teardown"),
        }

        self.frame += 1;
        self.state = SimState::Stepping;
        log::debug!(
            "frame {}: {} dt={} in {:?}",
            self.frame,
            strategy.name(),
            dt,
            started.elapsed()
        );
        Ok(())
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// Number of completed steps.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn grid_params(&self) -> &GridParams {
        &self.grid
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    pub fn particle_count(&self) -> usize {
        self.config.particle_count as usize
    }

    /// Current positions and velocities. The GPU backend copies them back
    /// to host memory first.
    ///
    /// # Panics
    ///
    /// Panics if the simulation has been torn down.
    pub fn snapshot(&mut self) -> Result<Snapshot<'_>, SimulationError> {
        let Self { engine, host_positions, host_velocities, frame, .. } = self;
        match engine {
            Some(Engine::Cpu(flock)) => Ok(Snapshot {
                positions: &flock.positions,
                velocities: flock.current_velocities(),
                frame: *frame,
            }),
            Some(Engine::Gpu(flock)) => {
                flock.read_state(host_positions, host_velocities)?;
                Ok(Snapshot {
                    positions: host_positions,
                    velocities: host_velocities,
                    frame: *frame,
                })
            }
            None => panic!("Simulation::snapshot called after teardown"),
        }
    }

    /// Grid tables from the most recent grid-based step on the CPU backend.
    /// `None` before any grid-based step, on the GPU backend and after
    /// teardown.
    pub fn grid_tables(&self) -> Option<&GridTables> {
        match self.engine.as_ref() {
            Some(Engine::Cpu(flock)) => flock.tables(),
            _ => None,
        }
    }

    /// Release every buffer. Further steps panic; calling this again is a
    /// no-op.
    pub fn teardown(&mut self) {
        if self.state == SimState::TornDown {
            return;
        }
        self.engine = None;
        self.host_positions = Vec::new();
        self.host_velocities = Vec::new();
        self.state = SimState::TornDown;
        log::info!("Simulation torn down after {} frames", self.frame);
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> FlockConfig {
        FlockConfig::new().with_particle_count(200).with_seed(3).with_threads(2)
    }

    #[test]
    fn test_initialize_seeds_inside_domain() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        assert_eq!(sim.state(), SimState::Initialized);
        assert_eq!(sim.grid_params().side_count, 22);

        let snapshot = sim.snapshot().unwrap();
        assert_eq!(snapshot.len(), 200);
        assert!(snapshot.positions().iter().all(|p| p.abs().max_element() <= 100.0));
        assert!(snapshot.velocities().iter().all(|&v| v == Vec3::ZERO));
    }

    #[test]
    fn test_same_seed_same_state() {
        let mut a = Simulation::initialize(small_config()).unwrap();
        let mut b = Simulation::initialize(small_config()).unwrap();
        assert_eq!(a.snapshot().unwrap().positions(), b.snapshot().unwrap().positions());

        let mut c = Simulation::initialize(small_config().with_seed(4)).unwrap();
        assert_ne!(a.snapshot().unwrap().positions(), c.snapshot().unwrap().positions());
    }

    #[test]
    fn test_step_advances_frame_and_state() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        sim.step(1.0).unwrap();
        sim.step_with(Strategy::BruteForce, 1.0).unwrap();
        assert_eq!(sim.frame(), 2);
        assert_eq!(sim.state(), SimState::Stepping);
        assert_eq!(sim.strategy(), Strategy::CoherentGrid);
        assert_eq!(sim.snapshot().unwrap().frame(), 2);
    }

    #[test]
    fn test_non_finite_dt_rejected() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        let err = sim.step(f32::NAN).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
        assert_eq!(sim.frame(), 0);
    }

    #[test]
    fn test_from_state_rejects_bad_input() {
        let config = FlockConfig::new();
        let mismatch = Simulation::from_state(config.clone(), vec![Vec3::ZERO; 2], vec![Vec3::ZERO]);
        assert!(matches!(mismatch, Err(SimulationError::InvalidConfig(_))));

        let outside = Simulation::from_state(config.clone(), vec![Vec3::new(0.0, 150.0, 0.0)], vec![Vec3::ZERO]);
        assert!(matches!(outside, Err(SimulationError::InvalidConfig(_))));

        let empty = Simulation::from_state(config, Vec::new(), Vec::new());
        assert!(matches!(empty, Err(SimulationError::InvalidConfig(_))));
    }

    #[test]
    fn test_no_grid_tables_before_grid_step() {
        let mut sim = Simulation::initialize(small_config().with_particle_count(50)).unwrap();
        assert!(sim.grid_tables().is_none());

        sim.step_with(Strategy::BruteForce, 1.0).unwrap();
        assert!(sim.grid_tables().is_none());

        sim.step_with(Strategy::ScatteredGrid, 1.0).unwrap();
        let tables = sim.grid_tables().unwrap();
        for (slot, &cell) in tables.grid_index().iter().enumerate() {
            let head = tables.cell_head(cell) as usize;
            assert!(head <= slot);
            assert_eq!(tables.grid_index()[head], cell);
        }

        // Tables from the last grid step stay visible through brute-force steps
        sim.step_with(Strategy::BruteForce, 1.0).unwrap();
        assert!(sim.grid_tables().is_some());
    }

    #[test]
    fn test_seeding_independent_of_thread_count() {
        let mut one = Simulation::initialize(small_config().with_threads(1)).unwrap();
        let mut four = Simulation::initialize(small_config().with_threads(4)).unwrap();
        assert_eq!(one.snapshot().unwrap().positions(), four.snapshot().unwrap().positions());
    }

    #[test]
    fn test_grid_tables_follow_last_step() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        sim.step_with(Strategy::ScatteredGrid, 1.0).unwrap();
        let tables = sim.grid_tables().unwrap();
        assert_eq!(tables.len(), 200);
        assert!(tables.grid_index().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        sim.teardown();
        sim.teardown();
        assert_eq!(sim.state(), SimState::TornDown);
        assert!(sim.grid_tables().is_none());
    }

    #[test]
    #[should_panic(expected = "after teardown")]
    fn test_step_after_teardown_panics() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        sim.teardown();
        let _ = sim.step(1.0);
    }

    #[test]
    #[should_panic(expected = "after teardown")]
    fn test_snapshot_after_teardown_panics() {
        let mut sim = Simulation::initialize(small_config()).unwrap();
        sim.teardown();
        let _ = sim.snapshot();
    }
}
