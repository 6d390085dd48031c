//! Host backend: every stage runs data-parallel on a dedicated rayon pool.
//!
//! Each rayon call returns only once all of its units have finished, which
//! provides the global barriers between stages.

use glam::Vec3;
use std::time::Instant;

use crate::config::{CellSweep, FlockConfig, RuleParams, Strategy};
use crate::error::{try_alloc, SimulationError};
use crate::grid::GridTables;
use crate::integrate::integrate_positions;
use crate::ping_pong::PingPong;
use crate::query::coherent::{self, CoherentBuffers};
use crate::query::{brute_force, scattered};
use crate::spatial::GridParams;

/// Particle state and grid tables for the host backend.
pub(crate) struct CpuFlock {
    pool: rayon::ThreadPool,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) velocities: PingPong<Vec<Vec3>>,
    tables: GridTables,
    // Set by the first grid-based step; until then `tables` holds placeholders
    grid_built: bool,
    coherent: CoherentBuffers,
}

/// Worker pool sized by `config.threads`. Seeding and stepping both run on it.
pub(crate) fn worker_pool(config: &FlockConfig) -> Result<rayon::ThreadPool, SimulationError> {
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("boidgrid-worker-{}", i));
    if let Some(threads) = config.threads {
        builder = builder.num_threads(threads);
    }
    Ok(builder.build()?)
}

impl CpuFlock {
    pub(crate) fn new(
        pool: rayon::ThreadPool,
        grid: &GridParams,
        positions: Vec<Vec3>,
        velocities: Vec<Vec3>,
    ) -> Result<Self, SimulationError> {
        let n = positions.len();
        let next = try_alloc("next velocities", n, Vec3::ZERO)?;
        let tables = GridTables::new(n, grid)?;
        let coherent = CoherentBuffers::new(n)?;

        Ok(Self {
            pool,
            positions,
            velocities: PingPong::new(velocities, next),
            tables,
            grid_built: false,
            coherent,
        })
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Grid tables of the last grid-based step, if one has run.
    pub(crate) fn tables(&self) -> Option<&GridTables> {
        self.grid_built.then_some(&self.tables)
    }

    pub(crate) fn current_velocities(&self) -> &[Vec3] {
        self.velocities.current()
    }

    /// Run one full pipeline: index, sort, tables, query, integrate, swap.
    pub(crate) fn step(
        &mut self,
        strategy: Strategy,
        sweep: CellSweep,
        grid: &GridParams,
        rules: &RuleParams,
        dt: f32,
    ) {
        let Self { pool, positions, velocities, tables, grid_built, coherent: scratch } = self;

        pool.install(|| {
            if strategy.uses_grid() {
                let started = Instant::now();
                tables.rebuild(grid, positions);
                log::trace!("grid rebuild: {:?}", started.elapsed());
            }

            let started = Instant::now();
            let (current, next) = velocities.split();
            match strategy {
                Strategy::BruteForce => {
                    brute_force::update_velocities(rules, positions, current, next);
                    integrate_positions(positions, next, dt, grid.half_extent);
                }
                Strategy::ScatteredGrid => {
                    scattered::update_velocities(rules, grid, sweep, tables, positions, current, next);
                    integrate_positions(positions, next, dt, grid.half_extent);
                }
                Strategy::CoherentGrid => {
                    let particle_index = tables.particle_index();
                    coherent::reorder(
                        particle_index,
                        positions,
                        current,
                        &mut scratch.positions,
                        &mut scratch.velocities,
                    );
                    coherent::update_velocities(
                        rules,
                        grid,
                        sweep,
                        tables,
                        &scratch.positions,
                        &scratch.velocities,
                        &mut scratch.next,
                    );
                    integrate_positions(&mut scratch.positions, &scratch.next, dt, grid.half_extent);
                    coherent::scatter_back(particle_index, scratch, positions, next);
                }
            }
            log::trace!("{} query + integrate: {:?}", strategy.name(), started.elapsed());
        });

        velocities.swap();
        *grid_built |= strategy.uses_grid();
    }
}
