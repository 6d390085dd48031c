//! # boidgrid
//!
//! Boids flocking on a uniform spatial grid, with three interchangeable
//! neighbor-search strategies and a CPU (rayon) or GPU (wgpu compute)
//! backend.
//!
//! ## Quick Start
//!
//! ```ignore
//! use boidgrid::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let mut sim = Simulation::initialize(
//!         FlockConfig::new()
//!             .with_particle_count(5_000)
//!             .with_seed(42)
//!             .with_strategy(Strategy::CoherentGrid),
//!     )?;
//!
//!     for _ in 0..600 {
//!         sim.step(1.0)?;
//!     }
//!
//!     let snapshot = sim.snapshot()?;
//!     println!("first boid at {}", snapshot.positions()[0]);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Rules
//!
//! Every step, each particle's velocity changes by three contributions from
//! neighbors within a per-rule radius ([`RuleParams`]):
//!
//! - **Cohesion**: steer toward the average position of nearby particles
//! - **Separation**: push away from particles that are too close
//! - **Alignment**: match the average velocity of nearby particles
//!
//! The result is clamped to `max_speed`, then positions advance by
//! `velocity · dt` and wrap at the domain boundary.
//!
//! ### Strategies
//!
//! | Strategy | Candidates examined |
//! |----------|---------------------|
//! | [`Strategy::BruteForce`] | every other particle |
//! | [`Strategy::ScatteredGrid`] | particles in nearby cells, read through an index table |
//! | [`Strategy::CoherentGrid`] | the same cells, with state first copied into cell order |
//!
//! All three produce the same velocities up to floating-point summation
//! order.
//!
//! ### Grid
//!
//! Cells are twice as wide as the largest rule radius, so every neighbor a
//! rule can see lies in the 3×3×3 block around a particle's cell. The grid
//! tables ([`GridTables`]) are rebuilt from scratch each step.

mod config;
mod cpu;
mod error;
mod gpu;
pub mod grid;
mod integrate;
mod ping_pong;
pub mod query;
pub mod rules;
mod simulation;
pub mod spatial;
mod spawn;

pub use config::{Backend, CellSweep, FlockConfig, RuleParams, Strategy};
pub use error::{GpuError, SimulationError};
pub use glam::Vec3;
pub use gpu::GpuContext;
pub use grid::GridTables;
pub use integrate::{integrate_positions, wrap_position};
pub use ping_pong::PingPong;
pub use simulation::{SimState, Simulation, Snapshot};
pub use spatial::{GridParams, EMPTY_CELL, NO_CELL};

/// Common imports.
pub mod prelude {
    pub use crate::{
        Backend, CellSweep, FlockConfig, GridParams, RuleParams, SimState, Simulation, SimulationError,
        Snapshot, Strategy, Vec3,
    };
}
