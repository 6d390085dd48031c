//! Grid neighbor search over particle data reordered into cell order.
//!
//! Positions and velocities are gathered into sorted order once per step so
//! candidates are read at their sorted slot directly. After integration the
//! results are scattered back to particle id order.

use glam::Vec3;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use super::for_each_candidate_slot;
use crate::config::{CellSweep, RuleParams};
use crate::error::{try_alloc, try_alloc_with, SimulationError};
use crate::grid::GridTables;
use crate::rules::RuleAccumulator;
use crate::spatial::GridParams;

/// Scratch arena for the coherent strategy, fully rewritten every step.
pub struct CoherentBuffers {
    pub(crate) positions: Vec<Vec3>,
    pub(crate) velocities: Vec<Vec3>,
    pub(crate) next: Vec<Vec3>,
    inverse: Vec<AtomicU32>,
}

impl CoherentBuffers {
    pub(crate) fn new(particle_count: usize) -> Result<Self, SimulationError> {
        Ok(Self {
            positions: try_alloc("coherent positions", particle_count, Vec3::ZERO)?,
            velocities: try_alloc("coherent velocities", particle_count, Vec3::ZERO)?,
            next: try_alloc("coherent next velocities", particle_count, Vec3::ZERO)?,
            inverse: try_alloc_with("inverse particle index", particle_count, || AtomicU32::new(0))?,
        })
    }
}

/// Gather positions and velocities into sorted slot order.
pub fn reorder(
    particle_index: &[u32],
    positions: &[Vec3],
    velocities: &[Vec3],
    sorted_positions: &mut [Vec3],
    sorted_velocities: &mut [Vec3],
) {
    sorted_positions
        .par_iter_mut()
        .zip(sorted_velocities.par_iter_mut())
        .zip(particle_index.par_iter())
        .for_each(|((pos, vel), &id)| {
            *pos = positions[id as usize];
            *vel = velocities[id as usize];
        });
}

/// Compute next velocities for every sorted slot, reading candidates at
/// their sorted slot with no indirection.
pub fn update_velocities(
    rules: &RuleParams,
    grid: &GridParams,
    sweep: CellSweep,
    tables: &GridTables,
    sorted_positions: &[Vec3],
    sorted_velocities: &[Vec3],
    sorted_next: &mut [Vec3],
) {
    sorted_next.par_iter_mut().enumerate().for_each(|(k, out)| {
        let focal = sorted_positions[k];
        let mut acc = RuleAccumulator::new(focal);
        for_each_candidate_slot(grid, sweep, tables, focal, |slot| {
            if slot != k {
                acc.visit(rules, sorted_positions[slot], sorted_velocities[slot]);
            }
        });
        *out = acc.finish(rules, sorted_velocities[k]);
    });
}

/// Copy sorted results back to particle id order.
///
/// The inverse permutation is built with one store per slot (every
/// particle id appears exactly once), then each particle gathers its own
/// values.
pub fn scatter_back(
    particle_index: &[u32],
    buffers: &CoherentBuffers,
    positions: &mut [Vec3],
    velocities: &mut [Vec3],
) {
    let inverse = &buffers.inverse;
    particle_index
        .par_iter()
        .enumerate()
        .for_each(|(slot, &id)| inverse[id as usize].store(slot as u32, Ordering::Relaxed));

    positions
        .par_iter_mut()
        .zip(velocities.par_iter_mut())
        .zip(inverse.par_iter())
        .for_each(|((pos, vel), slot)| {
            let slot = slot.load(Ordering::Relaxed) as usize;
            *pos = buffers.positions[slot];
            *vel = buffers.next[slot];
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_then_scatter_back_restores_order() {
        let particle_index = [2u32, 0, 3, 1];
        let positions = vec![Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE];
        let velocities = vec![Vec3::splat(0.1), Vec3::splat(0.2), Vec3::splat(0.3), Vec3::splat(0.4)];

        let mut buffers = CoherentBuffers::new(4).unwrap();
        reorder(&particle_index, &positions, &velocities, &mut buffers.positions, &mut buffers.velocities);
        assert_eq!(buffers.positions, vec![Vec3::Z, Vec3::X, Vec3::ONE, Vec3::Y]);

        buffers.next.copy_from_slice(&buffers.velocities);
        let mut out_pos = vec![Vec3::ZERO; 4];
        let mut out_vel = vec![Vec3::ZERO; 4];
        scatter_back(&particle_index, &buffers, &mut out_pos, &mut out_vel);
        assert_eq!(out_pos, positions);
        assert_eq!(out_vel, velocities);
    }
}
