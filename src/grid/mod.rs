//! Spatial grid tables, rebuilt from scratch every step.
//!
//! Stages run in order, each a full barrier before the next:
//! 1. [`index_particles`] computes each particle's cell id
//! 2. [`sort_by_cell`] buckets `(cell id, particle id)` pairs by cell
//! 3. [`build_cell_ranges`] finds each sorted position's run bounds
//! 4. [`build_cell_heads`] maps cell ids to their first sorted position

mod cell_table;
mod indexer;
mod sort;

use glam::Vec3;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

pub use cell_table::{build_cell_heads, build_cell_ranges};
pub use indexer::index_particles;
pub use sort::sort_by_cell;

use crate::error::{try_alloc, try_alloc_with, SimulationError};
use crate::spatial::{GridParams, EMPTY_CELL};

/// Co-sorted particle/cell tables plus the range and head lookups built
/// from them.
pub struct GridTables {
    particle_index: Vec<u32>,
    grid_index: Vec<u32>,
    cell_start: Vec<u32>,
    cell_end: Vec<u32>,
    cell_heads: Vec<AtomicU32>,
    sort_scratch: Vec<(u32, u32)>,
}

impl GridTables {
    pub(crate) fn new(particle_count: usize, grid: &GridParams) -> Result<Self, SimulationError> {
        let mut sort_scratch = Vec::new();
        sort_scratch
            .try_reserve_exact(particle_count)
            .map_err(|_| SimulationError::Allocation {
                what: "sort scratch",
                bytes: particle_count * std::mem::size_of::<(u32, u32)>(),
            })?;

        Ok(Self {
            particle_index: try_alloc("particle index", particle_count, 0u32)?,
            grid_index: try_alloc("grid index", particle_count, 0u32)?,
            cell_start: try_alloc("cell start", particle_count, 0u32)?,
            cell_end: try_alloc("cell end", particle_count, 0u32)?,
            cell_heads: try_alloc_with("cell head lookup", grid.cell_count as usize, || AtomicU32::new(EMPTY_CELL))?,
            sort_scratch,
        })
    }

    /// Rebuild every table from the current positions.
    pub(crate) fn rebuild(&mut self, grid: &GridParams, positions: &[Vec3]) {
        index_particles(grid, positions, &mut self.particle_index, &mut self.grid_index);
        sort_by_cell(&mut self.grid_index, &mut self.particle_index, &mut self.sort_scratch);
        build_cell_ranges(&self.grid_index, &mut self.cell_start, &mut self.cell_end);
        build_cell_heads(&self.grid_index, &self.cell_start, &self.cell_heads);
    }

    /// Number of sorted slots (equals the particle count).
    pub fn len(&self) -> usize {
        self.grid_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid_index.is_empty()
    }

    /// Original particle id occupying each sorted slot.
    pub fn particle_index(&self) -> &[u32] {
        &self.particle_index
    }

    /// Cell id of each sorted slot, non-decreasing.
    pub fn grid_index(&self) -> &[u32] {
        &self.grid_index
    }

    /// First sorted slot sharing each slot's cell id.
    pub fn cell_start(&self) -> &[u32] {
        &self.cell_start
    }

    /// Last sorted slot sharing each slot's cell id.
    pub fn cell_end(&self) -> &[u32] {
        &self.cell_end
    }

    /// Number of entries in the cell head lookup.
    pub fn cell_count(&self) -> usize {
        self.cell_heads.len()
    }

    /// First sorted slot of `cell`, or [`EMPTY_CELL`] if the cell holds no
    /// particles or is not a valid id.
    #[inline]
    pub fn cell_head(&self, cell: u32) -> u32 {
        self.cell_heads
            .get(cell as usize)
            .map_or(EMPTY_CELL, |head| head.load(Ordering::Relaxed))
    }

    /// Sorted slots occupied by `cell`, or `None` for off-grid and empty cells.
    #[inline]
    pub fn cell_slots(&self, cell: u32) -> Option<Range<usize>> {
        let head = self.cell_head(cell);
        if head == EMPTY_CELL {
            return None;
        }
        let head = head as usize;
        Some(head..self.cell_end[head] as usize + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::NO_CELL;

    #[test]
    fn test_rebuild_groups_particles_by_cell() {
        let grid = GridParams::new(100.0, 5.0).unwrap();
        let positions = vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(50.0, 50.0, 50.0),
            Vec3::new(2.0, 2.0, 2.0),
            Vec3::new(-50.0, 0.0, 0.0),
        ];
        let mut tables = GridTables::new(positions.len(), &grid).unwrap();
        tables.rebuild(&grid, &positions);

        assert!(tables.grid_index().windows(2).all(|w| w[0] <= w[1]));

        let shared = grid.cell_of(positions[0]);
        let slots = tables.cell_slots(shared).unwrap();
        assert_eq!(slots.len(), 2);
        let mut ids: Vec<u32> = slots.map(|s| tables.particle_index()[s]).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 2]);

        assert_eq!(tables.cell_slots(grid.cell_of(Vec3::new(-90.0, 90.0, 0.0))), None);
        assert_eq!(tables.cell_slots(NO_CELL), None);
    }

    #[test]
    fn test_head_matches_first_slot_of_each_cell() {
        let grid = GridParams::new(100.0, 5.0).unwrap();
        let positions: Vec<Vec3> = (0..40).map(|i| Vec3::splat((i % 7) as f32 * 9.0 - 30.0)).collect();
        let mut tables = GridTables::new(positions.len(), &grid).unwrap();
        tables.rebuild(&grid, &positions);

        for (slot, &cell) in tables.grid_index().iter().enumerate() {
            let first = tables.grid_index().iter().position(|&c| c == cell).unwrap();
            assert_eq!(tables.cell_head(cell) as usize, first);
            assert_eq!(tables.cell_start()[slot] as usize, first);
        }
    }
}
