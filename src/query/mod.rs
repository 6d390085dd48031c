//! Neighbor query evaluators.
//!
//! Each strategy computes every particle's next velocity from a read-only
//! snapshot of the current positions and velocities, writing only that
//! particle's slot of the output. Strategies differ in which candidates
//! they feed to the [`RuleAccumulator`](crate::rules::RuleAccumulator):
//!
//! - [`brute_force`]: every other particle
//! - [`scattered`]: particles in neighboring cells, read through the
//!   sorted particle index
//! - [`coherent`]: particles in neighboring cells, read from buffers
//!   reordered into cell order

pub mod brute_force;
pub mod coherent;
pub mod scattered;

use glam::Vec3;

use crate::config::CellSweep;
use crate::grid::GridTables;
use crate::spatial::{GridParams, NO_CELL};

/// Call `visit` with every sorted slot in the cells around `focal_pos`.
///
/// Off-grid cells and empty cells are skipped before any table lookup.
#[inline]
pub(crate) fn for_each_candidate_slot(
    grid: &GridParams,
    sweep: CellSweep,
    tables: &GridTables,
    focal_pos: Vec3,
    mut visit: impl FnMut(usize),
) {
    for &cell in grid.neighbor_cells(focal_pos, sweep).iter() {
        if cell == NO_CELL {
            continue;
        }
        let Some(slots) = tables.cell_slots(cell) else {
            continue;
        };
        for slot in slots {
            visit(slot);
        }
    }
}
