//! Spatial grid indexer: one independent unit per particle.

use glam::Vec3;
use rayon::prelude::*;

use crate::spatial::GridParams;

/// Write `particle_index[i] = i` and `grid_index[i]` = id of the cell
/// containing `positions[i]` ([`NO_CELL`](crate::spatial::NO_CELL) when
/// outside the grid).
pub fn index_particles(grid: &GridParams, positions: &[Vec3], particle_index: &mut [u32], grid_index: &mut [u32]) {
    debug_assert_eq!(positions.len(), particle_index.len());
    debug_assert_eq!(positions.len(), grid_index.len());

    particle_index
        .par_iter_mut()
        .zip(grid_index.par_iter_mut())
        .zip(positions.par_iter())
        .enumerate()
        .for_each(|(i, ((pi, gi), &pos))| {
            *pi = i as u32;
            *gi = grid.cell_of(pos);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::NO_CELL;

    #[test]
    fn test_index_particles() {
        let grid = GridParams::new(100.0, 5.0).unwrap();
        let positions = [Vec3::ZERO, Vec3::new(-105.0, -105.0, -105.0), Vec3::splat(1000.0)];
        let mut pi = [9u32; 3];
        let mut gi = [9u32; 3];
        index_particles(&grid, &positions, &mut pi, &mut gi);

        assert_eq!(pi, [0, 1, 2]);
        // (0 + 110) / 10 = 11 on every axis
        assert_eq!(gi[0], 11 + 11 * 22 + 11 * 22 * 22);
        assert_eq!(gi[1], 0);
        assert_eq!(gi[2], NO_CELL);
    }
}
