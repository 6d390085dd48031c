//! Grid neighbor search reading particle data through the sorted index.

use glam::Vec3;
use rayon::prelude::*;

use super::for_each_candidate_slot;
use crate::config::{CellSweep, RuleParams};
use crate::grid::GridTables;
use crate::rules::RuleAccumulator;
use crate::spatial::GridParams;

/// Compute next velocities from particles in neighboring cells.
///
/// `positions` and `velocities` stay in particle id order; each candidate
/// slot is mapped to its particle through `tables.particle_index()`.
pub fn update_velocities(
    rules: &RuleParams,
    grid: &GridParams,
    sweep: CellSweep,
    tables: &GridTables,
    positions: &[Vec3],
    velocities: &[Vec3],
    next: &mut [Vec3],
) {
    let particle_index = tables.particle_index();

    next.par_iter_mut().enumerate().for_each(|(i, out)| {
        let focal = positions[i];
        let mut acc = RuleAccumulator::new(focal);
        for_each_candidate_slot(grid, sweep, tables, focal, |slot| {
            let j = particle_index[slot] as usize;
            if j != i {
                acc.visit(rules, positions[j], velocities[j]);
            }
        });
        *out = acc.finish(rules, velocities[i]);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::brute_force;

    #[test]
    fn test_matches_brute_force_on_cluster() {
        let rules = RuleParams::default();
        let grid = GridParams::new(100.0, rules.max_radius()).unwrap();
        let positions: Vec<Vec3> = (0..30)
            .map(|i| {
                let f = i as f32;
                Vec3::new((f * 1.7) % 12.0, (f * 2.3) % 9.0, (f * 0.9) % 7.0)
            })
            .collect();
        let velocities: Vec<Vec3> = (0..30).map(|i| Vec3::new(0.0, 0.01 * i as f32, 0.0)).collect();

        let mut tables = GridTables::new(positions.len(), &grid).unwrap();
        tables.rebuild(&grid, &positions);

        let mut expected = vec![Vec3::ZERO; 30];
        brute_force::update_velocities(&rules, &positions, &velocities, &mut expected);
        let mut actual = vec![Vec3::ZERO; 30];
        update_velocities(&rules, &grid, CellSweep::Full, &tables, &positions, &velocities, &mut actual);

        for (a, e) in actual.iter().zip(&expected) {
            assert!(a.abs_diff_eq(*e, 1e-5), "{:?} vs {:?}", a, *e);
        }
    }
}
