//! Brute-force neighbor search: every particle against every other.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::RuleParams;
use crate::rules::RuleAccumulator;

/// Compute next velocities by scanning all `N - 1` other particles.
pub fn update_velocities(rules: &RuleParams, positions: &[Vec3], velocities: &[Vec3], next: &mut [Vec3]) {
    next.par_iter_mut().enumerate().for_each(|(i, out)| {
        let mut acc = RuleAccumulator::new(positions[i]);
        for (j, (&pos, &vel)) in positions.iter().zip(velocities).enumerate() {
            if j != i {
                acc.visit(rules, pos, vel);
            }
        }
        *out = acc.finish(rules, velocities[i]);
    });
}
