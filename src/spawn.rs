//! Random initial state.
//!
//! Every particle draws from its own RNG seeded by `(seed, id)`, so seeding
//! runs one independent unit per particle and the result does not depend on
//! how those units are scheduled.

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::f32::consts::TAU;

use crate::config::FlockConfig;

/// Per-particle random source with helpers for common spawn shapes.
pub(crate) struct SpawnContext {
    half_extent: f32,
    rng: SmallRng,
}

impl SpawnContext {
    /// Create the spawn context for particle `index` under `seed`.
    pub fn new(seed: u64, index: u32, half_extent: f32) -> Self {
        Self {
            half_extent,
            rng: SmallRng::seed_from_u64(mix_seed(seed, index)),
        }
    }

    /// Random point inside a cube of given half-size, centered at origin.
    pub fn random_in_cube(&mut self, half_size: f32) -> Vec3 {
        if half_size <= 0.0 {
            return Vec3::ZERO;
        }
        Vec3::new(
            self.rng.gen_range(-half_size..half_size),
            self.rng.gen_range(-half_size..half_size),
            self.rng.gen_range(-half_size..half_size),
        )
    }

    /// Random point within the simulation domain.
    pub fn random_in_bounds(&mut self) -> Vec3 {
        self.random_in_cube(self.half_extent)
    }

    /// Random point inside a sphere of given radius, uniform in volume.
    pub fn random_in_sphere(&mut self, radius: f32) -> Vec3 {
        if radius <= 0.0 {
            return Vec3::ZERO;
        }
        let theta = self.rng.gen_range(0.0..TAU);
        let cos_phi: f32 = self.rng.gen_range(-1.0..1.0);
        let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
        // Cube root for uniform volume distribution
        let r = radius * self.rng.gen::<f32>().cbrt();

        Vec3::new(r * sin_phi * theta.cos(), r * sin_phi * theta.sin(), r * cos_phi)
    }
}

/// SplitMix64 finalizer over the seed and particle id.
fn mix_seed(seed: u64, index: u32) -> u64 {
    let mut z = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fill `positions` and `velocities` with the seeded initial state.
pub(crate) fn seed_particles(config: &FlockConfig, positions: &mut [Vec3], velocities: &mut [Vec3]) {
    positions
        .par_iter_mut()
        .zip(velocities.par_iter_mut())
        .enumerate()
        .for_each(|(i, (pos, vel))| {
            let mut ctx = SpawnContext::new(config.seed, i as u32, config.half_extent);
            *pos = ctx.random_in_bounds();
            *vel = ctx.random_in_sphere(config.initial_speed);
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_in_sphere_bounds() {
        let mut ctx = SpawnContext::new(1, 0, 1.0);
        for _ in 0..100 {
            let pos = ctx.random_in_sphere(0.5);
            assert!(pos.length() <= 0.5 + 0.001);
        }
    }

    #[test]
    fn test_random_in_bounds_stays_inside() {
        let mut ctx = SpawnContext::new(3, 9, 100.0);
        for _ in 0..1000 {
            let pos = ctx.random_in_bounds();
            assert!(pos.abs().max_element() <= 100.0);
        }
    }

    #[test]
    fn test_same_seed_same_particle() {
        let a = SpawnContext::new(42, 17, 100.0).random_in_bounds();
        let b = SpawnContext::new(42, 17, 100.0).random_in_bounds();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_particles_reproducible() {
        let config = FlockConfig::new().with_particle_count(64).with_seed(5).with_initial_speed(1.0);
        let mut p1 = vec![Vec3::ZERO; 64];
        let mut v1 = vec![Vec3::ZERO; 64];
        let mut p2 = vec![Vec3::ZERO; 64];
        let mut v2 = vec![Vec3::ZERO; 64];
        seed_particles(&config, &mut p1, &mut v1);
        seed_particles(&config, &mut p2, &mut v2);
        assert_eq!(p1, p2);
        assert_eq!(v1, v2);
        assert!(v1.iter().all(|v| v.length() <= 1.0 + 1e-5));
        assert_ne!(p1[0], p1[1]);
    }

    #[test]
    fn test_zero_initial_speed_gives_zero_velocity() {
        let config = FlockConfig::new().with_particle_count(8);
        let mut p = vec![Vec3::ZERO; 8];
        let mut v = vec![Vec3::ONE; 8];
        seed_particles(&config, &mut p, &mut v);
        assert!(v.iter().all(|&v| v == Vec3::ZERO));
    }
}
