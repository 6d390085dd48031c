//! Simulation configuration.
//!
//! [`FlockConfig`] carries everything the simulation consumes from outside:
//! particle count, domain size, seed and the flocking rule constants. It is
//! validated once at initialization and never mutated afterwards, except for
//! the per-step strategy choice.

use crate::error::SimulationError;

/// Constants for the three flocking rules and the speed cap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuleParams {
    /// Neighbors closer than this pull the particle toward their center.
    pub cohesion_radius: f32,
    /// Neighbors closer than this push the particle away.
    pub separation_radius: f32,
    /// Neighbors closer than this contribute their velocity to the average.
    pub alignment_radius: f32,
    /// Scale applied to the cohesion offset.
    pub cohesion_scale: f32,
    /// Scale applied to the summed separation offsets.
    pub separation_scale: f32,
    /// Scale applied to the average neighbor velocity.
    pub alignment_scale: f32,
    /// Velocity magnitude is clamped to this after every update.
    pub max_speed: f32,
    /// Outer distance bound for separation, checked alongside `separation_radius`.
    pub separation_guard: f32,
}

impl Default for RuleParams {
    fn default() -> Self {
        Self {
            cohesion_radius: 5.0,
            separation_radius: 3.0,
            alignment_radius: 5.0,
            cohesion_scale: 0.01,
            separation_scale: 0.1,
            alignment_scale: 0.1,
            max_speed: 1.0,
            separation_guard: 100.0,
        }
    }
}

impl RuleParams {
    /// Largest of the three interaction radii.
    pub fn max_radius(&self) -> f32 {
        self.cohesion_radius.max(self.separation_radius).max(self.alignment_radius)
    }

    fn validate(&self) -> Result<(), SimulationError> {
        let radii = [
            ("cohesion_radius", self.cohesion_radius),
            ("separation_radius", self.separation_radius),
            ("alignment_radius", self.alignment_radius),
            ("max_speed", self.max_speed),
            ("separation_guard", self.separation_guard),
        ];
        for (name, value) in radii {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimulationError::InvalidConfig(format!(
                    "{} must be finite and positive, got {}",
                    name, value
                )));
            }
        }
        let scales = [
            ("cohesion_scale", self.cohesion_scale),
            ("separation_scale", self.separation_scale),
            ("alignment_scale", self.alignment_scale),
        ];
        for (name, value) in scales {
            if !value.is_finite() {
                return Err(SimulationError::InvalidConfig(format!("{} must be finite, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// How the neighbor set of each particle is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Scan every other particle. O(N²), no grid.
    BruteForce,
    /// Walk neighboring grid cells, reaching particle data through the
    /// sorted particle index.
    ScatteredGrid,
    /// Walk neighboring grid cells over particle data reordered into cell
    /// order, then copy the results back to id order.
    #[default]
    CoherentGrid,
}

impl Strategy {
    /// All strategies, in increasing order of sophistication.
    pub const ALL: [Strategy; 3] = [Strategy::BruteForce, Strategy::ScatteredGrid, Strategy::CoherentGrid];

    /// Whether the strategy needs the spatial grid tables.
    pub fn uses_grid(self) -> bool {
        !matches!(self, Strategy::BruteForce)
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::BruteForce => "brute-force",
            Strategy::ScatteredGrid => "scattered-grid",
            Strategy::CoherentGrid => "coherent-grid",
        }
    }
}

/// Which cells around a particle's own cell the grid strategies visit.
///
/// Neither sweep looks across the wrapping domain boundary: a particle near
/// one face never sees particles near the opposite face, even though
/// positions wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellSweep {
    /// The full 3×3×3 block centered on the particle's cell.
    #[default]
    Full,
    /// The 2×2×2 block extending toward the half of the cell the particle
    /// sits in. Sees the same in-radius neighbors as `Full` because cells
    /// are twice the largest radius wide.
    Octant,
}

/// Where the per-step stages execute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Data-parallel on a dedicated rayon pool.
    #[default]
    Cpu,
    /// WGSL compute kernels on a wgpu device.
    Gpu,
}

/// Full simulation configuration.
///
/// ```ignore
/// let config = FlockConfig::new()
///     .with_particle_count(5_000)
///     .with_seed(7)
///     .with_strategy(Strategy::ScatteredGrid);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FlockConfig {
    pub particle_count: u32,
    /// Half the side length of the cubic domain centered on the origin.
    pub half_extent: f32,
    pub seed: u64,
    /// Initial velocities are drawn uniformly from a ball of this radius.
    pub initial_speed: f32,
    pub rules: RuleParams,
    pub strategy: Strategy,
    pub sweep: CellSweep,
    pub backend: Backend,
    /// Worker threads for seeding and the CPU backend. `None` uses rayon's
    /// default.
    pub threads: Option<usize>,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            particle_count: 5_000,
            half_extent: 100.0,
            seed: 0,
            initial_speed: 0.0,
            rules: RuleParams::default(),
            strategy: Strategy::default(),
            sweep: CellSweep::default(),
            backend: Backend::default(),
            threads: None,
        }
    }
}

impl FlockConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of particles.
    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    /// Set the domain half-extent (cube from -half_extent to +half_extent).
    pub fn with_half_extent(mut self, half_extent: f32) -> Self {
        self.half_extent = half_extent;
        self
    }

    /// Set the seed for initial positions and velocities.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the radius of the ball initial velocities are drawn from.
    pub fn with_initial_speed(mut self, speed: f32) -> Self {
        self.initial_speed = speed;
        self
    }

    /// Replace the flocking rule constants.
    pub fn with_rules(mut self, rules: RuleParams) -> Self {
        self.rules = rules;
        self
    }

    /// Set the strategy used by [`Simulation::step`](crate::Simulation::step).
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set which neighbor cells the grid strategies visit.
    pub fn with_sweep(mut self, sweep: CellSweep) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Pin the CPU backend to a fixed number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Check the configuration for values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.particle_count == 0 {
            return Err(SimulationError::InvalidConfig("particle_count must be at least 1".into()));
        }
        if !(self.half_extent.is_finite() && self.half_extent > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "half_extent must be finite and positive, got {}",
                self.half_extent
            )));
        }
        if !(self.initial_speed.is_finite() && self.initial_speed >= 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "initial_speed must be finite and non-negative, got {}",
                self.initial_speed
            )));
        }
        if self.threads == Some(0) {
            return Err(SimulationError::InvalidConfig("threads must be at least 1".into()));
        }
        self.rules.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = RuleParams::default();
        assert_eq!(rules.max_radius(), 5.0);
        assert_eq!(rules.max_speed, 1.0);
        assert_eq!(rules.separation_guard, 100.0);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FlockConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_particles_rejected() {
        let err = FlockConfig::new().with_particle_count(0).validate().unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
    }

    #[test]
    fn test_negative_radius_rejected() {
        let rules = RuleParams { separation_radius: -1.0, ..Default::default() };
        let err = FlockConfig::new().with_rules(rules).validate().unwrap_err();
        assert!(err.to_string().contains("separation_radius"));
    }

    #[test]
    fn test_nan_half_extent_rejected() {
        assert!(FlockConfig::new().with_half_extent(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_strategy_uses_grid() {
        assert!(!Strategy::BruteForce.uses_grid());
        assert!(Strategy::ScatteredGrid.uses_grid());
        assert!(Strategy::CoherentGrid.uses_grid());
    }
}
