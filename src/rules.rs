//! Flocking rules: cohesion, separation and alignment.
//!
//! A [`RuleAccumulator`] is fed every candidate neighbor of one focal
//! particle, in any order, and then turned into the particle's new velocity.
//! Which candidates it sees is up to the query strategy.

use glam::Vec3;

use crate::config::RuleParams;

/// Running sums for the three rules around one focal particle.
#[derive(Clone, Copy, Debug)]
pub struct RuleAccumulator {
    focal: Vec3,
    center_sum: Vec3,
    center_count: u32,
    separation: Vec3,
    velocity_sum: Vec3,
    velocity_count: u32,
}

impl RuleAccumulator {
    /// Start accumulating for a particle at `focal`.
    #[inline]
    pub fn new(focal: Vec3) -> Self {
        Self {
            focal,
            center_sum: Vec3::ZERO,
            center_count: 0,
            separation: Vec3::ZERO,
            velocity_sum: Vec3::ZERO,
            velocity_count: 0,
        }
    }

    /// Account for one neighbor. The caller excludes the focal particle itself.
    #[inline]
    pub fn visit(&mut self, rules: &RuleParams, other_pos: Vec3, other_vel: Vec3) {
        let offset = other_pos - self.focal;
        let dist = offset.length();

        if dist < rules.cohesion_radius {
            self.center_sum += other_pos;
            self.center_count += 1;
        }
        if dist < rules.separation_radius && dist < rules.separation_guard {
            self.separation -= offset;
        }
        if dist < rules.alignment_radius {
            self.velocity_sum += other_vel;
            self.velocity_count += 1;
        }
    }

    /// Velocity change from the three rules.
    pub fn velocity_change(&self, rules: &RuleParams) -> Vec3 {
        let cohesion = if self.center_count > 0 {
            let center = self.center_sum / self.center_count as f32;
            (center - self.focal) * rules.cohesion_scale
        } else {
            Vec3::ZERO
        };

        let separation = self.separation * rules.separation_scale;

        let alignment = if self.velocity_count > 0 {
            self.velocity_sum / self.velocity_count as f32 * rules.alignment_scale
        } else {
            Vec3::ZERO
        };

        cohesion + separation + alignment
    }

    /// New velocity: `velocity` plus the rule contributions, speed-capped.
    #[inline]
    pub fn finish(&self, rules: &RuleParams, velocity: Vec3) -> Vec3 {
        clamp_speed(velocity + self.velocity_change(rules), rules.max_speed)
    }
}

/// Rescale `velocity` to exactly `max_speed` if it is faster, keeping its
/// direction.
#[inline]
pub fn clamp_speed(velocity: Vec3, max_speed: f32) -> Vec3 {
    let speed = velocity.length();
    if speed > max_speed {
        velocity * (max_speed / speed)
    } else {
        velocity
    }
}

/// WGSL mirror of [`RuleAccumulator`] and [`clamp_speed`]. Expects a
/// `params` uniform carrying `rule_distance`, `rule_scale`,
/// `separation_guard` and `max_speed`.
pub const RULES_WGSL: &str = r#"
struct RuleAccumulator {
    focal: vec3<f32>,
    center_sum: vec3<f32>,
    center_count: u32,
    separation: vec3<f32>,
    velocity_sum: vec3<f32>,
    velocity_count: u32,
};

fn rules_begin(focal: vec3<f32>) -> RuleAccumulator {
    return RuleAccumulator(focal, vec3<f32>(0.0), 0u, vec3<f32>(0.0), vec3<f32>(0.0), 0u);
}

fn rules_visit(acc: ptr<function, RuleAccumulator>, other_pos: vec3<f32>, other_vel: vec3<f32>) {
    let offset = other_pos - (*acc).focal;
    let dist = length(offset);

    if dist < params.rule_distance.x {
        (*acc).center_sum += other_pos;
        (*acc).center_count += 1u;
    }
    if dist < params.rule_distance.y && dist < params.separation_guard {
        (*acc).separation -= offset;
    }
    if dist < params.rule_distance.z {
        (*acc).velocity_sum += other_vel;
        (*acc).velocity_count += 1u;
    }
}

fn clamp_speed(v: vec3<f32>) -> vec3<f32> {
    let speed = length(v);
    if speed > params.max_speed {
        return v * (params.max_speed / speed);
    }
    return v;
}

fn rules_finish(acc: RuleAccumulator, velocity: vec3<f32>) -> vec3<f32> {
    var cohesion = vec3<f32>(0.0);
    if acc.center_count > 0u {
        let center = acc.center_sum / f32(acc.center_count);
        cohesion = (center - acc.focal) * params.rule_scale.x;
    }

    let separation = acc.separation * params.rule_scale.y;

    var alignment = vec3<f32>(0.0);
    if acc.velocity_count > 0u {
        alignment = acc.velocity_sum / f32(acc.velocity_count) * params.rule_scale.z;
    }

    return clamp_speed(velocity + cohesion + separation + alignment);
}
"#;
