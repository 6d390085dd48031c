//! Position integrator with single-step boundary wrap.

use glam::Vec3;
use rayon::prelude::*;

/// A coordinate below `-half_extent` jumps to `+half_extent` and one above
/// `+half_extent` jumps to `-half_extent`. Only one wrap is applied, which is
/// enough while per-step displacement stays well under a domain width.
#[inline]
pub fn wrap_axis(x: f32, half_extent: f32) -> f32 {
    if x < -half_extent {
        half_extent
    } else if x > half_extent {
        -half_extent
    } else {
        x
    }
}

#[inline]
pub fn wrap_position(pos: Vec3, half_extent: f32) -> Vec3 {
    Vec3::new(
        wrap_axis(pos.x, half_extent),
        wrap_axis(pos.y, half_extent),
        wrap_axis(pos.z, half_extent),
    )
}

/// `pos += vel * dt` then wrap, independently per particle.
pub fn integrate_positions(positions: &mut [Vec3], velocities: &[Vec3], dt: f32, half_extent: f32) {
    debug_assert_eq!(positions.len(), velocities.len());

    positions
        .par_iter_mut()
        .zip(velocities.par_iter())
        .for_each(|(pos, &vel)| {
            *pos = wrap_position(*pos + vel * dt, half_extent);
        });
}

/// WGSL mirror of [`wrap_position`]. Expects a `params` uniform with a
/// `half_extent` field.
pub const WRAP_WGSL: &str = r#"
fn wrap_axis(x: f32) -> f32 {
    if x < -params.half_extent {
        return params.half_extent;
    }
    if x > params.half_extent {
        return -params.half_extent;
    }
    return x;
}

fn wrap_position(pos: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(wrap_axis(pos.x), wrap_axis(pos.y), wrap_axis(pos.z));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_axis() {
        assert_eq!(wrap_axis(-100.5, 100.0), 100.0);
        assert_eq!(wrap_axis(100.5, 100.0), -100.0);
        assert_eq!(wrap_axis(100.0, 100.0), 100.0);
        assert_eq!(wrap_axis(-100.0, 100.0), -100.0);
        assert_eq!(wrap_axis(3.0, 100.0), 3.0);
    }

    #[test]
    fn test_integrate_moves_and_wraps() {
        let mut positions = vec![Vec3::ZERO, Vec3::new(99.5, 0.0, -99.5)];
        let velocities = vec![Vec3::new(1.0, -1.0, 0.5), Vec3::new(1.0, 0.0, -1.0)];
        integrate_positions(&mut positions, &velocities, 1.0, 100.0);

        assert_eq!(positions[0], Vec3::new(1.0, -1.0, 0.5));
        assert_eq!(positions[1], Vec3::new(-100.0, 0.0, 100.0));
    }
}
