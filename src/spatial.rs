//! Uniform grid geometry.
//!
//! The domain is covered by cubic cells twice as wide as the largest
//! interaction radius, so every neighbor a rule can see lies in the 3×3×3
//! block around a particle's own cell. Cells are addressed by a dense id
//! `x + y·side + z·side²`.

use glam::{IVec3, UVec3, Vec3};
use std::ops::Deref;

use crate::config::{CellSweep, FlockConfig};
use crate::error::SimulationError;

/// Cell id for a coordinate outside the grid.
pub const NO_CELL: u32 = u32::MAX;

/// Cell head lookup entry for a cell with no particles.
pub const EMPTY_CELL: u32 = u32::MAX;

/// Grid geometry, derived once at initialization and passed by value to
/// every stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridParams {
    /// Width of each cubic cell in world units.
    pub cell_width: f32,
    pub inv_cell_width: f32,
    /// Number of cells per axis.
    pub side_count: u32,
    /// Total number of cells (`side_count³`).
    pub cell_count: u32,
    /// Minimum corner of the grid.
    pub grid_min: Vec3,
    /// Half-extent of the simulation domain the grid covers.
    pub half_extent: f32,
}

impl GridParams {
    /// Derive the grid covering `[-half_extent, half_extent]³` for the given
    /// largest interaction radius.
    pub fn new(half_extent: f32, max_radius: f32) -> Result<Self, SimulationError> {
        let cell_width = 2.0 * max_radius;
        let half_side = (half_extent / cell_width) as u64 + 1;
        let side = half_side.saturating_mul(2);
        let cells = side.checked_mul(side).and_then(|sq| sq.checked_mul(side));
        let Some(cells) = cells.filter(|&c| c < NO_CELL as u64) else {
            return Err(SimulationError::InvalidConfig(format!(
                "grid of {}³ cells does not fit 32-bit cell ids; increase the interaction radii",
                side
            )));
        };
        let half_width = cell_width * half_side as f32;

        Ok(Self {
            cell_width,
            inv_cell_width: 1.0 / cell_width,
            side_count: side as u32,
            cell_count: cells as u32,
            grid_min: Vec3::splat(-half_width),
            half_extent,
        })
    }

    pub fn from_config(config: &FlockConfig) -> Result<Self, SimulationError> {
        Self::new(config.half_extent, config.rules.max_radius())
    }

    /// Integer cell coordinate containing `pos`. May lie outside the grid.
    #[inline]
    pub fn cell_coord(&self, pos: Vec3) -> IVec3 {
        ((pos - self.grid_min) * self.inv_cell_width).floor().as_ivec3()
    }

    /// Dense id for a cell coordinate, or [`NO_CELL`] if it is out of range.
    #[inline]
    pub fn encode(&self, coord: IVec3) -> u32 {
        let side = self.side_count as i32;
        if coord.cmplt(IVec3::ZERO).any() || coord.cmpge(IVec3::splat(side)).any() {
            return NO_CELL;
        }
        let side = self.side_count;
        coord.x as u32 + coord.y as u32 * side + coord.z as u32 * side * side
    }

    /// Cell id containing `pos`.
    #[inline]
    pub fn cell_of(&self, pos: Vec3) -> u32 {
        self.encode(self.cell_coord(pos))
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(&self, cell: u32) -> Option<UVec3> {
        if cell >= self.cell_count {
            return None;
        }
        let side = self.side_count;
        Some(UVec3::new(cell % side, (cell / side) % side, cell / (side * side)))
    }

    /// Cells a particle at `pos` must search, z-major then y then x.
    ///
    /// Out-of-range cells are reported as [`NO_CELL`] and must be skipped
    /// by the caller.
    pub fn neighbor_cells(&self, pos: Vec3, sweep: CellSweep) -> NeighborCells {
        let scaled = (pos - self.grid_min) * self.inv_cell_width;
        let base = scaled.floor();
        let coord = base.as_ivec3();

        let (lo, span) = match sweep {
            CellSweep::Full => (IVec3::splat(-1), 3),
            CellSweep::Octant => {
                let frac = scaled - base;
                let lo = IVec3::new(
                    if frac.x < 0.5 { -1 } else { 0 },
                    if frac.y < 0.5 { -1 } else { 0 },
                    if frac.z < 0.5 { -1 } else { 0 },
                );
                (lo, 2)
            }
        };

        let mut cells = NeighborCells { cells: [NO_CELL; 27], len: 0 };
        for dz in 0..span {
            for dy in 0..span {
                for dx in 0..span {
                    let offset = lo + IVec3::new(dx, dy, dz);
                    cells.cells[cells.len] = self.encode(coord + offset);
                    cells.len += 1;
                }
            }
        }
        cells
    }
}

/// Fixed-capacity list of cell ids produced by [`GridParams::neighbor_cells`].
#[derive(Clone, Copy, Debug)]
pub struct NeighborCells {
    cells: [u32; 27],
    len: usize,
}

impl Deref for NeighborCells {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.cells[..self.len]
    }
}

/// WGSL helpers for cell coordinates and ids. Expects a `params` uniform
/// with `grid_min`, `inv_cell_width` and `side_count` fields.
pub const GRID_WGSL: &str = r#"
const NO_CELL: u32 = 0xFFFFFFFFu;
const EMPTY_CELL: u32 = 0xFFFFFFFFu;

// Scaled position in cell units relative to the grid minimum
fn grid_scaled(pos: vec3<f32>) -> vec3<f32> {
    return (pos - params.grid_min) * params.inv_cell_width;
}

fn cell_coord(pos: vec3<f32>) -> vec3<i32> {
    return vec3<i32>(floor(grid_scaled(pos)));
}

// Dense cell id, NO_CELL when the coordinate falls outside the grid
fn encode_cell(coord: vec3<i32>) -> u32 {
    let side = i32(params.side_count);
    if coord.x < 0 || coord.y < 0 || coord.z < 0 ||
       coord.x >= side || coord.y >= side || coord.z >= side {
        return NO_CELL;
    }
    let s = params.side_count;
    return u32(coord.x) + u32(coord.y) * s + u32(coord.z) * s * s;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn default_grid() -> GridParams {
        GridParams::new(100.0, 5.0).unwrap()
    }

    #[test]
    fn test_default_grid_dimensions() {
        let grid = default_grid();
        assert_eq!(grid.cell_width, 10.0);
        assert_eq!(grid.side_count, 22);
        assert_eq!(grid.cell_count, 22 * 22 * 22);
        assert_eq!(grid.grid_min, Vec3::splat(-110.0));
    }

    #[test]
    fn test_encode_decode() {
        let grid = default_grid();
        let id = grid.encode(IVec3::new(3, 4, 5));
        assert_eq!(id, 3 + 4 * 22 + 5 * 22 * 22);
        assert_eq!(grid.decode(id), Some(UVec3::new(3, 4, 5)));
    }

    #[test]
    fn test_out_of_range_is_sentinel() {
        let grid = default_grid();
        assert_eq!(grid.encode(IVec3::new(-1, 0, 0)), NO_CELL);
        assert_eq!(grid.encode(IVec3::new(0, 22, 0)), NO_CELL);
        assert_eq!(grid.cell_of(Vec3::splat(500.0)), NO_CELL);
        assert_eq!(grid.decode(NO_CELL), None);
    }

    #[test]
    fn test_domain_corners_inside_grid() {
        let grid = default_grid();
        assert_ne!(grid.cell_of(Vec3::splat(-100.0)), NO_CELL);
        assert_ne!(grid.cell_of(Vec3::splat(100.0)), NO_CELL);
    }

    #[test]
    fn test_full_sweep_has_27_cells() {
        let grid = default_grid();
        let cells = grid.neighbor_cells(Vec3::ZERO, CellSweep::Full);
        assert_eq!(cells.len(), 27);
        assert!(cells.iter().all(|&c| c != NO_CELL));
        assert_eq!(cells[13], grid.cell_of(Vec3::ZERO));
    }

    #[test]
    fn test_octant_sweep_picks_near_side() {
        let grid = default_grid();
        // x = 1.0 sits in the lower half of cell [0, 10) along every axis
        let pos = Vec3::splat(1.0);
        let cells = grid.neighbor_cells(pos, CellSweep::Octant);
        assert_eq!(cells.len(), 8);
        let own = grid.cell_coord(pos);
        assert_eq!(cells[0], grid.encode(own - IVec3::ONE));
        assert_eq!(cells[7], grid.encode(own));
    }

    #[test]
    fn test_corner_cell_neighbors_skip_outside() {
        let grid = default_grid();
        let corner = grid.grid_min + Vec3::splat(0.5);
        let cells = grid.neighbor_cells(corner, CellSweep::Full);
        let outside = cells.iter().filter(|&&c| c == NO_CELL).count();
        assert_eq!(outside, 27 - 8);
    }

    #[test]
    fn test_oversized_grid_rejected() {
        assert!(GridParams::new(1.0e9, 0.001).is_err());
    }
}
