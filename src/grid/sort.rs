//! Sort stage: bucket particles by cell id.

use rayon::prelude::*;

/// Sort the co-indexed `(grid_index, particle_index)` pairs by cell id.
///
/// The sort is unstable: particles sharing a cell come out in unspecified
/// relative order. `scratch` is reused between calls to avoid reallocating.
pub fn sort_by_cell(grid_index: &mut [u32], particle_index: &mut [u32], scratch: &mut Vec<(u32, u32)>) {
    debug_assert_eq!(grid_index.len(), particle_index.len());

    scratch.clear();
    scratch.par_extend(grid_index.par_iter().copied().zip(particle_index.par_iter().copied()));
    scratch.par_sort_unstable_by_key(|&(cell, _)| cell);

    grid_index
        .par_iter_mut()
        .zip(particle_index.par_iter_mut())
        .zip(scratch.par_iter())
        .for_each(|((gi, pi), &(cell, id))| {
            *gi = cell;
            *pi = id;
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_keeps_pairs_together() {
        let mut keys = vec![5u32, 1, 3, 1];
        let mut vals = vec![0u32, 1, 2, 3];
        let mut scratch = Vec::new();
        sort_by_cell(&mut keys, &mut vals, &mut scratch);

        assert_eq!(keys, vec![1, 1, 3, 5]);
        assert_eq!(vals[2], 2);
        assert_eq!(vals[3], 0);
        let mut ones = vals[..2].to_vec();
        ones.sort();
        assert_eq!(ones, vec![1, 3]);
    }

    #[test]
    fn test_sort_empty() {
        let mut keys: Vec<u32> = Vec::new();
        let mut vals: Vec<u32> = Vec::new();
        sort_by_cell(&mut keys, &mut vals, &mut Vec::new());
        assert!(keys.is_empty());
    }
}
