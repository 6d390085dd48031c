//! Cell range table and cell head lookup.
//!
//! Both tables are derived from the sorted cell ids. The range table is
//! indexed by sorted position, the head lookup by cell id.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::spatial::EMPTY_CELL;

/// For every sorted position, record the first and last sorted position
/// sharing its cell id.
///
/// Single pass each way, comparing only against the immediate neighbor.
pub fn build_cell_ranges(grid_index: &[u32], start: &mut [u32], end: &mut [u32]) {
    let n = grid_index.len();
    debug_assert_eq!(n, start.len());
    debug_assert_eq!(n, end.len());

    let mut run_start = 0;
    for i in 0..n {
        if i > 0 && grid_index[i] != grid_index[i - 1] {
            run_start = i;
        }
        start[i] = run_start as u32;
    }

    let mut run_end = n.saturating_sub(1);
    for i in (0..n).rev() {
        if i + 1 < n && grid_index[i] != grid_index[i + 1] {
            run_end = i;
        }
        end[i] = run_end as u32;
    }
}

/// Reset every cell to [`EMPTY_CELL`], then map each occupied cell id to
/// the first sorted position holding it.
///
/// Every sorted position of a cell stores the same start value, so the
/// unordered concurrent stores agree and need no lock. Positions whose id
/// is outside the table (off-grid particles) are skipped.
pub fn build_cell_heads(grid_index: &[u32], start: &[u32], heads: &[AtomicU32]) {
    heads.par_iter().for_each(|head| head.store(EMPTY_CELL, Ordering::Relaxed));

    grid_index
        .par_iter()
        .zip(start.par_iter())
        .for_each(|(&cell, &first)| {
            if let Some(head) = heads.get(cell as usize) {
                head.store(first, Ordering::Relaxed);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heads(count: usize) -> Vec<AtomicU32> {
        (0..count).map(|_| AtomicU32::new(0)).collect()
    }

    fn load(heads: &[AtomicU32]) -> Vec<u32> {
        heads.iter().map(|h| h.load(Ordering::Relaxed)).collect()
    }

    #[test]
    fn test_ranges_single_run() {
        let keys = [4u32, 4, 4];
        let mut start = [9u32; 3];
        let mut end = [9u32; 3];
        build_cell_ranges(&keys, &mut start, &mut end);
        assert_eq!(start, [0, 0, 0]);
        assert_eq!(end, [2, 2, 2]);
    }

    #[test]
    fn test_ranges_all_distinct() {
        let keys = [1u32, 2, 3];
        let mut start = [9u32; 3];
        let mut end = [9u32; 3];
        build_cell_ranges(&keys, &mut start, &mut end);
        assert_eq!(start, [0, 1, 2]);
        assert_eq!(end, [0, 1, 2]);
    }

    #[test]
    fn test_ranges_empty() {
        build_cell_ranges(&[], &mut [], &mut []);
    }

    #[test]
    fn test_heads_point_at_first_slot() {
        let keys = [0u32, 0, 3, 3, 3];
        let start = [0u32, 0, 2, 2, 2];
        let table = heads(5);
        build_cell_heads(&keys, &start, &table);
        assert_eq!(load(&table), vec![0, EMPTY_CELL, EMPTY_CELL, 2, EMPTY_CELL]);
    }

    #[test]
    fn test_heads_skip_off_grid_ids() {
        let keys = [1u32, u32::MAX];
        let start = [0u32, 1];
        let table = heads(2);
        build_cell_heads(&keys, &start, &table);
        assert_eq!(load(&table), vec![EMPTY_CELL, 0]);
    }

    #[test]
    fn test_heads_reset_between_builds() {
        let table = heads(3);
        build_cell_heads(&[2, 2], &[0, 0], &table);
        build_cell_heads(&[0, 1], &[0, 1], &table);
        assert_eq!(load(&table), vec![0, 1, EMPTY_CELL]);
    }
}
