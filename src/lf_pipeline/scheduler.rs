//! Dependency-ordered scheduling of views.
//!
//! The decode order is hierarchy level ascending (ties keep bitstream
//! order) and must be a topological order of the reference graph; a
//! bitstream whose references cannot be satisfied under that order is
//! rejected outright. The schedule also precomputes when each view's
//! buffers are consumed for the last time, so the registry can release
//! them as early as possible.

use tracing::debug;

use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::view::View;

#[derive(Debug)]
pub struct Schedule {
    /// View indices in reconstruction order.
    pub order: Vec<usize>,
    /// Per view: the position in `order` after which its buffers are no
    /// longer needed by any later view. `None` means the view is never
    /// used as a reference and can be released right after its own
    /// outputs are written.
    pub release_after: Vec<Option<usize>>,
}

impl Schedule {
    /// Views whose buffers become dead once `position` completes.
    pub fn released_at(&self, position: usize) -> Vec<usize> {
        self.release_after
            .iter()
            .enumerate()
            .filter(|&(_, &last)| last == Some(position))
            .map(|(view, _)| view)
            .collect()
    }
}

pub fn build_schedule(views: &[View]) -> Result<Schedule> {
    let mut order: Vec<usize> = (0..views.len()).collect();
    order.sort_by_key(|&i| (views[i].hierarchy_level, views[i].decode_order));

    let mut position = vec![0usize; views.len()];
    for (pos, &i) in order.iter().enumerate() {
        position[i] = pos;
    }

    // Every reference must be reconstructed strictly before its dependent;
    // this also rules out cycles, which cannot satisfy the check anywhere.
    for &i in &order {
        for &reference in &views[i].references {
            if position[reference] >= position[i] {
                return Err(DecodeError::Dependency(format!(
                    "view {} (level {}) references view {} which is not \
                     reconstructed before it",
                    views[i].tag(),
                    views[i].hierarchy_level,
                    views[reference].tag(),
                )));
            }
        }
    }

    let mut release_after: Vec<Option<usize>> = vec![None; views.len()];
    for &i in &order {
        for &reference in &views[i].references {
            let last = release_after[reference].unwrap_or(0).max(position[i]);
            release_after[reference] = Some(last);
        }
    }

    debug!(views = views.len(), "schedule built");
    Ok(Schedule {
        order,
        release_after,
    })
}

/// Scan order in which same-level views are packed into one access unit:
/// rows of the subset ascending, columns alternating left-to-right and
/// right-to-left. Must match the encoder exactly.
pub fn serpentine_order(views: &[View], subset: &[usize]) -> Vec<usize> {
    let mut rows: Vec<i32> = subset.iter().map(|&i| views[i].row).collect();
    rows.sort_unstable();
    rows.dedup();

    let mut ordered = Vec::with_capacity(subset.len());
    for (pass, &row) in rows.iter().enumerate() {
        let mut in_row: Vec<usize> = subset
            .iter()
            .copied()
            .filter(|&i| views[i].row == row)
            .collect();
        in_row.sort_by_key(|&i| views[i].column);
        if pass % 2 == 1 {
            in_row.reverse();
        }
        ordered.extend(in_row);
    }
    ordered
}
