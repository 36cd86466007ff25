//! Inverse-depth reconstruction for views without a coded depth residual.
//!
//! The exact aggregation rule is behind the [`DepthPredictor`] seam so the
//! pipeline can be exercised with canned predictions; the default
//! implementation forward-warps every reference's depth map into the
//! target grid and keeps the nearest (largest inverse-depth) candidate.

use crate::lf_pipeline::error::Result;
use crate::lf_pipeline::merging::fill_holes;
use crate::lf_pipeline::warping::{TargetGeometry, warp_to_target};

/// A reconstructed reference's depth map plus its camera position.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceDepth<'a> {
    pub depth: &'a [u16],
    pub column: i32,
    pub row: i32,
}

pub trait DepthPredictor {
    /// Predicts the target view's inverse-depth map from already
    /// reconstructed references. Called only for views without a coded
    /// depth residual; an empty reference set yields a flat zero map.
    fn predict(
        &self,
        target: &TargetGeometry,
        min_inv_depth: u16,
        references: &[ReferenceDepth<'_>],
    ) -> Result<Vec<u16>>;
}

/// Default predictor: forward-warp each reference depth (the depth map
/// rides along as its own single-component texture), take the per-pixel
/// maximum inverse depth across references, then fill holes by neighbor
/// propagation.
pub struct WarpingDepthPredictor;

impl DepthPredictor for WarpingDepthPredictor {
    fn predict(
        &self,
        target: &TargetGeometry,
        min_inv_depth: u16,
        references: &[ReferenceDepth<'_>],
    ) -> Result<Vec<u16>> {
        let pixels = target.pixels();
        let mut predicted = vec![0u16; pixels];
        let mut valid = vec![false; pixels];

        for reference in references {
            let warped = warp_to_target(
                reference.depth,
                reference.depth,
                1,
                reference.column,
                reference.row,
                min_inv_depth,
                target,
            );
            for p in 0..pixels {
                if warped.valid[p] && (!valid[p] || warped.depth[p] > predicted[p]) {
                    predicted[p] = warped.depth[p];
                    valid[p] = true;
                }
            }
        }

        if !references.is_empty() {
            fill_holes(&mut predicted, &mut valid, target.width, target.height, 1);
        }
        Ok(predicted)
    }
}

/// 3x3 median smoothing with clipped borders, optionally applied to
/// predicted depth maps.
pub fn median_filter_3x3(depth: &[u16], width: usize, height: usize) -> Vec<u16> {
    let mut filtered = vec![0u16; depth.len()];
    let mut window = [0u16; 9];

    for y in 0..height {
        for x in 0..width {
            let mut n = 0usize;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let ny = y as i32 + dy;
                    let nx = x as i32 + dx;
                    if ny < 0 || nx < 0 || ny >= height as i32 || nx >= width as i32 {
                        continue;
                    }
                    window[n] = depth[ny as usize * width + nx as usize];
                    n += 1;
                }
            }
            window[..n].sort_unstable();
            filtered[y * width + x] = window[n / 2];
        }
    }
    filtered
}
