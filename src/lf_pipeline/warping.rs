//! Depth-compensated forward warping: every source pixel is splatted into
//! the nearest target pixel at the parallax its inverse depth implies,
//! with nearer samples occluding farther ones. Unwritten target pixels
//! stay holes for the merging stage to resolve.

use crate::lf_pipeline::view::View;

/// Fractional bits of the fixed-point inverse-depth samples. An inverse
/// depth of `1 << 14` displaces a pixel by exactly one pixel per unit of
/// camera-array offset.
pub const DISPARITY_FRACTIONAL_BITS: u32 = 14;

/// Camera position and grid of the view being predicted.
#[derive(Debug, Clone, Copy)]
pub struct TargetGeometry {
    pub column: i32,
    pub row: i32,
    pub width: usize,
    pub height: usize,
}

impl TargetGeometry {
    pub fn of(view: &View) -> Self {
        Self {
            column: view.column,
            row: view.row,
            width: view.width,
            height: view.height,
        }
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// One reference projected into a target grid. All planes are
/// target-sized; `valid` marks pixels that received at least one sample.
#[derive(Debug, Clone)]
pub struct WarpedView {
    pub width: usize,
    pub height: usize,
    pub components: usize,
    /// Planar, component-major, like view textures.
    pub texture: Vec<u16>,
    pub depth: Vec<u16>,
    /// Disparity (pixels per unit camera offset) of the winning sample.
    pub disparity: Vec<f32>,
    pub valid: Vec<bool>,
}

impl WarpedView {
    fn holes(width: usize, height: usize, components: usize) -> Self {
        let pixels = width * height;
        Self {
            width,
            height,
            components,
            texture: vec![0; pixels * components],
            depth: vec![0; pixels],
            disparity: vec![0.0; pixels],
            valid: vec![false; pixels],
        }
    }

    pub fn hole_count(&self) -> usize {
        self.valid.iter().filter(|&&v| !v).count()
    }
}

/// Projects `texture`/`depth` of a reference at `(ref_column, ref_row)`
/// into `target`. `min_inv_depth` floors every inverse-depth sample before
/// the parallax is computed.
pub fn warp_to_target(
    texture: &[u16],
    depth: &[u16],
    components: usize,
    ref_column: i32,
    ref_row: i32,
    min_inv_depth: u16,
    target: &TargetGeometry,
) -> WarpedView {
    let mut warped = WarpedView::holes(target.width, target.height, components);
    let pixels = target.pixels();

    let scale = 1.0f32 / (1 << DISPARITY_FRACTIONAL_BITS) as f32;
    let dcol = (target.column - ref_column) as f32;
    let drow = (target.row - ref_row) as f32;

    for y in 0..target.height {
        for x in 0..target.width {
            let p = y * target.width + x;
            let d = depth[p].max(min_inv_depth);
            let disparity = d as f32 * scale;

            let tx = x as isize + (disparity * dcol).round() as isize;
            let ty = y as isize + (disparity * drow).round() as isize;
            if tx < 0 || ty < 0 || tx >= target.width as isize || ty >= target.height as isize {
                continue;
            }
            let t = ty as usize * target.width + tx as usize;

            // Larger inverse depth is closer to the camera and occludes.
            if warped.valid[t] && warped.depth[t] >= d {
                continue;
            }
            warped.valid[t] = true;
            warped.depth[t] = d;
            warped.disparity[t] = disparity;
            for c in 0..components {
                warped.texture[c * pixels + t] = texture[c * pixels + p];
            }
        }
    }

    warped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_depth(value: u16, pixels: usize) -> Vec<u16> {
        vec![value; pixels]
    }

    #[test]
    fn zero_baseline_copies_the_reference() {
        let target = TargetGeometry {
            column: 3,
            row: 5,
            width: 4,
            height: 3,
        };
        let texture: Vec<u16> = (0..12).collect();
        let depth = flat_depth(1 << DISPARITY_FRACTIONAL_BITS, 12);

        let warped = warp_to_target(&texture, &depth, 1, 3, 5, 0, &target);
        assert_eq!(warped.texture, texture);
        assert_eq!(warped.hole_count(), 0);
    }

    #[test]
    fn unit_disparity_shifts_by_camera_offset() {
        let target = TargetGeometry {
            column: 1,
            row: 0,
            width: 4,
            height: 1,
        };
        let texture = vec![10, 20, 30, 40];
        // Inverse depth of exactly one pixel per camera-offset unit.
        let depth = flat_depth(1 << DISPARITY_FRACTIONAL_BITS, 4);

        let warped = warp_to_target(&texture, &depth, 1, 0, 0, 0, &target);
        // Everything moves one pixel right; column 0 has no contributor.
        assert!(!warped.valid[0]);
        assert_eq!(&warped.texture[1..], &[10, 20, 30]);
        assert!(warped.valid[1..].iter().all(|&v| v));
    }

    #[test]
    fn occlusion_keeps_the_nearer_sample() {
        let target = TargetGeometry {
            column: 1,
            row: 0,
            width: 3,
            height: 1,
        };
        // Pixel 0 at disparity 2 and pixel 1 at disparity 1 both land on
        // target pixel 2; pixel 0 is nearer (larger inverse depth).
        let texture = vec![111, 222, 0];
        let depth = vec![2 << DISPARITY_FRACTIONAL_BITS, 1 << DISPARITY_FRACTIONAL_BITS, 0];

        let warped = warp_to_target(&texture, &depth, 1, 0, 0, 0, &target);
        assert!(warped.valid[2]);
        assert_eq!(warped.texture[2], 111);
        assert_eq!(warped.depth[2], 2 << DISPARITY_FRACTIONAL_BITS);
    }

    #[test]
    fn min_inverse_depth_floors_the_parallax() {
        let target = TargetGeometry {
            column: 1,
            row: 0,
            width: 3,
            height: 1,
        };
        let texture = vec![7, 8, 9];
        let depth = vec![0, 0, 0];

        let floored = warp_to_target(
            &texture,
            &depth,
            1,
            0,
            0,
            1 << DISPARITY_FRACTIONAL_BITS,
            &target,
        );
        // The floor displaces every pixel one to the right.
        assert!(!floored.valid[0]);
        assert_eq!(floored.texture[1], 7);
    }

    #[test]
    fn multi_component_pixels_move_together() {
        let target = TargetGeometry {
            column: 0,
            row: 1,
            width: 2,
            height: 2,
        };
        let pixels = 4;
        let mut texture = vec![0u16; pixels * 3];
        for c in 0..3 {
            texture[c * pixels] = 100 + c as u16; // pixel (0,0)
        }
        let mut depth = vec![0u16; pixels];
        depth[0] = 1 << DISPARITY_FRACTIONAL_BITS; // moves one row down

        let warped = warp_to_target(&texture, &depth, 3, 0, 0, 0, &target);
        let t = 1 * 2 + 0;
        assert!(warped.valid[t]);
        for c in 0..3 {
            assert_eq!(warped.texture[c * pixels + t], 100 + c as u16);
        }
    }
}
