//! Combination of the per-reference warped candidates into one predicted
//! texture, followed by hole filling.
//!
//! The weighted modes share one kernel: every pixel gets a validity class
//! (bitmask of references that produced a sample there) and each
//! reference contributes with a class-dependent weight. Weighted-LS
//! weights come dequantized from the bitstream; geometric weights are
//! computed from the camera-array layout alone.

use tracing::debug;

use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::view::{LightField, MAX_SAMPLE, View};
use crate::lf_pipeline::warping::WarpedView;

/// Fixed-point shift of the quantized merge weights.
pub const MERGE_WEIGHT_SHIFT: u32 = 14;

/// Predicted texture plus the background/validity mask the hole filler
/// consumes.
#[derive(Debug)]
pub struct MergedTexture {
    pub texture: Vec<u16>,
    pub valid: Vec<bool>,
}

/// Per-pixel bitmask of which references contributed a valid warped
/// sample (bit `i` for reference `i`).
pub fn validity_classes(warped: &[WarpedView], pixels: usize) -> Vec<u16> {
    let mut classes = vec![0u16; pixels];
    for (i, w) in warped.iter().enumerate() {
        for (p, class) in classes.iter_mut().enumerate() {
            if w.valid[p] {
                *class |= 1 << i;
            }
        }
    }
    classes
}

/// Expands the bitstream's quantized `[reference][class]` weight table.
pub fn dequantize_merge_weights(quantized: &[i16], references: usize) -> Vec<f64> {
    let step = 1.0 / (1i64 << MERGE_WEIGHT_SHIFT) as f64;
    debug_assert_eq!(quantized.len(), references << references);
    quantized.iter().map(|&q| q as f64 * step).collect()
}

/// Weight table for [`MergeMode::GeometricWeight`]: every reference gets
/// `1 + diag - dist(reference, target)` in all classes it belongs to, so
/// closer references weigh more and weights stay positive anywhere in the
/// array. Needs the whole registry for the array diagonal.
///
/// [`MergeMode::GeometricWeight`]: crate::lf_pipeline::view::MergeMode::GeometricWeight
pub fn geometric_weight_table(light_field: &LightField, target: &View) -> Vec<f64> {
    let references = target.references.len();
    let classes = 1usize << references;
    let diag = light_field.array_diagonal();

    let mut table = vec![0.0f64; references * classes];
    for (i, &reference) in target.references.iter().enumerate() {
        let r = &light_field.views[reference];
        let dc = (r.column - target.column) as f64;
        let dr = (r.row - target.row) as f64;
        let weight = 1.0 + diag - (dc * dc + dr * dr).sqrt();
        for class in 0..classes {
            if class & (1 << i) != 0 {
                table[i * classes + class] = weight;
            }
        }
    }
    table
}

/// Weighted merge of all candidates into a planar texture. Pixels whose
/// class is empty, or whose weights sum to nothing, remain holes.
pub fn merge_weighted(
    warped: &[WarpedView],
    classes: &[u16],
    weights: &[f64],
    components: usize,
) -> Result<MergedTexture> {
    let references = warped.len();
    let n_classes = 1usize << references;
    if weights.len() != references * n_classes {
        return Err(DecodeError::Bitstream(format!(
            "merge weight table has {} entries, expected {}",
            weights.len(),
            references * n_classes
        )));
    }

    let pixels = classes.len();
    let mut texture = vec![0u16; pixels * components];
    let mut valid = vec![false; pixels];

    for p in 0..pixels {
        let class = classes[p] as usize;
        if class == 0 {
            continue;
        }
        let mut weight_sum = 0.0f64;
        for (i, _) in warped.iter().enumerate() {
            if class & (1 << i) != 0 {
                weight_sum += weights[i * n_classes + class];
            }
        }
        if weight_sum <= 0.0 {
            continue;
        }
        valid[p] = true;
        for c in 0..components {
            let mut acc = 0.0f64;
            for (i, w) in warped.iter().enumerate() {
                if class & (1 << i) != 0 {
                    acc += weights[i * n_classes + class] * w.texture[c * pixels + p] as f64;
                }
            }
            let value = (acc / weight_sum + 0.5).floor();
            texture[c * pixels + p] = value.clamp(0.0, MAX_SAMPLE as f64) as u16;
        }
    }

    Ok(MergedTexture { texture, valid })
}

/// Median merge: per pixel and component, the median of all valid
/// candidates. An even candidate count takes the rounded mean of the two
/// middle values; zero candidates leave a hole.
pub fn merge_median(warped: &[WarpedView], pixels: usize, components: usize) -> MergedTexture {
    let mut texture = vec![0u16; pixels * components];
    let mut valid = vec![false; pixels];
    let mut candidates: Vec<u16> = Vec::with_capacity(warped.len());

    for p in 0..pixels {
        let any = warped.iter().any(|w| w.valid[p]);
        if !any {
            continue;
        }
        valid[p] = true;
        for c in 0..components {
            candidates.clear();
            for w in warped {
                if w.valid[p] {
                    candidates.push(w.texture[c * pixels + p]);
                }
            }
            candidates.sort_unstable();
            let n = candidates.len();
            let value = if n % 2 == 1 {
                candidates[n / 2]
            } else {
                let a = candidates[n / 2 - 1] as u32;
                let b = candidates[n / 2] as u32;
                ((a + b + 1) / 2) as u16
            };
            texture[c * pixels + p] = value;
        }
    }

    MergedTexture { texture, valid }
}

/// Fills remaining holes by neighbor propagation: each pass assigns every
/// hole with at least one valid 4-neighbor the rounded average of those
/// neighbors, per component, until no hole is left or a pass makes no
/// progress. Returns the number of pixels filled (informational only).
/// Running it on a hole-free texture changes nothing.
pub fn fill_holes(
    texture: &mut [u16],
    valid: &mut [bool],
    width: usize,
    height: usize,
    components: usize,
) -> u32 {
    let pixels = width * height;
    let mut filled = 0u32;

    loop {
        let snapshot = valid.to_vec();
        let mut progressed = false;

        for y in 0..height {
            for x in 0..width {
                let p = y * width + x;
                if snapshot[p] {
                    continue;
                }
                let mut neighbors: [usize; 4] = [0; 4];
                let mut count = 0usize;
                if x > 0 && snapshot[p - 1] {
                    neighbors[count] = p - 1;
                    count += 1;
                }
                if x + 1 < width && snapshot[p + 1] {
                    neighbors[count] = p + 1;
                    count += 1;
                }
                if y > 0 && snapshot[p - width] {
                    neighbors[count] = p - width;
                    count += 1;
                }
                if y + 1 < height && snapshot[p + width] {
                    neighbors[count] = p + width;
                    count += 1;
                }
                if count == 0 {
                    continue;
                }
                for c in 0..components {
                    let sum: u32 = neighbors[..count]
                        .iter()
                        .map(|&n| texture[c * pixels + n] as u32)
                        .sum();
                    texture[c * pixels + p] =
                        ((sum + count as u32 / 2) / count as u32) as u16;
                }
                valid[p] = true;
                filled += 1;
                progressed = true;
            }
        }

        if !progressed {
            break;
        }
        if valid.iter().all(|&v| v) {
            break;
        }
    }

    if filled > 0 {
        debug!(filled, "holes filled");
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warped_flat(value: u16, valid: Vec<bool>) -> WarpedView {
        let pixels = valid.len();
        WarpedView {
            width: pixels,
            height: 1,
            components: 1,
            texture: vec![value; pixels],
            depth: vec![0; pixels],
            disparity: vec![0.0; pixels],
            valid,
        }
    }

    #[test]
    fn classes_reflect_candidate_validity() {
        let warped = vec![
            warped_flat(1, vec![true, false, true]),
            warped_flat(2, vec![false, false, true]),
        ];
        assert_eq!(validity_classes(&warped, 3), vec![0b01, 0b00, 0b11]);
    }

    #[test]
    fn median_single_candidate_passes_through() {
        let warped = vec![
            warped_flat(100, vec![true, false]),
            warped_flat(900, vec![false, false]),
        ];
        let merged = merge_median(&warped, 2, 1);
        assert_eq!(merged.texture[0], 100);
        assert!(merged.valid[0]);
        // Zero candidates: still a hole.
        assert!(!merged.valid[1]);
    }

    #[test]
    fn median_of_three_and_two() {
        let warped = vec![
            warped_flat(10, vec![true, true]),
            warped_flat(30, vec![true, true]),
            warped_flat(20, vec![true, false]),
        ];
        let merged = merge_median(&warped, 2, 1);
        assert_eq!(merged.texture[0], 20); // odd count: middle value
        assert_eq!(merged.texture[1], 20); // even count: rounded mean
    }

    #[test]
    fn weighted_merge_normalizes_over_valid_references() {
        let warped = vec![
            warped_flat(100, vec![true, true]),
            warped_flat(200, vec![true, false]),
        ];
        let classes = validity_classes(&warped, 2);
        // reference 0 weight 1.0 in all its classes, reference 1 weight 3.0.
        let classes_n = 4;
        let mut weights = vec![0.0f64; 2 * classes_n];
        for class in 0..classes_n {
            if class & 1 != 0 {
                weights[class] = 1.0;
            }
            if class & 2 != 0 {
                weights[classes_n + class] = 3.0;
            }
        }
        let merged = merge_weighted(&warped, &classes, &weights, 1).unwrap();
        // Pixel 0: (1*100 + 3*200) / 4 = 175. Pixel 1: only reference 0.
        assert_eq!(merged.texture[0], 175);
        assert_eq!(merged.texture[1], 100);
    }

    #[test]
    fn zero_weight_sum_leaves_a_hole() {
        let warped = vec![warped_flat(500, vec![true])];
        let classes = validity_classes(&warped, 1);
        let weights = vec![0.0f64; 2];
        let merged = merge_weighted(&warped, &classes, &weights, 1).unwrap();
        assert!(!merged.valid[0]);
    }

    #[test]
    fn dequantized_weights_use_the_fixed_point_step() {
        let weights = dequantize_merge_weights(&[1 << MERGE_WEIGHT_SHIFT as i16, 0], 1);
        assert_eq!(weights, vec![1.0, 0.0]);
    }

    #[test]
    fn hole_filling_propagates_and_counts() {
        let mut texture = vec![100, 0, 0, 100];
        let mut valid = vec![true, false, false, true];
        let filled = fill_holes(&mut texture, &mut valid, 4, 1, 1);
        assert_eq!(filled, 2);
        assert!(valid.iter().all(|&v| v));
        assert_eq!(texture, vec![100, 100, 100, 100]);
    }

    #[test]
    fn hole_filling_is_idempotent_on_full_textures() {
        let mut texture = vec![5, 6, 7, 8];
        let mut valid = vec![true; 4];
        let before = texture.clone();
        assert_eq!(fill_holes(&mut texture, &mut valid, 2, 2, 1), 0);
        assert_eq!(texture, before);
    }

    #[test]
    fn all_hole_image_stays_unfilled() {
        let mut texture = vec![0u16; 4];
        let mut valid = vec![false; 4];
        assert_eq!(fill_holes(&mut texture, &mut valid, 2, 2, 1), 0);
        assert!(valid.iter().all(|&v| !v));
    }
}
