//! Segmentation-guided global sparse filtering: for each component and
//! each depth region, a transmitted linear filter combines neighborhood
//! taps of the view's own prediction (and, in reference-regressor mode,
//! of every reference texture) into a refined sample. Outputs clamp to
//! the sample range and round half up; only the filtered component's
//! interior is replaced.

use tracing::debug;

use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::segmentation::Segmentation;
use crate::lf_pipeline::view::{MAX_SAMPLE, SparseFilter};

/// Fixed-point shift of the quantized sparse-filter coefficients.
pub const SPARSE_COEFF_SHIFT: u32 = 20;

pub fn dequantize_coefficients(filter: &SparseFilter) -> Vec<f64> {
    let step = 1.0 / (1i64 << SPARSE_COEFF_SHIFT) as f64;
    filter
        .quantized_coefficients
        .iter()
        .map(|&q| q as f64 * step)
        .collect()
}

/// One component plane zero-padded by `radius` on every side.
fn pad_plane(plane: &[u16], width: usize, height: usize, radius: usize) -> Vec<u16> {
    let pw = width + 2 * radius;
    let ph = height + 2 * radius;
    let mut padded = vec![0u16; pw * ph];
    for y in 0..height {
        let src = y * width;
        let dst = (y + radius) * pw + radius;
        padded[dst..dst + width].copy_from_slice(&plane[src..src + width]);
    }
    padded
}

/// Applies the view's filter bank in place. `filters` is consumed in
/// component-major, region-minor order; `reference_textures` are only
/// tapped when `reference_regressors` is set (they must match the view's
/// dimensions and component count).
pub fn apply_global_sparse_filter(
    texture: &mut [u16],
    width: usize,
    height: usize,
    components: usize,
    sparse_components: usize,
    reference_textures: &[&[u16]],
    segmentation: &Segmentation,
    filters: &[SparseFilter],
    tap_radius: usize,
    reference_regressors: bool,
) -> Result<()> {
    let pixels = width * height;
    let regions = segmentation.regions as usize;
    let filtered_components = sparse_components.min(components);

    if filters.len() != filtered_components * regions {
        return Err(DecodeError::Bitstream(format!(
            "{} sparse filters for {filtered_components} components x {regions} regions",
            filters.len()
        )));
    }

    let side = 2 * tap_radius + 1;
    let window = side * side;
    let pw = width + 2 * tap_radius;

    let mut cursor = 0usize;
    for component in 0..filtered_components {
        let plane = &texture[component * pixels..(component + 1) * pixels];
        let mut regressors: Vec<Vec<u16>> = Vec::with_capacity(1 + reference_textures.len());
        regressors.push(pad_plane(plane, width, height, tap_radius));
        if reference_regressors {
            for reference in reference_textures {
                let ref_plane = &reference[component * pixels..(component + 1) * pixels];
                regressors.push(pad_plane(ref_plane, width, height, tap_radius));
            }
        }
        let bias_index = regressors.len() * window;

        let mut filtered = vec![0.0f64; pixels];
        for region in 1..=regions as u32 {
            let filter = &filters[cursor];
            cursor += 1;
            let coefficients = dequantize_coefficients(filter);
            if coefficients.len() != filter.regressor_indices.len() {
                return Err(DecodeError::Bitstream(format!(
                    "sparse filter with {} coefficients but {} regressor indices",
                    coefficients.len(),
                    filter.regressor_indices.len()
                )));
            }

            for y in 0..height {
                for x in 0..width {
                    if segmentation.labels[y * width + x] != region {
                        continue;
                    }
                    let mut acc = 0.0f64;
                    for (&coeff, &index) in
                        coefficients.iter().zip(&filter.regressor_indices)
                    {
                        let index = index as usize;
                        if index == bias_index {
                            if !filter.bias_included {
                                return Err(DecodeError::Bitstream(
                                    "bias tap in a filter without a bias term".into(),
                                ));
                            }
                            acc += coeff;
                            continue;
                        }
                        if index > bias_index {
                            return Err(DecodeError::Bitstream(format!(
                                "regressor index {index} beyond {bias_index}"
                            )));
                        }
                        let regressor = index / window;
                        let tap = index % window;
                        let dy = tap / side;
                        let dx = tap % side;
                        let sample =
                            regressors[regressor][(y + dy) * pw + (x + dx)];
                        acc += coeff * sample as f64;
                    }
                    filtered[y * width + x] = acc;
                }
            }
        }

        // Clamp to the sample range, round half up, replace the component.
        let out = &mut texture[component * pixels..(component + 1) * pixels];
        for (dst, &value) in out.iter_mut().zip(&filtered) {
            *dst = (value.clamp(0.0, MAX_SAMPLE as f64) + 0.5).floor() as u16;
        }
    }

    debug!(
        components = filtered_components,
        regions, "global sparse filter applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_region(pixels: usize) -> Segmentation {
        Segmentation {
            labels: vec![1; pixels],
            region_sizes: vec![(1, pixels)],
            regions: 1,
        }
    }

    fn center_tap_index(radius: usize) -> u16 {
        let side = 2 * radius + 1;
        (radius * side + radius) as u16
    }

    #[test]
    fn center_tap_identity_filter_preserves_the_texture() {
        let width = 4;
        let height = 3;
        let mut texture: Vec<u16> = (0..12).map(|v| (v * 50) as u16).collect();
        let expected = texture.clone();

        let filters = vec![SparseFilter {
            quantized_coefficients: vec![1 << SPARSE_COEFF_SHIFT],
            regressor_indices: vec![center_tap_index(1)],
            bias_included: false,
        }];
        apply_global_sparse_filter(
            &mut texture,
            width,
            height,
            1,
            1,
            &[],
            &single_region(12),
            &filters,
            1,
            false,
        )
        .unwrap();
        assert_eq!(texture, expected);
    }

    #[test]
    fn output_is_clamped_to_the_sample_range() {
        let mut texture = vec![1000u16; 4];
        // Coefficient of 8.0 drives everything far beyond 1023; a second
        // run with -8.0 drives it below zero.
        let huge = SparseFilter {
            quantized_coefficients: vec![8 << SPARSE_COEFF_SHIFT],
            regressor_indices: vec![center_tap_index(1)],
            bias_included: false,
        };
        apply_global_sparse_filter(
            &mut texture,
            2,
            2,
            1,
            1,
            &[],
            &single_region(4),
            std::slice::from_ref(&huge),
            1,
            false,
        )
        .unwrap();
        assert!(texture.iter().all(|&v| v == MAX_SAMPLE));

        let negative = SparseFilter {
            quantized_coefficients: vec![-(8 << SPARSE_COEFF_SHIFT)],
            ..huge
        };
        apply_global_sparse_filter(
            &mut texture,
            2,
            2,
            1,
            1,
            &[],
            &single_region(4),
            &[negative],
            1,
            false,
        )
        .unwrap();
        assert!(texture.iter().all(|&v| v == 0));
    }

    #[test]
    fn bias_tap_adds_a_constant() {
        let mut texture = vec![0u16; 4];
        let window = 9; // radius 1, one regressor
        let filters = vec![SparseFilter {
            quantized_coefficients: vec![77 << SPARSE_COEFF_SHIFT],
            regressor_indices: vec![window as u16],
            bias_included: true,
        }];
        apply_global_sparse_filter(
            &mut texture,
            2,
            2,
            1,
            1,
            &[],
            &single_region(4),
            &filters,
            1,
            false,
        )
        .unwrap();
        assert!(texture.iter().all(|&v| v == 77));
    }

    #[test]
    fn reference_regressor_taps_read_the_reference() {
        let mut texture = vec![0u16; 4];
        let reference = vec![321u16; 4];
        let window = 9u16;
        // Regressor 1 (the reference), center tap.
        let filters = vec![SparseFilter {
            quantized_coefficients: vec![1 << SPARSE_COEFF_SHIFT],
            regressor_indices: vec![window + center_tap_index(1)],
            bias_included: false,
        }];
        apply_global_sparse_filter(
            &mut texture,
            2,
            2,
            1,
            1,
            &[&reference],
            &single_region(4),
            &filters,
            1,
            true,
        )
        .unwrap();
        assert!(texture.iter().all(|&v| v == 321));
    }

    #[test]
    fn filter_count_mismatch_is_rejected() {
        let mut texture = vec![0u16; 4];
        let err = apply_global_sparse_filter(
            &mut texture,
            2,
            2,
            1,
            1,
            &[],
            &single_region(4),
            &[],
            1,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }
}
