//! Dequantization and application of coded texture residuals, plus the
//! padding bookkeeping for the base codec's coding-unit grid.

use crate::lf_pipeline::view::MAX_SAMPLE;

/// Residuals are coded at this component bit depth.
pub const RESIDUAL_BIT_DEPTH: u32 = 10;
/// The base codec consumes frames padded to multiples of this.
pub const MIN_CU_SIZE: usize = 8;

/// Quantization step and DC offset for a hierarchy level: lossless step
/// with no offset up to level 1, step 2 with the coded range shifted by
/// `2^10 - 1` above it.
pub fn quant_params(hierarchy_level: i32) -> (i32, i32) {
    if hierarchy_level <= 1 {
        (1, 0)
    } else {
        (2, (1 << RESIDUAL_BIT_DEPTH) - 1)
    }
}

pub fn dequantize_residual(coded: &[u16], q: i32, offset: i32) -> Vec<f64> {
    coded
        .iter()
        .map(|&value| (value as f64 - offset as f64) * q as f64)
        .collect()
}

/// Encoder-side counterpart, used to validate the reconstruction
/// round-trip: residuals quantize to `round(r / Q) + offset`, saturating
/// at the coded container range.
pub fn quantize_residual(original: &[u16], predicted: &[u16], q: i32, offset: i32) -> Vec<u16> {
    original
        .iter()
        .zip(predicted)
        .map(|(&orig, &pred)| {
            let residual = orig as f64 - pred as f64;
            let coded = (residual / q as f64).round() + offset as f64;
            coded.clamp(0.0, u16::MAX as f64) as u16
        })
        .collect()
}

/// `final = clamp(predicted + residual)` per sample, round half up.
pub fn apply_residual(predicted: &[u16], residual: &[f64]) -> Vec<u16> {
    predicted
        .iter()
        .zip(residual)
        .map(|(&pred, &res)| {
            let value = pred as f64 + res;
            (value.clamp(0.0, MAX_SAMPLE as f64) + 0.5).floor() as u16
        })
        .collect()
}

/// Frame dimensions after padding up to the coding-unit grid.
pub fn padded_codec_dims(width: usize, height: usize) -> (usize, usize) {
    let pad = |n: usize| n.div_ceil(MIN_CU_SIZE) * MIN_CU_SIZE;
    (pad(width), pad(height))
}

/// Crops a padded planar codec frame back to the view grid.
pub fn crop_codec_frame(
    frame: &[u16],
    padded_width: usize,
    padded_height: usize,
    width: usize,
    height: usize,
    components: usize,
) -> Vec<u16> {
    let padded_pixels = padded_width * padded_height;
    let pixels = width * height;
    let mut cropped = vec![0u16; pixels * components];
    for c in 0..components {
        for y in 0..height {
            let src = c * padded_pixels + y * padded_width;
            let dst = c * pixels + y * width;
            cropped[dst..dst + width].copy_from_slice(&frame[src..src + width]);
        }
    }
    cropped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quant_params_follow_the_level_rule() {
        assert_eq!(quant_params(0), (1, 0));
        assert_eq!(quant_params(1), (1, 0));
        assert_eq!(quant_params(2), (2, 1023));
        assert_eq!(quant_params(5), (2, 1023));
    }

    #[test]
    fn round_trip_recovers_within_q_for_level_2() {
        let (q, offset) = quant_params(2);
        let predicted: Vec<u16> = (0..1024).map(|v| v as u16).collect();
        let original: Vec<u16> = predicted
            .iter()
            .map(|&p| (p as i32 + if p % 3 == 0 { 7 } else { -9 }).clamp(0, 1023) as u16)
            .collect();

        let coded = quantize_residual(&original, &predicted, q, offset);
        let residual = dequantize_residual(&coded, q, offset);
        let reconstructed = apply_residual(&predicted, &residual);

        for (&orig, &rec) in original.iter().zip(&reconstructed) {
            assert!((orig as i32 - rec as i32).abs() <= q);
        }
    }

    #[test]
    fn round_trip_is_exact_for_level_zero() {
        // Level-0 views predict from nothing: the residual over a zero
        // prediction is the image itself and Q = 1 keeps it lossless.
        let (q, offset) = quant_params(0);
        let predicted = vec![0u16; 256];
        let original: Vec<u16> = (0..256).map(|v| (v * 4) as u16).collect();

        let coded = quantize_residual(&original, &predicted, q, offset);
        let residual = dequantize_residual(&coded, q, offset);
        let reconstructed = apply_residual(&predicted, &residual);
        assert_eq!(reconstructed, original);
    }

    #[test]
    fn application_clamps_to_the_sample_range() {
        let out = apply_residual(&[1000, 20], &[500.0, -500.0]);
        assert_eq!(out, vec![1023, 0]);
    }

    #[test]
    fn padding_rounds_up_to_the_cu_grid() {
        assert_eq!(padded_codec_dims(626, 434), (632, 440));
        assert_eq!(padded_codec_dims(64, 8), (64, 8));
    }

    #[test]
    fn crop_recovers_the_view_grid() {
        let (pw, ph) = (8, 8);
        let (w, h) = (5, 6);
        let mut frame = vec![0u16; pw * ph * 2];
        for c in 0..2 {
            for y in 0..h {
                for x in 0..w {
                    frame[c * pw * ph + y * pw + x] = (c * 100 + y * 10 + x) as u16;
                }
            }
        }
        let cropped = crop_codec_frame(&frame, pw, ph, w, h, 2);
        assert_eq!(cropped.len(), w * h * 2);
        assert_eq!(cropped[0], 0);
        assert_eq!(cropped[w * h + 2 * w + 3], 123);
    }
}
