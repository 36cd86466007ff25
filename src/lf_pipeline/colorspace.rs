//! Colorspace conversion for the final output views. The pipeline works
//! in the coded colorspace throughout and only converts once, right
//! before the output image is written.

use crate::lf_pipeline::view::BIT_DEPTH;

// BT.709 full-range coefficients.
const KR: f64 = 0.2126;
const KB: f64 = 0.0722;
const KG: f64 = 1.0 - KR - KB;

/// Converts a planar YCbCr texture to planar RGB at `BIT_DEPTH` bits.
/// Chroma is centered on `2^(BIT_DEPTH-1)`; outputs clamp to the sample
/// range.
pub fn ycbcr_to_rgb(planar: &[u16], pixels: usize) -> Vec<u16> {
    debug_assert_eq!(planar.len(), pixels * 3);
    let max = ((1u32 << BIT_DEPTH) - 1) as f64;
    let center = (1u32 << (BIT_DEPTH - 1)) as f64;

    let cr_to_r = 2.0 * (1.0 - KR);
    let cb_to_b = 2.0 * (1.0 - KB);
    let cb_to_g = 2.0 * KB * (1.0 - KB) / KG;
    let cr_to_g = 2.0 * KR * (1.0 - KR) / KG;

    let mut rgb = vec![0u16; pixels * 3];
    for p in 0..pixels {
        let y = planar[p] as f64;
        let cb = planar[pixels + p] as f64 - center;
        let cr = planar[2 * pixels + p] as f64 - center;

        let r = y + cr_to_r * cr;
        let g = y - cb_to_g * cb - cr_to_g * cr;
        let b = y + cb_to_b * cb;

        rgb[p] = (r.clamp(0.0, max) + 0.5).floor() as u16;
        rgb[pixels + p] = (g.clamp(0.0, max) + 0.5).floor() as u16;
        rgb[2 * pixels + p] = (b.clamp(0.0, max) + 0.5).floor() as u16;
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_is_gray() {
        let pixels = 3;
        let mut planar = vec![0u16; 9];
        planar[0] = 0;
        planar[1] = 512;
        planar[2] = 1023;
        for p in 0..pixels {
            planar[pixels + p] = 512;
            planar[2 * pixels + p] = 512;
        }
        let rgb = ycbcr_to_rgb(&planar, pixels);
        for p in 0..pixels {
            assert_eq!(rgb[p], planar[p]);
            assert_eq!(rgb[pixels + p], planar[p]);
            assert_eq!(rgb[2 * pixels + p], planar[p]);
        }
    }

    #[test]
    fn extreme_chroma_clamps_to_the_sample_range() {
        let planar = vec![1023, 1023, 1023];
        let rgb = ycbcr_to_rgb(&planar, 1);
        assert!(rgb.iter().all(|&v| v <= 1023));
        // Strong positive Cr pushes red to the ceiling.
        assert_eq!(rgb[0], 1023);
    }
}
