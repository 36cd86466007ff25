//! Persistence of 16-bit-container PGM/PPM frames between pipeline
//! stages and for the final outputs, behind a trait so tests can keep
//! frames in memory.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma, Rgb};

use crate::lf_pipeline::error::{DecodeError, Result};

/// A planar sample buffer with its geometry; `components` is 1 (PGM) or
/// 3 (PPM).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub components: usize,
    pub samples: Vec<u16>,
}

impl Frame {
    pub fn new(width: usize, height: usize, components: usize, samples: Vec<u16>) -> Self {
        debug_assert_eq!(samples.len(), width * height * components);
        Self {
            width,
            height,
            components,
            samples,
        }
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

pub trait FrameStore {
    fn write_frame(&self, path: &Path, frame: &Frame) -> Result<()>;
    fn read_frame(&self, path: &Path) -> Result<Frame>;
}

/// Reads and writes frames as 16-bit PNM files on disk.
pub struct PnmFrameStore;

impl FrameStore for PnmFrameStore {
    fn write_frame(&self, path: &Path, frame: &Frame) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pixels = frame.pixels();
        let image = match frame.components {
            1 => DynamicImage::ImageLuma16(
                ImageBuffer::<Luma<u16>, _>::from_raw(
                    frame.width as u32,
                    frame.height as u32,
                    frame.samples.clone(),
                )
                .ok_or_else(|| DecodeError::Store("frame buffer size mismatch".into()))?,
            ),
            3 => {
                // Planar to interleaved for the encoder.
                let mut interleaved = Vec::with_capacity(pixels * 3);
                for p in 0..pixels {
                    interleaved.push(frame.samples[p]);
                    interleaved.push(frame.samples[pixels + p]);
                    interleaved.push(frame.samples[2 * pixels + p]);
                }
                DynamicImage::ImageRgb16(
                    ImageBuffer::<Rgb<u16>, _>::from_raw(
                        frame.width as u32,
                        frame.height as u32,
                        interleaved,
                    )
                    .ok_or_else(|| DecodeError::Store("frame buffer size mismatch".into()))?,
                )
            }
            other => {
                return Err(DecodeError::Store(format!(
                    "cannot persist a {other}-component frame as PNM"
                )));
            }
        };
        image
            .save(path)
            .map_err(|e| DecodeError::Store(format!("writing {}: {e}", path.display())))
    }

    fn read_frame(&self, path: &Path) -> Result<Frame> {
        let image = image::open(path)
            .map_err(|e| DecodeError::Store(format!("reading {}: {e}", path.display())))?;
        match image {
            DynamicImage::ImageLuma16(plane) => {
                let (width, height) = (plane.width() as usize, plane.height() as usize);
                Ok(Frame::new(width, height, 1, plane.into_raw()))
            }
            DynamicImage::ImageRgb16(rgb) => {
                let (width, height) = (rgb.width() as usize, rgb.height() as usize);
                let interleaved = rgb.into_raw();
                let pixels = width * height;
                let mut planar = vec![0u16; pixels * 3];
                for p in 0..pixels {
                    planar[p] = interleaved[3 * p];
                    planar[pixels + p] = interleaved[3 * p + 1];
                    planar[2 * pixels + p] = interleaved[3 * p + 2];
                }
                Ok(Frame::new(width, height, 3, planar))
            }
            other => Err(DecodeError::Store(format!(
                "{}: unsupported sample format {:?}",
                path.display(),
                other.color()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_frame_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.pgm");
        let frame = Frame::new(4, 3, 1, (0..12).map(|v| (v * 85) as u16).collect());

        PnmFrameStore.write_frame(&path, &frame).unwrap();
        let loaded = PnmFrameStore.read_frame(&path).unwrap();
        assert_eq!(loaded, frame);
    }

    #[test]
    fn color_frame_round_trips_planar_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.ppm");
        let pixels = 6;
        let mut samples = vec![0u16; pixels * 3];
        for p in 0..pixels {
            samples[p] = 10 + p as u16;
            samples[pixels + p] = 500 + p as u16;
            samples[2 * pixels + p] = 1000 + p as u16;
        }
        let frame = Frame::new(3, 2, 3, samples);

        PnmFrameStore.write_frame(&path, &frame).unwrap();
        let loaded = PnmFrameStore.read_frame(&path).unwrap();
        assert_eq!(loaded, frame);
    }

    #[test]
    fn unsupported_component_count_is_rejected() {
        let frame = Frame {
            width: 2,
            height: 1,
            components: 2,
            samples: vec![0; 4],
        };
        let err = PnmFrameStore
            .write_frame(Path::new("/tmp/never_written.pnm"), &frame)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Store(_)));
    }
}
