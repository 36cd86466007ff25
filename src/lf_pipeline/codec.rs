//! External base-layer codecs, modeled as injected collaborators so the
//! reconstruction pipeline can run against fakes in tests. The real
//! implementations shell out to the reference tool binaries and move
//! samples through scratch files, which is how those tools operate.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::lf_pipeline::error::{DecodeError, Result};

/// Decodes one HEVC access unit into raw 10-bit planar frames.
pub trait TextureCodec {
    /// `frames` full frames of `width * height * components` samples each
    /// (already padded to the coding-unit grid by the encoder).
    fn decode_access_unit(
        &self,
        access_unit: &[u8],
        frames: usize,
        width: usize,
        height: usize,
        components: usize,
    ) -> Result<Vec<Vec<u16>>>;
}

/// Decodes one JPEG2000 segment into a single-component plane.
pub trait DepthCodec {
    fn decode_depth(&self, segment: &[u8], width: usize, height: usize) -> Result<Vec<u16>>;
}

/// Expands the deflate-compressed per-view metadata blob.
pub trait MetadataInflater {
    fn inflate(&self, compressed: &[u8]) -> Result<Vec<u8>>;

    /// Whether this inflater can actually run. Checked up front when the
    /// header's deflate flag is set, before any decode work starts.
    fn available(&self) -> bool {
        true
    }
}

fn run_tool(command: &mut Command, what: &str) -> Result<()> {
    debug!(?command, "running {what}");
    let output = command
        .output()
        .map_err(|e| DecodeError::Codec(format!("failed to spawn {what}: {e}")))?;
    if !output.status.success() {
        return Err(DecodeError::Codec(format!(
            "{what} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

fn locate(explicit: Option<&Path>, name: &str) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => which::which(name).map_err(|_| {
            DecodeError::Configuration(format!(
                "{name} not found in PATH and no explicit path configured"
            ))
        }),
    }
}

/// HEVC reference-decoder binary (HM `TAppDecoder`).
pub struct HmTextureCodec {
    binary: PathBuf,
    work_dir: PathBuf,
}

impl HmTextureCodec {
    pub fn new(binary: Option<&Path>, work_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            binary: locate(binary, "TAppDecoder")?,
            work_dir: work_dir.into(),
        })
    }
}

impl TextureCodec for HmTextureCodec {
    fn decode_access_unit(
        &self,
        access_unit: &[u8],
        frames: usize,
        width: usize,
        height: usize,
        components: usize,
    ) -> Result<Vec<Vec<u16>>> {
        fs::create_dir_all(&self.work_dir)?;
        let bitstream = self.work_dir.join("texture_au.hevc");
        let raw = self.work_dir.join("texture_au.yuv");
        fs::write(&bitstream, access_unit)?;

        info!(frames, width, height, "decoding texture access unit");
        run_tool(
            Command::new(&self.binary)
                .arg("-b")
                .arg(&bitstream)
                .arg("-o")
                .arg(&raw),
            "HEVC decoder",
        )?;

        let bytes = fs::read(&raw)?;
        let samples_per_frame = width * height * components;
        let expected = frames * samples_per_frame * 2;
        if bytes.len() < expected {
            return Err(DecodeError::Codec(format!(
                "HEVC decoder produced {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let mut decoded = Vec::with_capacity(frames);
        for f in 0..frames {
            let start = f * samples_per_frame * 2;
            let frame = bytes[start..start + samples_per_frame * 2]
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            decoded.push(frame);
        }
        Ok(decoded)
    }
}

/// JPEG2000 expander binary (Kakadu `kdu_expand`).
pub struct KakaduDepthCodec {
    binary: PathBuf,
    work_dir: PathBuf,
}

impl KakaduDepthCodec {
    pub fn new(binary: Option<&Path>, work_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            binary: locate(binary, "kdu_expand")?,
            work_dir: work_dir.into(),
        })
    }
}

impl DepthCodec for KakaduDepthCodec {
    fn decode_depth(&self, segment: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
        fs::create_dir_all(&self.work_dir)?;
        let compressed = self.work_dir.join("depth_residual.jp2");
        let expanded = self.work_dir.join("depth_residual.pgm");
        fs::write(&compressed, segment)?;

        run_tool(
            Command::new(&self.binary)
                .arg("-i")
                .arg(&compressed)
                .arg("-o")
                .arg(&expanded),
            "JPEG2000 expander",
        )?;

        let decoded = image::open(&expanded)
            .map_err(|e| DecodeError::Codec(format!("unreadable expander output: {e}")))?;
        let plane = decoded.into_luma16();
        if plane.width() as usize != width || plane.height() as usize != height {
            return Err(DecodeError::Codec(format!(
                "depth plane is {}x{}, expected {width}x{height}",
                plane.width(),
                plane.height()
            )));
        }
        Ok(plane.into_raw())
    }
}

/// Gzip binary, used only when the header's deflate flag is set.
pub struct GzipInflater {
    binary: Option<PathBuf>,
    work_dir: PathBuf,
}

impl GzipInflater {
    pub fn new(binary: Option<&Path>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.map(Path::to_path_buf),
            work_dir: work_dir.into(),
        }
    }
}

impl MetadataInflater for GzipInflater {
    fn inflate(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let binary = self.binary.as_ref().ok_or_else(|| {
            DecodeError::Configuration("deflate metadata present but no gzip path set".into())
        })?;
        fs::create_dir_all(&self.work_dir)?;
        let packed = self.work_dir.join("viewparams.gz");
        let unpacked = self.work_dir.join("viewparams");
        fs::write(&packed, compressed)?;

        run_tool(
            Command::new(binary).arg("-d").arg("-f").arg(&packed),
            "gzip",
        )?;
        Ok(fs::read(&unpacked)?)
    }

    fn available(&self) -> bool {
        self.binary.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_without_a_path_is_unavailable() {
        let inflater = GzipInflater::new(None, "scratch");
        assert!(!inflater.available());
        let err = inflater.inflate(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, DecodeError::Configuration(_)));
    }

    #[test]
    fn missing_binary_reports_a_codec_error() {
        let codec = HmTextureCodec {
            binary: PathBuf::from("/nonexistent/TAppDecoder"),
            work_dir: std::env::temp_dir().join("plenodec_codec_test"),
        };
        let err = codec.decode_access_unit(&[0u8; 4], 1, 8, 8, 1).unwrap_err();
        assert!(matches!(err, DecodeError::Codec(_)));
    }
}
