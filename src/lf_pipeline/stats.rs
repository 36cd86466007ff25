//! Structured summary of a decode session, persisted as JSON next to the
//! outputs: the configuration actually used plus one record per view.

use std::path::Path;

use serde::Serialize;

use crate::lf_pipeline::config::DecodeConfig;
use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::view::View;

#[derive(Debug, Serialize)]
pub struct ViewStats {
    pub column: i32,
    pub row: i32,
    pub decode_order: usize,
    pub level: i32,
    pub tap_radius: usize,
    pub sparse_taps: usize,
    pub sparse_filter_count: usize,
    pub quantized_coefficients: Vec<Vec<i32>>,
    pub regressor_indices: Vec<Vec<u16>>,
    pub bpp_texture: f64,
    pub bpp_depth: f64,
}

impl ViewStats {
    pub fn for_view(view: &View, texture_bytes: usize, depth_bytes: usize) -> Self {
        let pixels = view.pixels().max(1) as f64;
        Self {
            column: view.column,
            row: view.row,
            decode_order: view.decode_order,
            level: view.hierarchy_level,
            tap_radius: view.tap_radius,
            sparse_taps: view.sparse_taps,
            sparse_filter_count: view.sparse_filters.len(),
            quantized_coefficients: view
                .sparse_filters
                .iter()
                .map(|f| f.quantized_coefficients.clone())
                .collect(),
            regressor_indices: view
                .sparse_filters
                .iter()
                .map(|f| f.regressor_indices.clone())
                .collect(),
            bpp_texture: texture_bytes as f64 * 8.0 / pixels,
            bpp_depth: depth_bytes as f64 * 8.0 / pixels,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub input: String,
    pub output_directory: String,
    pub hevc_decoder: Option<String>,
    pub kakadu_expand: Option<String>,
    pub gzip: Option<String>,
    pub use_deflate: bool,
    pub segmentation_iterations: u8,
    pub metadata_bytes: usize,
    pub residual_bytes: usize,
    pub views: Vec<ViewStats>,
}

impl SessionStats {
    pub fn new(config: &DecodeConfig, use_deflate: bool, segmentation_iterations: u8) -> Self {
        let display = |p: &Option<std::path::PathBuf>| {
            p.as_ref().map(|p| p.display().to_string())
        };
        Self {
            input: config.input.display().to_string(),
            output_directory: config.output_directory.display().to_string(),
            hevc_decoder: display(&config.hevc_decoder),
            kakadu_expand: display(&config.kakadu_expand),
            gzip: display(&config.gzip),
            use_deflate,
            segmentation_iterations,
            metadata_bytes: 0,
            residual_bytes: 0,
            views: Vec::new(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DecodeError::Store(format!("serializing stats: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lf_pipeline::config::DecodeConfig;

    #[test]
    fn stats_serialize_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let config = DecodeConfig::builder()
            .input("in.lf")
            .output_directory(dir.path())
            .build();
        let mut stats = SessionStats::new(&config, false, 5);
        stats.metadata_bytes = 120;

        let path = dir.path().join("stats.json");
        stats.write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["segmentation_iterations"], 5);
        assert_eq!(parsed["metadata_bytes"], 120);
        assert!(parsed["views"].as_array().unwrap().is_empty());
    }
}
