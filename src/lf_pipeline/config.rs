use std::path::PathBuf;

/// Everything one decode session needs from the outside world: the input
/// bitstream, where outputs land, and the external tool paths for the
/// base-layer codecs. Passed explicitly into the decoder, never global.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    pub input: PathBuf,
    pub output_directory: PathBuf,
    /// Defaults to `<output_directory>/decode_stats.json` when unset.
    pub stats_file: Option<PathBuf>,
    pub hevc_decoder: Option<PathBuf>,
    pub kakadu_expand: Option<PathBuf>,
    pub gzip: Option<PathBuf>,
    /// 3x3 median smoothing of predicted inverse-depth maps.
    pub median_filter_depth: bool,
    /// Persist every per-reference warped view next to the outputs.
    pub save_partial_warped: bool,
}

impl DecodeConfig {
    pub fn builder() -> DecodeConfigBuilder {
        DecodeConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct DecodeConfigBuilder {
    input: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    stats_file: Option<PathBuf>,
    hevc_decoder: Option<PathBuf>,
    kakadu_expand: Option<PathBuf>,
    gzip: Option<PathBuf>,
    median_filter_depth: Option<bool>,
    save_partial_warped: Option<bool>,
}

impl DecodeConfigBuilder {
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn output_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(path.into());
        self
    }

    pub fn stats_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_file = Some(path.into());
        self
    }

    pub fn hevc_decoder(mut self, path: impl Into<PathBuf>) -> Self {
        self.hevc_decoder = Some(path.into());
        self
    }

    pub fn kakadu_expand(mut self, path: impl Into<PathBuf>) -> Self {
        self.kakadu_expand = Some(path.into());
        self
    }

    pub fn gzip(mut self, path: impl Into<PathBuf>) -> Self {
        self.gzip = Some(path.into());
        self
    }

    pub fn median_filter_depth(mut self, enabled: bool) -> Self {
        self.median_filter_depth = Some(enabled);
        self
    }

    pub fn save_partial_warped(mut self, enabled: bool) -> Self {
        self.save_partial_warped = Some(enabled);
        self
    }

    pub fn build(self) -> DecodeConfig {
        DecodeConfig {
            input: self.input.unwrap_or_else(|| PathBuf::from("input.lf")),
            output_directory: self
                .output_directory
                .unwrap_or_else(|| PathBuf::from("decoded")),
            stats_file: self.stats_file,
            hevc_decoder: self.hevc_decoder,
            kakadu_expand: self.kakadu_expand,
            gzip: self.gzip,
            median_filter_depth: self.median_filter_depth.unwrap_or(false),
            save_partial_warped: self.save_partial_warped.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_overrides() {
        let config = DecodeConfig::builder()
            .input("stream.lf")
            .output_directory("out")
            .gzip("/usr/bin/gzip")
            .median_filter_depth(true)
            .build();

        assert_eq!(config.input, PathBuf::from("stream.lf"));
        assert_eq!(config.output_directory, PathBuf::from("out"));
        assert_eq!(config.gzip.as_deref(), Some(std::path::Path::new("/usr/bin/gzip")));
        assert!(config.median_filter_depth);
        assert!(!config.save_partial_warped);
        assert!(config.stats_file.is_none());
    }
}
