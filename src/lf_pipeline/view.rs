use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::header::{Colorspace, LightFieldHeader};

/// Sample bit depth of every texture and residual plane.
pub const BIT_DEPTH: u32 = 10;
/// Largest representable sample value at [`BIT_DEPTH`].
pub const MAX_SAMPLE: u16 = (1 << BIT_DEPTH) - 1;
/// Most references one view may merge from; validity classes are u16
/// bitmasks, one bit per reference.
pub const MAX_REFERENCES: usize = 16;

/// How the warped reference candidates are combined into one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Per-pixel weights fitted by the encoder and carried in the bitstream.
    WeightedLs,
    /// Weights derived purely from camera-array distance to the target.
    GeometricWeight,
    /// Per-pixel median of the valid candidates.
    Median,
}

impl MergeMode {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MergeMode::WeightedLs),
            1 => Ok(MergeMode::GeometricWeight),
            2 => Ok(MergeMode::Median),
            other => Err(DecodeError::Bitstream(format!(
                "unknown merge mode {other}"
            ))),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MergeMode::WeightedLs => 0,
            MergeMode::GeometricWeight => 1,
            MergeMode::Median => 2,
        }
    }
}

/// One region's linear predictor: quantized coefficients plus the
/// regressor taps they apply to. Consumed once, then discarded.
#[derive(Debug, Clone, Default)]
pub struct SparseFilter {
    pub quantized_coefficients: Vec<i32>,
    pub regressor_indices: Vec<u16>,
    pub bias_included: bool,
}

/// Lifecycle of a view's buffers within one decode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// Not yet reconstructed; buffers must not be read.
    Pending,
    /// Texture and inverse depth are final and may serve as references.
    Reconstructed,
    /// Buffers dropped after the last dependent consumed them.
    Released,
}

/// One camera-array sample. Buffers are transient: allocated when the view
/// is reconstructed, dropped once no later view needs them.
#[derive(Debug, Clone)]
pub struct View {
    pub column: i32,
    pub row: i32,
    /// Position of this view's metadata in the bitstream.
    pub decode_order: usize,
    pub hierarchy_level: i32,

    pub width: usize,
    pub height: usize,
    pub components: usize,

    /// Planar samples, `components * width * height`, component-major.
    pub texture: Option<Vec<u16>>,
    /// `width * height` fixed-point inverse-depth samples.
    pub inverse_depth: Option<Vec<u16>>,

    pub references: Vec<usize>,
    pub merge_mode: MergeMode,
    /// Quantized weight table for [`MergeMode::WeightedLs`], laid out
    /// `[reference][validity class]`.
    pub merge_weights: Vec<i16>,
    pub sparse_filters: Vec<SparseFilter>,
    /// Sparse filter neighborhood radius (taps span `2r+1` square).
    pub tap_radius: usize,
    /// Active coefficients per sparse filter.
    pub sparse_taps: usize,
    pub use_global_sparse: bool,
    pub has_texture_residual: bool,
    pub has_depth_residual: bool,
    /// Inverse-depth floor applied before prediction and warping.
    pub min_inv_depth: u16,

    pub status: ViewStatus,
}

impl View {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn samples(&self) -> usize {
        self.pixels() * self.components
    }

    pub fn texture(&self) -> Result<&[u16]> {
        self.texture.as_deref().ok_or_else(|| {
            DecodeError::Dependency(format!(
                "texture of view {:03}_{:03} is not resident",
                self.column, self.row
            ))
        })
    }

    pub fn inverse_depth(&self) -> Result<&[u16]> {
        self.inverse_depth.as_deref().ok_or_else(|| {
            DecodeError::Dependency(format!(
                "inverse depth of view {:03}_{:03} is not resident",
                self.column, self.row
            ))
        })
    }

    pub fn mark_reconstructed(&mut self) {
        self.status = ViewStatus::Reconstructed;
    }

    pub fn release_buffers(&mut self) {
        self.texture = None;
        self.inverse_depth = None;
        self.status = ViewStatus::Released;
    }

    /// `<column>_<row>` tag used in output file names and logs.
    pub fn tag(&self) -> String {
        format!("{:03}_{:03}", self.column, self.row)
    }
}

/// Process-wide state for one decode session: the header plus the owning
/// arena of views, referenced everywhere else by stable index.
#[derive(Debug)]
pub struct LightField {
    pub header: LightFieldHeader,
    pub views: Vec<View>,
}

impl LightField {
    pub fn new(header: LightFieldHeader, views: Vec<View>) -> Self {
        Self { header, views }
    }

    pub fn colorspace(&self) -> Colorspace {
        self.header.colorspace
    }

    /// Highest hierarchy level actually present among the views.
    pub fn highest_level(&self) -> i32 {
        self.views
            .iter()
            .map(|v| v.hierarchy_level)
            .max()
            .unwrap_or(0)
    }

    /// Diagonal of the camera array in view-position units. Positive even
    /// for a single-view array.
    pub fn array_diagonal(&self) -> f64 {
        let dr = (self.header.rows - 1).max(0) as f64;
        let dc = (self.header.columns - 1).max(0) as f64;
        (dr * dr + dc * dc).sqrt()
    }
}
