//! Hierarchical light-field decoding pipeline
//!
//! This module reconstructs a full grid of camera views from a single
//! coded bitstream: base-layer residuals come from external reference
//! codecs, everything else is predicted by depth-image-based warping,
//! candidate merging, and sparse-filter refinement, one hierarchy level
//! at a time.

pub mod codec;
pub mod codestream;
pub mod colorspace;
pub mod config;
pub mod depth;
pub mod error;
pub mod header;
pub mod merging;
pub mod pipeline;
pub mod residual;
pub mod scheduler;
pub mod segmentation;
pub mod sparsefilter;
pub mod stats;
pub mod store;
pub mod timing;
pub mod view;
pub mod warping;


pub use codec::{
    DepthCodec, GzipInflater, HmTextureCodec, KakaduDepthCodec, MetadataInflater, TextureCodec,
};
pub use config::{DecodeConfig, DecodeConfigBuilder};
pub use error::{DecodeError, Result};
pub use header::{Colorspace, LightFieldHeader};
pub use pipeline::{ExternalToolDecoder, LightFieldDecoder};
pub use stats::SessionStats;
pub use store::{Frame, FrameStore, PnmFrameStore};
pub use view::{LightField, MergeMode, View};
