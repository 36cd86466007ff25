use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, info_span, instrument};

use crate::lf_pipeline::codec::{
    DepthCodec, GzipInflater, HmTextureCodec, KakaduDepthCodec, MetadataInflater, TextureCodec,
};
use crate::lf_pipeline::codestream::{ResidualPayloads, read_view_sections, view_from_record};
use crate::lf_pipeline::colorspace::ycbcr_to_rgb;
use crate::lf_pipeline::config::DecodeConfig;
use crate::lf_pipeline::depth::{
    DepthPredictor, ReferenceDepth, WarpingDepthPredictor, median_filter_3x3,
};
use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::header::{Colorspace, LightFieldHeader};
use crate::lf_pipeline::merging::{
    dequantize_merge_weights, fill_holes, geometric_weight_table, merge_median, merge_weighted,
    validity_classes,
};
use crate::lf_pipeline::residual::{
    apply_residual, crop_codec_frame, dequantize_residual, padded_codec_dims, quant_params,
};
use crate::lf_pipeline::scheduler::{Schedule, build_schedule, serpentine_order};
use crate::lf_pipeline::segmentation::segment_inverse_depth;
use crate::lf_pipeline::sparsefilter::apply_global_sparse_filter;
use crate::lf_pipeline::stats::{SessionStats, ViewStats};
use crate::lf_pipeline::store::{Frame, FrameStore, PnmFrameStore};
use crate::lf_pipeline::timing::{StageTimings, Timer};
use crate::lf_pipeline::view::{LightField, MergeMode, View};
use crate::lf_pipeline::warping::{TargetGeometry, WarpedView, warp_to_target};

/// The whole decoder, generic over its external collaborators so the
/// reconstruction pipeline can run against fakes. Views are processed
/// strictly sequentially in schedule order; later views may depend on
/// any earlier one's buffers.
pub struct LightFieldDecoder<T, D, M, S, P> {
    config: DecodeConfig,
    texture_codec: T,
    depth_codec: D,
    inflater: M,
    store: S,
    depth_predictor: P,
}

/// Decoder wired to the real external tools.
pub type ExternalToolDecoder =
    LightFieldDecoder<HmTextureCodec, KakaduDepthCodec, GzipInflater, PnmFrameStore, WarpingDepthPredictor>;

impl ExternalToolDecoder {
    pub fn new(config: DecodeConfig) -> Result<Self> {
        let scratch = config.output_directory.join("scratch");
        let texture_codec = HmTextureCodec::new(config.hevc_decoder.as_deref(), &scratch)?;
        let depth_codec = KakaduDepthCodec::new(config.kakadu_expand.as_deref(), &scratch)?;
        let inflater = GzipInflater::new(config.gzip.as_deref(), scratch);
        Ok(Self::with_collaborators(
            config,
            texture_codec,
            depth_codec,
            inflater,
            PnmFrameStore,
            WarpingDepthPredictor,
        ))
    }
}

impl<T, D, M, S, P> LightFieldDecoder<T, D, M, S, P>
where
    T: TextureCodec,
    D: DepthCodec,
    M: MetadataInflater,
    S: FrameStore,
    P: DepthPredictor,
{
    pub fn with_collaborators(
        config: DecodeConfig,
        texture_codec: T,
        depth_codec: D,
        inflater: M,
        store: S,
        depth_predictor: P,
    ) -> Self {
        Self {
            config,
            texture_codec,
            depth_codec,
            inflater,
            store,
            depth_predictor,
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decodes the whole light field: header, per-view metadata, batched
    /// base-layer residuals, then one full reconstruction pass per view
    /// in dependency order. Returns the session summary that was also
    /// persisted as JSON.
    pub fn decode(&self) -> Result<SessionStats> {
        let mut timings = StageTimings::new();
        std::fs::create_dir_all(&self.config.output_directory)?;

        let timer = Timer::start("parse_bitstream");
        let data = std::fs::read(&self.config.input).map_err(|e| {
            DecodeError::Configuration(format!(
                "cannot open input {}: {e}",
                self.config.input.display()
            ))
        })?;
        let mut cursor = Cursor::new(data);
        let (header, header_bytes) = LightFieldHeader::read_from(&mut cursor)?;
        info!(
            views = header.view_count,
            rows = header.rows,
            columns = header.columns,
            colorspace = ?header.colorspace,
            "light-field header parsed"
        );

        if header.use_deflate && !self.inflater.available() {
            return Err(DecodeError::Configuration(
                "per-view metadata is deflate-compressed but no decompression tool is configured"
                    .into(),
            ));
        }

        let sections = read_view_sections(&mut cursor, &header, &self.inflater)?;
        let mut views = Vec::with_capacity(sections.records.len());
        for (order, record) in sections.records.into_iter().enumerate() {
            views.push(view_from_record(record, order, &header)?);
        }
        let mut light_field = LightField::new(header, views);
        let schedule = build_schedule(&light_field.views)?;
        timer.record(&mut timings);

        let mut residual_frames =
            self.decode_texture_residuals(&light_field, &sections.payloads, &mut timings)?;
        let texture_bytes = texture_byte_shares(&light_field, &sections.payloads);

        let mut stats = SessionStats::new(
            &self.config,
            light_field.header.use_deflate,
            light_field.header.segmentation_iterations,
        );
        stats.metadata_bytes = sections.metadata_bytes + header_bytes;
        stats.residual_bytes = sections.residual_bytes;

        for (position, &index) in schedule.order.iter().enumerate() {
            self.reconstruct_view(
                &mut light_field,
                index,
                &sections.payloads,
                &mut residual_frames,
                &mut timings,
            )?;

            stats.views.push(ViewStats::for_view(
                &light_field.views[index],
                texture_bytes.get(&index).copied().unwrap_or(0),
                sections
                    .payloads
                    .depth_segments
                    .get(&index)
                    .map_or(0, Vec::len),
            ));

            self.release_dead_buffers(&mut light_field, &schedule, position, index);
        }

        stats.views.sort_by_key(|v| v.decode_order);
        timings.log_summary();

        let stats_path = self
            .config
            .stats_file
            .clone()
            .unwrap_or_else(|| self.config.output_directory.join("decode_stats.json"));
        stats.write_to(&stats_path)?;
        info!(path = %stats_path.display(), "decode complete");
        Ok(stats)
    }

    /// Batched base-codec decode: one access unit per hierarchy level
    /// that carries texture residuals, covering all same-level views in
    /// serpentine scan order at coding-unit-padded dimensions.
    fn decode_texture_residuals(
        &self,
        light_field: &LightField,
        payloads: &ResidualPayloads,
        timings: &mut StageTimings,
    ) -> Result<HashMap<usize, Vec<u16>>> {
        let timer = Timer::start("base_codec");
        let mut frames = HashMap::new();

        for level in 0..=light_field.highest_level() {
            let subset: Vec<usize> = (0..light_field.views.len())
                .filter(|&i| light_field.views[i].hierarchy_level == level)
                .collect();
            if subset.is_empty()
                || !subset
                    .iter()
                    .any(|&i| light_field.views[i].has_texture_residual)
            {
                continue;
            }

            let unit = payloads.texture_access_units.get(&level).ok_or_else(|| {
                DecodeError::Bitstream(format!(
                    "no texture access unit for hierarchy level {level}"
                ))
            })?;

            let scan = serpentine_order(&light_field.views, &subset);
            let first = &light_field.views[scan[0]];
            let (padded_w, padded_h) = padded_codec_dims(first.width, first.height);
            let components = if light_field.header.reference_components > 1 {
                3
            } else {
                1
            };

            info!(level, views = scan.len(), "decoding texture residuals");
            let decoded = self.texture_codec.decode_access_unit(
                unit,
                scan.len(),
                padded_w,
                padded_h,
                components,
            )?;
            if decoded.len() < scan.len() {
                return Err(DecodeError::Codec(format!(
                    "base codec returned {} frames for {} views",
                    decoded.len(),
                    scan.len()
                )));
            }

            for (f, &i) in scan.iter().enumerate() {
                let view = &light_field.views[i];
                if !view.has_texture_residual {
                    continue;
                }
                frames.insert(
                    i,
                    crop_codec_frame(
                        &decoded[f],
                        padded_w,
                        padded_h,
                        view.width,
                        view.height,
                        components,
                    ),
                );
            }
        }

        timer.record(timings);
        Ok(frames)
    }

    #[instrument(skip_all, fields(view = %light_field.views[index].tag()))]
    fn reconstruct_view(
        &self,
        light_field: &mut LightField,
        index: usize,
        payloads: &ResidualPayloads,
        residual_frames: &mut HashMap<usize, Vec<u16>>,
        timings: &mut StageTimings,
    ) -> Result<()> {
        let target = TargetGeometry::of(&light_field.views[index]);
        let pixels = target.pixels();
        let tag = light_field.views[index].tag();
        info!("decoding view {tag}");

        // Inverse depth: coded residual wins, otherwise predict from the
        // references' reconstructed depth maps.
        let timer = Timer::start("depth");
        let mut depth = if light_field.views[index].has_depth_residual {
            let segment = payloads.depth_segments.get(&index).ok_or_else(|| {
                DecodeError::Bitstream(format!("missing depth residual segment for view {tag}"))
            })?;
            info!("decoding inverse-depth residual for view {tag}");
            self.depth_codec
                .decode_depth(segment, target.width, target.height)?
        } else {
            let references = reference_depths(light_field, index)?;
            self.depth_predictor.predict(
                &target,
                light_field.views[index].min_inv_depth,
                &references,
            )?
        };
        if self.config.median_filter_depth {
            depth = median_filter_3x3(&depth, target.width, target.height);
        }
        self.store
            .write_frame(&self.depth_path(&tag), &Frame::new(target.width, target.height, 1, depth.clone()))?;
        light_field.views[index].inverse_depth = Some(depth);
        timer.record(timings);

        // Texture prediction from the references, when there are any.
        let mut texture = if light_field.views[index].references.is_empty() {
            vec![0u16; pixels * light_field.views[index].components]
        } else {
            self.predict_texture(light_field, index, &target, timings)?
        };

        // Residual application.
        let timer = Timer::start("residual");
        if light_field.views[index].has_texture_residual {
            let coded = residual_frames.remove(&index).ok_or_else(|| {
                DecodeError::Bitstream(format!("no decoded texture residual for view {tag}"))
            })?;
            let (q, offset) = quant_params(light_field.views[index].hierarchy_level);
            let residual = dequantize_residual(&coded, q, offset);
            if residual.len() != texture.len() {
                return Err(DecodeError::Bitstream(format!(
                    "view {tag}: residual carries {} samples for a {}-sample prediction",
                    residual.len(),
                    texture.len()
                )));
            }
            texture = apply_residual(&texture, &residual);
        }
        timer.record(timings);

        light_field.views[index].texture = Some(texture);
        light_field.views[index].mark_reconstructed();

        let timer = Timer::start("write_outputs");
        self.write_outputs(light_field, index, &tag)?;
        timer.record(timings);
        Ok(())
    }

    /// Warp all references into the target grid, merge the candidates,
    /// fill holes, and optionally refine with the global sparse filter.
    fn predict_texture(
        &self,
        light_field: &LightField,
        index: usize,
        target: &TargetGeometry,
        timings: &mut StageTimings,
    ) -> Result<Vec<u16>> {
        let view = &light_field.views[index];
        let pixels = target.pixels();
        let components = view.components;

        let timer = Timer::start("warp");
        let mut sources = Vec::with_capacity(view.references.len());
        for &reference in &view.references {
            let r = &light_field.views[reference];
            sources.push((r.texture()?, r.inverse_depth()?, r.column, r.row));
        }
        let min_inv_depth = view.min_inv_depth;
        let warped: Vec<WarpedView> = sources
            .par_iter()
            .map(|&(texture, depth, column, row)| {
                warp_to_target(texture, depth, components, column, row, min_inv_depth, target)
            })
            .collect();

        if self.config.save_partial_warped {
            for (w, &reference) in warped.iter().zip(&view.references) {
                let r = &light_field.views[reference];
                let path = self.config.output_directory.join(format!(
                    "{}_warped_to_{}.ppm",
                    r.tag(),
                    view.tag()
                ));
                self.store.write_frame(
                    &path,
                    &Frame::new(target.width, target.height, components, w.texture.clone()),
                )?;
            }
        }
        timer.record(timings);

        let timer = Timer::start("merge");
        let merged = match view.merge_mode {
            MergeMode::WeightedLs => {
                let classes = validity_classes(&warped, pixels);
                let weights =
                    dequantize_merge_weights(&view.merge_weights, view.references.len());
                merge_weighted(&warped, &classes, &weights, components)?
            }
            MergeMode::GeometricWeight => {
                let classes = validity_classes(&warped, pixels);
                let weights = geometric_weight_table(light_field, view);
                merge_weighted(&warped, &classes, &weights, components)?
            }
            MergeMode::Median => merge_median(&warped, pixels, components),
        };
        let mut texture = merged.texture;
        let mut valid = merged.valid;
        fill_holes(&mut texture, &mut valid, target.width, target.height, components);
        timer.record(timings);

        if view.use_global_sparse {
            let timer = Timer::start("sparse_filter");
            let span = info_span!("sparse_filter").entered();
            let sparse_components = light_field.header.sparse_components as usize;
            let regions = (view.sparse_filters.len() / sparse_components) as u32;
            let segmentation = segment_inverse_depth(
                light_field.views[index].inverse_depth()?,
                target.width,
                target.height,
                regions,
                light_field.header.segmentation_iterations as u32,
            );

            let mut reference_textures = Vec::with_capacity(view.references.len());
            for &reference in &view.references {
                reference_textures.push(light_field.views[reference].texture()?);
            }
            apply_global_sparse_filter(
                &mut texture,
                target.width,
                target.height,
                components,
                sparse_components,
                &reference_textures,
                &segmentation,
                &view.sparse_filters,
                view.tap_radius,
                light_field.header.sparse_bias,
            )?;
            drop(span);
            timer.record(timings);
        }

        Ok(texture)
    }

    /// Persists the internal-colorspace texture and the colorspace-
    /// converted output view.
    fn write_outputs(&self, light_field: &LightField, index: usize, tag: &str) -> Result<()> {
        let view = &light_field.views[index];
        let texture = view.texture()?;
        let pixels = view.pixels();

        self.store.write_frame(
            &self.internal_path(tag, view),
            &Frame::new(view.width, view.height, view.components, texture.to_vec()),
        )?;

        let luma_only = light_field.header.reference_components == 1 || view.components == 1;
        if luma_only {
            let plane = texture[..pixels].to_vec();
            self.store.write_frame(
                &self.output_path(tag, 1),
                &Frame::new(view.width, view.height, 1, plane),
            )?;
        } else {
            let converted = match light_field.colorspace() {
                Colorspace::YCbCr => ycbcr_to_rgb(texture, pixels),
                Colorspace::Rgb => texture.to_vec(),
            };
            self.store.write_frame(
                &self.output_path(tag, 3),
                &Frame::new(view.width, view.height, 3, converted),
            )?;
        }
        Ok(())
    }

    fn release_dead_buffers(
        &self,
        light_field: &mut LightField,
        schedule: &Schedule,
        position: usize,
        index: usize,
    ) {
        for released in schedule.released_at(position) {
            light_field.views[released].release_buffers();
        }
        // A view nothing ever references only had to survive long enough
        // to be written out.
        if schedule.release_after[index].is_none() {
            light_field.views[index].release_buffers();
        }
    }

    fn depth_path(&self, tag: &str) -> PathBuf {
        self.config.output_directory.join(format!("{tag}_depth.pgm"))
    }

    fn internal_path(&self, tag: &str, view: &View) -> PathBuf {
        let ext = if view.components == 1 { "pgm" } else { "ppm" };
        self.config
            .output_directory
            .join(format!("{tag}_internal.{ext}"))
    }

    fn output_path(&self, tag: &str, components: usize) -> PathBuf {
        let ext = if components == 1 { "pgm" } else { "ppm" };
        self.config.output_directory.join(format!("{tag}.{ext}"))
    }
}

/// References' reconstructed depth maps for the target's predictor call.
fn reference_depths(light_field: &LightField, index: usize) -> Result<Vec<ReferenceDepth<'_>>> {
    let mut references = Vec::with_capacity(light_field.views[index].references.len());
    for &reference in &light_field.views[index].references {
        let r = &light_field.views[reference];
        references.push(ReferenceDepth {
            depth: r.inverse_depth()?,
            column: r.column,
            row: r.row,
        });
    }
    Ok(references)
}

/// Splits each level's access-unit bytes evenly over the views whose
/// residual it carries, for the per-view rate figures.
fn texture_byte_shares(
    light_field: &LightField,
    payloads: &ResidualPayloads,
) -> HashMap<usize, usize> {
    let mut shares = HashMap::new();
    for (&level, unit) in &payloads.texture_access_units {
        let carriers: Vec<usize> = (0..light_field.views.len())
            .filter(|&i| {
                light_field.views[i].hierarchy_level == level
                    && light_field.views[i].has_texture_residual
            })
            .collect();
        if carriers.is_empty() {
            continue;
        }
        let share = unit.len() / carriers.len();
        for i in carriers {
            shares.insert(i, share);
        }
    }
    shares
}
