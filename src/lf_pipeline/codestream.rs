//! Per-view sections of the bitstream: one metadata record per view,
//! interleaved with the level-grouped texture access units and the
//! per-view depth-residual segments, in the exact order the encoder
//! packed them.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::lf_pipeline::codec::MetadataInflater;
use crate::lf_pipeline::error::{DecodeError, Result};
use crate::lf_pipeline::header::LightFieldHeader;
use crate::lf_pipeline::view::{MAX_REFERENCES, MergeMode, SparseFilter, View, ViewStatus};

/// Raw per-view metadata as carried in the bitstream, before validation
/// against the session header.
#[derive(Debug, Clone, Default)]
pub struct ViewRecord {
    pub column: i32,
    pub row: i32,
    pub width: i32,
    pub height: i32,
    pub components: u8,
    pub hierarchy_level: i32,
    pub merge_mode: u8,
    pub tap_radius: u8,
    pub sparse_taps: u8,
    pub use_global_sparse: bool,
    pub has_texture_residual: bool,
    pub has_depth_residual: bool,
    pub references: Vec<i32>,
    pub merge_weights: Vec<i16>,
    pub sparse_filters: Vec<SparseFilter>,
}

pub fn read_view_record<R: Read>(reader: &mut R) -> Result<ViewRecord> {
    let rd = |e| DecodeError::from_read(e, "view metadata record");

    let column = reader.read_i32::<LittleEndian>().map_err(rd)?;
    let row = reader.read_i32::<LittleEndian>().map_err(rd)?;
    let width = reader.read_i32::<LittleEndian>().map_err(rd)?;
    let height = reader.read_i32::<LittleEndian>().map_err(rd)?;
    let components = reader.read_u8().map_err(rd)?;
    let hierarchy_level = reader.read_i32::<LittleEndian>().map_err(rd)?;
    let merge_mode = reader.read_u8().map_err(rd)?;
    let tap_radius = reader.read_u8().map_err(rd)?;
    let sparse_taps = reader.read_u8().map_err(rd)?;
    let use_global_sparse = reader.read_u8().map_err(rd)? != 0;
    let has_texture_residual = reader.read_u8().map_err(rd)? != 0;
    let has_depth_residual = reader.read_u8().map_err(rd)? != 0;

    let reference_count = reader.read_u8().map_err(rd)? as usize;
    let mut references = Vec::with_capacity(reference_count);
    for _ in 0..reference_count {
        references.push(reader.read_i32::<LittleEndian>().map_err(rd)?);
    }

    let weight_count = reader.read_u16::<LittleEndian>().map_err(rd)? as usize;
    let mut merge_weights = Vec::with_capacity(weight_count);
    for _ in 0..weight_count {
        merge_weights.push(reader.read_i16::<LittleEndian>().map_err(rd)?);
    }

    let filter_count = reader.read_u16::<LittleEndian>().map_err(rd)? as usize;
    let mut sparse_filters = Vec::with_capacity(filter_count);
    for _ in 0..filter_count {
        let coeff_count = reader.read_u8().map_err(rd)? as usize;
        let mut quantized_coefficients = Vec::with_capacity(coeff_count);
        for _ in 0..coeff_count {
            quantized_coefficients.push(reader.read_i32::<LittleEndian>().map_err(rd)?);
        }
        let mut regressor_indices = Vec::with_capacity(coeff_count);
        for _ in 0..coeff_count {
            regressor_indices.push(reader.read_u16::<LittleEndian>().map_err(rd)?);
        }
        let bias_included = reader.read_u8().map_err(rd)? != 0;
        sparse_filters.push(SparseFilter {
            quantized_coefficients,
            regressor_indices,
            bias_included,
        });
    }

    Ok(ViewRecord {
        column,
        row,
        width,
        height,
        components,
        hierarchy_level,
        merge_mode,
        tap_radius,
        sparse_taps,
        use_global_sparse,
        has_texture_residual,
        has_depth_residual,
        references,
        merge_weights,
        sparse_filters,
    })
}

pub fn write_view_record<W: Write>(record: &ViewRecord, writer: &mut W) -> Result<()> {
    writer.write_i32::<LittleEndian>(record.column)?;
    writer.write_i32::<LittleEndian>(record.row)?;
    writer.write_i32::<LittleEndian>(record.width)?;
    writer.write_i32::<LittleEndian>(record.height)?;
    writer.write_u8(record.components)?;
    writer.write_i32::<LittleEndian>(record.hierarchy_level)?;
    writer.write_u8(record.merge_mode)?;
    writer.write_u8(record.tap_radius)?;
    writer.write_u8(record.sparse_taps)?;
    writer.write_u8(record.use_global_sparse as u8)?;
    writer.write_u8(record.has_texture_residual as u8)?;
    writer.write_u8(record.has_depth_residual as u8)?;

    writer.write_u8(record.references.len() as u8)?;
    for &reference in &record.references {
        writer.write_i32::<LittleEndian>(reference)?;
    }

    writer.write_u16::<LittleEndian>(record.merge_weights.len() as u16)?;
    for &weight in &record.merge_weights {
        writer.write_i16::<LittleEndian>(weight)?;
    }

    writer.write_u16::<LittleEndian>(record.sparse_filters.len() as u16)?;
    for filter in &record.sparse_filters {
        writer.write_u8(filter.quantized_coefficients.len() as u8)?;
        for &coeff in &filter.quantized_coefficients {
            writer.write_i32::<LittleEndian>(coeff)?;
        }
        for &index in &filter.regressor_indices {
            writer.write_u16::<LittleEndian>(index)?;
        }
        writer.write_u8(filter.bias_included as u8)?;
    }
    Ok(())
}

/// Coded residual payloads extracted from the per-view sections.
#[derive(Debug, Default)]
pub struct ResidualPayloads {
    /// One HEVC access unit per hierarchy level that carries any texture
    /// residual; the unit covers all same-level views in scan order.
    pub texture_access_units: HashMap<i32, Vec<u8>>,
    /// JPEG2000 segment per view with a coded depth residual, keyed by
    /// decode order.
    pub depth_segments: HashMap<usize, Vec<u8>>,
}

#[derive(Debug)]
pub struct ViewSections {
    pub records: Vec<ViewRecord>,
    pub payloads: ResidualPayloads,
    /// Bytes spent on per-view metadata (prediction side of the rate split).
    pub metadata_bytes: usize,
    /// Bytes spent on residual payloads.
    pub residual_bytes: usize,
}

fn read_length_prefixed<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let len = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| DecodeError::from_read(e, what))? as usize;
    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| DecodeError::from_read(e, what))?;
    Ok(bytes)
}

/// Reads all per-view sections. When the header's deflate flag is set the
/// metadata records come from one compressed blob expanded through the
/// injected inflater; the residual payloads always follow inline, one
/// texture access unit per level (at that level's first residual-carrying
/// view) and one depth segment per flagged view.
pub fn read_view_sections<R: Read>(
    reader: &mut R,
    header: &LightFieldHeader,
    inflater: &dyn MetadataInflater,
) -> Result<ViewSections> {
    let view_count = header.view_count as usize;
    let mut metadata_bytes = 0usize;
    let mut residual_bytes = 0usize;

    let mut deflated_records = if header.use_deflate {
        let compressed = read_length_prefixed(reader, "deflated view metadata")?;
        metadata_bytes += 4 + compressed.len();
        debug!(bytes = compressed.len(), "expanding deflated view metadata");
        let inflated = inflater.inflate(&compressed)?;
        Some(Cursor::new(inflated))
    } else {
        None
    };

    let mut records = Vec::with_capacity(view_count);
    let mut payloads = ResidualPayloads::default();
    let mut levels_in_codestream: Vec<i32> = Vec::new();

    for order in 0..view_count {
        let record = match deflated_records.as_mut() {
            Some(blob) => read_view_record(blob)?,
            None => {
                let record = read_view_record(reader)?;
                // Record size is not fixed; re-serialize to count it.
                let mut counted = Vec::new();
                write_view_record(&record, &mut counted)?;
                metadata_bytes += counted.len();
                record
            }
        };

        if record.has_texture_residual && !levels_in_codestream.contains(&record.hierarchy_level) {
            let unit = read_length_prefixed(reader, "texture residual access unit")?;
            residual_bytes += 4 + unit.len();
            payloads
                .texture_access_units
                .insert(record.hierarchy_level, unit);
            levels_in_codestream.push(record.hierarchy_level);
        }

        if record.has_depth_residual {
            let segment = read_length_prefixed(reader, "depth residual segment")?;
            residual_bytes += 4 + segment.len();
            payloads.depth_segments.insert(order, segment);
        }

        records.push(record);
    }

    Ok(ViewSections {
        records,
        payloads,
        metadata_bytes,
        residual_bytes,
    })
}

/// Validates a raw record against the session header and turns it into a
/// registry entry. Reference indices must be in range; self-references are
/// malformed; a weighted-LS view must carry a weight table matching its
/// reference count.
pub fn view_from_record(
    record: ViewRecord,
    decode_order: usize,
    header: &LightFieldHeader,
) -> Result<View> {
    let tag = format!("{:03}_{:03}", record.column, record.row);

    if record.width <= 0 || record.height <= 0 {
        return Err(DecodeError::Bitstream(format!(
            "view {tag}: invalid dimensions {}x{}",
            record.width, record.height
        )));
    }
    if record.components != 1 && record.components != 3 {
        return Err(DecodeError::Bitstream(format!(
            "view {tag}: unsupported component count {}",
            record.components
        )));
    }

    let merge_mode = MergeMode::from_code(record.merge_mode)?;

    // Validity classes are u16 bitmasks; more references than mask bits
    // cannot be merged and would overflow the class arithmetic.
    if record.references.len() > MAX_REFERENCES {
        return Err(DecodeError::Bitstream(format!(
            "view {tag}: {} references exceeds the limit of {MAX_REFERENCES}",
            record.references.len()
        )));
    }

    let mut references = Vec::with_capacity(record.references.len());
    for &reference in &record.references {
        if reference < 0 || reference as usize >= header.view_count as usize {
            return Err(DecodeError::Bitstream(format!(
                "view {tag}: reference index {reference} out of range"
            )));
        }
        if reference as usize == decode_order {
            return Err(DecodeError::Dependency(format!(
                "view {tag} references itself"
            )));
        }
        references.push(reference as usize);
    }

    if merge_mode == MergeMode::WeightedLs && !references.is_empty() {
        let classes = 1usize << references.len();
        let expected = references.len() * classes;
        if record.merge_weights.len() != expected {
            return Err(DecodeError::Bitstream(format!(
                "view {tag}: {} merge weights for {} references (expected {expected})",
                record.merge_weights.len(),
                references.len()
            )));
        }
    }

    if record.use_global_sparse {
        if header.sparse_components == 0 {
            return Err(DecodeError::Bitstream(format!(
                "view {tag}: global sparse filtering with zero sparse components"
            )));
        }
        if record.sparse_filters.is_empty()
            || record.sparse_filters.len() % header.sparse_components as usize != 0
        {
            return Err(DecodeError::Bitstream(format!(
                "view {tag}: {} sparse filters not divisible by {} components",
                record.sparse_filters.len(),
                header.sparse_components
            )));
        }
    }

    Ok(View {
        column: record.column,
        row: record.row,
        decode_order,
        hierarchy_level: record.hierarchy_level,
        width: record.width as usize,
        height: record.height as usize,
        components: record.components as usize,
        texture: None,
        inverse_depth: None,
        references,
        merge_mode,
        merge_weights: record.merge_weights,
        sparse_filters: record.sparse_filters,
        tap_radius: record.tap_radius as usize,
        sparse_taps: record.sparse_taps as usize,
        use_global_sparse: record.use_global_sparse,
        has_texture_residual: record.has_texture_residual,
        has_depth_residual: record.has_depth_residual,
        min_inv_depth: header.min_inverse_depth,
        status: ViewStatus::Pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lf_pipeline::header::Colorspace;

    fn test_header(view_count: i32) -> LightFieldHeader {
        LightFieldHeader {
            view_count,
            rows: 2,
            columns: 2,
            min_inverse_depth: 0,
            colorspace: Colorspace::Rgb,
            max_hierarchy_level: 1,
            sparse_components: 1,
            merge_components: 3,
            sparse_bias: false,
            reference_components: 3,
            segmentation_iterations: 4,
            use_deflate: false,
        }
    }

    fn test_record() -> ViewRecord {
        ViewRecord {
            column: 1,
            row: 0,
            width: 8,
            height: 6,
            components: 3,
            hierarchy_level: 1,
            merge_mode: 2,
            references: vec![0],
            ..Default::default()
        }
    }

    #[test]
    fn record_round_trip() {
        let mut record = test_record();
        record.merge_weights = vec![3, -5];
        record.sparse_filters = vec![SparseFilter {
            quantized_coefficients: vec![1 << 20, -77],
            regressor_indices: vec![4, 12],
            bias_included: true,
        }];

        let mut buf = Vec::new();
        write_view_record(&record, &mut buf).unwrap();
        let parsed = read_view_record(&mut Cursor::new(&buf)).unwrap();

        assert_eq!(parsed.column, 1);
        assert_eq!(parsed.references, vec![0]);
        assert_eq!(parsed.merge_weights, vec![3, -5]);
        assert_eq!(parsed.sparse_filters.len(), 1);
        assert_eq!(parsed.sparse_filters[0].quantized_coefficients, vec![1 << 20, -77]);
        assert_eq!(parsed.sparse_filters[0].regressor_indices, vec![4, 12]);
        assert!(parsed.sparse_filters[0].bias_included);
    }

    #[test]
    fn out_of_range_reference_rejected() {
        let mut record = test_record();
        record.references = vec![9];
        let err = view_from_record(record, 1, &test_header(4)).unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }

    #[test]
    fn reference_count_above_mask_capacity_rejected() {
        // 64 references parse fine but cannot fit a u16 validity mask;
        // the weighted-LS class count would overflow if this got through.
        let mut record = test_record();
        record.merge_mode = 0;
        record.references = (0..64).collect();
        let err = view_from_record(record, 70, &test_header(128)).unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }

    #[test]
    fn self_reference_is_a_dependency_error() {
        let mut record = test_record();
        record.references = vec![1];
        let err = view_from_record(record, 1, &test_header(4)).unwrap_err();
        assert!(matches!(err, DecodeError::Dependency(_)));
    }

    #[test]
    fn weighted_ls_requires_full_weight_table() {
        let mut record = test_record();
        record.merge_mode = 0;
        record.references = vec![0, 2];
        record.merge_weights = vec![1, 2, 3]; // needs 2 * 2^2 = 8
        let err = view_from_record(record, 1, &test_header(4)).unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }

    #[test]
    fn truncated_record_is_a_bitstream_error() {
        let mut buf = Vec::new();
        write_view_record(&test_record(), &mut buf).unwrap();
        buf.truncate(10);
        let err = read_view_record(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }
}
