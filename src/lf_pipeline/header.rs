use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::lf_pipeline::error::{DecodeError, Result};

/// Colorspace the light field was coded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Rgb,
    YCbCr,
}

impl Colorspace {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Colorspace::Rgb),
            1 => Ok(Colorspace::YCbCr),
            other => Err(DecodeError::Bitstream(format!(
                "unknown colorspace enumerator {other}"
            ))),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Colorspace::Rgb => 0,
            Colorspace::YCbCr => 1,
        }
    }
}

/// Global parameters shared by every view of one decode session.
/// Fixed-order little-endian fields, exactly as the encoder wrote them.
#[derive(Debug, Clone)]
pub struct LightFieldHeader {
    pub view_count: i32,
    pub rows: i32,
    pub columns: i32,
    pub min_inverse_depth: u16,
    pub colorspace: Colorspace,
    pub max_hierarchy_level: i32,
    pub sparse_components: u8,
    pub merge_components: u8,
    pub sparse_bias: bool,
    pub reference_components: u8,
    pub segmentation_iterations: u8,
    pub use_deflate: bool,
}

impl LightFieldHeader {
    /// Parses the header and returns it together with the number of bytes
    /// consumed (tracked for the prediction-rate figures).
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, usize)> {
        let rd = |e| DecodeError::from_read(e, "light-field header");

        let view_count = reader.read_i32::<LittleEndian>().map_err(rd)?;
        let rows = reader.read_i32::<LittleEndian>().map_err(rd)?;
        let columns = reader.read_i32::<LittleEndian>().map_err(rd)?;
        let min_inverse_depth = reader.read_u16::<LittleEndian>().map_err(rd)?;
        let colorspace = Colorspace::from_code(reader.read_u8().map_err(rd)?)?;
        let max_hierarchy_level = reader.read_i32::<LittleEndian>().map_err(rd)?;
        let sparse_components = reader.read_u8().map_err(rd)?;
        let merge_components = reader.read_u8().map_err(rd)?;
        let sparse_bias = reader.read_u8().map_err(rd)? != 0;
        let reference_components = reader.read_u8().map_err(rd)?;
        let segmentation_iterations = reader.read_u8().map_err(rd)?;
        let use_deflate = reader.read_u8().map_err(rd)? != 0;

        if view_count <= 0 {
            return Err(DecodeError::Bitstream(format!(
                "non-positive view count {view_count}"
            )));
        }
        if rows <= 0 || columns <= 0 {
            return Err(DecodeError::Bitstream(format!(
                "invalid camera array geometry {rows}x{columns}"
            )));
        }

        let header = Self {
            view_count,
            rows,
            columns,
            min_inverse_depth,
            colorspace,
            max_hierarchy_level,
            sparse_components,
            merge_components,
            sparse_bias,
            reference_components,
            segmentation_iterations,
            use_deflate,
        };
        Ok((header, Self::BYTE_SIZE))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(self.view_count)?;
        writer.write_i32::<LittleEndian>(self.rows)?;
        writer.write_i32::<LittleEndian>(self.columns)?;
        writer.write_u16::<LittleEndian>(self.min_inverse_depth)?;
        writer.write_u8(self.colorspace.code())?;
        writer.write_i32::<LittleEndian>(self.max_hierarchy_level)?;
        writer.write_u8(self.sparse_components)?;
        writer.write_u8(self.merge_components)?;
        writer.write_u8(self.sparse_bias as u8)?;
        writer.write_u8(self.reference_components)?;
        writer.write_u8(self.segmentation_iterations)?;
        writer.write_u8(self.use_deflate as u8)?;
        Ok(())
    }

    pub const BYTE_SIZE: usize = 4 + 4 + 4 + 2 + 1 + 4 + 1 + 1 + 1 + 1 + 1 + 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> LightFieldHeader {
        LightFieldHeader {
            view_count: 4,
            rows: 2,
            columns: 2,
            min_inverse_depth: 0,
            colorspace: Colorspace::YCbCr,
            max_hierarchy_level: 2,
            sparse_components: 1,
            merge_components: 3,
            sparse_bias: true,
            reference_components: 3,
            segmentation_iterations: 10,
            use_deflate: false,
        }
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), LightFieldHeader::BYTE_SIZE);

        let (parsed, n) = LightFieldHeader::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(n, LightFieldHeader::BYTE_SIZE);
        assert_eq!(parsed.view_count, 4);
        assert_eq!(parsed.colorspace, Colorspace::YCbCr);
        assert!(parsed.sparse_bias);
        assert_eq!(parsed.segmentation_iterations, 10);
    }

    #[test]
    fn truncated_header_is_a_bitstream_error() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        buf.truncate(7);

        let err = LightFieldHeader::read_from(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }

    #[test]
    fn unknown_colorspace_rejected() {
        assert!(Colorspace::from_code(2).is_err());
    }
}
