//! SDIF partial files
//!
//! Partials travel as big-endian SDIF frames:
//! - `RBEP` - bandwidth-enhanced breakpoints, 6 columns (index, frequency,
//!   amplitude, phase, bandwidth, time offset), at most one breakpoint per
//!   partial in each frame
//! - `RBEL` - partial labels, 2 columns (index, label), written once
//! - `RBEM` - marker times and NUL-terminated marker names
//! - `1TRC` - sine-only tracks, 4 columns, resampled at the frame times
//!
//! Unknown frames and matrices are skipped on import.

mod reader;
mod writer;

use crate::error::{SdifError, SdifResult};
use rbe_core::{Marker, Partial, PartialList};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

pub(crate) use reader::SdifReader;
pub(crate) use writer::SdifWriter;

/// Frame and matrix signatures
pub mod signatures {
    pub const SDIF: [u8; 4] = *b"SDIF";
    pub const ENHANCED: [u8; 4] = *b"RBEP";
    pub const LABELS: [u8; 4] = *b"RBEL";
    pub const MARKERS: [u8; 4] = *b"RBEM";
    pub const SINE_ONLY: [u8; 4] = *b"1TRC";
}

/// Matrix element types; the low byte is the element size
pub mod data_type {
    pub const FLOAT32: i32 = 0x0004;
    pub const FLOAT64: i32 = 0x0008;
    pub const INT16: i32 = 0x0102;
    pub const INT32: i32 = 0x0104;
    pub const INT64: i32 = 0x0108;
    pub const UINT32: i32 = 0x0204;
    pub const UTF8: i32 = 0x0301;
    pub const BYTE: i32 = 0x0401;

    pub const fn size_of(data_type: i32) -> i64 {
        (data_type & 0xff) as i64
    }
}

pub(crate) const SPEC_VERSION: i32 = 3;
pub(crate) const TYPES_VERSION: i32 = 1;

/// Stream carrying breakpoint frames
pub(crate) const ENVELOPE_STREAM: i32 = 1;
/// Stream carrying label and marker frames
pub(crate) const INFO_STREAM: i32 = 2;

/// Columns of a full row: the enhanced columns plus a resampled flag
pub(crate) const MAX_ROW_COLUMNS: usize = 7;
pub(crate) const ENHANCED_COLUMNS: usize = 6;
pub(crate) const SINE_ONLY_COLUMNS: usize = 4;

/// Time, stream id and matrix count, counted in a frame's size
pub(crate) const FRAME_HEADER_TAIL: i64 = 16;
pub(crate) const MATRIX_HEADER_SIZE: i64 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameHeader {
    pub signature: [u8; 4],
    /// Bytes following the size field
    pub size: i32,
    pub time: f64,
    pub stream_id: i32,
    pub matrix_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MatrixHeader {
    pub signature: [u8; 4],
    pub data_type: i32,
    pub rows: i32,
    pub cols: i32,
}

impl MatrixHeader {
    /// Unpadded data size in bytes.
    pub fn data_len(&self) -> i64 {
        data_type::size_of(self.data_type) * self.rows as i64 * self.cols as i64
    }

    pub fn padding(&self) -> i64 {
        let rem = self.data_len() % 8;
        if rem == 0 { 0 } else { 8 - rem }
    }

    pub fn padded_len(&self) -> i64 {
        self.data_len() + self.padding()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SDIF FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Partials and markers read from or bound for an SDIF file.
#[derive(Debug, Clone, Default)]
pub struct SdifFile {
    partials: PartialList,
    markers: Vec<Marker>,
}

impl SdifFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import every non-empty partial and every marker in `path`.
    pub fn read(path: impl AsRef<Path>) -> SdifResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SdifError::ReadFailed(Box::new(SdifError::bad_format(format!(
                "Could not open SDIF file for reading: {}: {}",
                path.display(),
                e
            ))))
        })?;
        let sdif = Self::read_from(BufReader::new(file))?;
        if sdif.partials.is_empty() {
            log::warn!(
                "No Partials were imported from {}, no (non-empty) SDIF frames found.",
                path.display()
            );
        }
        Ok(sdif)
    }

    /// Import from any seekable byte source.
    pub fn read_from<R: Read + Seek>(reader: R) -> SdifResult<Self> {
        let result = SdifReader::open(reader).and_then(|mut r| r.read_all());
        match result {
            Ok((partials, markers)) => {
                log::info!(
                    "imported {} Partials and {} Markers from SDIF",
                    partials.len(),
                    markers.len()
                );
                Ok(Self { partials, markers })
            }
            Err(e) => Err(SdifError::ReadFailed(Box::new(e))),
        }
    }

    /// Collect the partials to export.
    pub fn from_partials<I: IntoIterator<Item = Partial>>(partials: I) -> Self {
        Self {
            partials: partials.into_iter().collect(),
            markers: Vec::new(),
        }
    }

    pub fn with_markers(mut self, markers: Vec<Marker>) -> Self {
        self.markers = markers;
        self
    }

    pub fn partials(&self) -> &PartialList {
        &self.partials
    }

    pub fn partials_mut(&mut self) -> &mut PartialList {
        &mut self.partials
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }

    pub fn add_partial(&mut self, p: Partial) {
        self.partials.push(p);
    }

    pub fn into_parts(self) -> (PartialList, Vec<Marker>) {
        (self.partials, self.markers)
    }

    /// Export as `RBEP` frames with labels and markers.
    pub fn write(&self, path: impl AsRef<Path>) -> SdifResult<()> {
        self.write_path(path.as_ref(), true)
    }

    /// Export as sine-only `1TRC` frames with labels and markers.
    pub fn write_1trc(&self, path: impl AsRef<Path>) -> SdifResult<()> {
        self.write_path(path.as_ref(), false)
    }

    pub fn write_to<W: Write>(&self, out: W) -> SdifResult<()> {
        self.export(out, true)
    }

    pub fn write_1trc_to<W: Write>(&self, out: W) -> SdifResult<()> {
        self.export(out, false)
    }

    fn write_path(&self, path: &Path, enhanced: bool) -> SdifResult<()> {
        let file = File::create(path).map_err(|e| {
            SdifError::WriteFailed(Box::new(SdifError::bad_format(format!(
                "Could not open SDIF file for writing: {}: {}",
                path.display(),
                e
            ))))
        })?;
        self.export(BufWriter::new(file), enhanced)
    }

    fn export<W: Write>(&self, out: W, enhanced: bool) -> SdifResult<()> {
        self.export_frames(out, enhanced)
            .map_err(|e| SdifError::WriteFailed(Box::new(e)))
    }

    fn export_frames<W: Write>(&self, out: W, enhanced: bool) -> SdifResult<()> {
        let mut writer = SdifWriter::begin(out)?;
        writer.write_all(&self.partials, &self.markers, enhanced)?;
        writer.finish()
    }
}
