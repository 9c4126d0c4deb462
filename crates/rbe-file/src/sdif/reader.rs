//! SDIF import

use super::{
    data_type, signatures, FrameHeader, MatrixHeader, FRAME_HEADER_TAIL, MATRIX_HEADER_SIZE, MAX_ROW_COLUMNS,
    SPEC_VERSION, TYPES_VERSION,
};
use crate::error::{SdifError, SdifResult};
use rbe_core::{Breakpoint, Label, Marker, Partial, PartialList};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

const ROW_INDEX: usize = 0;
const ROW_FREQ_OR_LABEL: usize = 1;
const ROW_AMP: usize = 2;
const ROW_PHASE: usize = 3;
const ROW_NOISE: usize = 4;
const ROW_TIME_OFFSET: usize = 5;
const ROW_RESAMPLED: usize = 6;

pub(crate) struct SdifReader<R> {
    reader: R,
    /// Partials by the index their rows carry
    partials: BTreeMap<u64, Partial>,
    markers: Vec<Marker>,
}

impl<R: Read + Seek> SdifReader<R> {
    /// Check the global header and position at the first frame.
    pub fn open(mut reader: R) -> SdifResult<Self> {
        let mut sig = [0u8; 4];
        reader.read_exact(&mut sig)?;
        if sig != signatures::SDIF {
            return Err(SdifError::library("Bad SDIF header"));
        }

        let size = read_i32(&mut reader)?;
        if size % 8 != 0 || size < 8 {
            return Err(SdifError::library("Bad SDIF header"));
        }
        let version = read_i32(&mut reader)?;
        let types_version = read_i32(&mut reader)?;
        if version < SPEC_VERSION {
            return Err(SdifError::library("Obsolete SDIF file from an old version of SDIF"));
        }
        if types_version < TYPES_VERSION {
            return Err(SdifError::library(
                "Obsolete version of the standard SDIF frame and matrix types",
            ));
        }
        if size > 8 {
            reader.seek(SeekFrom::Current(size as i64 - 8))?;
        }

        Ok(Self {
            reader,
            partials: BTreeMap::new(),
            markers: Vec::new(),
        })
    }

    /// Read every frame; partials come back in index order, empty ones
    /// dropped.
    pub fn read_all(&mut self) -> SdifResult<(PartialList, Vec<Marker>)> {
        while let Some(fh) = self.read_frame_header()? {
            let start = self.reader.stream_position()?;
            let end = start as i64 + fh.size as i64 - FRAME_HEADER_TAIL;

            match fh.signature {
                signatures::MARKERS => self.read_markers(&fh, end)?,
                signatures::ENHANCED | signatures::SINE_ONLY | signatures::LABELS => {
                    self.read_partial_frame(&fh, end)?
                }
                other => {
                    log::debug!(
                        "skipping {} frame at {:.4} s (stream {})",
                        String::from_utf8_lossy(&other),
                        fh.time,
                        fh.stream_id
                    );
                    if fh.size as i64 - FRAME_HEADER_TAIL < 0 {
                        return Err(SdifError::library(
                            "Frame header's size is too low for time tag and stream ID",
                        ));
                    }
                }
            }

            let pos = self.reader.stream_position()? as i64;
            if pos < end {
                self.reader.seek(SeekFrom::Start(end as u64))?;
            }
        }

        let partials = std::mem::take(&mut self.partials)
            .into_values()
            .filter(|p| !p.is_empty())
            .collect();
        Ok((partials, std::mem::take(&mut self.markers)))
    }

    /// Next frame header, `None` at the end of the data.
    fn read_frame_header(&mut self) -> SdifResult<Option<FrameHeader>> {
        let mut signature = [0u8; 4];
        match self.reader.read_exact(&mut signature) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        Ok(Some(FrameHeader {
            signature,
            size: read_i32(&mut self.reader)?,
            time: read_f64(&mut self.reader)?,
            stream_id: read_i32(&mut self.reader)?,
            matrix_count: read_i32(&mut self.reader)?,
        }))
    }

    /// Matrix header whose header and padded data both end at or before
    /// `frame_end`.
    fn read_matrix_header(&mut self, frame_end: i64) -> SdifResult<MatrixHeader> {
        let start = self.reader.stream_position()? as i64;
        if start + MATRIX_HEADER_SIZE > frame_end {
            return Err(SdifError::library("Bad SDIF matrix header"));
        }
        let mut signature = [0u8; 4];
        self.reader
            .read_exact(&mut signature)
            .map_err(|_| SdifError::library("Bad SDIF matrix header"))?;
        let mh = MatrixHeader {
            signature,
            data_type: read_i32(&mut self.reader)?,
            rows: read_i32(&mut self.reader)?,
            cols: read_i32(&mut self.reader)?,
        };
        if mh.rows < 0 || mh.cols < 0 {
            return Err(SdifError::library("Bad SDIF matrix header"));
        }
        if start + MATRIX_HEADER_SIZE + mh.padded_len() > frame_end {
            return Err(SdifError::library("SDIF matrix data overruns its frame"));
        }
        Ok(mh)
    }

    fn skip(&mut self, bytes: i64) -> SdifResult<()> {
        if bytes > 0 {
            self.reader
                .seek(SeekFrom::Current(bytes))
                .map_err(|_| SdifError::library("fseek() failed while skipping over data"))?;
        }
        Ok(())
    }

    fn read_value(&mut self, dt: i32) -> SdifResult<f64> {
        if dt == data_type::FLOAT64 {
            read_f64(&mut self.reader)
        } else {
            Ok(read_f32(&mut self.reader)? as f64)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PARTIAL FRAMES
    // ═══════════════════════════════════════════════════════════════════════

    fn read_partial_frame(&mut self, fh: &FrameHeader, end: i64) -> SdifResult<()> {
        for _ in 0..fh.matrix_count {
            let mh = self.read_matrix_header(end)?;
            let float = mh.data_type == data_type::FLOAT32 || mh.data_type == data_type::FLOAT64;
            if !float || mh.cols as usize > MAX_ROW_COLUMNS {
                log::warn!(
                    "skipping {} matrix with data type {:#06x} and {} columns",
                    String::from_utf8_lossy(&mh.signature),
                    mh.data_type,
                    mh.cols
                );
                self.skip(mh.padded_len())?;
                continue;
            }

            for _ in 0..mh.rows {
                let mut row = [0.0f64; MAX_ROW_COLUMNS];
                for value in row.iter_mut().take(mh.cols as usize) {
                    *value = self.read_value(mh.data_type)?;
                }
                self.process_row(&mh.signature, &row, fh.time)?;
            }
            self.skip(mh.padding())?;
        }
        Ok(())
    }

    fn process_row(&mut self, signature: &[u8; 4], row: &[f64; MAX_ROW_COLUMNS], frame_time: f64) -> SdifResult<()> {
        if row[ROW_RESAMPLED] != 0.0 {
            return Ok(());
        }
        let index = row[ROW_INDEX];
        if !(index >= 0.0) || index > u32::MAX as f64 {
            return Err(SdifError::bad_format(format!("Invalid Partial index {} in SDIF data.", index)));
        }
        let partial = self.partials.entry(index as u64).or_default();

        match *signature {
            signatures::ENHANCED | signatures::SINE_ONLY => {
                let bp = Breakpoint::new(row[ROW_FREQ_OR_LABEL], row[ROW_AMP], row[ROW_NOISE], row[ROW_PHASE]);
                partial.insert(frame_time + row[ROW_TIME_OFFSET], bp);
            }
            signatures::LABELS => partial.set_label(row[ROW_FREQ_OR_LABEL] as Label),
            _ => {}
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MARKERS
    // ═══════════════════════════════════════════════════════════════════════

    fn read_markers(&mut self, fh: &FrameHeader, end: i64) -> SdifResult<()> {
        let bad = || SdifError::bad_format("Markers frame has bad format.");
        if fh.matrix_count != 2 {
            return Err(bad());
        }

        let mh = self.read_matrix_header(end).map_err(|_| bad())?;
        let float = mh.data_type == data_type::FLOAT32 || mh.data_type == data_type::FLOAT64;
        if !float || mh.cols != 1 {
            return Err(bad());
        }
        let mut times = Vec::new();
        for _ in 0..mh.rows {
            times.push(self.read_value(mh.data_type)?);
        }
        self.skip(mh.padding())?;

        let mh = self.read_matrix_header(end).map_err(|_| bad())?;
        if mh.data_type != data_type::UTF8 || mh.cols != 1 {
            return Err(bad());
        }
        let mut text = Vec::new();
        (&mut self.reader).take(mh.rows as u64).read_to_end(&mut text)?;
        if text.len() != mh.rows as usize {
            return Err(bad());
        }
        self.skip(mh.padding())?;

        // every name is NUL-terminated
        let names: Vec<String> = match text.split_last() {
            Some((0, body)) => body.split(|&b| b == 0).map(|s| String::from_utf8_lossy(s).into_owned()).collect(),
            Some(_) => return Err(bad()),
            None => Vec::new(),
        };
        if names.len() != times.len() {
            return Err(bad());
        }

        self.markers
            .extend(times.into_iter().zip(names).map(|(t, name)| Marker::new(t, name)));
        Ok(())
    }
}

fn read_i32<R: Read>(reader: &mut R) -> SdifResult<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> SdifResult<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> SdifResult<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}
