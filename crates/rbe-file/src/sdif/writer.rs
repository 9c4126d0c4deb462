//! SDIF export

use super::{
    data_type, signatures, MatrixHeader, ENHANCED_COLUMNS, ENVELOPE_STREAM, FRAME_HEADER_TAIL, INFO_STREAM,
    MATRIX_HEADER_SIZE, SINE_ONLY_COLUMNS, SPEC_VERSION, TYPES_VERSION,
};
use crate::error::{SdifError, SdifResult};
use rbe_core::{Marker, Partial};
use std::f64::consts::PI;
use std::io::Write;

/// Breakpoints closer than this share a frame time.
const FRAME_EPSILON: f64 = 1.0e-9;

pub(crate) struct SdifWriter<W: Write> {
    out: W,
}

impl<W: Write> SdifWriter<W> {
    /// Write the global header.
    pub fn begin(mut out: W) -> SdifResult<Self> {
        out.write_all(&signatures::SDIF)?;
        out.write_all(&8i32.to_be_bytes())?;
        out.write_all(&SPEC_VERSION.to_be_bytes())?;
        out.write_all(&TYPES_VERSION.to_be_bytes())?;
        Ok(Self { out })
    }

    pub fn finish(mut self) -> SdifResult<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Labels, markers, then breakpoint frames. Empty partials are left
    /// out and the rest are indexed by their position among those kept.
    pub fn write_all(&mut self, partials: &[Partial], markers: &[Marker], enhanced: bool) -> SdifResult<()> {
        let indexed: Vec<&Partial> = partials.iter().filter(|p| !p.is_empty()).collect();
        log::info!(
            "exporting {} Partials and {} Markers as {}",
            indexed.len(),
            markers.len(),
            if enhanced { "RBEP" } else { "1TRC" }
        );

        self.write_labels(&indexed)?;
        self.write_markers(markers)?;
        self.write_envelopes(&indexed, enhanced)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOW LEVEL
    // ═══════════════════════════════════════════════════════════════════════

    fn write_frame_header(
        &mut self,
        signature: [u8; 4],
        matrices: &[MatrixHeader],
        time: f64,
        stream_id: i32,
    ) -> SdifResult<()> {
        let size = FRAME_HEADER_TAIL
            + matrices
                .iter()
                .map(|mh| MATRIX_HEADER_SIZE + mh.padded_len())
                .sum::<i64>();
        let size = i32::try_from(size).map_err(|_| SdifError::library("frame too large for SDIF"))?;

        self.out.write_all(&signature)?;
        self.out.write_all(&size.to_be_bytes())?;
        self.out.write_all(&time.to_be_bytes())?;
        self.out.write_all(&stream_id.to_be_bytes())?;
        self.out.write_all(&(matrices.len() as i32).to_be_bytes())?;
        Ok(())
    }

    fn write_matrix_header(&mut self, mh: &MatrixHeader) -> SdifResult<()> {
        self.out.write_all(&mh.signature)?;
        self.out.write_all(&mh.data_type.to_be_bytes())?;
        self.out.write_all(&mh.rows.to_be_bytes())?;
        self.out.write_all(&mh.cols.to_be_bytes())?;
        Ok(())
    }

    fn write_padding(&mut self, mh: &MatrixHeader) -> SdifResult<()> {
        let pad = [0u8; 8];
        self.out.write_all(&pad[..mh.padding() as usize])?;
        Ok(())
    }

    fn write_f64_matrix(&mut self, mh: &MatrixHeader, data: &[f64]) -> SdifResult<()> {
        self.write_matrix_header(mh)?;
        for v in data {
            self.out.write_all(&v.to_be_bytes())?;
        }
        self.write_padding(mh)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LABELS AND MARKERS
    // ═══════════════════════════════════════════════════════════════════════

    fn write_labels(&mut self, partials: &[&Partial]) -> SdifResult<()> {
        if partials.iter().all(|p| p.label() == 0) {
            return Ok(());
        }
        let data: Vec<f64> = partials
            .iter()
            .enumerate()
            .flat_map(|(i, p)| [i as f64, p.label() as f64])
            .collect();
        let mh = f64_matrix(signatures::LABELS, partials.len(), 2)?;
        self.write_frame_header(signatures::LABELS, &[mh], 0.0, INFO_STREAM)?;
        self.write_f64_matrix(&mh, &data)
    }

    fn write_markers(&mut self, markers: &[Marker]) -> SdifResult<()> {
        if markers.is_empty() {
            return Ok(());
        }
        let times: Vec<f64> = markers.iter().map(Marker::time).collect();
        let mut names = Vec::new();
        for m in markers {
            names.extend_from_slice(m.name().as_bytes());
            names.push(0);
        }

        let times_mh = f64_matrix(signatures::MARKERS, times.len(), 1)?;
        let names_mh = MatrixHeader {
            signature: signatures::MARKERS,
            data_type: data_type::UTF8,
            rows: i32::try_from(names.len()).map_err(|_| SdifError::library("marker names too long"))?,
            cols: 1,
        };

        self.write_frame_header(signatures::MARKERS, &[times_mh, names_mh], 0.0, INFO_STREAM)?;
        self.write_f64_matrix(&times_mh, &times)?;
        self.write_matrix_header(&names_mh)?;
        self.out.write_all(&names)?;
        self.write_padding(&names_mh)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENVELOPE FRAMES
    // ═══════════════════════════════════════════════════════════════════════

    fn write_envelopes(&mut self, partials: &[&Partial], enhanced: bool) -> SdifResult<()> {
        let mut schedule = FrameSchedule::new(partials);
        let Some(last_time) = schedule.last_time() else {
            return Ok(());
        };

        let (signature, cols) = if enhanced {
            (signatures::ENHANCED, ENHANCED_COLUMNS)
        } else {
            (signatures::SINE_ONLY, SINE_ONLY_COLUMNS)
        };

        let mut frames = 0usize;
        let mut next_frame_time = schedule.first_frame_time();
        loop {
            let frame_time = next_frame_time;
            next_frame_time = schedule.next_frame_time(frame_time);

            let data = assemble_rows(partials, enhanced, frame_time, next_frame_time)?;
            if !data.is_empty() {
                let mh = f64_matrix(signature, data.len() / cols, cols)?;
                self.write_frame_header(signature, &[mh], frame_time, ENVELOPE_STREAM)?;
                self.write_f64_matrix(&mh, &data)?;
                frames += 1;
            }

            if next_frame_time >= last_time {
                break;
            }
        }
        log::debug!("wrote {} envelope frames", frames);
        Ok(())
    }
}

fn f64_matrix(signature: [u8; 4], rows: usize, cols: usize) -> SdifResult<MatrixHeader> {
    Ok(MatrixHeader {
        signature,
        data_type: data_type::FLOAT64,
        rows: i32::try_from(rows).map_err(|_| SdifError::library("too many rows for an SDIF matrix"))?,
        cols: cols as i32,
    })
}

/// Rows for every partial active in `[frame_time, next_frame_time)`.
///
/// Enhanced rows carry the partial's next breakpoint and its offset from
/// the frame time. Sine-only rows carry the parameters at the frame time,
/// and also cover partials sounding across the frame without a breakpoint
/// in it.
fn assemble_rows(partials: &[&Partial], enhanced: bool, frame_time: f64, next_frame_time: f64) -> SdifResult<Vec<f64>> {
    let mut data = Vec::new();
    for (index, p) in partials.iter().enumerate() {
        let pos = p.find_after(frame_time);
        let Some((time, bp)) = p.get(pos) else {
            continue;
        };

        let sounding = !enhanced && p.amplitude_at(frame_time)? != 0.0;
        if time >= next_frame_time && !sounding {
            continue;
        }

        let (params, offset) = if enhanced {
            (*bp, time - frame_time)
        } else {
            (p.parameters_at(frame_time)?, 0.0)
        };
        let phase = if params.phase() < 0.0 {
            params.phase() + 2.0 * PI
        } else {
            params.phase()
        };

        data.extend_from_slice(&[index as f64, params.frequency(), params.amplitude(), phase]);
        if enhanced {
            data.extend_from_slice(&[params.bandwidth(), offset]);
        }
    }
    Ok(data)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAME SCHEDULE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct BreakpointTime {
    index: usize,
    time: f64,
}

/// Chooses frame boundaries so that no frame holds two breakpoints of
/// the same partial.
struct FrameSchedule {
    times: Vec<BreakpointTime>,
    /// First breakpoint not yet covered by a frame
    pos: usize,
}

impl FrameSchedule {
    fn new(partials: &[&Partial]) -> Self {
        let mut times: Vec<BreakpointTime> = partials
            .iter()
            .enumerate()
            .flat_map(|(index, p)| p.iter().map(move |(time, _)| BreakpointTime { index, time }))
            .collect();
        times.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { times, pos: 0 }
    }

    fn last_time(&self) -> Option<f64> {
        self.times.last().map(|b| b.time)
    }

    /// Start of the first frame: the earliest breakpoint time, moved down
    /// to a whole millisecond when it is not on one.
    fn first_frame_time(&self) -> f64 {
        let first = self.times.first().map_or(0.0, |b| b.time);
        if (1000.0 * first).fract() != 0.0 {
            (1000.0 * first - 0.001).floor() / 1000.0
        } else {
            first
        }
    }

    /// End of the frame starting at `frame_time`: just before the first
    /// group of simultaneous breakpoints that would give some partial a
    /// second breakpoint in the frame.
    fn next_frame_time(&mut self, frame_time: f64) -> f64 {
        let start = self.pos;
        let mut in_frame: Vec<usize> = Vec::new();
        let mut it = self.pos;
        while it < self.times.len() && !in_frame.contains(&self.times[it].index) {
            in_frame.push(self.times[it].index);
            it += 1;
            if it == self.times.len() || self.times[it].time - self.times[self.pos].time > FRAME_EPSILON {
                self.pos = it;
            }
        }
        if self.pos == start {
            // a group holding one partial twice still has to make progress
            let t = self.times[start].time;
            self.pos = start + self.times[start..].partition_point(|b| b.time - t <= FRAME_EPSILON);
        }

        let Some(next) = self.times.get(self.pos) else {
            let last = self.last_time().unwrap_or(frame_time);
            return last.max(frame_time) + 1.0;
        };
        let prev = self.times[self.pos - 1].time;
        let mut next_time = next.time - 0.5 * (next.time - prev);

        // prefer a round boundary, whole then tenth of a millisecond
        for scale in [1000.0, 10000.0] {
            let rounded = (scale * next_time).floor() / scale;
            if rounded < next_time && rounded > prev {
                next_time = rounded;
                break;
            }
        }
        next_time
    }
}
