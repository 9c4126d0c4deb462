//! Resampling partials onto a regular time grid
//!
//! Dense resampling places a breakpoint at every grid multiple between
//! the rounded start and end of a partial. Quantization moves each
//! existing breakpoint to its nearest grid multiple. With phase
//! correction on, frequencies are then nudged so that rendering reaches
//! the stored phases.

use crate::config::ResamplerConfig;
use rbe_core::phasefix::{fix_frequency, DEFAULT_MAX_FIX_PCT};
use rbe_core::{checkpoint, CoreError, CoreResult, LinearEnvelope, NoProgress, Partial, Progress};

#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    interval: f64,
    phase_correct: bool,
}

impl Resampler {
    pub fn new(interval: f64) -> CoreResult<Self> {
        if interval <= 0.0 {
            return Err(CoreError::invalid_argument("Resampler interval must be positive."));
        }
        Ok(Self {
            interval,
            phase_correct: true,
        })
    }

    pub fn with_config(config: ResamplerConfig) -> CoreResult<Self> {
        let mut r = Self::new(config.interval)?;
        r.set_phase_correct(config.phase_correct);
        Ok(r)
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn phase_correct(&self) -> bool {
        self.phase_correct
    }

    pub fn set_phase_correct(&mut self, on: bool) {
        self.phase_correct = on;
    }

    #[inline]
    fn grid_index(&self, t: f64) -> i64 {
        (t / self.interval).round() as i64
    }

    /// Replace the breakpoints of `p` with samples on the grid.
    pub fn resample(&self, p: &mut Partial) {
        let (Ok(start), Ok(end)) = (p.start_time(), p.end_time()) else {
            return;
        };

        let mut newp = Partial::with_label(p.label());
        for k in self.grid_index(start)..=self.grid_index(end) {
            let t = k as f64 * self.interval;
            if let Ok(bp) = p.parameters_at(t) {
                newp.insert(t, bp);
            }
        }
        self.finish(p, newp);
    }

    /// Resample on the grid, sampling the instant `timing(t)` of the
    /// original partial at each grid time `t`.
    ///
    /// The grid covers the span of the timing envelope. Grid times whose
    /// source instant falls outside the partial are skipped.
    pub fn resample_with_timing(&self, p: &mut Partial, timing: &LinearEnvelope) -> CoreResult<()> {
        check_timing(timing)?;
        let (Ok(start), Ok(end)) = (p.start_time(), p.end_time()) else {
            return Ok(());
        };
        let mut points = timing.iter();
        let (Some((tfirst, _)), Some((tlast, _))) = (points.next(), timing.iter().last()) else {
            return Ok(());
        };

        let mut newp = Partial::with_label(p.label());
        for k in self.grid_index(tfirst)..=self.grid_index(tlast) {
            let t = k as f64 * self.interval;
            let src = timing.value_at(t);
            if src >= start && src <= end {
                newp.insert(t, p.parameters_at(src)?);
            }
        }
        self.finish(p, newp);
        Ok(())
    }

    /// Move every breakpoint to its nearest grid time, taking the
    /// partial's parameters at that time. Breakpoints landing on the same
    /// grid time collapse into one.
    pub fn quantize(&self, p: &mut Partial) {
        let mut newp = Partial::with_label(p.label());
        for (t, _) in p.iter() {
            let tq = self.grid_index(t) as f64 * self.interval;
            if let Ok(bp) = p.parameters_at(tq) {
                newp.insert(tq, bp);
            }
        }
        self.finish(p, newp);
    }

    fn finish(&self, p: &mut Partial, mut newp: Partial) {
        if self.phase_correct {
            fix_frequency(&mut newp, DEFAULT_MAX_FIX_PCT);
        }
        *p = newp;
    }

    pub fn resample_all(&self, partials: &mut [Partial]) -> CoreResult<()> {
        self.apply_with_progress(partials, &NoProgress, |r, p| r.resample(p))
    }

    pub fn quantize_all(&self, partials: &mut [Partial]) -> CoreResult<()> {
        self.apply_with_progress(partials, &NoProgress, |r, p| r.quantize(p))
    }

    pub fn resample_all_with_timing(&self, partials: &mut [Partial], timing: &LinearEnvelope) -> CoreResult<()> {
        check_timing(timing)?;
        for p in partials.iter_mut() {
            self.resample_with_timing(p, timing)?;
        }
        Ok(())
    }

    /// Dense or quantizing resampling of every partial, polling
    /// `progress` between partials.
    pub fn resample_with_progress(&self, partials: &mut [Partial], dense: bool, progress: &dyn Progress) -> CoreResult<()> {
        if dense {
            self.apply_with_progress(partials, progress, |r, p| r.resample(p))
        } else {
            self.apply_with_progress(partials, progress, |r, p| r.quantize(p))
        }
    }

    fn apply_with_progress(
        &self,
        partials: &mut [Partial],
        progress: &dyn Progress,
        f: impl Fn(&Self, &mut Partial),
    ) -> CoreResult<()> {
        log::info!("resampling {} Partials at {} s", partials.len(), self.interval);
        let total = partials.len();
        for (i, p) in partials.iter_mut().enumerate() {
            checkpoint(progress, i, total)?;
            f(self, p);
        }
        checkpoint(progress, total, total)
    }
}

fn check_timing(timing: &LinearEnvelope) -> CoreResult<()> {
    for (t, v) in timing.iter() {
        if t < 0.0 {
            return Err(CoreError::invalid_argument("Timing envelope times must be non-negative."));
        }
        if v < 0.0 {
            return Err(CoreError::invalid_argument("Timing envelope values must be non-negative."));
        }
    }
    Ok(())
}

/// One-shot dense resampling.
pub fn resample(partials: &mut [Partial], interval: f64) -> CoreResult<()> {
    Resampler::new(interval)?.resample_all(partials)
}
