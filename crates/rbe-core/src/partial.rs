//! Partial: a labeled, time-ordered sequence of breakpoints

use crate::breakpoint::{wrap_pi, Breakpoint};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::Range;

/// Channel / harmonic identifier. Zero means unlabeled.
pub type Label = i32;

/// Default fade used when extrapolating amplitude beyond the ends.
pub const SHORTEST_SAFE_FADE_TIME: f64 = 1.0e-9;

/// Breakpoints closer than this are considered coincident.
const MIN_TIME_DIFF: f64 = 1.0e-9;

const EMPTY_PARTIAL: &str = "Tried to interpolate a Partial with no Breakpoints.";

/// One sinusoidal-plus-noise component of a sound.
///
/// Breakpoint times are strictly increasing. Positions returned by the
/// query methods are indices into the breakpoint sequence and are
/// invalidated by any insertion or removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partial {
    label: Label,
    breakpoints: Vec<(f64, Breakpoint)>,
}

impl Partial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(label: Label) -> Self {
        Self {
            label,
            breakpoints: Vec::new(),
        }
    }

    /// Build a partial from `(time, breakpoint)` pairs in any order.
    pub fn from_breakpoints<I>(label: Label, breakpoints: I) -> Self
    where
        I: IntoIterator<Item = (f64, Breakpoint)>,
    {
        let mut p = Self::with_label(label);
        for (t, bp) in breakpoints {
            p.insert(t, bp);
        }
        p
    }

    #[inline]
    pub fn label(&self) -> Label {
        self.label
    }

    #[inline]
    pub fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Iterate `(time, breakpoint)` pairs in time order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (f64, &Breakpoint)> + '_ {
        self.breakpoints.iter().map(|(t, bp)| (*t, bp))
    }

    /// Mutable iteration; times are read-only so ordering cannot break.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = (f64, &mut Breakpoint)> + '_ {
        self.breakpoints.iter_mut().map(|(t, bp)| (*t, bp))
    }

    /// Time of the breakpoint at `pos`. Panics if `pos` is out of range.
    #[inline]
    pub fn time_at(&self, pos: usize) -> f64 {
        self.breakpoints[pos].0
    }

    /// Breakpoint at `pos`. Panics if `pos` is out of range.
    #[inline]
    pub fn breakpoint(&self, pos: usize) -> &Breakpoint {
        &self.breakpoints[pos].1
    }

    #[inline]
    pub fn breakpoint_mut(&mut self, pos: usize) -> &mut Breakpoint {
        &mut self.breakpoints[pos].1
    }

    pub fn get(&self, pos: usize) -> Option<(f64, &Breakpoint)> {
        self.breakpoints.get(pos).map(|(t, bp)| (*t, bp))
    }

    pub fn first(&self) -> CoreResult<&Breakpoint> {
        self.breakpoints
            .first()
            .map(|(_, bp)| bp)
            .ok_or_else(|| CoreError::invalid_partial("Partial has no Breakpoints."))
    }

    pub fn first_mut(&mut self) -> CoreResult<&mut Breakpoint> {
        self.breakpoints
            .first_mut()
            .map(|(_, bp)| bp)
            .ok_or_else(|| CoreError::invalid_partial("Partial has no Breakpoints."))
    }

    pub fn last(&self) -> CoreResult<&Breakpoint> {
        self.breakpoints
            .last()
            .map(|(_, bp)| bp)
            .ok_or_else(|| CoreError::invalid_partial("Partial has no Breakpoints."))
    }

    pub fn last_mut(&mut self) -> CoreResult<&mut Breakpoint> {
        self.breakpoints
            .last_mut()
            .map(|(_, bp)| bp)
            .ok_or_else(|| CoreError::invalid_partial("Partial has no Breakpoints."))
    }

    pub fn start_time(&self) -> CoreResult<f64> {
        self.breakpoints
            .first()
            .map(|(t, _)| *t)
            .ok_or_else(|| CoreError::invalid_partial("Partial has no Breakpoints."))
    }

    pub fn end_time(&self) -> CoreResult<f64> {
        self.breakpoints
            .last()
            .map(|(t, _)| *t)
            .ok_or_else(|| CoreError::invalid_partial("Partial has no Breakpoints."))
    }

    /// Duration in seconds, zero for an empty partial.
    pub fn duration(&self) -> f64 {
        match (self.breakpoints.first(), self.breakpoints.last()) {
            (Some((t0, _)), Some((t1, _))) => t1 - t0,
            _ => 0.0,
        }
    }

    /// Phase of the first breakpoint.
    pub fn initial_phase(&self) -> CoreResult<f64> {
        Ok(self.first()?.phase())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // POSITIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Position of the first breakpoint at or after `time`, or `len()`.
    pub fn find_after(&self, time: f64) -> usize {
        self.breakpoints.partition_point(|(t, _)| *t < time)
    }

    /// Position of the breakpoint nearest to `time`, `None` when empty.
    pub fn find_nearest(&self, time: f64) -> Option<usize> {
        if self.breakpoints.is_empty() {
            return None;
        }
        let pos = self.find_after(time);
        if pos > 0 {
            let prev = pos - 1;
            if pos == self.len() || self.time_at(pos) - time > time - self.time_at(prev) {
                return Some(prev);
            }
        }
        Some(pos)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MUTATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a breakpoint at `time`, replacing any breakpoint closer than
    /// one nanosecond. Returns the position of the inserted breakpoint.
    pub fn insert(&mut self, time: f64, bp: Breakpoint) -> usize {
        let mut pos = self.find_after(time);

        if pos < self.len() && self.time_at(pos) - time < MIN_TIME_DIFF {
            self.breakpoints.remove(pos);
        } else if pos > 0 && time - self.time_at(pos - 1) < MIN_TIME_DIFF {
            pos -= 1;
            self.breakpoints.remove(pos);
        }

        self.breakpoints.insert(pos, (time, bp));
        pos
    }

    /// Remove the breakpoints in `range`, returning the position that now
    /// follows the removed span.
    pub fn erase(&mut self, range: Range<usize>) -> usize {
        let start = range.start.min(self.len());
        let end = range.end.min(self.len()).max(start);
        self.breakpoints.drain(start..end);
        start
    }

    /// Remove one breakpoint.
    pub fn erase_at(&mut self, pos: usize) -> usize {
        self.erase(pos..pos + 1)
    }

    /// Remove every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// Break this partial at `pos`: the tail `[pos, len)` is removed and
    /// returned as a new partial with the same label.
    pub fn split(&mut self, pos: usize) -> Partial {
        let pos = pos.min(self.len());
        Partial {
            label: self.label,
            breakpoints: self.breakpoints.split_off(pos),
        }
    }

    /// Copy of the breakpoints in `range` with this partial's label.
    pub fn slice(&self, range: Range<usize>) -> Partial {
        let start = range.start.min(self.len());
        let end = range.end.min(self.len()).max(start);
        Partial {
            label: self.label,
            breakpoints: self.breakpoints[start..end].to_vec(),
        }
    }

    /// Shift every breakpoint time by `offset` seconds.
    pub fn shift_time(&mut self, offset: f64) {
        for (t, _) in self.breakpoints.iter_mut() {
            *t += offset;
        }
    }

    /// Absorb the energy of `other` as noise into the non-silent
    /// breakpoints of this partial that lie within its span.
    pub fn absorb(&mut self, other: &Partial) -> CoreResult<()> {
        let (start, end) = (other.start_time()?, other.end_time()?);
        let mut pos = self.find_after(start);
        while pos < self.len() && self.time_at(pos) <= end {
            let t = self.time_at(pos);
            if self.breakpoints[pos].1.amplitude() > 0.0 {
                let a = other.amplitude_at(t)?;
                self.breakpoints[pos].1.add_noise_energy(a * a);
            }
            pos += 1;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTERPOLATED QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    /// Interpolated parameters at `time`, fading amplitude over the default
    /// safe fade time outside the partial's span.
    pub fn parameters_at(&self, time: f64) -> CoreResult<Breakpoint> {
        self.parameters_at_with_fade(time, SHORTEST_SAFE_FADE_TIME)
    }

    /// Interpolated parameters at `time`.
    ///
    /// Outside the span, frequency and bandwidth hold the end values,
    /// amplitude ramps to zero over `fade_time` and phase is extrapolated
    /// at constant frequency.
    pub fn parameters_at_with_fade(&self, time: f64, fade_time: f64) -> CoreResult<Breakpoint> {
        let (Some(&(tstart, first)), Some(&(tend, last))) =
            (self.breakpoints.first(), self.breakpoints.last())
        else {
            return Err(CoreError::invalid_partial(EMPTY_PARTIAL));
        };

        if tstart >= time {
            let mut amp = 0.0;
            if fade_time > 0.0 && (tstart - time) < fade_time {
                let alpha = 1.0 - (tstart - time) / fade_time;
                amp = alpha * first.amplitude();
            }
            let dp = 2.0 * PI * (tstart - time) * first.frequency();
            Ok(Breakpoint::new(
                first.frequency(),
                amp,
                first.bandwidth(),
                wrap_pi(first.phase() - dp),
            ))
        } else if tend <= time {
            let mut amp = 0.0;
            if fade_time > 0.0 && (time - tend) < fade_time {
                let alpha = 1.0 - (time - tend) / fade_time;
                amp = alpha * last.amplitude();
            }
            let dp = 2.0 * PI * (time - tend) * last.frequency();
            Ok(Breakpoint::new(
                last.frequency(),
                amp,
                last.bandwidth(),
                wrap_pi(last.phase() + dp),
            ))
        } else {
            let pos = self.find_after(time);
            let (hitime, hi) = self.breakpoints[pos];
            let (lotime, lo) = self.breakpoints[pos - 1];
            let alpha = (time - lotime) / (hitime - lotime);

            let freq = alpha * hi.frequency() + (1.0 - alpha) * lo.frequency();
            let amp = alpha * hi.amplitude() + (1.0 - alpha) * lo.amplitude();
            let bw = alpha * hi.bandwidth() + (1.0 - alpha) * lo.bandwidth();

            let favg = 0.5 * (lo.frequency() + freq);
            let dp = 2.0 * PI * (time - lotime) * favg;
            Ok(Breakpoint::new(freq, amp, bw, wrap_pi(lo.phase() + dp)))
        }
    }

    pub fn frequency_at(&self, time: f64) -> CoreResult<f64> {
        Ok(self.parameters_at(time)?.frequency())
    }

    pub fn amplitude_at(&self, time: f64) -> CoreResult<f64> {
        Ok(self.parameters_at(time)?.amplitude())
    }

    pub fn amplitude_at_with_fade(&self, time: f64, fade_time: f64) -> CoreResult<f64> {
        Ok(self.parameters_at_with_fade(time, fade_time)?.amplitude())
    }

    pub fn bandwidth_at(&self, time: f64) -> CoreResult<f64> {
        Ok(self.parameters_at(time)?.bandwidth())
    }

    pub fn phase_at(&self, time: f64) -> CoreResult<f64> {
        Ok(self.parameters_at(time)?.phase())
    }
}

impl<'a> IntoIterator for &'a Partial {
    type Item = &'a (f64, Breakpoint);
    type IntoIter = std::slice::Iter<'a, (f64, Breakpoint)>;

    fn into_iter(self) -> Self::IntoIter {
        self.breakpoints.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Partial {
        Partial::from_breakpoints(
            3,
            [
                (0.0, Breakpoint::new(100.0, 0.1, 0.0, 0.0)),
                (1.0, Breakpoint::new(200.0, 0.3, 0.5, 0.0)),
            ],
        )
    }

    #[test]
    fn test_insert_keeps_order_and_replaces_coincident() {
        let mut p = Partial::new();
        p.insert(0.2, Breakpoint::new(1.0, 1.0, 0.0, 0.0));
        p.insert(0.1, Breakpoint::new(2.0, 1.0, 0.0, 0.0));
        p.insert(0.3, Breakpoint::new(3.0, 1.0, 0.0, 0.0));
        assert_eq!(p.len(), 3);
        assert_eq!(p.time_at(0), 0.1);

        let pos = p.insert(0.2 + 1e-10, Breakpoint::new(9.0, 1.0, 0.0, 0.0));
        assert_eq!(pos, 1);
        assert_eq!(p.len(), 3);
        assert_eq!(p.breakpoint(1).frequency(), 9.0);
    }

    #[test]
    fn test_empty_partial_queries() {
        let p = Partial::new();
        assert_eq!(p.duration(), 0.0);
        assert!(p.start_time().is_err());
        assert!(matches!(p.parameters_at(0.0), Err(CoreError::InvalidPartial(_))));
        assert!(p.find_nearest(1.0).is_none());
    }

    #[test]
    fn test_interpolation_inside_span() {
        let p = ramp();
        let bp = p.parameters_at(0.5).unwrap();
        assert_relative_eq!(bp.frequency(), 150.0);
        assert_relative_eq!(bp.amplitude(), 0.2);
        assert_relative_eq!(bp.bandwidth(), 0.25);
        // average of 100 and 150 Hz over half a second
        assert_relative_eq!(bp.phase(), wrap_pi(2.0 * PI * 0.5 * 125.0), epsilon = 1e-9);
    }

    #[test]
    fn test_amplitude_fades_outside_span() {
        let p = ramp();
        assert_relative_eq!(p.amplitude_at(0.0).unwrap(), 0.1);
        assert_eq!(p.amplitude_at(-0.5).unwrap(), 0.0);
        assert_relative_eq!(p.amplitude_at_with_fade(1.05, 0.1).unwrap(), 0.15, epsilon = 1e-12);
        assert_relative_eq!(p.frequency_at(5.0).unwrap(), 200.0);
    }

    #[test]
    fn test_find_after_and_nearest() {
        let p = ramp();
        assert_eq!(p.find_after(-1.0), 0);
        assert_eq!(p.find_after(0.0), 0);
        assert_eq!(p.find_after(0.1), 1);
        assert_eq!(p.find_after(2.0), 2);
        assert_eq!(p.find_nearest(0.4), Some(0));
        assert_eq!(p.find_nearest(0.6), Some(1));
        assert_eq!(p.find_nearest(3.0), Some(1));
    }

    #[test]
    fn test_split_and_erase() {
        let mut p = Partial::from_breakpoints(
            2,
            (0..5).map(|i| (i as f64 * 0.1, Breakpoint::new(100.0, 0.1, 0.0, 0.0))),
        );
        let tail = p.split(3);
        assert_eq!(p.len(), 3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.label(), 2);
        assert_relative_eq!(tail.start_time().unwrap(), 0.3);

        let next = p.erase(0..2);
        assert_eq!(next, 0);
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_absorb_adds_noise() {
        let mut p = ramp();
        let other = Partial::from_breakpoints(
            0,
            [
                (0.0, Breakpoint::new(300.0, 0.2, 0.0, 0.0)),
                (1.0, Breakpoint::new(300.0, 0.2, 0.0, 0.0)),
            ],
        );
        p.absorb(&other).unwrap();
        let bp = p.breakpoint(0);
        assert_relative_eq!(bp.amplitude().powi(2), 0.01 + 0.04, epsilon = 1e-12);
        assert!(bp.bandwidth() > 0.7);
    }
}
