//! Partial utilities: envelope-driven mutators, statistics, predicates
//! and time-addressed phase fixing.
//!
//! Every mutator exists in two forms: a reusable [`PartialMutator`] value
//! and a free function applying it to a slice of partials.

use crate::breakpoint::Breakpoint;
use crate::envelope::{Envelope, LinearEnvelope};
use crate::partial::{Label, Partial};
use crate::phasefix;
use std::cmp::Ordering;

/// In-place transformation of a single partial.
pub trait PartialMutator {
    fn mutate(&self, p: &mut Partial);

    /// Apply to every partial of a collection.
    fn mutate_all(&self, partials: &mut [Partial]) {
        for p in partials.iter_mut() {
            self.mutate(p);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVELOPE-DRIVEN MUTATORS
// ═══════════════════════════════════════════════════════════════════════════

macro_rules! envelope_mutator {
    ($(#[$doc:meta])* $Name:ident, |$bp:ident, $x:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $Name {
            env: Box<dyn Envelope>,
        }

        impl $Name {
            /// Mutator driven by a constant.
            pub fn new(x: f64) -> Self {
                Self {
                    env: Box::new(LinearEnvelope::constant(x)),
                }
            }

            /// Mutator driven by a copy of `env`.
            pub fn with_envelope(env: &dyn Envelope) -> Self {
                Self { env: env.clone_box() }
            }
        }

        impl From<f64> for $Name {
            fn from(x: f64) -> Self {
                Self::new(x)
            }
        }

        impl PartialMutator for $Name {
            fn mutate(&self, p: &mut Partial) {
                for (t, $bp) in p.iter_mut() {
                    let $x = self.env.value_at(t);
                    $body;
                }
            }
        }
    };
}

envelope_mutator!(
    /// Multiply amplitudes by the envelope value.
    AmplitudeScaler,
    |bp, x| bp.set_amplitude(bp.amplitude() * x)
);

envelope_mutator!(
    /// Multiply bandwidths by the envelope value.
    BandwidthScaler,
    |bp, x| bp.set_bandwidth(bp.bandwidth() * x)
);

envelope_mutator!(
    /// Replace bandwidths with the envelope value.
    BandwidthSetter,
    |bp, x| bp.set_bandwidth(x)
);

envelope_mutator!(
    /// Multiply frequencies by the envelope value.
    FrequencyScaler,
    |bp, x| bp.set_frequency(bp.frequency() * x)
);

envelope_mutator!(
    /// Multiply the noise-to-sine energy ratio by the envelope value.
    /// Breakpoints that are all noise stay all noise.
    NoiseRatioScaler,
    |bp, x| bp.set_bandwidth(scale_noise_ratio_of(bp.bandwidth(), x))
);

envelope_mutator!(
    /// Shift frequencies by the envelope value in cents.
    PitchShifter,
    |bp, x| bp.set_frequency(bp.frequency() * 2f64.powf((0.01 * x) / 12.0))
);

fn scale_noise_ratio_of(bw: f64, factor: f64) -> f64 {
    if bw < 1.0 {
        let ratio = factor * bw / (1.0 - bw);
        ratio / (1.0 + ratio)
    } else {
        1.0
    }
}

/// Trim a partial to a time window, inserting interpolated breakpoints
/// at the boundaries where the partial crosses them.
#[derive(Debug, Clone, Copy)]
pub struct Cropper {
    min_time: f64,
    max_time: f64,
}

impl Cropper {
    pub fn new(t1: f64, t2: f64) -> Self {
        Self {
            min_time: t1.min(t2),
            max_time: t1.max(t2),
        }
    }
}

impl PartialMutator for Cropper {
    fn mutate(&self, p: &mut Partial) {
        let mut it = p.find_after(self.min_time);
        if it != 0 {
            if it != p.len() {
                if let Ok(bp) = p.parameters_at(self.min_time) {
                    it = p.insert(self.min_time, bp);
                }
            }
            p.erase(0..it);
        }

        let mut it = p.find_after(self.max_time);
        if it != p.len() {
            if it != 0 {
                if let Ok(bp) = p.parameters_at(self.max_time) {
                    it = p.insert(self.max_time, bp) + 1;
                }
            }
            let len = p.len();
            p.erase(it..len);
        }
    }
}

/// Shift every breakpoint by a fixed time offset.
#[derive(Debug, Clone, Copy)]
pub struct TimeShifter {
    offset: f64,
}

impl TimeShifter {
    pub fn new(offset: f64) -> Self {
        Self { offset }
    }
}

impl PartialMutator for TimeShifter {
    fn mutate(&self, p: &mut Partial) {
        p.shift_time(self.offset);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COLLECTION OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════

pub fn scale_amplitude(partials: &mut [Partial], env: &dyn Envelope) {
    AmplitudeScaler::with_envelope(env).mutate_all(partials);
}

pub fn scale_bandwidth(partials: &mut [Partial], env: &dyn Envelope) {
    BandwidthScaler::with_envelope(env).mutate_all(partials);
}

pub fn set_bandwidth(partials: &mut [Partial], env: &dyn Envelope) {
    BandwidthSetter::with_envelope(env).mutate_all(partials);
}

pub fn scale_frequency(partials: &mut [Partial], env: &dyn Envelope) {
    FrequencyScaler::with_envelope(env).mutate_all(partials);
}

pub fn scale_noise_ratio(partials: &mut [Partial], env: &dyn Envelope) {
    NoiseRatioScaler::with_envelope(env).mutate_all(partials);
}

/// Shift pitch by `env` cents.
pub fn shift_pitch(partials: &mut [Partial], env: &dyn Envelope) {
    PitchShifter::with_envelope(env).mutate_all(partials);
}

/// Crop every partial to `[t1, t2]`. Partials left empty stay in place.
pub fn crop(partials: &mut [Partial], t1: f64, t2: f64) {
    Cropper::new(t1, t2).mutate_all(partials);
}

pub fn shift_time(partials: &mut [Partial], offset: f64) {
    TimeShifter::new(offset).mutate_all(partials);
}

/// Earliest start and latest end time over the non-empty partials,
/// `(0, 0)` when there are none.
pub fn time_span(partials: &[Partial]) -> (f64, f64) {
    partials
        .iter()
        .filter_map(|p| Some((p.start_time().ok()?, p.end_time().ok()?)))
        .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
        .unwrap_or((0.0, 0.0))
}

// ═══════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════

/// Largest breakpoint amplitude, zero for an empty partial.
pub fn peak_amplitude(p: &Partial) -> f64 {
    p.iter().map(|(_, bp)| bp.amplitude()).fold(0.0, f64::max)
}

/// Mean breakpoint amplitude, zero for an empty partial.
pub fn avg_amplitude(p: &Partial) -> f64 {
    mean(p, Breakpoint::amplitude)
}

/// Mean breakpoint frequency, zero for an empty partial.
pub fn avg_frequency(p: &Partial) -> f64 {
    mean(p, Breakpoint::frequency)
}

/// Amplitude-weighted mean frequency, zero for an empty or silent partial.
pub fn weighted_avg_frequency(p: &Partial) -> f64 {
    let (sum, ampsum) = p.iter().fold((0.0, 0.0), |(s, a), (_, bp)| {
        (s + bp.amplitude() * bp.frequency(), a + bp.amplitude())
    });
    if sum != 0.0 && ampsum != 0.0 { sum / ampsum } else { 0.0 }
}

fn mean(p: &Partial, field: fn(&Breakpoint) -> f64) -> f64 {
    if p.is_empty() {
        return 0.0;
    }
    p.iter().map(|(_, bp)| field(bp)).sum::<f64>() / p.len() as f64
}

// ═══════════════════════════════════════════════════════════════════════════
// PREDICATES AND COMPARATORS
// ═══════════════════════════════════════════════════════════════════════════

pub fn is_label_equal(label: Label) -> impl Fn(&Partial) -> bool {
    move |p| p.label() == label
}

pub fn is_label_greater(label: Label) -> impl Fn(&Partial) -> bool {
    move |p| p.label() > label
}

pub fn is_label_less(label: Label) -> impl Fn(&Partial) -> bool {
    move |p| p.label() < label
}

pub fn is_duration_less(duration: f64) -> impl Fn(&Partial) -> bool {
    move |p| p.duration() < duration
}

/// True for partials whose peak amplitude is below `amp`.
pub fn is_peak_less(amp: f64) -> impl Fn(&Partial) -> bool {
    move |p| peak_amplitude(p) < amp
}

pub fn compare_label_less(a: &Partial, b: &Partial) -> Ordering {
    a.label().cmp(&b.label())
}

pub fn compare_duration_less(a: &Partial, b: &Partial) -> Ordering {
    a.duration().total_cmp(&b.duration())
}

pub fn compare_duration_greater(a: &Partial, b: &Partial) -> Ordering {
    b.duration().total_cmp(&a.duration())
}

/// Orders by start time, empty partials last.
pub fn compare_start_time_less(a: &Partial, b: &Partial) -> Ordering {
    let start = |p: &Partial| p.start_time().unwrap_or(f64::INFINITY);
    start(a).total_cmp(&start(b))
}

// ═══════════════════════════════════════════════════════════════════════════
// PHASE FIXING BY TIME
// ═══════════════════════════════════════════════════════════════════════════

/// Recompute phases before `t` so they agree with the phase at the
/// breakpoint nearest `t`.
pub fn fix_phase_before(p: &mut Partial, t: f64) {
    if p.len() > 1 {
        if let Some(pos) = p.find_nearest(t) {
            phasefix::fix_phase_backward(p, 0, pos);
        }
    }
}

/// Recompute phases after `t` from the breakpoint nearest `t`.
pub fn fix_phase_after(p: &mut Partial, t: f64) {
    if p.len() > 1 {
        if let Some(pos) = p.find_nearest(t) {
            let last = p.len() - 1;
            phasefix::fix_phase_forward(p, pos, last);
        }
    }
}

/// Recompute phases forward between the breakpoints nearest `tbeg` and
/// `tend`.
pub fn fix_phase_forward(p: &mut Partial, tbeg: f64, tend: f64) {
    let (tbeg, tend) = if tbeg > tend { (tend, tbeg) } else { (tbeg, tend) };
    if p.len() > 1 {
        if let (Some(b), Some(e)) = (p.find_nearest(tbeg), p.find_nearest(tend)) {
            phasefix::fix_phase_forward(p, b, e);
        }
    }
}

/// Recompute phases on both sides of the breakpoint nearest `t`.
pub fn fix_phase_at(p: &mut Partial, t: f64) {
    if p.len() > 1 {
        if let Some(pos) = p.find_nearest(t) {
            let last = p.len() - 1;
            phasefix::fix_phase_forward(p, pos, last);
            phasefix::fix_phase_backward(p, 0, pos);
        }
    }
}

/// Alter frequencies between `tbeg` and `tend` so that the phases at the
/// breakpoints nearest those times are both reached.
///
/// A partial not spanning the whole interval is fixed from whichever end
/// lies inside it. A null breakpoint in between splits the work into a
/// forward fix up to it and a backward fix after it.
pub fn fix_phase_between(p: &mut Partial, tbeg: f64, tend: f64) {
    let (tbeg, tend) = if tbeg > tend { (tend, tbeg) } else { (tbeg, tend) };
    let (Ok(start), Ok(end)) = (p.start_time(), p.end_time()) else {
        return;
    };

    if end < tend {
        fix_phase_after(p, tbeg);
    } else if start > tbeg {
        fix_phase_before(p, tend);
    } else if let (Some(b), Some(e)) = (p.find_nearest(tbeg), p.find_nearest(tend)) {
        match (b..e).find(|&i| p.breakpoint(i).is_null()) {
            Some(null) => {
                phasefix::fix_phase_forward(p, b, null);
                phasefix::fix_phase_backward(p, null, e);
            }
            None => phasefix::fix_phase_between(p, b, e),
        }
    }
}
