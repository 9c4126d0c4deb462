//! Morphing between two partial collections
//!
//! Same-labeled source and target partials are merged along a common
//! timeline. At every breakpoint instant of either partial the other one
//! is evaluated, and the two parameter sets are blended with weights taken
//! from the frequency, amplitude and bandwidth morphing functions (0 is the
//! source, 1 the target). Unlabeled partials are not paired; they are
//! crossfaded instead.
//!
//! Amplitude and bandwidth blend in the log domain by default, frequency
//! blends linearly by default. After a morphed partial is built its
//! phases are re-fixed so that regions sitting purely at the source or
//! the target keep that sound's rendered phase.

use crate::config::MorpherConfig;
use rbe_core::phasefix::{fix_phase_backward, fix_phase_between, fix_phase_forward};
use rbe_core::{
    checkpoint, Breakpoint, CoreError, CoreResult, Envelope, Label, LinearEnvelope, NoProgress, Partial,
    PartialList, Progress,
};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Amplitudes and bandwidths at or below this are treated as zero by the
/// log-domain blend.
const LOG_EPSILON: f64 = 1.0e-12;

/// Source breakpoints are skipped once every weight reaches this.
const MAX_MORPH_PARAM: f64 = 0.9;

/// Target breakpoints are skipped while every weight is at or below this.
const MIN_MORPH_PARAM: f64 = 0.1;

/// Width of the frequency-fix fade band above the threshold, in dB.
const FADE_RANGE_DB: f64 = 10.0;

/// Which sound the frequency weight selects at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MorphState {
    Source,
    Target,
    Interpolated,
}

impl MorphState {
    fn from_weight(fweight: f64) -> Self {
        if fweight <= 0.0 {
            Self::Source
        } else if fweight >= 1.0 {
            Self::Target
        } else {
            Self::Interpolated
        }
    }
}

#[derive(Debug, Default)]
struct MorphingPair {
    src: Partial,
    tgt: Partial,
}

#[derive(Debug, Clone)]
pub struct Morpher {
    freq_function: Box<dyn Envelope>,
    amp_function: Box<dyn Envelope>,
    bw_function: Box<dyn Envelope>,

    src_ref_partial: Partial,
    tgt_ref_partial: Partial,

    freq_fix_threshold_db: f64,
    amp_shape: f64,
    min_breakpoint_gap: f64,
    log_amp_morphing: bool,
    log_freq_morphing: bool,

    partials: PartialList,
}

impl Morpher {
    /// Morpher using `f` for all three morphing functions.
    pub fn new(f: &dyn Envelope) -> Self {
        Self::with_functions(f, f, f)
    }

    pub fn with_functions(freq: &dyn Envelope, amp: &dyn Envelope, bw: &dyn Envelope) -> Self {
        let config = MorpherConfig::default();
        Self {
            freq_function: freq.clone_box(),
            amp_function: amp.clone_box(),
            bw_function: bw.clone_box(),
            src_ref_partial: Partial::new(),
            tgt_ref_partial: Partial::new(),
            freq_fix_threshold_db: config.fix_threshold_db,
            amp_shape: config.amp_shape,
            min_breakpoint_gap: config.min_breakpoint_gap,
            log_amp_morphing: config.log_amp_morphing,
            log_freq_morphing: config.log_freq_morphing,
            partials: PartialList::new(),
        }
    }

    /// Morpher with three functions and explicit parameters.
    pub fn with_config(
        freq: &dyn Envelope,
        amp: &dyn Envelope,
        bw: &dyn Envelope,
        config: MorpherConfig,
    ) -> CoreResult<Self> {
        let mut m = Self::with_functions(freq, amp, bw);
        m.set_amplitude_shape(config.amp_shape)?;
        m.set_min_breakpoint_gap(config.min_breakpoint_gap)?;
        m.log_amp_morphing = config.log_amp_morphing;
        m.log_freq_morphing = config.log_freq_morphing;
        m.freq_fix_threshold_db = config.fix_threshold_db;
        Ok(m)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MORPHING
    // ═══════════════════════════════════════════════════════════════════════

    /// Morph one pair of partials into a new partial labeled `label`.
    ///
    /// Either partial may be empty, but not both.
    pub fn morph_partial(&self, src: &Partial, tgt: &Partial, label: Label) -> CoreResult<Partial> {
        if src.is_empty() && tgt.is_empty() {
            return Err(CoreError::invalid_argument("Cannot morph two empty Partials,"));
        }

        let mut dont_add_before = 0.0_f64;
        if let Ok(t) = src.start_time() {
            dont_add_before = dont_add_before.min(t);
        }
        if let Ok(t) = tgt.start_time() {
            dont_add_before = dont_add_before.min(t);
        }

        let mut newp = Partial::with_label(label);
        let (mut si, mut ti) = (0, 0);
        while si < src.len() || ti < tgt.len() {
            let take_src = ti == tgt.len() || (si < src.len() && src.time_at(si) < tgt.time_at(ti));
            if take_src {
                let t = src.time_at(si);
                if dont_add_before <= t {
                    self.append_morphed_src(*src.breakpoint(si), tgt, t, &mut newp)?;
                }
                si += 1;
            } else {
                let t = tgt.time_at(ti);
                if dont_add_before <= t {
                    self.append_morphed_tgt(*tgt.breakpoint(ti), src, t, &mut newp)?;
                }
                ti += 1;
            }

            if let Ok(end) = newp.end_time() {
                dont_add_before = end + self.min_breakpoint_gap;
            }
        }

        self.fix_morphed_phases(&mut newp);
        Ok(newp)
    }

    /// Morph two distilled partial collections, appending the results to
    /// [`partials`](Self::partials).
    ///
    /// Labeled partials are paired by label; a label present in only one
    /// collection morphs against silence (or against the reference partial
    /// of the other sound, when one is set). Unlabeled partials are
    /// crossfaded.
    pub fn morph(&mut self, src: &[Partial], tgt: &[Partial]) -> CoreResult<()> {
        // never cancelled
        self.morph_with_progress(src, tgt, &NoProgress)
    }

    /// As [`morph`](Self::morph), polling `progress` between labels. On
    /// cancellation the partials morphed so far are kept.
    pub fn morph_with_progress(&mut self, src: &[Partial], tgt: &[Partial], progress: &dyn Progress) -> CoreResult<()> {
        let mut correspondence: BTreeMap<Label, MorphingPair> = BTreeMap::new();
        for p in src.iter().filter(|p| p.label() != 0) {
            let pair = correspondence.entry(p.label()).or_default();
            if !pair.src.is_empty() {
                return Err(CoreError::invalid_argument(
                    "Source Partials must be distilled before morphing.",
                ));
            }
            pair.src = p.clone();
        }
        for p in tgt.iter().filter(|p| p.label() != 0) {
            let pair = correspondence.entry(p.label()).or_default();
            if !pair.tgt.is_empty() {
                return Err(CoreError::invalid_argument(
                    "Target Partials must be distilled before morphing.",
                ));
            }
            pair.tgt = p.clone();
        }

        log::info!(
            "morphing {} source and {} target Partials over {} labels",
            src.len(),
            tgt.len(),
            correspondence.len()
        );

        let total = correspondence.len();
        for (i, (label, pair)) in correspondence.into_iter().enumerate() {
            checkpoint(progress, i, total)?;
            self.morph_pair(label, pair)?;
        }
        checkpoint(progress, total, total)?;

        self.crossfade(src, tgt, 0);
        Ok(())
    }

    fn morph_pair(&mut self, label: Label, pair: MorphingPair) -> CoreResult<()> {
        let MorphingPair { mut src, mut tgt } = pair;
        if src.is_empty() && tgt.is_empty() {
            return Ok(());
        }
        log::debug!(
            "morphing {} and {} partials with label {label}",
            usize::from(!src.is_empty()),
            usize::from(!tgt.is_empty())
        );
        self.add_end_nulls(&mut src)?;
        self.add_end_nulls(&mut tgt)?;

        let newp = self.morph_partial(&src, &tgt, label)?;
        if newp.iter().any(|(_, bp)| bp.amplitude() != 0.0) {
            self.partials.push(newp);
        }
        Ok(())
    }

    /// Give a partial null end points one minimum gap beyond its ends, so
    /// that a morph never holds a sounding breakpoint past the partial.
    fn add_end_nulls(&self, p: &mut Partial) -> CoreResult<()> {
        if p.is_empty() {
            return Ok(());
        }
        let gap = self.min_breakpoint_gap;
        if p.first()?.amplitude() != 0.0 && p.start_time()? > gap {
            let t = p.start_time()? - gap;
            let null = p.parameters_at(t)?;
            p.insert(t, null);
        }
        if p.last()?.amplitude() != 0.0 {
            let t = p.end_time()? + gap;
            let null = p.parameters_at(t)?;
            p.insert(t, null);
        }
        Ok(())
    }

    /// Fade out every source partial and fade in every target partial
    /// carrying `label`, thinning breakpoints to the minimum gap. The
    /// faded partials are appended to [`partials`](Self::partials).
    pub fn crossfade(&mut self, src: &[Partial], tgt: &[Partial], label: Label) {
        log::debug!("crossfading Partials labeled {label}");

        let mut kept = 0;
        for p in src.iter().filter(|p| p.label() == label && !p.is_empty()) {
            let newp = self.thinned(p, |m, bp, t| m.fade_src_breakpoint(bp, t));
            if !newp.is_empty() {
                self.partials.push(newp);
                kept += 1;
            }
        }
        log::debug!("kept {kept} from sound 1");

        kept = 0;
        for p in tgt.iter().filter(|p| p.label() == label && !p.is_empty()) {
            let newp = self.thinned(p, |m, bp, t| m.fade_tgt_breakpoint(bp, t));
            if !newp.is_empty() {
                self.partials.push(newp);
                kept += 1;
            }
        }
        log::debug!("kept {kept} from sound 2");
    }

    fn thinned(&self, p: &Partial, fade: impl Fn(&Self, Breakpoint, f64) -> Breakpoint) -> Partial {
        let mut newp = Partial::with_label(p.label());
        let mut dont_add_before = f64::NEG_INFINITY;
        for (t, bp) in p.iter() {
            if dont_add_before <= t {
                newp.insert(t, fade(self, *bp, t));
                dont_add_before = t + self.min_breakpoint_gap;
            }
        }
        newp
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BREAKPOINT BLENDING
    // ═══════════════════════════════════════════════════════════════════════

    /// Blend two breakpoints with the morphing function weights at `time`.
    pub fn morph_breakpoints(&self, src: &Breakpoint, tgt: &Breakpoint, time: f64) -> Breakpoint {
        let fweight = self.freq_function.value_at(time);
        let aweight = self.amp_function.value_at(time);
        let bweight = self.bw_function.value_at(time);
        self.interpolate_parameters(src, tgt, fweight, aweight, bweight)
    }

    /// Blend a source breakpoint with the target partial's parameters at
    /// `time`.
    pub fn morph_src_breakpoint(&self, src: &Breakpoint, tgt_partial: &Partial, time: f64) -> CoreResult<Breakpoint> {
        if tgt_partial.is_empty() {
            return Err(CoreError::invalid_argument(
                "morphSrcBreakpoint cannot morph with empty Partial",
            ));
        }
        let tgt = tgt_partial.parameters_at(time)?;
        Ok(self.morph_breakpoints(src, &tgt, time))
    }

    /// Blend a target breakpoint with the source partial's parameters at
    /// `time`.
    pub fn morph_tgt_breakpoint(&self, tgt: &Breakpoint, src_partial: &Partial, time: f64) -> CoreResult<Breakpoint> {
        if src_partial.is_empty() {
            return Err(CoreError::invalid_argument(
                "morphTgtBreakpoint cannot morph with empty Partial",
            ));
        }
        let src = src_partial.parameters_at(time)?;
        Ok(self.morph_breakpoints(&src, tgt, time))
    }

    /// Source breakpoint with its amplitude faded toward silence.
    pub fn fade_src_breakpoint(&self, mut bp: Breakpoint, time: f64) -> Breakpoint {
        let alpha = self.amp_function.value_at(time);
        bp.set_amplitude(self.interpolate_amplitude(bp.amplitude(), 0.0, alpha));
        bp
    }

    /// Target breakpoint with its amplitude faded in from silence.
    pub fn fade_tgt_breakpoint(&self, mut bp: Breakpoint, time: f64) -> Breakpoint {
        let alpha = self.amp_function.value_at(time);
        bp.set_amplitude(self.interpolate_amplitude(0.0, bp.amplitude(), alpha));
        bp
    }

    fn append_morphed_src(&self, mut src_bp: Breakpoint, tgt: &Partial, time: f64, newp: &mut Partial) -> CoreResult<()> {
        let fweight = self.freq_function.value_at(time);
        let aweight = self.amp_function.value_at(time);
        let bweight = self.bw_function.value_at(time);

        let need_null = newp.last().is_ok_and(|bp| bp.amplitude() != 0.0)
            && src_bp.amplitude() == 0.0
            && !tgt.is_empty()
            && tgt.amplitude_at(time)? == 0.0;

        if fweight >= MAX_MORPH_PARAM && aweight >= MAX_MORPH_PARAM && bweight >= MAX_MORPH_PARAM && !need_null {
            return Ok(());
        }

        self.adjust_frequency(&mut src_bp, &self.src_ref_partial, newp.label(), time)?;
        let morphed = if tgt.is_empty() {
            if self.tgt_ref_partial.is_empty() {
                self.fade_src_breakpoint(src_bp, time)
            } else {
                let tgt_bp = harmonic_of_reference(&self.tgt_ref_partial, newp.label(), time)?;
                self.interpolate_parameters(&src_bp, &tgt_bp, fweight, aweight, bweight)
            }
        } else {
            let mut tgt_bp = tgt.parameters_at(time)?;
            self.adjust_frequency(&mut tgt_bp, &self.tgt_ref_partial, newp.label(), time)?;
            self.interpolate_parameters(&src_bp, &tgt_bp, fweight, aweight, bweight)
        };
        newp.insert(time, morphed);
        Ok(())
    }

    fn append_morphed_tgt(&self, mut tgt_bp: Breakpoint, src: &Partial, time: f64, newp: &mut Partial) -> CoreResult<()> {
        let fweight = self.freq_function.value_at(time);
        let aweight = self.amp_function.value_at(time);
        let bweight = self.bw_function.value_at(time);

        let need_null = newp.last().is_ok_and(|bp| bp.amplitude() != 0.0)
            && tgt_bp.amplitude() == 0.0
            && !src.is_empty()
            && src.amplitude_at(time)? == 0.0;

        if fweight <= MIN_MORPH_PARAM && aweight <= MIN_MORPH_PARAM && bweight <= MIN_MORPH_PARAM && !need_null {
            return Ok(());
        }

        self.adjust_frequency(&mut tgt_bp, &self.tgt_ref_partial, newp.label(), time)?;
        let morphed = if src.is_empty() {
            if self.src_ref_partial.is_empty() {
                self.fade_tgt_breakpoint(tgt_bp, time)
            } else {
                let src_bp = harmonic_of_reference(&self.src_ref_partial, newp.label(), time)?;
                self.interpolate_parameters(&src_bp, &tgt_bp, fweight, aweight, bweight)
            }
        } else {
            let mut src_bp = src.parameters_at(time)?;
            self.adjust_frequency(&mut src_bp, &self.src_ref_partial, newp.label(), time)?;
            self.interpolate_parameters(&src_bp, &tgt_bp, fweight, aweight, bweight)
        };
        newp.insert(time, morphed);
        Ok(())
    }

    /// Pull the frequency of a quiet breakpoint toward the harmonic of
    /// `reference` numbered `harmonic`. No-op without a reference.
    fn adjust_frequency(&self, bp: &mut Breakpoint, reference: &Partial, harmonic: Label, time: f64) -> CoreResult<()> {
        if reference.is_empty() {
            return Ok(());
        }
        let begin_fade = 10f64.powf(0.05 * (self.freq_fix_threshold_db + FADE_RANGE_DB));
        if bp.amplitude() < begin_fade {
            let threshold = 10f64.powf(0.05 * self.freq_fix_threshold_db);
            let one_over_fade_span = 1.0 / (begin_fade - threshold);
            let fscale = harmonic as f64 / reference.label() as f64;
            let alpha = ((begin_fade - bp.amplitude()) * one_over_fade_span).min(1.0);
            let fref = reference.frequency_at(time)?;
            bp.set_frequency(alpha * fref * fscale + (1.0 - alpha) * bp.frequency());
        }
        Ok(())
    }

    fn interpolate_parameters(&self, src: &Breakpoint, tgt: &Breakpoint, fweight: f64, aweight: f64, bweight: f64) -> Breakpoint {
        Breakpoint::new(
            self.interpolate_frequency(src.frequency(), tgt.frequency(), fweight),
            self.interpolate_amplitude(src.amplitude(), tgt.amplitude(), aweight),
            self.interpolate_bandwidth(src.bandwidth(), tgt.bandwidth(), bweight),
            interpolate_phase(src.phase(), tgt.phase(), fweight),
        )
    }

    fn interpolate_amplitude(&self, src: f64, tgt: f64, alpha: f64) -> f64 {
        let morphed = if self.log_amp_morphing {
            if src > LOG_EPSILON || tgt > LOG_EPSILON {
                interpolate_log(src, tgt, alpha, self.amp_shape)
            } else {
                0.0
            }
        } else {
            interpolate_linear(src, tgt, alpha)
        };
        morphed.max(0.0)
    }

    fn interpolate_bandwidth(&self, src: f64, tgt: f64, alpha: f64) -> f64 {
        // bandwidth follows the amplitude blending mode
        self.interpolate_amplitude(src, tgt, alpha)
    }

    fn interpolate_frequency(&self, src: f64, tgt: f64, alpha: f64) -> f64 {
        if self.log_freq_morphing {
            let shape = if src == 0.0 || tgt == 0.0 {
                MorpherConfig::default().amp_shape
            } else {
                0.0
            };
            interpolate_log(src, tgt, alpha, shape)
        } else {
            interpolate_linear(src, tgt, alpha)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PHASE
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-fix phases by frequency-weight region: pure source or pure
    /// target regions propagate forward, interpolated regions are bridged
    /// between their locked ends.
    fn fix_morphed_phases(&self, newp: &mut Partial) {
        if newp.is_empty() {
            return;
        }
        let state_at = |p: &Partial, pos: usize| MorphState::from_weight(self.freq_function.value_at(p.time_at(pos)));

        let mut last_correct = 0;
        let mut cur = state_at(&*newp, 0);
        for pos in 1..newp.len() {
            let next = state_at(&*newp, pos);
            if next == cur {
                continue;
            }
            match cur {
                MorphState::Interpolated if last_correct == 0 => fix_phase_backward(newp, last_correct, pos),
                MorphState::Interpolated => fix_phase_between(newp, last_correct, pos),
                _ => fix_phase_forward(newp, last_correct, pos),
            }
            last_correct = pos;
            cur = next;
        }
        fix_phase_forward(newp, last_correct, newp.len() - 1);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PARAMETERS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn frequency_function(&self) -> &dyn Envelope {
        self.freq_function.as_ref()
    }

    pub fn amplitude_function(&self) -> &dyn Envelope {
        self.amp_function.as_ref()
    }

    pub fn bandwidth_function(&self) -> &dyn Envelope {
        self.bw_function.as_ref()
    }

    pub fn set_frequency_function(&mut self, f: &dyn Envelope) {
        self.freq_function = f.clone_box();
    }

    pub fn set_amplitude_function(&mut self, f: &dyn Envelope) {
        self.amp_function = f.clone_box();
    }

    pub fn set_bandwidth_function(&mut self, f: &dyn Envelope) {
        self.bw_function = f.clone_box();
    }

    pub fn source_reference_partial(&self) -> &Partial {
        &self.src_ref_partial
    }

    pub fn target_reference_partial(&self) -> &Partial {
        &self.tgt_ref_partial
    }

    /// Use `p` as the source harmonic reference. Its label is its
    /// harmonic number, so it must be labeled.
    pub fn set_source_reference_partial(&mut self, p: &Partial) -> CoreResult<()> {
        if p.label() == 0 {
            return Err(CoreError::invalid_argument(
                "the morphing source reference Partial must be labeled with its harmonic number",
            ));
        }
        self.src_ref_partial = p.clone();
        Ok(())
    }

    pub fn set_target_reference_partial(&mut self, p: &Partial) -> CoreResult<()> {
        if p.label() == 0 {
            return Err(CoreError::invalid_argument(
                "the morphing target reference Partial must be labeled with its harmonic number",
            ));
        }
        self.tgt_ref_partial = p.clone();
        Ok(())
    }

    /// Use the partial labeled `label` in `partials` as the source
    /// reference. Label 0 clears the reference.
    pub fn set_source_reference_label(&mut self, partials: &[Partial], label: Label) -> CoreResult<()> {
        self.src_ref_partial = find_reference(partials, label)?;
        Ok(())
    }

    pub fn set_target_reference_label(&mut self, partials: &[Partial], label: Label) -> CoreResult<()> {
        self.tgt_ref_partial = find_reference(partials, label)?;
        Ok(())
    }

    pub fn amplitude_shape(&self) -> f64 {
        self.amp_shape
    }

    pub fn set_amplitude_shape(&mut self, x: f64) -> CoreResult<()> {
        if x <= 0.0 {
            return Err(CoreError::invalid_argument(
                "the amplitude morph shaping parameter must be positive",
            ));
        }
        self.amp_shape = x;
        Ok(())
    }

    pub fn min_breakpoint_gap(&self) -> f64 {
        self.min_breakpoint_gap
    }

    pub fn set_min_breakpoint_gap(&mut self, x: f64) -> CoreResult<()> {
        if x <= 0.0 {
            return Err(CoreError::invalid_argument("the minimum Breakpoint gap must be positive"));
        }
        self.min_breakpoint_gap = x;
        Ok(())
    }

    pub fn log_amp_morphing(&self) -> bool {
        self.log_amp_morphing
    }

    pub fn set_log_amp_morphing(&mut self, on: bool) {
        self.log_amp_morphing = on;
    }

    pub fn log_freq_morphing(&self) -> bool {
        self.log_freq_morphing
    }

    pub fn set_log_freq_morphing(&mut self, on: bool) {
        self.log_freq_morphing = on;
    }

    pub fn fix_threshold_db(&self) -> f64 {
        self.freq_fix_threshold_db
    }

    pub fn set_fix_threshold_db(&mut self, db: f64) {
        self.freq_fix_threshold_db = db;
    }

    /// Morphed partials collected so far.
    pub fn partials(&self) -> &PartialList {
        &self.partials
    }

    pub fn partials_mut(&mut self) -> &mut PartialList {
        &mut self.partials
    }

    /// Hand over the morphed partials, leaving the morpher empty.
    pub fn take_partials(&mut self) -> PartialList {
        std::mem::take(&mut self.partials)
    }
}

impl Default for Morpher {
    fn default() -> Self {
        Self::new(&LinearEnvelope::constant(0.0))
    }
}

fn find_reference(partials: &[Partial], label: Label) -> CoreResult<Partial> {
    if label == 0 {
        return Ok(Partial::new());
    }
    partials
        .iter()
        .find(|p| p.label() == label)
        .cloned()
        .ok_or_else(|| CoreError::invalid_argument("no Partial has the specified reference label"))
}

/// Silent stand-in for a missing partial: the reference's parameters at
/// `time`, scaled to harmonic `harmonic`, with no amplitude or noise.
fn harmonic_of_reference(reference: &Partial, harmonic: Label, time: f64) -> CoreResult<Breakpoint> {
    let mut bp = reference.parameters_at(time)?;
    let fscale = harmonic as f64 / reference.label() as f64;
    bp.set_frequency(fscale * bp.frequency());
    bp.set_phase(fscale * bp.phase());
    bp.set_amplitude(0.0);
    bp.set_bandwidth(0.0);
    Ok(bp)
}

#[inline]
fn interpolate_log(x: f64, y: f64, alpha: f64, shape: f64) -> f64 {
    let s = x + shape;
    let t = y + shape;
    s * (t / s).powf(alpha) - shape
}

#[inline]
fn interpolate_linear(x: f64, y: f64, alpha: f64) -> f64 {
    x * (1.0 - alpha) + y * alpha
}

/// Linear phase blend after bringing the source within pi of the target.
fn interpolate_phase(mut src: f64, tgt: f64, alpha: f64) -> f64 {
    while src - tgt > PI {
        src -= 2.0 * PI;
    }
    while tgt - src > PI {
        src += 2.0 * PI;
    }
    interpolate_linear(src, tgt, alpha) % (2.0 * PI)
}

/// One-shot morph of two distilled collections with separate frequency,
/// amplitude and bandwidth functions.
pub fn morph(
    src: &[Partial],
    tgt: &[Partial],
    freq: &dyn Envelope,
    amp: &dyn Envelope,
    bw: &dyn Envelope,
) -> CoreResult<PartialList> {
    let mut m = Morpher::with_functions(freq, amp, bw);
    m.morph(src, tgt)?;
    Ok(m.take_partials())
}

/// As [`morph`], steering unmatched labels with harmonic reference
/// partials. A reference label of 0 means no reference for that sound.
pub fn morph_with_reference(
    src: &[Partial],
    tgt: &[Partial],
    src_ref_label: Label,
    tgt_ref_label: Label,
    freq: &dyn Envelope,
    amp: &dyn Envelope,
    bw: &dyn Envelope,
) -> CoreResult<PartialList> {
    let mut m = Morpher::with_functions(freq, amp, bw);
    m.set_source_reference_label(src, src_ref_label)?;
    m.set_target_reference_label(tgt, tgt_ref_label)?;
    m.morph(src, tgt)?;
    Ok(m.take_partials())
}
