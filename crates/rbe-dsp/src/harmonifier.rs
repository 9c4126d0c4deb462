//! Pulling quiet breakpoints onto harmonic frequencies
//!
//! Below an amplitude threshold (plus a 10 dB fade band above it), a
//! breakpoint's frequency is blended toward the reference partial's
//! frequency scaled by the ratio of labels. An optional weighting
//! envelope scales the blend over time.

use rbe_core::{checkpoint, CoreError, CoreResult, Envelope, Label, LinearEnvelope, NoProgress, Partial, Progress};

/// Width of the fade band above the threshold, in dB.
const FADE_RANGE_DB: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct Harmonifier {
    ref_partial: Partial,
    freq_fix_threshold_db: f64,
    weight: Box<dyn Envelope>,
}

impl Harmonifier {
    /// Harmonifier referencing a labeled, non-empty partial.
    pub fn new(reference: &Partial, threshold_db: f64) -> CoreResult<Self> {
        Self::with_weight(reference, &LinearEnvelope::constant(1.0), threshold_db)
    }

    pub fn with_weight(reference: &Partial, weight: &dyn Envelope, threshold_db: f64) -> CoreResult<Self> {
        if reference.label() <= 0 {
            return Err(CoreError::invalid_argument(
                "Cannot use an unlabeled reference Partial in Harmonifier.",
            ));
        }
        if reference.is_empty() {
            return Err(CoreError::invalid_object(
                "Cannot use an empty reference Partial in Harmonifier.",
            ));
        }
        Ok(Self {
            ref_partial: reference.clone(),
            freq_fix_threshold_db: threshold_db,
            weight: weight.clone_box(),
        })
    }

    /// Harmonifier referencing the first partial in `partials` carrying
    /// `ref_label`.
    pub fn from_label(partials: &[Partial], ref_label: Label, threshold_db: f64) -> CoreResult<Self> {
        Self::from_label_with_weight(partials, ref_label, &LinearEnvelope::constant(1.0), threshold_db)
    }

    pub fn from_label_with_weight(
        partials: &[Partial],
        ref_label: Label,
        weight: &dyn Envelope,
        threshold_db: f64,
    ) -> CoreResult<Self> {
        if ref_label <= 0 {
            return Err(CoreError::invalid_argument(
                "Harmonifier reference label must be positive.",
            ));
        }
        let reference = partials
            .iter()
            .find(|p| p.label() == ref_label)
            .ok_or_else(|| CoreError::invalid_argument("no Partial has the specified reference label"))?;
        Self::with_weight(reference, weight, threshold_db)
    }

    pub fn reference(&self) -> &Partial {
        &self.ref_partial
    }

    pub fn threshold_db(&self) -> f64 {
        self.freq_fix_threshold_db
    }

    /// Blend the frequencies of the quiet breakpoints of `p` toward the
    /// harmonic of the reference. Unlabeled partials are left alone.
    pub fn harmonify(&self, p: &mut Partial) -> CoreResult<()> {
        if p.label() == 0 {
            return Ok(());
        }
        let fscale = p.label() as f64 / self.ref_partial.label() as f64;
        let threshold = 10f64.powf(0.05 * self.freq_fix_threshold_db);
        let begin_fade = 10f64.powf(0.05 * (self.freq_fix_threshold_db + FADE_RANGE_DB));
        let one_over_fade_span = 1.0 / (begin_fade - threshold);

        for (t, bp) in p.iter_mut() {
            if bp.amplitude() < begin_fade {
                let alpha = ((begin_fade - bp.amplitude()) * one_over_fade_span).min(1.0) * self.weight.value_at(t);
                let fref = self.ref_partial.frequency_at(t)?;
                let f = alpha * fref * fscale + (1.0 - alpha) * bp.frequency();
                bp.set_frequency(f);
            }
        }
        Ok(())
    }

    pub fn harmonify_all(&self, partials: &mut [Partial]) -> CoreResult<()> {
        self.harmonify_with_progress(partials, &NoProgress)
    }

    pub fn harmonify_with_progress(&self, partials: &mut [Partial], progress: &dyn Progress) -> CoreResult<()> {
        log::info!(
            "harmonifying {} Partials against label {}",
            partials.len(),
            self.ref_partial.label()
        );
        let total = partials.len();
        for (i, p) in partials.iter_mut().enumerate() {
            checkpoint(progress, i, total)?;
            self.harmonify(p)?;
        }
        checkpoint(progress, total, total)
    }
}

/// One-shot harmonification against the partial labeled `ref_label`.
pub fn harmonify(partials: &mut [Partial], ref_label: Label, weight: &dyn Envelope, threshold_db: f64) -> CoreResult<()> {
    let h = Harmonifier::from_label_with_weight(partials, ref_label, weight, threshold_db)?;
    h.harmonify_all(partials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rbe_core::Breakpoint;

    fn steady(label: Label, freq: f64, amp: f64) -> Partial {
        Partial::from_breakpoints(
            label,
            (0..5).map(|i| (i as f64 * 0.1, Breakpoint::new(freq, amp, 0.0, 0.0))),
        )
    }

    #[test]
    fn test_default_threshold_pulls_everything_quiet() {
        let mut list = vec![steady(1, 100.0, 0.5), steady(3, 310.0, 0.1), steady(0, 777.0, 0.1)];
        harmonify(&mut list, 1, &LinearEnvelope::constant(1.0), 0.0).unwrap();
        for (_, bp) in list[1].iter() {
            assert_relative_eq!(bp.frequency(), 300.0);
        }
        assert_eq!(list[2].breakpoint(0).frequency(), 777.0);
        assert_eq!(list[0].breakpoint(0).frequency(), 100.0);
    }

    #[test]
    fn test_loud_breakpoints_untouched() {
        let reference = steady(1, 100.0, 0.5);
        let h = Harmonifier::new(&reference, -60.0).unwrap();
        let mut p = steady(2, 205.0, 0.1);
        h.harmonify(&mut p).unwrap();
        assert_eq!(p.breakpoint(0).frequency(), 205.0);
    }

    #[test]
    fn test_weight_scales_blend() {
        let reference = steady(1, 100.0, 0.5);
        let h = Harmonifier::with_weight(&reference, &LinearEnvelope::constant(0.5), 0.0).unwrap();
        let mut p = steady(2, 210.0, 0.01);
        h.harmonify(&mut p).unwrap();
        assert_relative_eq!(p.breakpoint(0).frequency(), 205.0);
    }

    #[test]
    fn test_reference_errors() {
        let list = vec![steady(2, 200.0, 0.1)];
        assert!(Harmonifier::from_label(&list, 1, 0.0).is_err());
        assert!(Harmonifier::from_label(&list, 0, 0.0).is_err());
        let empty = Partial::with_label(1);
        assert!(matches!(Harmonifier::new(&empty, 0.0), Err(CoreError::InvalidObject(_))));
    }
}
