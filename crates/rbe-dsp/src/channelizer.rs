//! Harmonic channel labeling
//!
//! A channelizer assigns each partial the label of the harmonic channel
//! that holds most of its energy, relative to a reference frequency
//! envelope tracking one known harmonic.

use crate::config::ChannelizerConfig;
use rbe_core::{checkpoint, CoreError, CoreResult, Envelope, Label, LinearEnvelope, NoProgress, Partial, Progress};

/// Channel labeler driven by a reference frequency envelope.
#[derive(Debug, Clone)]
pub struct Channelizer {
    ref_channel_freq: Box<dyn Envelope>,
    ref_channel_label: Label,
    stretch_factor: f64,
    amp_weighting: f64,
}

impl Channelizer {
    /// Channelizer whose `ref_label`-th harmonic follows `ref_freq`.
    pub fn new(ref_freq: &dyn Envelope, ref_label: Label) -> CoreResult<Self> {
        Self::with_config(ref_freq, ref_label, ChannelizerConfig::default())
    }

    pub fn with_config(ref_freq: &dyn Envelope, ref_label: Label, config: ChannelizerConfig) -> CoreResult<Self> {
        if ref_label <= 0 {
            return Err(CoreError::invalid_argument(
                "Channelizer reference label must be positive.",
            ));
        }
        check_stretch(config.stretch_factor)?;
        Ok(Self {
            ref_channel_freq: ref_freq.clone_box(),
            ref_channel_label: ref_label,
            stretch_factor: config.stretch_factor,
            amp_weighting: config.amp_weighting,
        })
    }

    /// Channelizer with a constant fundamental (reference label 1).
    pub fn from_frequency(ref_freq: f64, stretch_factor: f64) -> CoreResult<Self> {
        if ref_freq <= 0.0 {
            return Err(CoreError::invalid_argument(
                "Channelizer reference frequency must be positive.",
            ));
        }
        let config = ChannelizerConfig::default().with_stretch_factor(stretch_factor);
        Self::with_config(&LinearEnvelope::constant(ref_freq), 1, config)
    }

    pub fn stretch_factor(&self) -> f64 {
        self.stretch_factor
    }

    pub fn set_stretch_factor(&mut self, stretch: f64) -> CoreResult<()> {
        check_stretch(stretch)?;
        self.stretch_factor = stretch;
        Ok(())
    }

    /// Derive the stretch factor from two observed stretched harmonics,
    /// `fm` of harmonic `m` and `fn_` of harmonic `n`. Negative estimates
    /// are clamped to zero.
    pub fn set_stretch_factor_from(&mut self, fm: f64, m: i32, fn_: f64, n: i32) -> CoreResult<()> {
        let b = Self::compute_stretch_factor(fm, m, fn_, n)?;
        self.stretch_factor = b.max(0.0);
        Ok(())
    }

    /// Stretch factor B such that harmonic k sits at
    /// `k · f0 · sqrt(1 + B·k²)`, from two observed harmonics.
    pub fn compute_stretch_factor(fm: f64, m: i32, fn_: f64, n: i32) -> CoreResult<f64> {
        if fm <= 0.0 || fn_ <= 0.0 {
            return Err(CoreError::invalid_argument(
                "Channelizer stretched harmonic frequencies must be positive.",
            ));
        }
        if m <= 0 || n <= 0 {
            return Err(CoreError::invalid_argument(
                "Channelizer stretched harmonic numbers must be positive.",
            ));
        }
        let (m, n) = (m as f64, n as f64);
        let k = (m * fn_) / (n * fm);
        let num = 1.0 - k * k;
        let denom = k * k * m * m - n * n;
        Ok(num / denom)
    }

    pub fn amplitude_weighting(&self) -> f64 {
        self.amp_weighting
    }

    pub fn set_amplitude_weighting(&mut self, exponent: f64) {
        self.amp_weighting = exponent;
    }

    /// Frequency of the (unstretched) first channel at `time`.
    pub fn reference_frequency_at(&self, time: f64) -> f64 {
        let n = self.ref_channel_label as f64;
        let fref = self.ref_channel_freq.value_at(time) / n;
        if self.stretch_factor != 0.0 {
            fref / (1.0 + self.stretch_factor * n * n).sqrt()
        } else {
            fref
        }
    }

    /// Center frequency of `channel` at `time`, stretch included.
    pub fn channel_frequency_at(&self, time: f64, channel: Label) -> f64 {
        let fref = self.reference_frequency_at(time);
        let c = channel as f64;
        let fc = c * fref;
        if self.stretch_factor != 0.0 {
            fc * (1.0 + self.stretch_factor * c * c).sqrt()
        } else {
            fc
        }
    }

    /// Non-integer channel number of `frequency` at `time`.
    ///
    /// With stretching this is the positive root of
    /// `B·k⁴ + k² − (f/fref)² = 0` in k.
    pub fn compute_fractional_channel_number(&self, time: f64, frequency: f64) -> f64 {
        let fratio = frequency / self.reference_frequency_at(time);
        if self.stretch_factor == 0.0 {
            return fratio;
        }
        let rb = 1.0 / self.stretch_factor;
        ((0.25 * rb * rb + fratio * fratio * rb).sqrt() - 0.5 * rb).sqrt()
    }

    /// Nearest channel number of `frequency` at `time`.
    pub fn compute_channel_number(&self, time: f64, frequency: f64) -> Label {
        (self.compute_fractional_channel_number(time, frequency) + 0.5) as Label
    }

    /// Label one partial with its (optionally amplitude-weighted) average
    /// channel number.
    pub fn channelize_one(&self, partial: &mut Partial) {
        log::debug!("channelizing Partial with {} Breakpoints", partial.len());

        let (sum, weights) = partial.iter().fold((0.0, 0.0), |(sum, weights), (t, bp)| {
            let weight = if self.amp_weighting != 0.0 {
                let a = bp.amplitude() * (1.0 - bp.bandwidth()).sqrt();
                a.powf(self.amp_weighting)
            } else {
                1.0
            };
            let k = self.compute_fractional_channel_number(t, bp.frequency());
            (sum + weight * k, weights + weight)
        });

        let label = if weights > 0.0 {
            ((sum / weights) + 0.5).max(0.0) as Label
        } else {
            0
        };
        partial.set_label(label);
    }

    /// Label every partial.
    pub fn channelize(&self, partials: &mut [Partial]) -> CoreResult<()> {
        self.channelize_with_progress(partials, &NoProgress)
    }

    /// Label every partial, polling `progress` between partials.
    pub fn channelize_with_progress(&self, partials: &mut [Partial], progress: &dyn Progress) -> CoreResult<()> {
        log::info!("channelizing {} Partials", partials.len());
        let total = partials.len();
        for (i, p) in partials.iter_mut().enumerate() {
            checkpoint(progress, i, total)?;
            self.channelize_one(p);
        }
        checkpoint(progress, total, total)
    }
}

fn check_stretch(stretch: f64) -> CoreResult<()> {
    if stretch < 0.0 {
        return Err(CoreError::invalid_argument(
            "Channelizer stretch factor must be non-negative.",
        ));
    }
    Ok(())
}

/// One-shot channelization without stretching or weighting.
pub fn channelize(partials: &mut [Partial], ref_freq: &dyn Envelope, ref_label: Label) -> CoreResult<()> {
    Channelizer::new(ref_freq, ref_label)?.channelize(partials)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rbe_core::Breakpoint;

    fn steady(freq: f64, amps: &[f64]) -> Partial {
        Partial::from_breakpoints(
            0,
            amps.iter()
                .enumerate()
                .map(|(i, &a)| (i as f64 * 0.1, Breakpoint::new(freq, a, 0.0, 0.0))),
        )
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let env = LinearEnvelope::constant(100.0);
        assert!(Channelizer::new(&env, 0).is_err());
        assert!(Channelizer::from_frequency(-1.0, 0.0).is_err());
        assert!(Channelizer::from_frequency(100.0, -0.1).is_err());
        assert!(Channelizer::compute_stretch_factor(100.0, 0, 200.0, 2).is_err());
    }

    #[test]
    fn test_constant_reference_labels() {
        let ch = Channelizer::from_frequency(220.0, 0.0).unwrap();
        let mut list = vec![steady(220.0, &[0.1, 0.1, 0.1]), steady(663.0, &[0.1, 0.1])];
        ch.channelize(&mut list).unwrap();
        assert_eq!(list[0].label(), 1);
        assert_eq!(list[1].label(), 3);
    }

    #[test]
    fn test_reference_on_higher_harmonic() {
        let env = LinearEnvelope::constant(600.0);
        let ch = Channelizer::new(&env, 3).unwrap();
        assert_relative_eq!(ch.reference_frequency_at(0.0), 200.0);
        assert_eq!(ch.compute_channel_number(0.0, 410.0), 2);
    }

    #[test]
    fn test_stretch_round_trip() {
        let b = 0.0004;
        let ch = Channelizer::from_frequency(100.0, b).unwrap();
        for k in 1..10 {
            let f = ch.channel_frequency_at(0.0, k);
            assert_relative_eq!(ch.compute_fractional_channel_number(0.0, f), k as f64, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_compute_stretch_factor_recovers_b() {
        let b = 0.001;
        let f = |k: f64| k * 100.0 * (1.0 + b * k * k).sqrt();
        let est = Channelizer::compute_stretch_factor(f(1.0), 1, f(8.0), 8).unwrap();
        assert_relative_eq!(est, b, epsilon = 1e-12);

        let mut ch = Channelizer::from_frequency(100.0, 0.0).unwrap();
        ch.set_stretch_factor_from(100.0, 1, 190.0, 2).unwrap();
        assert_eq!(ch.stretch_factor(), 0.0);
    }

    #[test]
    fn test_amplitude_weighting_favours_loud_breakpoints() {
        let mut p = Partial::from_breakpoints(
            0,
            [
                (0.0, Breakpoint::new(290.0, 0.001, 0.0, 0.0)),
                (0.1, Breakpoint::new(100.0, 1.0, 0.0, 0.0)),
                (0.2, Breakpoint::new(290.0, 0.001, 0.0, 0.0)),
            ],
        );
        let mut ch = Channelizer::from_frequency(100.0, 0.0).unwrap();
        ch.channelize_one(&mut p);
        assert_eq!(p.label(), 2);

        ch.set_amplitude_weighting(1.0);
        ch.channelize_one(&mut p);
        assert_eq!(p.label(), 1);
    }
}
