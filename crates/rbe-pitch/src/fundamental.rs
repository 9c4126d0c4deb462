//! Time-varying fundamental frequency estimation
//!
//! Both estimators gather spectral peaks (frequency and sinusoidal
//! amplitude) at an instant, discard peaks that are quieter than the
//! amplitude floor, more than the amplitude range below the loudest peak,
//! or at or above the frequency ceiling, and hand the rest to
//! [`F0Estimate`]. The partial estimator reads the peaks straight from a
//! partial list; the sample estimator computes a windowed FFT of the
//! samples around the instant.

use crate::config::{
    check_amp_floor, check_amp_range, check_precision, check_window_width, FundamentalConfig,
};
use crate::error::{PitchError, PitchResult};
use crate::f0_estimate::F0Estimate;
use rbe_core::{checkpoint, LinearEnvelope, NoProgress, Partial, Progress};
use realfft::{RealFftPlanner, RealToComplex};
use num_complex::Complex;
use std::f64::consts::PI;
use std::sync::Arc;

/// Spectral peaks collected at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Peaks {
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

impl Peaks {
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    fn push(&mut self, freq: f64, amp: f64) {
        self.frequencies.push(freq);
        self.amplitudes.push(amp);
    }

    /// Drop every peak quieter than `thresh`.
    fn retain_above(&mut self, thresh: f64) {
        let (freqs, amps): (Vec<f64>, Vec<f64>) = self
            .frequencies
            .iter()
            .zip(&self.amplitudes)
            .filter(|&(_, &a)| a >= thresh)
            .map(|(&f, &a)| (f, a))
            .unzip();
        self.frequencies = freqs;
        self.amplitudes = amps;
    }
}

#[inline]
fn db_to_amp(db: f64) -> f64 {
    10f64.powf(0.05 * db)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ESTIMATOR TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Common interface of the fundamental estimators.
///
/// Implementors supply their parameters and a way to collect peaks at an
/// instant; estimation and envelope building are shared.
pub trait FundamentalEstimator {
    fn config(&self) -> &FundamentalConfig;

    fn config_mut(&mut self) -> &mut FundamentalConfig;

    /// Spectral peaks at time `t`, already thresholded.
    fn collect_peaks(&mut self, t: f64) -> PitchResult<Peaks>;

    fn amp_floor(&self) -> f64 {
        self.config().amp_floor_db
    }

    fn amp_range(&self) -> f64 {
        self.config().amp_range_db
    }

    fn freq_ceiling(&self) -> f64 {
        self.config().freq_ceiling_hz
    }

    fn precision(&self) -> f64 {
        self.config().precision_hz
    }

    /// Absolute amplitude floor in (negative) dB.
    fn set_amp_floor(&mut self, db: f64) -> PitchResult<()> {
        check_amp_floor(db)?;
        self.config_mut().amp_floor_db = db;
        Ok(())
    }

    /// Range in (positive) dB below the loudest peak.
    fn set_amp_range(&mut self, db: f64) -> PitchResult<()> {
        check_amp_range(db)?;
        self.config_mut().amp_range_db = db;
        Ok(())
    }

    fn set_freq_ceiling(&mut self, hz: f64) {
        self.config_mut().freq_ceiling_hz = hz;
    }

    fn set_precision(&mut self, hz: f64) -> PitchResult<()> {
        check_precision(hz)?;
        self.config_mut().precision_hz = hz;
        Ok(())
    }

    /// Fundamental estimate at `t` within `[lo, hi]`.
    fn estimate_at(&mut self, t: f64, lo: f64, hi: f64) -> PitchResult<F0Estimate> {
        let peaks = self.collect_peaks(t)?;
        Ok(F0Estimate::new(
            &peaks.amplitudes,
            &peaks.frequencies,
            lo,
            hi,
            self.precision(),
        ))
    }

    /// Sample the estimator every `interval` seconds over `[tbeg, tend)`
    /// and keep the estimates whose confidence is at least `confidence`.
    fn build_envelope(
        &mut self,
        tbeg: f64,
        tend: f64,
        interval: f64,
        lo: f64,
        hi: f64,
        confidence: f64,
    ) -> PitchResult<LinearEnvelope> {
        // never cancelled
        self.build_envelope_with_progress(tbeg, tend, interval, lo, hi, confidence, &NoProgress)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_envelope_with_progress(
        &mut self,
        tbeg: f64,
        tend: f64,
        interval: f64,
        lo: f64,
        hi: f64,
        confidence: f64,
        progress: &dyn Progress,
    ) -> PitchResult<LinearEnvelope> {
        if !(interval > 0.0) {
            return Err(PitchError::invalid_argument("sampling interval must be positive"));
        }
        let (tbeg, tend) = if tbeg > tend { (tend, tbeg) } else { (tbeg, tend) };

        let total = ((tend - tbeg) / interval).ceil() as usize;
        log::info!(
            "estimating fundamental over [{:.3}, {:.3}) s at {} instants",
            tbeg,
            tend,
            total
        );

        let mut env = LinearEnvelope::new();
        let mut i = 0;
        loop {
            let time = tbeg + i as f64 * interval;
            if time >= tend {
                break;
            }
            checkpoint(progress, i, total)?;

            let peaks = self.collect_peaks(time)?;
            if !peaks.is_empty() {
                let est = F0Estimate::new(&peaks.amplitudes, &peaks.frequencies, lo, hi, self.precision());
                if est.confidence() >= confidence {
                    env.insert(time, est.frequency());
                } else {
                    log::debug!(
                        "rejected {:.2} Hz at {:.4} s (confidence {:.3})",
                        est.frequency(),
                        time,
                        est.confidence()
                    );
                }
            }
            i += 1;
        }
        checkpoint(progress, total, total)?;

        log::debug!("fundamental envelope has {} points", env.len());
        Ok(env)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FROM PARTIALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fundamental estimator over a collection of partials.
#[derive(Debug, Clone)]
pub struct FundamentalFromPartials<'a> {
    partials: &'a [Partial],
    config: FundamentalConfig,
}

impl<'a> FundamentalFromPartials<'a> {
    /// Estimator with default thresholds and the given precision (Hz).
    pub fn new(partials: &'a [Partial], precision_hz: f64) -> PitchResult<Self> {
        Self::with_config(partials, FundamentalConfig::default().with_precision(precision_hz))
    }

    pub fn with_config(partials: &'a [Partial], config: FundamentalConfig) -> PitchResult<Self> {
        config.validate()?;
        Ok(Self { partials, config })
    }

    pub fn partials(&self) -> &'a [Partial] {
        self.partials
    }

    /// Sinusoidal amplitude and frequency of every partial at `t`.
    pub fn collect_freqs_and_amps(&self, t: f64) -> Peaks {
        let mut peaks = Peaks::default();
        let floor = db_to_amp(self.config.amp_floor_db);
        let mut max_amp = 0.0f64;

        for p in self.partials.iter().filter(|p| !p.is_empty()) {
            let (Ok(amp), Ok(bw), Ok(freq)) = (p.amplitude_at(t), p.bandwidth_at(t), p.frequency_at(t))
            else {
                continue;
            };
            let sine_amp = (1.0 - bw).max(0.0).sqrt() * amp;
            if sine_amp > floor && freq < self.config.freq_ceiling_hz {
                peaks.push(freq, sine_amp);
            }
            max_amp = max_amp.max(sine_amp);
        }

        peaks.retain_above(db_to_amp(-self.config.amp_range_db) * max_amp);
        peaks
    }
}

impl FundamentalEstimator for FundamentalFromPartials<'_> {
    fn config(&self) -> &FundamentalConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut FundamentalConfig {
        &mut self.config
    }

    fn collect_peaks(&mut self, t: f64) -> PitchResult<Peaks> {
        Ok(self.collect_freqs_and_amps(t))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FROM SAMPLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Fundamental estimator over a buffer of audio samples.
pub struct FundamentalFromSamples {
    samples: Vec<f64>,
    sample_rate: f64,
    config: FundamentalConfig,
    /// Window length the cached plan was built for
    window_len: usize,
    window: Vec<f64>,
    window_sum: f64,
    fft: Option<Arc<dyn RealToComplex<f64>>>,
    fft_input: Vec<f64>,
    fft_output: Vec<Complex<f64>>,
}

impl std::fmt::Debug for FundamentalFromSamples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundamentalFromSamples")
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("config", &self.config)
            .field("window_len", &self.window_len)
            .finish()
    }
}

impl FundamentalFromSamples {
    pub fn new(samples: &[f64], sample_rate: f64, precision_hz: f64) -> PitchResult<Self> {
        Self::with_config(
            samples,
            sample_rate,
            FundamentalConfig::default().with_precision(precision_hz),
        )
    }

    pub fn with_config(samples: &[f64], sample_rate: f64, config: FundamentalConfig) -> PitchResult<Self> {
        if !(sample_rate > 0.0) {
            return Err(PitchError::InvalidSampleRate(sample_rate));
        }
        config.validate()?;
        Ok(Self {
            samples: samples.to_vec(),
            sample_rate,
            config,
            window_len: 0,
            window: Vec::new(),
            window_sum: 0.0,
            fft: None,
            fft_input: Vec::new(),
            fft_output: Vec::new(),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn window_width(&self) -> f64 {
        self.config.window_width_hz
    }

    /// Main-lobe width (Hz) of the analysis window.
    pub fn set_window_width(&mut self, hz: f64) -> PitchResult<()> {
        check_window_width(hz)?;
        self.config.window_width_hz = hz;
        Ok(())
    }

    /// Hann window whose main lobe (4 bins) spans the configured width,
    /// odd so it centers on a sample.
    fn window_len_for(&self) -> usize {
        let len = (4.0 * self.sample_rate / self.config.window_width_hz).ceil() as usize;
        (len | 1).max(3)
    }

    fn prepare(&mut self) {
        let len = self.window_len_for();
        if len == self.window_len && self.fft.is_some() {
            return;
        }
        let fft_len = (2 * len).next_power_of_two();
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_len);

        self.window = (0..len)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (len - 1) as f64).cos()))
            .collect();
        self.window_sum = self.window.iter().sum();
        self.fft_input = fft.make_input_vec();
        self.fft_output = fft.make_output_vec();
        self.fft = Some(fft);
        self.window_len = len;
        log::debug!("analysis window {} samples, FFT {}", len, fft_len);
    }

    /// Windowed magnitude spectrum of the samples centered at `t`.
    fn spectrum_at(&mut self, t: f64) -> PitchResult<()> {
        self.prepare();
        let Some(fft) = self.fft.clone() else {
            return Err(PitchError::FftError("no FFT plan".into()));
        };

        let half = (self.window_len / 2) as i64;
        let middle = (self.sample_rate * t).round() as i64;
        self.fft_input.iter_mut().for_each(|x| *x = 0.0);
        for (i, w) in self.window.iter().enumerate() {
            let idx = middle - half + i as i64;
            if idx >= 0 && (idx as usize) < self.samples.len() {
                self.fft_input[i] = w * self.samples[idx as usize];
            }
        }

        fft.process(&mut self.fft_input, &mut self.fft_output)
            .map_err(|e| PitchError::FftError(format!("{:?}", e)))?;
        Ok(())
    }

    /// Local maxima of the magnitude spectrum at `t`, refined by
    /// parabolic interpolation of the log magnitude.
    fn spectral_peaks(&mut self, t: f64) -> PitchResult<Peaks> {
        self.spectrum_at(t)?;
        let fft_len = self.fft_input.len();
        let bin_hz = self.sample_rate / fft_len as f64;
        let scale = 2.0 / self.window_sum;

        let log_mag: Vec<f64> = self
            .fft_output
            .iter()
            .map(|c| c.norm().max(f64::MIN_POSITIVE).ln())
            .collect();

        let mut peaks = Peaks::default();
        for k in 1..log_mag.len().saturating_sub(1) {
            let (a, b, g) = (log_mag[k - 1], log_mag[k], log_mag[k + 1]);
            if b > a && b >= g {
                let denom = a - 2.0 * b + g;
                let p = if denom != 0.0 { 0.5 * (a - g) / denom } else { 0.0 };
                let freq = (k as f64 + p) * bin_hz;
                let amp = (b - 0.25 * (a - g) * p).exp() * scale;
                peaks.push(freq, amp);
            }
        }
        Ok(peaks)
    }
}

impl FundamentalEstimator for FundamentalFromSamples {
    fn config(&self) -> &FundamentalConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut FundamentalConfig {
        &mut self.config
    }

    fn collect_peaks(&mut self, t: f64) -> PitchResult<Peaks> {
        let raw = self.spectral_peaks(t)?;
        let max_amp = raw.amplitudes.iter().copied().fold(0.0, f64::max);
        let thresh = db_to_amp(self.config.amp_floor_db).max(db_to_amp(-self.config.amp_range_db) * max_amp);

        let mut peaks = Peaks::default();
        for (&f, &a) in raw.frequencies.iter().zip(&raw.amplitudes) {
            if a > thresh && f < self.config.freq_ceiling_hz {
                peaks.push(f, a);
            }
        }
        Ok(peaks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rbe_core::{Breakpoint, CancelToken, CoreError, Envelope};

    fn harmonic_partials(f0: f64, count: usize, t0: f64, t1: f64) -> Vec<Partial> {
        (1..=count)
            .map(|k| {
                let f = f0 * k as f64;
                let amp = 0.2 / k as f64;
                Partial::from_breakpoints(
                    0,
                    [(t0, Breakpoint::new(f, amp, 0.0, 0.0)), (t1, Breakpoint::new(f, amp, 0.0, 0.0))],
                )
            })
            .collect()
    }

    #[test]
    fn test_estimate_from_partials() {
        let partials = harmonic_partials(200.0, 6, 0.0, 1.0);
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let f0 = est.estimate_at(0.5, 120.0, 500.0).unwrap();
        assert_relative_eq!(f0.frequency(), 200.0, epsilon = 0.1);
        assert!(f0.confidence() > 0.99);
    }

    #[test]
    fn test_collect_applies_thresholds() {
        let mut partials = harmonic_partials(200.0, 3, 0.0, 1.0);
        // 40 dB below the loudest
        partials.push(Partial::from_breakpoints(
            0,
            [(0.0, Breakpoint::new(1234.0, 0.002, 0.0, 0.0)), (1.0, Breakpoint::new(1234.0, 0.002, 0.0, 0.0))],
        ));
        // above the ceiling
        partials.push(Partial::from_breakpoints(
            0,
            [(0.0, Breakpoint::new(5000.0, 0.2, 0.0, 0.0)), (1.0, Breakpoint::new(5000.0, 0.2, 0.0, 0.0))],
        ));
        // pure noise has no sinusoidal energy
        partials.push(Partial::from_breakpoints(
            0,
            [(0.0, Breakpoint::new(333.0, 0.2, 1.0, 0.0)), (1.0, Breakpoint::new(333.0, 0.2, 1.0, 0.0))],
        ));
        partials.push(Partial::new());

        let est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let peaks = est.collect_freqs_and_amps(0.5);
        assert_eq!(peaks.len(), 3);
        for (got, want) in peaks.frequencies.iter().zip([200.0, 400.0, 600.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }

        // outside every span the partials fade to silence
        assert!(est.collect_freqs_and_amps(2.0).is_empty());
    }

    #[test]
    fn test_setters_validate() {
        let partials = harmonic_partials(200.0, 2, 0.0, 1.0);
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        assert!(est.set_amp_floor(0.0).is_err());
        assert!(est.set_amp_range(-3.0).is_err());
        assert!(est.set_precision(0.0).is_err());
        est.set_amp_floor(-80.0).unwrap();
        est.set_amp_range(40.0).unwrap();
        est.set_freq_ceiling(2000.0);
        assert_eq!(est.amp_floor(), -80.0);
        assert_eq!(est.amp_range(), 40.0);
        assert_eq!(est.freq_ceiling(), 2000.0);
        assert!(FundamentalFromPartials::new(&partials, -1.0).is_err());
    }

    #[test]
    fn test_build_envelope_samples_interval() {
        let partials = harmonic_partials(150.0, 5, 0.0, 0.5);
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let env = est.build_envelope(0.0, 0.5, 0.0625, 100.0, 300.0, 0.9).unwrap();
        assert_eq!(env.len(), 8);
        for (t, v) in env.iter() {
            assert!(t < 0.5);
            assert_relative_eq!(v, 150.0, epsilon = 0.1);
        }
        assert_relative_eq!(env.value_at(0.1), 150.0, epsilon = 0.1);
    }

    #[test]
    fn test_build_envelope_gaps_where_silent() {
        let mut partials = harmonic_partials(150.0, 4, 0.0, 0.1);
        partials.extend(harmonic_partials(150.0, 4, 0.3, 0.4));
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let env = est.build_envelope(0.0, 0.4, 0.05, 100.0, 300.0, 0.9).unwrap();
        let times: Vec<f64> = env.iter().map(|(t, _)| t).collect();
        assert!(times.iter().all(|&t| t <= 0.1 + 1e-9 || t >= 0.3 - 1e-9));
        assert!(!times.is_empty());
    }

    #[test]
    fn test_build_envelope_reversed_bounds_and_bad_interval() {
        let partials = harmonic_partials(150.0, 4, 0.0, 0.1);
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let a = est.build_envelope(0.1, 0.0, 0.02, 100.0, 300.0, 0.9).unwrap();
        let b = est.build_envelope(0.0, 0.1, 0.02, 100.0, 300.0, 0.9).unwrap();
        assert_eq!(a.len(), b.len());
        assert!(est.build_envelope(0.0, 0.1, 0.0, 100.0, 300.0, 0.9).is_err());
    }

    #[test]
    fn test_build_envelope_cancel() {
        let partials = harmonic_partials(150.0, 4, 0.0, 0.1);
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = est
            .build_envelope_with_progress(0.0, 0.1, 0.01, 100.0, 300.0, 0.9, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(matches!(err, PitchError::Core(CoreError::Cancelled)));
    }

    fn tone(f0: f64, harmonics: usize, sample_rate: f64, secs: f64) -> Vec<f64> {
        let n = (sample_rate * secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate;
                (1..=harmonics)
                    .map(|k| 0.5 / k as f64 * (2.0 * PI * f0 * k as f64 * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_sample_peaks_locate_sinusoid() {
        let samples = tone(440.0, 1, 44100.0, 0.5);
        let cfg = FundamentalConfig::default().with_amp_range(20.0);
        let mut est = FundamentalFromSamples::with_config(&samples, 44100.0, cfg).unwrap();
        let peaks = est.collect_peaks(0.25).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_relative_eq!(peaks.frequencies[0], 440.0, epsilon = 1.0);
        assert_relative_eq!(peaks.amplitudes[0], 0.5, epsilon = 0.02);
    }

    #[test]
    fn test_estimate_from_samples() {
        let samples = tone(200.0, 3, 44100.0, 0.5);
        let mut est = FundamentalFromSamples::new(&samples, 44100.0, 0.1).unwrap();
        let f0 = est.estimate_at(0.25, 100.0, 300.0).unwrap();
        assert_relative_eq!(f0.frequency(), 200.0, epsilon = 1.0);
    }

    #[test]
    fn test_samples_outside_signal_are_silent() {
        let samples = tone(200.0, 3, 44100.0, 0.1);
        let mut est = FundamentalFromSamples::new(&samples, 44100.0, 0.1).unwrap();
        assert!(est.collect_peaks(5.0).unwrap().is_empty());
        assert_eq!(est.estimate_at(5.0, 100.0, 300.0).unwrap(), F0Estimate::default());
    }

    #[test]
    fn test_sample_estimator_validation() {
        assert!(matches!(
            FundamentalFromSamples::new(&[0.0; 16], 0.0, 0.1),
            Err(PitchError::InvalidSampleRate(_))
        ));
        let mut est = FundamentalFromSamples::new(&[0.0; 16], 8000.0, 0.1).unwrap();
        assert!(est.set_window_width(0.0).is_err());
        est.set_window_width(40.0).unwrap();
        assert_eq!(est.window_width(), 40.0);
    }

    #[test]
    fn test_envelope_trait_object_from_estimate() {
        let partials = harmonic_partials(220.0, 4, 0.0, 0.2);
        let mut est = FundamentalFromPartials::new(&partials, 0.1).unwrap();
        let env = est.build_envelope(0.0, 0.2, 0.05, 150.0, 400.0, 0.9).unwrap();
        let boxed: Box<dyn Envelope> = Box::new(env);
        assert_relative_eq!(boxed.value_at(0.1), 220.0, epsilon = 0.1);
    }
}
