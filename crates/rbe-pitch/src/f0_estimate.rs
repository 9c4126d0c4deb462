//! Single-instant fundamental estimate from spectral peaks
//!
//! Candidate fundamentals are the integer sub-multiples of every peak
//! frequency inside the search range. Each candidate is scored with the
//! normalized likelihood
//!
//! ```text
//! Q(f0) = sum(a_k^2 * cos(2 pi f_k / f0)) / sum(a_k^2)
//! ```
//!
//! which is 1 when every peak is an exact harmonic of `f0`. The best
//! candidate is promoted by octaves while the octave scores nearly as
//! well, then refined with a secant search for a zero of `dQ/df0`.

use std::f64::consts::PI;

/// Promote to the octave above while it scores at least this fraction
/// of the best likelihood.
const OCTAVE_RATIO: f64 = 0.95;

const MAX_SECANT_ITERS: usize = 20;

/// Fundamental frequency and its likelihood score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct F0Estimate {
    frequency: f64,
    confidence: f64,
}

impl F0Estimate {
    /// Estimate the fundamental of peaks with amplitudes `amps` and
    /// frequencies `freqs` within `[fmin, fmax]`, refined to about
    /// `resolution` Hz. No peaks in range gives frequency and confidence 0.
    pub fn new(amps: &[f64], freqs: &[f64], fmin: f64, fmax: f64, resolution: f64) -> Self {
        debug_assert_eq!(amps.len(), freqs.len());
        let (mut fmin, mut fmax) = (fmin, fmax);
        if fmin > fmax {
            std::mem::swap(&mut fmin, &mut fmax);
        }
        let fmin = fmin.max(1.0);

        let candidates = candidate_freqs(freqs, fmin, fmax);
        if candidates.is_empty() {
            return Self::default();
        }

        let norm = 1.0 / amps.iter().map(|a| a * a).sum::<f64>();
        let (mut best_freq, mut best_q) = candidates
            .iter()
            .map(|&f| (f, likelihood(amps, freqs, f, norm)))
            .fold((candidates[0], f64::NEG_INFINITY), |best, c| if c.1 > best.1 { c } else { best });

        let mut next_f = 2.0 * best_freq;
        let mut next_q = likelihood(amps, freqs, next_f, norm);
        while fmax > next_f && OCTAVE_RATIO * best_q < next_q {
            best_freq = next_f;
            best_q = next_q;
            next_f += best_freq;
            next_q = likelihood(amps, freqs, next_f, norm);
        }

        let alt_freq = if likelihood_slope(amps, freqs, best_freq) > 0.0 {
            best_freq + resolution
        } else {
            best_freq - resolution
        };

        let mut frequency = secant_search(amps, freqs, best_freq, alt_freq);
        if frequency < fmin || frequency > fmax {
            frequency = best_freq;
        }
        let mut confidence = likelihood(amps, freqs, frequency, norm);
        if best_q > confidence {
            confidence = best_q;
            frequency = best_freq;
        }

        Self { frequency, confidence }
    }

    /// Estimated fundamental in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Likelihood of the estimate, at most 1.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Every sub-multiple `f / n` of every peak falling in `[fmin, fmax]`,
/// sorted ascending.
fn candidate_freqs(peak_freqs: &[f64], fmin: f64, fmax: f64) -> Vec<f64> {
    let mut out = Vec::new();
    for &pk in peak_freqs {
        let mut div = 1.0;
        let mut f = pk;
        while f > fmax {
            div += 1.0;
            f = pk / div;
        }
        while f >= fmin {
            out.push(f);
            div += 1.0;
            f = pk / div;
        }
    }
    out.sort_by(f64::total_cmp);
    out
}

#[inline]
fn likelihood(amps: &[f64], freqs: &[f64], f0: f64, norm: f64) -> f64 {
    let sum: f64 = amps
        .iter()
        .zip(freqs)
        .map(|(a, f)| a * a * (2.0 * PI * f / f0).cos())
        .sum();
    sum * norm
}

/// Derivative of the (unnormalized) likelihood with respect to `f0`.
#[inline]
fn likelihood_slope(amps: &[f64], freqs: &[f64], f0: f64) -> f64 {
    amps.iter()
        .zip(freqs)
        .map(|(a, f)| {
            let arg = 2.0 * PI * f / f0;
            a * a * arg.sin() * arg / f0
        })
        .sum()
}

/// Secant iteration toward a zero of the likelihood slope. Stops after a
/// fixed number of steps or when a step is no longer finite, keeping the
/// last finite iterate.
fn secant_search(amps: &[f64], freqs: &[f64], f1: f64, f2: f64) -> f64 {
    let mut xn = f1;
    let mut xnm1 = f2;
    let mut fxnm1 = likelihood_slope(amps, freqs, xnm1);
    for _ in 0..MAX_SECANT_ITERS {
        let fxn = likelihood_slope(amps, freqs, xn);
        let deltax = fxn * (xn - xnm1) / (fxn - fxnm1);
        xnm1 = xn;
        xn -= deltax;
        fxnm1 = fxn;
        if !deltax.is_finite() {
            return xnm1;
        }
    }
    xn
}
