//! Breakpoint: an instantaneous sample of a bandwidth-enhanced partial

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Frequency, amplitude, bandwidth (noisiness) and phase at one instant.
///
/// A breakpoint carries no time of its own; the owning [`crate::Partial`]
/// stores it keyed by time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    frequency: f64,
    amplitude: f64,
    bandwidth: f64,
    phase: f64,
}

impl Breakpoint {
    #[inline]
    pub fn new(frequency: f64, amplitude: f64, bandwidth: f64, phase: f64) -> Self {
        Self {
            frequency,
            amplitude,
            bandwidth,
            phase,
        }
    }

    /// Frequency in Hz.
    #[inline]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Sinusoidal plus noise amplitude (absolute, not dB).
    #[inline]
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Fraction of the energy that is noise-like, 0 to 1.
    #[inline]
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Phase in radians.
    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    #[inline]
    pub fn set_frequency(&mut self, x: f64) {
        self.frequency = x;
    }

    #[inline]
    pub fn set_amplitude(&mut self, x: f64) {
        self.amplitude = x;
    }

    #[inline]
    pub fn set_bandwidth(&mut self, x: f64) {
        self.bandwidth = x;
    }

    #[inline]
    pub fn set_phase(&mut self, x: f64) {
        self.phase = x;
    }

    /// Zero-amplitude breakpoints mark silence and break phase continuity.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.amplitude == 0.0
    }

    /// Add noise energy to this breakpoint, increasing the amplitude and
    /// recomputing the bandwidth so that the sinusoidal energy is unchanged.
    pub fn add_noise_energy(&mut self, energy: f64) {
        let mut e = self.amplitude * self.amplitude;
        let mut n = e * self.bandwidth;

        e += energy;
        n += energy;

        self.amplitude = e.sqrt();
        self.bandwidth = if e > 0.0 { n / e } else { 0.0 };
    }

    /// Silent copy of `self` placed `fade_time` seconds earlier, with the
    /// phase rolled back at this breakpoint's frequency.
    pub fn null_before(&self, fade_time: f64) -> Self {
        let dp = TWO_PI * fade_time * self.frequency;
        Self {
            frequency: self.frequency,
            amplitude: 0.0,
            bandwidth: 0.0,
            phase: (self.phase - dp) % TWO_PI,
        }
    }

    /// Silent copy of `self` placed `fade_time` seconds later, with the
    /// phase advanced at this breakpoint's frequency.
    pub fn null_after(&self, fade_time: f64) -> Self {
        let dp = TWO_PI * fade_time * self.frequency;
        Self {
            frequency: self.frequency,
            amplitude: 0.0,
            bandwidth: 0.0,
            phase: (self.phase + dp) % TWO_PI,
        }
    }
}

/// Wrap an angle onto the half-open interval (-π, π].
#[inline]
pub fn wrap_pi(x: f64) -> f64 {
    x + TWO_PI * (0.5 - x / TWO_PI).floor()
}
