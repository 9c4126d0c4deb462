//! Parameter sets for the partial transformation algorithms

use serde::{Deserialize, Serialize};

/// Channelizer tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelizerConfig {
    /// Inharmonicity coefficient B of a stiff string (0 = harmonic)
    pub stretch_factor: f64,

    /// Exponent applied to breakpoint sine amplitudes when averaging
    /// channel numbers (0 = unweighted)
    pub amp_weighting: f64,
}

impl Default for ChannelizerConfig {
    fn default() -> Self {
        Self {
            stretch_factor: 0.0,
            amp_weighting: 0.0,
        }
    }
}

impl ChannelizerConfig {
    pub fn with_stretch_factor(mut self, b: f64) -> Self {
        self.stretch_factor = b;
        self
    }

    pub fn with_amp_weighting(mut self, exponent: f64) -> Self {
        self.amp_weighting = exponent;
        self
    }
}

/// Distiller tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillerConfig {
    /// Time for a partial to fade in or out around a gap (seconds)
    pub fade_time: f64,

    /// Minimum silence between fade out and fade in (seconds)
    pub gap_time: f64,
}

impl Default for DistillerConfig {
    fn default() -> Self {
        Self {
            fade_time: 0.005,
            gap_time: 0.001,
        }
    }
}

impl DistillerConfig {
    pub fn with_fade_time(mut self, t: f64) -> Self {
        self.fade_time = t;
        self
    }

    pub fn with_gap_time(mut self, t: f64) -> Self {
        self.gap_time = t;
        self
    }
}

/// Sieve tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SieveConfig {
    /// Fade time; partials closer than twice this are overlapping
    pub fade_time: f64,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self { fade_time: 0.001 }
    }
}

impl SieveConfig {
    pub fn with_fade_time(mut self, t: f64) -> Self {
        self.fade_time = t;
        self
    }
}

/// Collator tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollatorConfig {
    pub fade_time: f64,
    pub gap_time: f64,
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            fade_time: 0.001,
            gap_time: 0.0001,
        }
    }
}

impl CollatorConfig {
    pub fn with_fade_time(mut self, t: f64) -> Self {
        self.fade_time = t;
        self
    }

    pub fn with_gap_time(mut self, t: f64) -> Self {
        self.gap_time = t;
        self
    }
}

/// Resampler tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerConfig {
    /// Grid interval (seconds)
    pub interval: f64,

    /// Adjust frequencies so rendered phase reaches the stored phases
    pub phase_correct: bool,

    /// Dense resampling (true) or quantization of existing breakpoints
    pub dense: bool,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            interval: 0.001,
            phase_correct: true,
            dense: true,
        }
    }
}

impl ResamplerConfig {
    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_phase_correct(mut self, on: bool) -> Self {
        self.phase_correct = on;
        self
    }

    pub fn with_dense(mut self, on: bool) -> Self {
        self.dense = on;
        self
    }
}

/// Morpher tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorpherConfig {
    /// Offset added before log-domain amplitude interpolation
    pub amp_shape: f64,

    /// Minimum time between breakpoints of a morphed partial (seconds)
    pub min_breakpoint_gap: f64,

    pub log_amp_morphing: bool,
    pub log_freq_morphing: bool,

    /// Breakpoints quieter than this (dB) do not lock the phase
    pub fix_threshold_db: f64,
}

impl Default for MorpherConfig {
    fn default() -> Self {
        Self {
            amp_shape: 1.0e-5,
            min_breakpoint_gap: 1.0e-4,
            log_amp_morphing: true,
            log_freq_morphing: false,
            fix_threshold_db: -90.0,
        }
    }
}

impl MorpherConfig {
    pub fn with_amp_shape(mut self, x: f64) -> Self {
        self.amp_shape = x;
        self
    }

    pub fn with_min_breakpoint_gap(mut self, x: f64) -> Self {
        self.min_breakpoint_gap = x;
        self
    }

    pub fn with_log_amp_morphing(mut self, on: bool) -> Self {
        self.log_amp_morphing = on;
        self
    }

    pub fn with_log_freq_morphing(mut self, on: bool) -> Self {
        self.log_freq_morphing = on;
        self
    }
}
