//! Fundamental estimator parameters

use crate::error::{PitchError, PitchResult};
use serde::{Deserialize, Serialize};

/// Estimator tuning shared by the partial and sample estimators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundamentalConfig {
    /// Target precision of each estimate (Hz)
    pub precision_hz: f64,

    /// Absolute amplitude floor (dB, negative)
    pub amp_floor_db: f64,

    /// Amplitude range below the loudest component (dB, positive)
    pub amp_range_db: f64,

    /// Components at or above this frequency are ignored (Hz)
    pub freq_ceiling_hz: f64,

    /// Main-lobe width of the analysis window (Hz, samples only)
    pub window_width_hz: f64,
}

impl Default for FundamentalConfig {
    fn default() -> Self {
        Self {
            precision_hz: 0.1,
            amp_floor_db: -60.0,
            amp_range_db: 30.0,
            freq_ceiling_hz: 4000.0,
            window_width_hz: 80.0,
        }
    }
}

impl FundamentalConfig {
    pub fn with_precision(mut self, hz: f64) -> Self {
        self.precision_hz = hz;
        self
    }

    pub fn with_amp_floor(mut self, db: f64) -> Self {
        self.amp_floor_db = db;
        self
    }

    pub fn with_amp_range(mut self, db: f64) -> Self {
        self.amp_range_db = db;
        self
    }

    pub fn with_freq_ceiling(mut self, hz: f64) -> Self {
        self.freq_ceiling_hz = hz;
        self
    }

    pub fn with_window_width(mut self, hz: f64) -> Self {
        self.window_width_hz = hz;
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> PitchResult<()> {
        check_precision(self.precision_hz)?;
        check_amp_floor(self.amp_floor_db)?;
        check_amp_range(self.amp_range_db)?;
        check_window_width(self.window_width_hz)
    }
}

pub(crate) fn check_precision(x: f64) -> PitchResult<()> {
    if x > 0.0 {
        Ok(())
    } else {
        Err(PitchError::invalid_argument("precision must be positive"))
    }
}

pub(crate) fn check_amp_floor(x: f64) -> PitchResult<()> {
    if x < 0.0 {
        Ok(())
    } else {
        Err(PitchError::invalid_argument("amplitude floor must be negative (dB)"))
    }
}

pub(crate) fn check_amp_range(x: f64) -> PitchResult<()> {
    if x > 0.0 {
        Ok(())
    } else {
        Err(PitchError::invalid_argument("amplitude range must be positive (dB)"))
    }
}

pub(crate) fn check_window_width(x: f64) -> PitchResult<()> {
    if x > 0.0 {
        Ok(())
    } else {
        Err(PitchError::invalid_argument("window width must be positive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(FundamentalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(FundamentalConfig::default().with_amp_floor(3.0).validate().is_err());
        assert!(FundamentalConfig::default().with_amp_range(0.0).validate().is_err());
        assert!(FundamentalConfig::default().with_precision(-0.1).validate().is_err());
        assert!(FundamentalConfig::default().with_window_width(0.0).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: FundamentalConfig = serde_json::from_str(r#"{"freq_ceiling_hz": 2000.0}"#).unwrap();
        assert_eq!(cfg.freq_ceiling_hz, 2000.0);
        assert_eq!(cfg.precision_hz, 0.1);
    }
}
