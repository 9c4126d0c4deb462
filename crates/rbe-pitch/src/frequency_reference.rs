//! Reference envelopes for channelization
//!
//! [`FrequencyReference`] samples a partial-based fundamental estimator a
//! fixed number of times over the span of a partial list and accepts every
//! estimate. [`create_f0_estimate`] samples at a fixed interval and keeps
//! only confident estimates.

use crate::error::{PitchError, PitchResult};
use crate::fundamental::{FundamentalEstimator, FundamentalFromPartials};
use rbe_core::partial_utils::time_span;
use rbe_core::{Envelope, LinearEnvelope, Partial};

/// Sampling interval used when no sample count is given (seconds)
pub const DEFAULT_REFERENCE_INTERVAL: f64 = 0.005;

const REFERENCE_PRECISION_HZ: f64 = 0.1;

const F0_PRECISION_HZ: f64 = 0.1;
const F0_CONFIDENCE: f64 = 0.9;

/// Fundamental frequency envelope built from a partial list.
#[derive(Debug, Clone)]
pub struct FrequencyReference {
    env: LinearEnvelope,
}

impl FrequencyReference {
    /// Estimate the fundamental within `[min_freq, max_freq]` at
    /// `num_samps` instants evenly spread over the partials' span, or
    /// every 5 ms when `num_samps` is 0.
    pub fn new(partials: &[Partial], min_freq: f64, max_freq: f64, num_samps: usize) -> PitchResult<Self> {
        if num_samps == 1 {
            return Err(PitchError::invalid_argument(
                "frequency reference needs at least two samples",
            ));
        }
        if !(min_freq > 0.0) || !(max_freq > 0.0) {
            return Err(PitchError::invalid_argument("frequency bounds must be positive"));
        }

        let (tbeg, tend) = time_span(partials);
        let span = tend - tbeg;
        if span <= 0.0 {
            log::warn!("frequency reference over an empty time span");
            return Ok(Self { env: LinearEnvelope::new() });
        }

        let interval = if num_samps == 0 {
            DEFAULT_REFERENCE_INTERVAL
        } else {
            span / (num_samps - 1) as f64
        };

        let mut est = FundamentalFromPartials::new(partials, REFERENCE_PRECISION_HZ)?;
        // every estimate lands, and the end of the span is sampled too
        let env = est.build_envelope(
            tbeg,
            tend + 0.5 * interval,
            interval,
            min_freq,
            max_freq,
            f64::NEG_INFINITY,
        )?;
        Ok(Self { env })
    }

    pub fn envelope(&self) -> &LinearEnvelope {
        &self.env
    }

    pub fn into_envelope(self) -> LinearEnvelope {
        self.env
    }
}

impl Envelope for FrequencyReference {
    fn value_at(&self, time: f64) -> f64 {
        self.env.value_at(time)
    }

    fn clone_box(&self) -> Box<dyn Envelope> {
        Box::new(self.clone())
    }
}

/// Confident fundamental estimates within `[min_freq, max_freq]`, taken
/// every `interval` seconds over the span of `partials`.
pub fn create_f0_estimate(
    partials: &[Partial],
    min_freq: f64,
    max_freq: f64,
    interval: f64,
) -> PitchResult<LinearEnvelope> {
    let (tbeg, tend) = time_span(partials);
    let mut est = FundamentalFromPartials::new(partials, F0_PRECISION_HZ)?;
    est.build_envelope(tbeg, tend, interval, min_freq, max_freq, F0_CONFIDENCE)
}
