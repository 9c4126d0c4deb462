//! rbe-pitch: Fundamental frequency estimation
//!
//! Maximum-likelihood estimation of a time-varying fundamental, either from
//! the partials of an analysis or from raw samples.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rbe_pitch::{FundamentalEstimator, FundamentalFromPartials};
//!
//! let mut est = FundamentalFromPartials::new(&partials, 0.1)?;
//! let reference = est.build_envelope(0.0, 2.0, 0.01, 80.0, 400.0, 0.9)?;
//! ```
//!
//! ## Modules
//! - `f0_estimate` - Single-instant estimate from spectral peaks
//! - `fundamental` - Partial and sample estimators, envelope building
//! - `frequency_reference` - Reference envelopes for channelization
//! - `config` - Estimator thresholds

pub mod config;
pub mod f0_estimate;
pub mod frequency_reference;
pub mod fundamental;

mod error;

pub use config::FundamentalConfig;
pub use error::{PitchError, PitchResult};
pub use f0_estimate::F0Estimate;
pub use frequency_reference::{create_f0_estimate, FrequencyReference, DEFAULT_REFERENCE_INTERVAL};
pub use fundamental::{FundamentalEstimator, FundamentalFromPartials, FundamentalFromSamples, Peaks};
