//! rbe-dsp: Partial transformation algorithms
//!
//! Everything here operates on complete, already-analyzed partial
//! collections from `rbe-core`.
//!
//! ## Modules
//! - `channelizer` - Label partials by harmonic channel against a reference
//! - `distiller` - Merge same-labeled partials into one per label
//! - `sieve` - Unlabel shorter partials that overlap within a label
//! - `collator` - Pack unlabeled partials end to end under fresh labels
//! - `dilator` - Piecewise-linear time warping of partials and markers
//! - `resampler` - Dense or quantizing resampling with phase correction
//! - `harmonifier` - Pull quiet breakpoints onto harmonic frequencies
//! - `morpher` - Interpolate between two distilled partial collections
//! - `config` - Serializable parameter sets for all of the above

pub mod channelizer;
pub mod collator;
pub mod config;
pub mod dilator;
pub mod distiller;
pub mod harmonifier;
pub mod morpher;
pub mod resampler;
pub mod sieve;

pub use channelizer::{channelize, Channelizer};
pub use collator::{collate, Collator};
pub use config::*;
pub use dilator::{dilate, Dilator};
pub use distiller::{distill, Distiller};
pub use harmonifier::{harmonify, Harmonifier};
pub use morpher::{morph, morph_with_reference, Morpher};
pub use resampler::{resample, Resampler};
pub use sieve::{sift, Sieve};
