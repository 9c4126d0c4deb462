//! rbe-core: Partial model for reassigned bandwidth-enhanced additive sound
//!
//! This crate provides the data model shared by every other crate in the
//! workspace: breakpoints, partials, partial lists, markers, envelopes,
//! phase correction and the partial utilities.

mod breakpoint;
mod envelope;
mod error;
mod marker;
mod partial;
mod partial_list;
mod progress;

pub mod partial_utils;
pub mod phasefix;

pub use breakpoint::*;
pub use envelope::*;
pub use error::*;
pub use marker::*;
pub use partial::*;
pub use partial_list::*;
pub use progress::*;
