//! rbe-file: Partial file I/O
//!
//! Reads and writes partials and markers as SDIF:
//! - `RBEP` bandwidth-enhanced frames (exact breakpoint times)
//! - `1TRC` sine-only frames for other SDIF tools
//! - `RBEL` labels and `RBEM` markers alongside either
//!
//! All values are big-endian on disk; float32 and float64 matrices are
//! both accepted on import.

mod error;
pub mod sdif;

pub use error::*;
pub use sdif::SdifFile;
