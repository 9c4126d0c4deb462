//! Cooperative progress reporting and cancellation
//!
//! Long-running operations over many partials poll a [`Progress`] between
//! whole-partial units of work, so a cancelled operation never leaves a
//! partial half-mutated.

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Progress sink polled by batch operations.
pub trait Progress: Send + Sync {
    /// Report completion in 0..=1. Returning `false` requests cancellation.
    fn set_progress(&self, fraction: f64) -> bool;
}

/// Progress sink that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    #[inline]
    fn set_progress(&self, _fraction: f64) -> bool {
        true
    }
}

/// Shareable cancellation flag with the last reported progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    progress_bits: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation request
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.progress_bits.store(0f64.to_bits(), Ordering::Relaxed);
    }

    /// Last reported progress fraction
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }
}

impl Progress for CancelToken {
    fn set_progress(&self, fraction: f64) -> bool {
        self.progress_bits
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        !self.is_cancelled()
    }
}

/// Report `done` of `total` units and fail with `Cancelled` if requested.
pub fn checkpoint(progress: &dyn Progress, done: usize, total: usize) -> CoreResult<()> {
    let fraction = if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    };
    if progress.set_progress(fraction) {
        Ok(())
    } else {
        log::debug!("operation cancelled at {:.0}%", fraction * 100.0);
        Err(CoreError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(checkpoint(&token, 1, 4).is_ok());
        assert_eq!(token.progress(), 0.25);

        let shared = token.clone();
        shared.cancel();
        assert!(matches!(checkpoint(&token, 2, 4), Err(CoreError::Cancelled)));

        token.reset();
        assert!(!token.is_cancelled());
        assert_eq!(token.progress(), 0.0);
    }

    #[test]
    fn test_no_progress_never_cancels() {
        assert!(checkpoint(&NoProgress, 0, 0).is_ok());
    }
}
