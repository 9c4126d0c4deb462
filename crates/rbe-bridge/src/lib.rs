//! rbe-bridge: C-callable procedural interface
//!
//! Exposes the partial model, the transformation algorithms, fundamental
//! estimation and SDIF files to C hosts. Partial lists and envelopes are
//! addressed through opaque `u64` handles.
//!
//! ## Modules
//! - `ffi_error` - Error categories, last-error storage and the error callback
//! - `registry` - Handle registries for partial lists and envelopes
//! - `partial_list_ffi` / `envelope_ffi` - Object lifetimes
//! - `processing_ffi` - Channelize, distill, sift, collate, dilate, resample,
//!   harmonify, morph and fundamental estimation
//! - `file_ffi` - SDIF import and export
//! - `utilities_ffi` - Cropping, scaling, label selection and phase repair
//!
//! Every entry point catches errors and panics, reports them through the
//! handler installed with `rbe_set_error_handler` and returns a neutral
//! value instead of unwinding into the caller.

// Handles and raw buffers from C are validated before use
#![allow(clippy::not_unsafe_ptr_arg_deref)]
// The morph entry points mirror the C signatures
#![allow(clippy::too_many_arguments)]

mod ffi_args;
pub mod envelope_ffi;
pub mod ffi_error;
pub mod file_ffi;
pub mod partial_list_ffi;
pub mod processing_ffi;
pub mod registry;
pub mod utilities_ffi;

pub use ffi_error::{FfiError, FfiErrorCategory, FfiResult};
pub use registry::{ENVELOPES, Handle, INVALID_HANDLE, PARTIAL_LISTS, Registry};

use once_cell::sync::Lazy;
use rbe_core::{CancelToken, Progress};
use std::ffi::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};

// ═══════════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Cancellation shared by every long-running entry point.
///
/// The token is cleared when an operation starts with no other operation
/// running. While operations overlap, one `rbe_cancel` stops all of them
/// and `rbe_progress` reports whichever polled last.
pub(crate) struct OperationTracker {
    token: CancelToken,
    active: AtomicUsize,
}

impl OperationTracker {
    pub(crate) fn new() -> Self {
        Self {
            token: CancelToken::new(),
            active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn begin(&self) -> Operation<'_> {
        if self.active.fetch_add(1, Ordering::SeqCst) == 0 {
            self.token.reset();
        }
        Operation { tracker: self }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn progress(&self) -> f64 {
        self.token.progress()
    }
}

/// One running operation; polls the shared token until dropped.
pub(crate) struct Operation<'a> {
    tracker: &'a OperationTracker,
}

impl Progress for Operation<'_> {
    fn set_progress(&self, fraction: f64) -> bool {
        self.tracker.token.set_progress(fraction)
    }
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}

static OPERATIONS: Lazy<OperationTracker> = Lazy::new(OperationTracker::new);

pub(crate) fn begin_operation() -> Operation<'static> {
    OPERATIONS.begin()
}

/// Install `env_logger` as the log backend, configured by `RUST_LOG`.
/// Later calls do nothing.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_init_logging() {
    if env_logger::Builder::from_default_env().try_init().is_ok() {
        log::info!("rbe-bridge {} logging initialized", env!("CARGO_PKG_VERSION"));
    }
}

/// Ask the running operations to stop at their next partial boundary.
/// Each then reports a `Cancelled` error and leaves no partial
/// half-modified.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_cancel() {
    OPERATIONS.cancel();
}

/// Completion of the current or last operation, 0 to 1.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_progress() -> f64 {
    OPERATIONS.progress()
}

/// Library version as a static NUL-terminated string. Do not free.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}
