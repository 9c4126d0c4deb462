//! Error reporting across the C boundary
//!
//! Every entry point runs its body inside [`guard`]. Errors and panics are
//! converted to an [`FfiError`], stored as the calling thread's last error
//! and passed to the handler installed with [`rbe_set_error_handler`]. The
//! entry point then returns a neutral value: nothing, zero, or
//! [`INVALID_HANDLE`](crate::registry::INVALID_HANDLE).
//!
//! Handler reports read `"<category> in <operation>(): <message>"`.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rbe_core::CoreError;
use rbe_file::SdifError;
use rbe_pitch::PitchError;
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::ffi::{CString, c_char};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CATEGORIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Error category for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum FfiErrorCategory {
    /// Malformed parameters or null pointers
    InvalidArgument = 1,
    /// Operation preconditions violated (empty list, un-distilled input)
    InvalidObject = 2,
    IndexOutOfBounds = 3,
    /// Handle not present in its registry
    InvalidHandle = 4,
    /// File open, read, write or format failure
    FileIo = 5,
    Cancelled = 6,
    /// Entry point backed by an external collaborator that is not linked
    Unsupported = 7,
    /// Panic or internal failure
    Internal = 255,
}

impl fmt::Display for FfiErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiErrorCategory::InvalidArgument => write!(f, "Invalid argument"),
            FfiErrorCategory::InvalidObject => write!(f, "Invalid object"),
            FfiErrorCategory::IndexOutOfBounds => write!(f, "Index out of bounds"),
            FfiErrorCategory::InvalidHandle => write!(f, "Invalid handle"),
            FfiErrorCategory::FileIo => write!(f, "File I/O error"),
            FfiErrorCategory::Cancelled => write!(f, "Cancelled"),
            FfiErrorCategory::Unsupported => write!(f, "Unsupported"),
            FfiErrorCategory::Internal => write!(f, "Internal error"),
        }
    }
}

/// Layer that raised the error, stored in [`FfiError::code`].
pub mod codes {
    pub const CORE: u16 = 1;
    pub const PITCH: u16 = 2;
    pub const SDIF: u16 = 3;
    pub const BOUNDARY: u16 = 4;
    pub const PANIC: u16 = 5;
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR STRUCT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FfiError {
    pub category: FfiErrorCategory,
    /// Raising layer, one of [`codes`]
    pub code: u16,
    pub message: String,
    /// Name of the failing operation
    pub context: Option<String>,
}

impl FfiError {
    pub fn new(category: FfiErrorCategory, code: u16, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FfiErrorCategory::InvalidArgument, codes::BOUNDARY, message)
    }

    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::new(FfiErrorCategory::InvalidObject, codes::BOUNDARY, message)
    }

    pub fn invalid_handle(kind: &str, handle: u64) -> Self {
        Self::new(
            FfiErrorCategory::InvalidHandle,
            codes::BOUNDARY,
            format!("no {} with handle {}", kind, handle),
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FfiErrorCategory::Unsupported, codes::BOUNDARY, message)
    }

    /// Category in the high 16 bits, layer code in the low 16 bits.
    pub fn full_code(&self) -> u32 {
        ((self.category as u32) << 16) | (self.code as u32)
    }

    /// The line passed to the error handler.
    pub fn report_line(&self) -> String {
        format!(
            "{} in {}(): {}",
            self.category,
            self.context.as_deref().unwrap_or("rbe"),
            self.message
        )
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"category":"{:?}","code":{},"message":"{}"}}"#,
                self.category,
                self.code,
                self.message.replace('"', "'")
            )
        })
    }

    fn from_core(err: CoreError, code: u16) -> Self {
        let (category, message) = match err {
            CoreError::InvalidArgument(m) => (FfiErrorCategory::InvalidArgument, m),
            CoreError::InvalidObject(m) | CoreError::InvalidPartial(m) => (FfiErrorCategory::InvalidObject, m),
            CoreError::IndexOutOfBounds(m) => (FfiErrorCategory::IndexOutOfBounds, m),
            CoreError::FileIo(m) => (FfiErrorCategory::FileIo, m),
            e @ (CoreError::SdifLibrary(_) | CoreError::Io(_)) => (FfiErrorCategory::FileIo, e.to_string()),
            CoreError::Cancelled => (FfiErrorCategory::Cancelled, "operation cancelled".to_string()),
        };
        Self::new(category, code, message)
    }
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report_line())
    }
}

impl std::error::Error for FfiError {}

impl From<CoreError> for FfiError {
    fn from(err: CoreError) -> Self {
        Self::from_core(err, codes::CORE)
    }
}

impl From<PitchError> for FfiError {
    fn from(err: PitchError) -> Self {
        match err {
            PitchError::Core(e) => Self::from_core(e, codes::PITCH),
            PitchError::InvalidArgument(m) => Self::new(FfiErrorCategory::InvalidArgument, codes::PITCH, m),
            e @ PitchError::InvalidSampleRate(_) => {
                Self::new(FfiErrorCategory::InvalidArgument, codes::PITCH, e.to_string())
            }
            PitchError::FftError(m) => Self::new(FfiErrorCategory::Internal, codes::PITCH, m),
        }
    }
}

impl From<SdifError> for FfiError {
    fn from(err: SdifError) -> Self {
        Self::from_core(err.into(), codes::SDIF)
    }
}

pub type FfiResult<T> = Result<T, FfiError>;

// ═══════════════════════════════════════════════════════════════════════════════
// REPORTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Callback receiving one NUL-terminated report per failure.
pub type ErrorHandler = extern "C" fn(*const c_char);

static ERROR_HANDLER: Lazy<RwLock<Option<ErrorHandler>>> = Lazy::new(|| RwLock::new(None));

thread_local! {
    static LAST_ERROR: RefCell<Option<FfiError>> = const { RefCell::new(None) };
}

/// Store `err` as the last error and pass it to the installed handler.
pub fn report(err: FfiError) {
    let line = err.report_line();
    log::error!("{}", line);

    // copy the pointer out so a handler may reinstall itself
    let handler = *ERROR_HANDLER.read();
    if let Some(handler) = handler {
        if let Ok(c_line) = CString::new(line.replace('\0', " ")) {
            handler(c_line.as_ptr());
        }
    }
    LAST_ERROR.with(|last| *last.borrow_mut() = Some(err));
}

/// Last error reported on this thread.
pub fn last_error() -> Option<FfiError> {
    LAST_ERROR.with(|last| last.borrow().clone())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|last| *last.borrow_mut() = None);
}

/// Run an entry point body, reporting any error or panic as raised by
/// `operation` and returning `fallback` in that case.
pub fn guard<T>(operation: &str, fallback: T, body: impl FnOnce() -> FfiResult<T>) -> T {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            report(err.with_context(operation));
            fallback
        }
        Err(payload) => {
            let err = FfiError::new(FfiErrorCategory::Internal, codes::PANIC, panic_message(payload.as_ref()));
            report(err.with_context(operation));
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s.replace('\0', " ")) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FFI C INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Install the error handler; pass null to remove it.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_set_error_handler(handler: Option<ErrorHandler>) {
    *ERROR_HANDLER.write() = handler;
}

/// Last error report on this thread, null if none.
/// CALLER MUST FREE using rbe_free_string()
#[unsafe(no_mangle)]
pub extern "C" fn rbe_last_error() -> *mut c_char {
    match last_error() {
        Some(err) => into_c_string(err.report_line()),
        None => std::ptr::null_mut(),
    }
}

/// Last error on this thread as JSON, null if none.
/// CALLER MUST FREE using rbe_free_string()
#[unsafe(no_mangle)]
pub extern "C" fn rbe_last_error_json() -> *mut c_char {
    match last_error() {
        Some(err) => into_c_string(err.to_json_string()),
        None => std::ptr::null_mut(),
    }
}

/// Full code of the last error on this thread, 0 if none.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_last_error_code() -> u32 {
    last_error().map(|e| e.full_code()).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_clear_last_error() {
    clear_last_error();
}

/// Free a string returned by this library
#[unsafe(no_mangle)]
pub extern "C" fn rbe_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(s));
    }
}
