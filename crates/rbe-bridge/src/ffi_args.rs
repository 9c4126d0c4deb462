//! Raw argument validation
//!
//! Strings, arrays and JSON parameter sets arrive as raw pointers. These
//! helpers reject null and malformed input before any algorithm runs.

use crate::ffi_error::{FfiError, FfiResult};
use serde::de::DeserializeOwned;
use std::ffi::{CStr, c_char};

/// Borrow a NUL-terminated UTF-8 string.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives
/// the returned borrow.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::invalid_argument(format!("{} is null", what)));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiError::invalid_argument(format!("{} is not valid UTF-8", what)))
}

/// Borrow `len` doubles.
///
/// # Safety
/// `ptr` must be null or point to at least `len` readable doubles that
/// outlive the returned borrow.
pub(crate) unsafe fn f64_slice<'a>(ptr: *const f64, len: i32, what: &str) -> FfiResult<&'a [f64]> {
    if len < 0 {
        return Err(FfiError::invalid_argument(format!("{} length is negative", what)));
    }
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(FfiError::invalid_argument(format!("{} is null", what)));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len as usize) })
}

/// Parse a JSON parameter set; null selects the defaults. Missing fields
/// take their default values.
///
/// # Safety
/// As for [`c_str`].
pub(crate) unsafe fn config<T: DeserializeOwned + Default>(json: *const c_char) -> FfiResult<T> {
    if json.is_null() {
        return Ok(T::default());
    }
    let text = unsafe { c_str(json, "configuration") }?;
    serde_json::from_str(text).map_err(|e| FfiError::invalid_argument(format!("bad configuration JSON: {}", e)))
}
