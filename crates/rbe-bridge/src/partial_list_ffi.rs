//! PartialList lifetime
//!
//! C interface:
//! - `rbe_partial_list_create()` - New empty list, returns its handle
//! - `rbe_partial_list_destroy(h)` - Drop the list
//! - `rbe_partial_list_clear(h)`
//! - `rbe_partial_list_copy(dst, src)` - Replace `dst` contents with a copy of `src`
//! - `rbe_partial_list_size(h)`
//! - `rbe_partial_list_splice(dst, src)` - Move all of `src` onto the end of `dst`

use crate::ffi_error::{FfiError, guard};
use crate::registry::{Handle, INVALID_HANDLE, PARTIAL_LISTS};
use rbe_core::PartialList;

#[unsafe(no_mangle)]
pub extern "C" fn rbe_partial_list_create() -> Handle {
    guard("partial_list_create", INVALID_HANDLE, || Ok(PARTIAL_LISTS.insert(PartialList::new())))
}

/// Destroying handle 0 does nothing.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_partial_list_destroy(list: Handle) {
    guard("partial_list_destroy", (), || {
        if list != INVALID_HANDLE && !PARTIAL_LISTS.remove(list) {
            return Err(FfiError::invalid_handle(PARTIAL_LISTS.kind(), list));
        }
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_partial_list_clear(list: Handle) {
    guard("partial_list_clear", (), || PARTIAL_LISTS.write(list, |ps| ps.clear()))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_partial_list_copy(dst: Handle, src: Handle) {
    guard("partial_list_copy", (), || {
        let copy = PARTIAL_LISTS.snapshot(src)?;
        PARTIAL_LISTS.write(dst, |ps| *ps = copy)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_partial_list_size(list: Handle) -> u64 {
    guard("partial_list_size", 0, || PARTIAL_LISTS.read(list, |ps| ps.len() as u64))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_partial_list_splice(dst: Handle, src: Handle) {
    guard("partial_list_splice", (), || {
        if dst == src {
            return Err(FfiError::invalid_argument("cannot splice a PartialList into itself"));
        }
        let mut moved = PARTIAL_LISTS.write(src, std::mem::take)?;
        PARTIAL_LISTS.write(dst, |ps| rbe_core::splice(ps, &mut moved))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi_error::{FfiErrorCategory, clear_last_error, last_error};
    use rbe_core::{Breakpoint, Partial};

    fn list_of(labels: &[i32]) -> Handle {
        let h = rbe_partial_list_create();
        PARTIAL_LISTS
            .write(h, |ps| {
                for &label in labels {
                    ps.push(Partial::from_breakpoints(label, [(0.0, Breakpoint::new(100.0, 0.1, 0.0, 0.0))]));
                }
            })
            .unwrap();
        h
    }

    #[test]
    fn test_create_size_destroy() {
        let h = rbe_partial_list_create();
        assert_ne!(h, INVALID_HANDLE);
        assert_eq!(rbe_partial_list_size(h), 0);
        rbe_partial_list_destroy(h);

        clear_last_error();
        assert_eq!(rbe_partial_list_size(h), 0);
        let err = last_error().unwrap();
        assert_eq!(err.category, FfiErrorCategory::InvalidHandle);
        assert_eq!(err.context.as_deref(), Some("partial_list_size"));
    }

    #[test]
    fn test_destroy_null_handle_is_silent() {
        clear_last_error();
        rbe_partial_list_destroy(INVALID_HANDLE);
        assert!(last_error().is_none());
    }

    #[test]
    fn test_copy_and_splice() {
        let a = list_of(&[1, 2]);
        let b = list_of(&[3]);

        rbe_partial_list_copy(b, a);
        assert_eq!(rbe_partial_list_size(b), 2);
        rbe_partial_list_copy(a, a);
        assert_eq!(rbe_partial_list_size(a), 2);

        rbe_partial_list_splice(a, b);
        assert_eq!(rbe_partial_list_size(a), 4);
        assert_eq!(rbe_partial_list_size(b), 0);
        let labels = PARTIAL_LISTS.read(a, |ps| ps.iter().map(Partial::label).collect::<Vec<_>>()).unwrap();
        assert_eq!(labels, vec![1, 2, 1, 2]);

        clear_last_error();
        rbe_partial_list_splice(a, a);
        assert_eq!(last_error().unwrap().category, FfiErrorCategory::InvalidArgument);
        assert_eq!(rbe_partial_list_size(a), 4);

        rbe_partial_list_clear(a);
        assert_eq!(rbe_partial_list_size(a), 0);
        rbe_partial_list_destroy(a);
        rbe_partial_list_destroy(b);
    }
}
