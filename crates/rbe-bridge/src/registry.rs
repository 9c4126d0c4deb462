//! Handle registries
//!
//! C hosts never see Rust pointers. Objects live in process-wide registries
//! keyed by `u64` handles, handed out from 1 upward; 0 is never valid.

use crate::ffi_error::{FfiError, FfiResult};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rbe_core::{LinearEnvelope, PartialList};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type Handle = u64;

pub const INVALID_HANDLE: Handle = 0;

/// Process-wide partial lists
pub static PARTIAL_LISTS: Lazy<Registry<PartialList>> = Lazy::new(|| Registry::new("PartialList"));

/// Process-wide linear envelopes
pub static ENVELOPES: Lazy<Registry<LinearEnvelope>> = Lazy::new(|| Registry::new("LinearEnvelope"));

/// Objects of one kind addressed by handle.
pub struct Registry<T> {
    kind: &'static str,
    items: DashMap<Handle, Arc<RwLock<T>>>,
    next_id: AtomicU64,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Take ownership of `value` and return its new handle.
    pub fn insert(&self, value: T) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.items.insert(id, Arc::new(RwLock::new(value)));
        log::debug!("created {} {}", self.kind, id);
        id
    }

    /// Drop the object behind `id`. Returns false if there was none.
    pub fn remove(&self, id: Handle) -> bool {
        let removed = self.items.remove(&id).is_some();
        if removed {
            log::debug!("destroyed {} {}", self.kind, id);
        }
        removed
    }

    pub fn contains(&self, id: Handle) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The shared object behind `id`. The map shard is released before
    /// the caller locks the object.
    pub fn get(&self, id: Handle) -> FfiResult<Arc<RwLock<T>>> {
        self.items
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FfiError::invalid_handle(self.kind, id))
    }

    pub fn read<R>(&self, id: Handle, f: impl FnOnce(&T) -> R) -> FfiResult<R> {
        let obj = self.get(id)?;
        let guard = obj.read();
        Ok(f(&guard))
    }

    pub fn write<R>(&self, id: Handle, f: impl FnOnce(&mut T) -> R) -> FfiResult<R> {
        let obj = self.get(id)?;
        let mut guard = obj.write();
        Ok(f(&mut guard))
    }
}

impl<T: Clone> Registry<T> {
    /// Copy of the object behind `id`, taken under a read lock.
    pub fn snapshot(&self, id: Handle) -> FfiResult<T> {
        self.read(id, T::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_start_at_one() {
        let reg: Registry<i32> = Registry::new("Number");
        assert!(reg.is_empty());
        let a = reg.insert(10);
        let b = reg.insert(20);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains(INVALID_HANDLE));
    }

    #[test]
    fn test_read_write_remove() {
        let reg: Registry<Vec<i32>> = Registry::new("Vec");
        let h = reg.insert(vec![1, 2]);
        reg.write(h, |v| v.push(3)).unwrap();
        assert_eq!(reg.read(h, |v| v.len()).unwrap(), 3);
        assert_eq!(reg.snapshot(h).unwrap(), vec![1, 2, 3]);

        assert!(reg.remove(h));
        assert!(!reg.remove(h));
        let err = reg.read(h, |v| v.len()).unwrap_err();
        assert_eq!(err.message, format!("no Vec with handle {}", h));
    }
}
