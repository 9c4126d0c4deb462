//! LinearEnvelope lifetime and evaluation

use crate::ffi_error::{FfiError, guard};
use crate::registry::{ENVELOPES, Handle, INVALID_HANDLE};
use rbe_core::LinearEnvelope;

#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_create() -> Handle {
    guard("linear_envelope_create", INVALID_HANDLE, || Ok(ENVELOPES.insert(LinearEnvelope::new())))
}

/// Envelope with a single breakpoint at time 0.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_create_constant(value: f64) -> Handle {
    guard("linear_envelope_create_constant", INVALID_HANDLE, || {
        Ok(ENVELOPES.insert(LinearEnvelope::constant(value)))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_copy(env: Handle) -> Handle {
    guard("linear_envelope_copy", INVALID_HANDLE, || {
        let copy = ENVELOPES.snapshot(env)?;
        Ok(ENVELOPES.insert(copy))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_destroy(env: Handle) {
    guard("linear_envelope_destroy", (), || {
        if env != INVALID_HANDLE && !ENVELOPES.remove(env) {
            return Err(FfiError::invalid_handle(ENVELOPES.kind(), env));
        }
        Ok(())
    })
}

/// Insert a breakpoint, replacing any at the same time.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_insert(env: Handle, time: f64, value: f64) {
    guard("linear_envelope_insert", (), || {
        ENVELOPES.write(env, |e| e.insert_breakpoint(time, value))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_value_at(env: Handle, time: f64) -> f64 {
    guard("linear_envelope_value_at", 0.0, || ENVELOPES.read(env, |e| e.value_at(time)))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_linear_envelope_size(env: Handle) -> u64 {
    guard("linear_envelope_size", 0, || ENVELOPES.read(env, |e| e.len() as u64))
}
