//! Utility entry points
//!
//! Cropping, time shifting, envelope-driven scaling, label selection,
//! time span and phase repair over registered partial lists.

use crate::ffi_error::{FfiError, guard};
use crate::processing_ffi::remove_empty;
use crate::registry::{ENVELOPES, Handle, PARTIAL_LISTS};
use rbe_core::partial_utils;
use rbe_core::{Envelope, Label, Partial};

/// Crop to `[t1, t2]`, removing partials left empty.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_crop(list: Handle, t1: f64, t2: f64) {
    guard("crop", (), || {
        PARTIAL_LISTS.write(list, |ps| {
            log::info!("cropping {} Partials", ps.len());
            partial_utils::crop(ps, t1, t2);
            remove_empty(ps);
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_shift_time(list: Handle, offset: f64) {
    guard("shift_time", (), || {
        PARTIAL_LISTS.write(list, |ps| partial_utils::shift_time(ps, offset))
    })
}

fn apply_envelope(list: Handle, env: Handle, f: fn(&mut [Partial], &dyn Envelope)) -> Result<(), FfiError> {
    let env = ENVELOPES.snapshot(env)?;
    PARTIAL_LISTS.write(list, |ps| f(ps, &env))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_scale_amplitude(list: Handle, amp_env: Handle) {
    guard("scale_amplitude", (), || apply_envelope(list, amp_env, partial_utils::scale_amplitude))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_scale_bandwidth(list: Handle, bw_env: Handle) {
    guard("scale_bandwidth", (), || apply_envelope(list, bw_env, partial_utils::scale_bandwidth))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_set_bandwidth(list: Handle, bw_env: Handle) {
    guard("set_bandwidth", (), || apply_envelope(list, bw_env, partial_utils::set_bandwidth))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_scale_frequency(list: Handle, freq_env: Handle) {
    guard("scale_frequency", (), || apply_envelope(list, freq_env, partial_utils::scale_frequency))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_scale_noise_ratio(list: Handle, noise_env: Handle) {
    guard("scale_noise_ratio", (), || apply_envelope(list, noise_env, partial_utils::scale_noise_ratio))
}

/// Shift pitch by the envelope's value in cents.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_shift_pitch(list: Handle, pitch_env: Handle) {
    guard("shift_pitch", (), || apply_envelope(list, pitch_env, partial_utils::shift_pitch))
}

// ═══════════════════════════════════════════════════════════════════════════════
// LABEL SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Append copies of the partials labeled `label` in `src` to `dst`.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_copy_labeled(src: Handle, label: Label, dst: Handle) {
    guard("copy_labeled", (), || {
        let mut copies = Vec::new();
        PARTIAL_LISTS.read(src, |ps| rbe_core::copy_labeled(ps, label, &mut copies))?;
        PARTIAL_LISTS.write(dst, |ps| ps.append(&mut copies))
    })
}

/// Move the partials labeled `label` from `src` to the end of `dst`.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_extract_labeled(src: Handle, label: Label, dst: Handle) {
    guard("extract_labeled", (), || {
        if src == dst {
            return Err(FfiError::invalid_argument("source and destination are the same PartialList"));
        }
        PARTIAL_LISTS.get(dst)?;
        let mut moved = Vec::new();
        PARTIAL_LISTS.write(src, |ps| rbe_core::extract_labeled(ps, label, &mut moved))?;
        PARTIAL_LISTS.write(dst, |ps| ps.append(&mut moved))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_remove_labeled(list: Handle, label: Label) {
    guard("remove_labeled", (), || {
        PARTIAL_LISTS.write(list, |ps| rbe_core::remove_labeled(ps, label))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_sort_by_label(list: Handle) {
    guard("sort_by_label", (), || PARTIAL_LISTS.write(list, |ps| rbe_core::sort_by_label(ps)))
}

/// Earliest start and latest end over the non-empty partials, both 0
/// when there are none. Either output pointer may be null.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_time_span(list: Handle, tmin: *mut f64, tmax: *mut f64) {
    guard("time_span", (), || {
        let (start, end) = PARTIAL_LISTS.read(list, |ps| partial_utils::time_span(ps))?;
        unsafe {
            if !tmin.is_null() {
                *tmin = start;
            }
            if !tmax.is_null() {
                *tmax = end;
            }
        }
        Ok(())
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PHASE REPAIR
// ═══════════════════════════════════════════════════════════════════════════════

fn fix_each(list: Handle, f: impl Fn(&mut Partial)) -> Result<(), FfiError> {
    PARTIAL_LISTS.write(list, |ps| ps.iter_mut().for_each(f))
}

/// Recompute phases before `time` from the breakpoint nearest it.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_fix_phase_before(list: Handle, time: f64) {
    guard("fix_phase_before", (), || fix_each(list, |p| partial_utils::fix_phase_before(p, time)))
}

/// Recompute phases after `time` from the breakpoint nearest it.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_fix_phase_after(list: Handle, time: f64) {
    guard("fix_phase_after", (), || fix_each(list, |p| partial_utils::fix_phase_after(p, time)))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_fix_phase_at(list: Handle, time: f64) {
    guard("fix_phase_at", (), || fix_each(list, |p| partial_utils::fix_phase_at(p, time)))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_fix_phase_forward(list: Handle, tbeg: f64, tend: f64) {
    guard("fix_phase_forward", (), || {
        fix_each(list, |p| partial_utils::fix_phase_forward(p, tbeg, tend))
    })
}

/// Adjust frequencies so that phases at both `tbeg` and `tend` are kept.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_fix_phase_between(list: Handle, tbeg: f64, tend: f64) {
    guard("fix_phase_between", (), || {
        fix_each(list, |p| partial_utils::fix_phase_between(p, tbeg, tend))
    })
}
