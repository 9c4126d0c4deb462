//! File entry points
//!
//! SDIF partial files are read and written here. AIFF audio and Spc files
//! belong to external codecs; their entry points exist for hosts written
//! against the full interface and report an `Unsupported` error.

use crate::ffi_args::c_str;
use crate::ffi_error::{FfiError, guard};
use crate::registry::{Handle, PARTIAL_LISTS};
use rbe_file::SdifFile;
use std::ffi::c_char;

/// Append the partials of the SDIF file at `path` to `list`. Markers in
/// the file are not imported.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_import_sdif(path: *const c_char, list: Handle) {
    guard("import_sdif", (), || {
        let path = unsafe { c_str(path, "path") }?;
        // fail on a bad handle before touching the file
        PARTIAL_LISTS.get(list)?;

        log::info!("importing Partials from {}", path);
        let (mut partials, markers) = SdifFile::read(path)?.into_parts();
        if !markers.is_empty() {
            log::debug!("ignoring {} Markers in {}", markers.len(), path);
        }
        PARTIAL_LISTS.write(list, |ps| ps.append(&mut partials))
    })
}

/// Write `list` to `path` as bandwidth-enhanced RBEP frames.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_export_sdif(path: *const c_char, list: Handle) {
    guard("export_sdif", (), || export(path, list, true))
}

/// Write `list` to `path` as sine-only 1TRC frames.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_export_sdif_1trc(path: *const c_char, list: Handle) {
    guard("export_sdif_1trc", (), || export(path, list, false))
}

fn export(path: *const c_char, list: Handle, enhanced: bool) -> Result<(), FfiError> {
    let path = unsafe { c_str(path, "path") }?;
    let partials = PARTIAL_LISTS.snapshot(list)?;
    if partials.is_empty() {
        return Err(FfiError::invalid_object("No Partials in PartialList to export to sdif file."));
    }

    log::info!("exporting sdif partial data to {}", path);
    let sdif = SdifFile::from_partials(partials);
    if enhanced {
        sdif.write(path)?;
    } else {
        sdif.write_1trc(path)?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTERNAL CODECS
// ═══════════════════════════════════════════════════════════════════════════════

/// Always returns 0 samples.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_import_aiff(
    _path: *const c_char,
    _buffer: *mut f64,
    _buffer_size: u32,
    _sample_rate: *mut f64,
) -> u32 {
    guard("import_aiff", 0, || Err(FfiError::unsupported("AIFF files are read by an external audio codec")))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_export_aiff(
    _path: *const c_char,
    _buffer: *const f64,
    _buffer_size: u32,
    _sample_rate: f64,
    _bits_per_sample: i32,
) {
    guard("export_aiff", (), || Err(FfiError::unsupported("AIFF files are written by an external audio codec")))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_import_spc(_path: *const c_char, _list: Handle) {
    guard("import_spc", (), || Err(FfiError::unsupported("Spc files are read by an external codec")))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_export_spc(
    _path: *const c_char,
    _list: Handle,
    _midi_pitch: f64,
    _enhanced: i32,
    _end_approach_time: f64,
) {
    guard("export_spc", (), || Err(FfiError::unsupported("Spc files are written by an external codec")))
}
