//! Algorithm entry points
//!
//! One-shot wrappers over `rbe-dsp` and `rbe-pitch` acting on registered
//! partial lists and envelopes. Long operations poll the process-wide
//! cancellation token between partials (see `rbe_cancel`). The
//! `*_with_config` forms take a JSON parameter set, where null or missing
//! fields select the defaults.

use crate::begin_operation;
use crate::ffi_args::{config, f64_slice};
use crate::ffi_error::{FfiError, FfiResult, guard};
use crate::registry::{ENVELOPES, Handle, INVALID_HANDLE, PARTIAL_LISTS};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rbe_core::{Label, LinearEnvelope, Partial, PartialList};
use rbe_dsp::{
    Channelizer, ChannelizerConfig, Collator, CollatorConfig, Dilator, Distiller, DistillerConfig, Harmonifier,
    Morpher, MorpherConfig, Resampler, ResamplerConfig, Sieve, SieveConfig,
};
use rbe_pitch::{FrequencyReference, create_f0_estimate};
use std::ffi::c_char;

/// Fade time used by the one-shot distill and sift entry points.
const BOUNDARY_FADE_TIME: f64 = 0.001;

/// Amplitude shape applied by every morph entry point.
static AMPLITUDE_SHAPE: Lazy<RwLock<f64>> = Lazy::new(|| RwLock::new(MorpherConfig::default().amp_shape));

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNELIZE / DISTILL / SIFT / COLLATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Label partials by harmonic channel of `ref_env`, whose frequency is
/// channel `ref_label`.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_channelize(list: Handle, ref_env: Handle, ref_label: Label) {
    guard("channelize", (), || {
        channelize_list(list, ref_env, ref_label, ChannelizerConfig::default())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_channelize_with_config(list: Handle, ref_env: Handle, ref_label: Label, json: *const c_char) {
    guard("channelize", (), || {
        let cfg = unsafe { config::<ChannelizerConfig>(json) }?;
        channelize_list(list, ref_env, ref_label, cfg)
    })
}

fn channelize_list(list: Handle, ref_env: Handle, ref_label: Label, cfg: ChannelizerConfig) -> FfiResult<()> {
    let env = ENVELOPES.snapshot(ref_env)?;
    let channelizer = Channelizer::with_config(&env, ref_label, cfg)?;
    PARTIAL_LISTS.write(list, |ps| channelizer.channelize_with_progress(ps, &begin_operation()))??;
    Ok(())
}

/// Merge same-labeled partials, fading over 1 ms.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_distill(list: Handle) {
    guard("distill", (), || {
        distill_list(list, DistillerConfig::default().with_fade_time(BOUNDARY_FADE_TIME))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_distill_with_config(list: Handle, json: *const c_char) {
    guard("distill", (), || {
        let cfg = unsafe { config::<DistillerConfig>(json) }?;
        distill_list(list, cfg)
    })
}

fn distill_list(list: Handle, cfg: DistillerConfig) -> FfiResult<()> {
    let distiller = Distiller::with_config(cfg)?;
    PARTIAL_LISTS.write(list, |ps| distiller.distill_with_progress(ps, &begin_operation()))??;
    Ok(())
}

/// Unlabel the shorter of overlapping same-labeled partials.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_sift(list: Handle) {
    guard("sift", (), || sift_list(list, SieveConfig::default().with_fade_time(BOUNDARY_FADE_TIME)))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_sift_with_config(list: Handle, json: *const c_char) {
    guard("sift", (), || {
        let cfg = unsafe { config::<SieveConfig>(json) }?;
        sift_list(list, cfg)
    })
}

fn sift_list(list: Handle, cfg: SieveConfig) -> FfiResult<()> {
    let sieve = Sieve::with_config(cfg)?;
    PARTIAL_LISTS.write(list, |ps| sieve.sift_with_progress(ps, &begin_operation()))??;
    Ok(())
}

/// Pack unlabeled partials into as few non-overlapping ones as possible.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_collate(list: Handle) {
    guard("collate", (), || collate_list(list, CollatorConfig::default()))
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_collate_with_config(list: Handle, json: *const c_char) {
    guard("collate", (), || {
        let cfg = unsafe { config::<CollatorConfig>(json) }?;
        collate_list(list, cfg)
    })
}

fn collate_list(list: Handle, cfg: CollatorConfig) -> FfiResult<()> {
    let collator = Collator::with_config(cfg)?;
    PARTIAL_LISTS.write(list, |ps| collator.collate_with_progress(ps, &begin_operation()))??;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// DILATE / RESAMPLE / HARMONIFY
// ═══════════════════════════════════════════════════════════════════════════════

/// Warp time so that `initial[i]` lands on `target[i]`.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_dilate(list: Handle, initial: *const f64, target: *const f64, npts: i32) {
    guard("dilate", (), || {
        let initial = unsafe { f64_slice(initial, npts, "initial times") }?;
        let target = unsafe { f64_slice(target, npts, "target times") }?;
        let dilator = Dilator::from_times(initial, target)?;
        PARTIAL_LISTS.write(list, |ps| dilator.dilate_with_progress(ps, &begin_operation()))??;
        Ok(())
    })
}

/// Quantize breakpoint times to a grid of `interval` seconds, with phase
/// correction. Partials left empty are removed. Dense resampling is
/// available through [`rbe_resample_with_config`].
#[unsafe(no_mangle)]
pub extern "C" fn rbe_resample(list: Handle, interval: f64) {
    guard("resample", (), || {
        resample_list(list, ResamplerConfig::default().with_interval(interval).with_dense(false))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_resample_with_config(list: Handle, json: *const c_char) {
    guard("resample", (), || {
        let cfg = unsafe { config::<ResamplerConfig>(json) }?;
        resample_list(list, cfg)
    })
}

fn resample_list(list: Handle, cfg: ResamplerConfig) -> FfiResult<()> {
    let resampler = Resampler::with_config(cfg)?;
    PARTIAL_LISTS.write(list, |ps| {
        resampler.resample_with_progress(ps, cfg.dense, &begin_operation())?;
        remove_empty(ps);
        Ok::<_, FfiError>(())
    })?
}

/// Pull breakpoints quieter than `threshold_db` toward harmonics of the
/// first partial labeled `ref_label`, weighted by `weight_env`.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_harmonify(list: Handle, ref_label: Label, weight_env: Handle, threshold_db: f64) {
    guard("harmonify", (), || {
        let weight = ENVELOPES.snapshot(weight_env)?;
        PARTIAL_LISTS.write(list, |ps| {
            if ps.is_empty() {
                return Err(FfiError::invalid_object("No Partials in PartialList to harmonify."));
            }
            let harmonifier = Harmonifier::from_label_with_weight(ps, ref_label, &weight, threshold_db)?;
            harmonifier.harmonify_with_progress(ps, &begin_operation())?;
            Ok(())
        })?
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// MORPH
// ═══════════════════════════════════════════════════════════════════════════════

/// Morph two distilled lists and append the result to `dst`.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_morph(src: Handle, tgt: Handle, freq_env: Handle, amp_env: Handle, bw_env: Handle, dst: Handle) {
    guard("morph", (), || {
        let cfg = MorpherConfig::default().with_amp_shape(*AMPLITUDE_SHAPE.read());
        morph_lists(src, tgt, None, [freq_env, amp_env, bw_env], cfg, dst)
    })
}

/// As `rbe_morph`, steering unmatched labels with harmonic reference
/// partials. A reference label of 0 selects no reference.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_morph_with_reference(
    src: Handle,
    tgt: Handle,
    src_ref_label: Label,
    tgt_ref_label: Label,
    freq_env: Handle,
    amp_env: Handle,
    bw_env: Handle,
    dst: Handle,
) {
    guard("morph_with_reference", (), || {
        let cfg = MorpherConfig::default().with_amp_shape(*AMPLITUDE_SHAPE.read());
        morph_lists(
            src,
            tgt,
            Some((src_ref_label, tgt_ref_label)),
            [freq_env, amp_env, bw_env],
            cfg,
            dst,
        )
    })
}

/// As `rbe_morph` with an explicit morpher parameter set. The global
/// amplitude shape does not apply.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_morph_with_config(
    src: Handle,
    tgt: Handle,
    freq_env: Handle,
    amp_env: Handle,
    bw_env: Handle,
    json: *const c_char,
    dst: Handle,
) {
    guard("morph", (), || {
        let cfg = unsafe { config::<MorpherConfig>(json) }?;
        morph_lists(src, tgt, None, [freq_env, amp_env, bw_env], cfg, dst)
    })
}

fn morph_lists(
    src: Handle,
    tgt: Handle,
    references: Option<(Label, Label)>,
    functions: [Handle; 3],
    cfg: MorpherConfig,
    dst: Handle,
) -> FfiResult<()> {
    let src_partials = PARTIAL_LISTS.snapshot(src)?;
    let tgt_partials = PARTIAL_LISTS.snapshot(tgt)?;
    let [freq, amp, bw] = functions.map(|h| ENVELOPES.snapshot(h));
    let (freq, amp, bw) = (freq?, amp?, bw?);
    // fail on a bad destination before doing the work
    PARTIAL_LISTS.get(dst)?;

    let mut morpher = Morpher::with_config(&freq, &amp, &bw, cfg)?;
    if let Some((src_ref, tgt_ref)) = references {
        log_reference("first", src_ref);
        log_reference("second", tgt_ref);
        morpher.set_source_reference_label(&src_partials, src_ref)?;
        morpher.set_target_reference_label(&tgt_partials, tgt_ref)?;
    }
    morpher.morph_with_progress(&src_partials, &tgt_partials, &begin_operation())?;

    let mut morphed = morpher.take_partials();
    PARTIAL_LISTS.write(dst, |ps| ps.append(&mut morphed))
}

fn log_reference(which: &str, label: Label) {
    if label != 0 {
        log::info!("using Partial labeled {} as reference Partial for {} morph source", label, which);
    } else {
        log::info!("using no reference Partial for {} morph source", which);
    }
}

/// Set the amplitude shape used by later morphs. Must be positive; small
/// values bend the amplitude blend toward logarithmic, large ones toward
/// linear.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_morpher_set_amplitude_shape(shape: f64) {
    guard("morpher_set_amplitude_shape", (), || {
        if !(shape > 0.0) {
            return Err(FfiError::invalid_argument(
                "the amplitude morph shaping parameter must be positive",
            ));
        }
        *AMPLITUDE_SHAPE.write() = shape;
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rbe_morpher_amplitude_shape() -> f64 {
    *AMPLITUDE_SHAPE.read()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FUNDAMENTAL ESTIMATION
// ═══════════════════════════════════════════════════════════════════════════════

/// New envelope of about `num_samps` fundamental estimates in
/// `[min_freq, max_freq]`; every 5 ms when `num_samps` is 0.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_create_freq_reference(list: Handle, min_freq: f64, max_freq: f64, num_samps: i64) -> Handle {
    guard("create_freq_reference", INVALID_HANDLE, || {
        if num_samps < 0 {
            return Err(FfiError::invalid_argument("number of samples must be non-negative"));
        }
        let env = PARTIAL_LISTS.read(list, |ps| {
            FrequencyReference::new(ps, min_freq, max_freq, num_samps as usize).map(FrequencyReference::into_envelope)
        })??;
        Ok(register_envelope(env))
    })
}

/// New envelope of confident fundamental estimates every `interval`
/// seconds over the span of the list.
#[unsafe(no_mangle)]
pub extern "C" fn rbe_create_f0_estimate(list: Handle, min_freq: f64, max_freq: f64, interval: f64) -> Handle {
    guard("create_f0_estimate", INVALID_HANDLE, || {
        let env = PARTIAL_LISTS.read(list, |ps| create_f0_estimate(ps, min_freq, max_freq, interval))??;
        Ok(register_envelope(env))
    })
}

fn register_envelope(env: LinearEnvelope) -> Handle {
    log::debug!("estimated {} fundamental frequency points", env.len());
    ENVELOPES.insert(env)
}

pub(crate) fn remove_empty(partials: &mut PartialList) {
    partials.retain(|p: &Partial| !p.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope_ffi::{rbe_linear_envelope_create_constant, rbe_linear_envelope_destroy};
    use crate::ffi_error::{FfiErrorCategory, clear_last_error, last_error};
    use crate::partial_list_ffi::{rbe_partial_list_create, rbe_partial_list_destroy, rbe_partial_list_size};
    use approx::assert_relative_eq;
    use rbe_core::Breakpoint;
    use std::ffi::CString;

    fn steady(label: Label, freq: f64, t0: f64, t1: f64) -> Partial {
        Partial::from_breakpoints(
            label,
            (0..=10).map(|i| {
                let t = t0 + (t1 - t0) * i as f64 / 10.0;
                (t, Breakpoint::new(freq, 0.2, 0.0, 0.0))
            }),
        )
    }

    fn register(partials: Vec<Partial>) -> Handle {
        let h = rbe_partial_list_create();
        PARTIAL_LISTS.write(h, |ps| ps.extend(partials)).unwrap();
        h
    }

    fn labels(h: Handle) -> Vec<Label> {
        PARTIAL_LISTS.read(h, |ps| ps.iter().map(Partial::label).collect()).unwrap()
    }

    #[test]
    fn test_channelize_then_distill() {
        let list = register(vec![
            steady(0, 100.0, 0.0, 0.2),
            steady(0, 201.0, 0.0, 0.1),
            steady(0, 199.0, 0.15, 0.3),
            steady(0, 302.0, 0.0, 0.3),
        ]);
        let reference = rbe_linear_envelope_create_constant(100.0);

        rbe_channelize(list, reference, 1);
        assert_eq!(labels(list), vec![1, 2, 2, 3]);

        rbe_distill(list);
        assert_eq!(rbe_partial_list_size(list), 3);
        assert_eq!(labels(list), vec![1, 2, 3]);

        rbe_linear_envelope_destroy(reference);
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_channelize_with_stretch_config() {
        let list = register(vec![steady(0, 100.0, 0.0, 0.2), steady(0, 300.0, 0.0, 0.2)]);
        let reference = rbe_linear_envelope_create_constant(100.0);
        let json = CString::new(r#"{"amp_weighting": 1.0}"#).unwrap();

        clear_last_error();
        rbe_channelize_with_config(list, reference, 1, json.as_ptr());
        assert!(last_error().is_none());
        assert_eq!(labels(list), vec![1, 3]);

        rbe_linear_envelope_destroy(reference);
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_collate_packs_unlabeled() {
        let list = register(vec![steady(0, 100.0, 0.0, 0.1), steady(0, 500.0, 0.2, 0.3), steady(4, 400.0, 0.0, 0.3)]);
        rbe_collate(list);
        assert_eq!(rbe_partial_list_size(list), 2);
        assert_eq!(labels(list), vec![4, 5]);
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_sift_unlabels_shorter_overlap() {
        let list = register(vec![steady(2, 200.0, 0.0, 0.3), steady(2, 201.0, 0.05, 0.15)]);
        rbe_sift(list);
        assert_eq!(labels(list), vec![2, 0]);
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_dilate_through_pointers() {
        let list = register(vec![steady(1, 100.0, 0.0, 1.0)]);
        let initial = [0.5];
        let target = [1.0];
        rbe_dilate(list, initial.as_ptr(), target.as_ptr(), 1);
        let end = PARTIAL_LISTS.read(list, |ps| ps[0].end_time().unwrap()).unwrap();
        assert_relative_eq!(end, 1.5, epsilon = 1e-12);

        clear_last_error();
        rbe_dilate(list, std::ptr::null(), target.as_ptr(), 1);
        assert_eq!(last_error().unwrap().category, FfiErrorCategory::InvalidArgument);
        rbe_partial_list_destroy(list);
    }

    fn two_point(t0: f64, t1: f64) -> Partial {
        Partial::from_breakpoints(
            1,
            [(t0, Breakpoint::new(100.0, 0.2, 0.0, 0.0)), (t1, Breakpoint::new(100.0, 0.2, 0.0, 0.0))],
        )
    }

    #[test]
    fn test_resample_rejects_bad_interval() {
        let list = register(vec![two_point(0.0, 0.1)]);
        clear_last_error();
        rbe_resample(list, 0.0);
        let err = last_error().unwrap();
        assert_eq!(err.category, FfiErrorCategory::InvalidArgument);
        assert_eq!(err.context.as_deref(), Some("resample"));
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_resample_quantizes_by_default() {
        let list = register(vec![two_point(0.001, 0.098)]);
        clear_last_error();
        rbe_resample(list, 0.01);
        assert!(last_error().is_none());
        let times = PARTIAL_LISTS
            .read(list, |ps| ps[0].iter().map(|(t, _)| t).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(times.len(), 2);
        assert_relative_eq!(times[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(times[1], 0.1, epsilon = 1e-12);

        let dense = CString::new(r#"{"interval": 0.01, "dense": true}"#).unwrap();
        rbe_resample_with_config(list, dense.as_ptr());
        let n = PARTIAL_LISTS.read(list, |ps| ps[0].len()).unwrap();
        assert_eq!(n, 11);
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_harmonify_needs_partials() {
        let list = rbe_partial_list_create();
        let weight = rbe_linear_envelope_create_constant(1.0);
        clear_last_error();
        rbe_harmonify(list, 1, weight, -90.0);
        let err = last_error().unwrap();
        assert_eq!(err.category, FfiErrorCategory::InvalidObject);
        assert_eq!(
            err.report_line(),
            "Invalid object in harmonify(): No Partials in PartialList to harmonify."
        );
        rbe_linear_envelope_destroy(weight);
        rbe_partial_list_destroy(list);
    }

    #[test]
    fn test_amplitude_shape_must_be_positive() {
        clear_last_error();
        rbe_morpher_set_amplitude_shape(-1.0);
        assert_eq!(last_error().unwrap().category, FfiErrorCategory::InvalidArgument);
        rbe_morpher_set_amplitude_shape(f64::NAN);
        assert!(rbe_morpher_amplitude_shape() > 0.0);
    }

    #[test]
    fn test_morph_appends_to_destination() {
        let src = register(vec![steady(1, 100.0, 0.0, 0.2), steady(2, 200.0, 0.0, 0.2)]);
        let tgt = register(vec![steady(1, 110.0, 0.0, 0.2)]);
        let dst = register(vec![steady(7, 700.0, 0.0, 0.1)]);
        let half = rbe_linear_envelope_create_constant(0.5);

        rbe_morph(src, tgt, half, half, half, dst);
        let mut got = labels(dst);
        assert_eq!(got.remove(0), 7);
        got.sort();
        assert_eq!(got, vec![1, 2]);

        let f = PARTIAL_LISTS
            .read(dst, |ps| {
                let p = ps.iter().find(|p| p.label() == 1).unwrap();
                p.frequency_at(0.1).unwrap()
            })
            .unwrap();
        assert_relative_eq!(f, 105.0, epsilon = 1e-9);

        for h in [src, tgt, dst] {
            rbe_partial_list_destroy(h);
        }
        rbe_linear_envelope_destroy(half);
    }

    #[test]
    fn test_morph_with_missing_reference_label() {
        let src = register(vec![steady(1, 100.0, 0.0, 0.2)]);
        let tgt = register(vec![steady(1, 110.0, 0.0, 0.2)]);
        let dst = rbe_partial_list_create();
        let half = rbe_linear_envelope_create_constant(0.5);

        clear_last_error();
        rbe_morph_with_reference(src, tgt, 3, 0, half, half, half, dst);
        assert_eq!(last_error().unwrap().category, FfiErrorCategory::InvalidArgument);
        assert_eq!(rbe_partial_list_size(dst), 0);

        clear_last_error();
        rbe_morph_with_reference(src, tgt, 1, 1, half, half, half, dst);
        assert!(last_error().is_none());
        assert_eq!(rbe_partial_list_size(dst), 1);

        for h in [src, tgt, dst] {
            rbe_partial_list_destroy(h);
        }
        rbe_linear_envelope_destroy(half);
    }

    #[test]
    fn test_f0_estimate_handle() {
        let list = register((1..=6).map(|k| steady(0, 150.0 * k as f64, 0.0, 0.5)).collect());
        let env = rbe_create_f0_estimate(list, 100.0, 200.0, 0.0625);
        assert_ne!(env, INVALID_HANDLE);
        let points = ENVELOPES.read(env, |e| e.iter().collect::<Vec<_>>()).unwrap();
        assert_eq!(points.len(), 8);
        for (_, f) in points {
            assert_relative_eq!(f, 150.0, epsilon = 0.1);
        }

        clear_last_error();
        assert_eq!(rbe_create_freq_reference(list, 100.0, 200.0, 1), INVALID_HANDLE);
        assert_eq!(last_error().unwrap().category, FfiErrorCategory::InvalidArgument);

        let reference = rbe_create_freq_reference(list, 100.0, 200.0, 11);
        assert_eq!(ENVELOPES.read(reference, |e| e.len()).unwrap(), 11);

        rbe_linear_envelope_destroy(env);
        rbe_linear_envelope_destroy(reference);
        rbe_partial_list_destroy(list);
    }
}
