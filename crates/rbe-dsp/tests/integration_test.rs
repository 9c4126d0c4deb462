//! Partial Algorithm Integration Tests
//!
//! Runs the algorithms in the order an analysis pipeline uses them and
//! checks the properties each stage promises:
//! - Channelize + distill leaves at most one partial per label
//! - Distilling twice changes nothing
//! - Sifting only touches labels
//! - Collating uses the fewest partials possible
//! - Resampling lands on the grid
//! - Morphing at either end reproduces that end

use approx::assert_relative_eq;
use rbe_core::{Breakpoint, CancelToken, CoreError, Label, LinearEnvelope, Partial, PartialList};
use rbe_dsp::{channelize, collate, distill, morph, sift, Channelizer, Distiller, Morpher, Resampler};
use std::collections::HashSet;
use std::f64::consts::PI;

/// Deterministic pseudo-random sequence in 0..1
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Steady partial with phases consistent with its frequency.
fn steady(label: Label, freq: f64, amp: f64, t0: f64, t1: f64, hop: f64) -> Partial {
    let n = ((t1 - t0) / hop).round() as usize;
    Partial::from_breakpoints(
        label,
        (0..=n).map(|i| {
            let t = t0 + i as f64 * hop;
            let phase = rbe_core::wrap_pi(2.0 * PI * freq * (t - t0));
            (t, Breakpoint::new(freq, amp, 0.05, phase))
        }),
    )
}

/// Harmonic analysis of a 110 Hz tone, with each harmonic broken into
/// fragments and some slightly detuned duplicates.
fn fragmented_harmonics() -> PartialList {
    let mut rng = Lcg(7);
    let mut list = PartialList::new();
    for h in 1..=6 {
        let f = 110.0 * h as f64;
        list.push(steady(0, f, 0.1 / h as f64, 0.0, 0.3, 0.01));
        list.push(steady(0, f * (1.0 + 0.002 * rng.next()), 0.05 / h as f64, 0.35, 0.6, 0.01));
        list.push(steady(0, f, 0.02, 0.1, 0.2, 0.01));
    }
    list
}

fn sample_values(p: &Partial) -> Vec<(f64, f64)> {
    (0..=20)
        .map(|i| {
            let t = i as f64 * 0.03;
            (p.frequency_at(t).unwrap_or(0.0), p.amplitude_at(t).unwrap_or(0.0))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNELIZE + DISTILL
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_channelize_then_distill_example() {
    let mut list = vec![
        steady(0, 220.0, 0.1, 0.0, 0.2, 0.1),
        steady(0, 220.0, 0.1, 0.0, 0.2, 0.1),
    ];
    channelize(&mut list, &LinearEnvelope::constant(220.0), 1).unwrap();
    assert!(list.iter().all(|p| p.label() == 1));

    distill(&mut list, 0.001, 0.0001).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].label(), 1);
    assert_relative_eq!(list[0].start_time().unwrap(), 0.0);
    assert_relative_eq!(list[0].end_time().unwrap(), 0.2);
}

#[test]
fn test_distilled_labels_are_unique() {
    let mut list = fragmented_harmonics();
    let chan = Channelizer::new(&LinearEnvelope::constant(110.0), 1).unwrap();
    chan.channelize(&mut list).unwrap();

    let split = distill(&mut list, 0.005, 0.001).unwrap();
    let labels: Vec<Label> = list[..split].iter().map(Partial::label).collect();
    let unique: HashSet<Label> = labels.iter().copied().collect();
    assert_eq!(labels.len(), unique.len());
    assert_eq!(unique, (1..=6).collect::<HashSet<Label>>());
    assert!(list[split..].iter().all(|p| p.label() == 0));
}

#[test]
fn test_distill_is_idempotent() {
    let mut list = fragmented_harmonics();
    channelize(&mut list, &LinearEnvelope::constant(110.0), 1).unwrap();
    let distiller = Distiller::new(0.005, 0.001).unwrap();
    distiller.distill(&mut list).unwrap();

    let before: Vec<(Label, Vec<(f64, f64)>)> = list.iter().map(|p| (p.label(), sample_values(p))).collect();
    distiller.distill(&mut list).unwrap();
    let after: Vec<(Label, Vec<(f64, f64)>)> = list.iter().map(|p| (p.label(), sample_values(p))).collect();

    assert_eq!(before.len(), after.len());
    for ((la, va), (lb, vb)) in before.iter().zip(&after) {
        assert_eq!(la, lb);
        for (a, b) in va.iter().zip(vb) {
            assert_relative_eq!(a.0, b.0, epsilon = 1e-9);
            assert_relative_eq!(a.1, b.1, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_cancelled_distill_reports_cancellation() {
    let mut list = fragmented_harmonics();
    channelize(&mut list, &LinearEnvelope::constant(110.0), 1).unwrap();
    let token = CancelToken::new();
    token.cancel();
    let distiller = Distiller::new(0.005, 0.001).unwrap();
    let result = distiller.distill_with_progress(&mut list, &token);
    assert!(matches!(result, Err(CoreError::Cancelled)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIEVE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_sieve_example() {
    let mut list = vec![steady(4, 440.0, 0.1, 0.0, 0.5, 0.05), steady(4, 445.0, 0.1, 0.1, 0.3, 0.05)];
    sift(&mut list, 0.001).unwrap();
    assert_eq!(list[0].label(), 4);
    assert_eq!(list[1].label(), 0);
}

#[test]
fn test_sieve_only_touches_labels() {
    let mut list = fragmented_harmonics();
    channelize(&mut list, &LinearEnvelope::constant(110.0), 1).unwrap();
    let count_before: usize = list.iter().map(Partial::len).sum();
    let labels_before: Vec<Label> = list.iter().map(Partial::label).collect();
    let values_before: Vec<Vec<(f64, Breakpoint)>> =
        list.iter().map(|p| p.iter().map(|(t, bp)| (t, *bp)).collect()).collect();

    sift(&mut list, 0.001).unwrap();

    let count_after: usize = list.iter().map(Partial::len).sum();
    assert_eq!(count_before, count_after);
    for (i, p) in list.iter().enumerate() {
        let values: Vec<(f64, Breakpoint)> = p.iter().map(|(t, bp)| (t, *bp)).collect();
        assert_eq!(values, values_before[i]);
        assert!(p.label() == labels_before[i] || p.label() == 0);
    }

    // the short duplicate fragment of every harmonic overlaps the long one
    assert_eq!(list.iter().filter(|p| p.label() == 0).count(), 6);
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATOR
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_collate_is_minimal_and_never_overlaps() {
    let (fade, gap) = (0.001, 0.0001);
    let clearance = 2.0 * fade + gap;
    let mut rng = Lcg(42);
    let spans: Vec<(f64, f64)> = (0..40)
        .map(|_| {
            let start = (rng.next() * 100.0).round() * 0.01;
            let dur = 0.01 + (rng.next() * 10.0).round() * 0.01;
            (start, start + dur)
        })
        .collect();

    // fewest tracks = deepest stack of spans extended by the clearance
    let minimum = spans
        .iter()
        .map(|&(s, _)| spans.iter().filter(|&&(a, b)| a <= s && s <= b + clearance).count())
        .max()
        .unwrap();

    let mut list: PartialList = spans.iter().map(|&(s, e)| steady(0, 500.0, 0.1, s, e, 0.01)).collect();
    list.insert(0, steady(9, 990.0, 0.1, 0.0, 1.0, 0.1));
    let split = collate(&mut list, fade, gap).unwrap();

    assert_eq!(split, 1);
    assert_eq!(list.len() - split, minimum);
    let labels: Vec<Label> = list[split..].iter().map(Partial::label).collect();
    assert_eq!(labels, (10..10 + minimum as Label).collect::<Vec<_>>());

    // every source breakpoint survives in exactly one collated partial
    let total: usize = spans.iter().map(|&(s, e)| ((e - s) / 0.01).round() as usize + 1).sum();
    let nonnull: usize = list[split..]
        .iter()
        .map(|p| p.iter().filter(|(_, bp)| !bp.is_null()).count())
        .sum();
    assert_eq!(nonnull, total);
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESAMPLER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_dense_resampling_on_grid() {
    let mut list = fragmented_harmonics();
    let interval = 0.004;
    let r = Resampler::new(interval).unwrap();
    r.resample_all(&mut list).unwrap();
    for p in &list {
        for (t, _) in p.iter() {
            let k = t / interval;
            assert_relative_eq!(k, k.round(), epsilon = 1e-9);
        }
    }
}

#[test]
fn test_quantize_preserves_breakpoint_count() {
    let mut list = fragmented_harmonics();
    let counts: Vec<usize> = list.iter().map(Partial::len).collect();
    Resampler::new(0.001).unwrap().quantize_all(&mut list).unwrap();
    let after: Vec<usize> = list.iter().map(Partial::len).collect();
    assert_eq!(counts, after);
}

// ═══════════════════════════════════════════════════════════════════════════════
// MORPHER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_morph_with_self_reproduces_source() {
    let src = vec![steady(1, 220.0, 0.2, 0.05, 0.45, 0.01), steady(2, 440.0, 0.1, 0.05, 0.45, 0.01)];
    for weight in [0.0, 1.0] {
        let f = LinearEnvelope::constant(weight);
        let out = morph(&src, &src, &f, &f, &f).unwrap();
        assert_eq!(out.len(), 2);
        for (orig, morphed) in src.iter().zip(&out) {
            assert_eq!(orig.label(), morphed.label());
            for (t, bp) in orig.iter() {
                let got = morphed.parameters_at(t).unwrap();
                assert_relative_eq!(got.frequency(), bp.frequency(), epsilon = 1e-9);
                assert_relative_eq!(got.amplitude(), bp.amplitude(), epsilon = 1e-9);
                assert_relative_eq!(got.bandwidth(), bp.bandwidth(), epsilon = 1e-9);
                let dphase = rbe_core::wrap_pi(got.phase() - bp.phase());
                assert_relative_eq!(dphase, 0.0, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_morph_envelope_sweeps_frequency() {
    let src = vec![steady(1, 200.0, 0.2, 0.0, 1.0, 0.01)];
    let tgt = vec![steady(1, 400.0, 0.2, 0.0, 1.0, 0.01)];
    let sweep = LinearEnvelope::from_points([(0.0, 0.0), (1.0, 1.0)]);
    let mut m = Morpher::new(&sweep);
    m.morph(&src, &tgt).unwrap();
    let out = &m.partials()[0];
    assert_relative_eq!(out.frequency_at(0.0).unwrap(), 200.0, epsilon = 1e-6);
    assert_relative_eq!(out.frequency_at(0.5).unwrap(), 300.0, epsilon = 1.0);
    assert_relative_eq!(out.frequency_at(1.0).unwrap(), 400.0, epsilon = 1e-6);
}
