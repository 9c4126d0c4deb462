//! Partial Algorithm Benchmarks
//!
//! Measures the batch algorithms over synthetic harmonic analyses of
//! increasing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rbe_core::{Breakpoint, LinearEnvelope, Partial, PartialList};
use rbe_dsp::{Channelizer, Collator, Distiller, Morpher, Resampler, Sieve};

const FUNDAMENTAL: f64 = 110.0;
const HARMONIC_COUNTS: &[usize] = &[8, 32, 128];

/// Harmonic analysis with two fragments per harmonic, 5 ms hop.
fn generate_partials(harmonics: usize) -> PartialList {
    let mut list = PartialList::new();
    for h in 1..=harmonics {
        let f = FUNDAMENTAL * h as f64;
        for (t0, t1) in [(0.0, 0.6), (0.5, 1.0)] {
            let n = ((t1 - t0) / 0.005) as usize;
            list.push(Partial::from_breakpoints(
                0,
                (0..=n).map(|i| {
                    let t = t0 + i as f64 * 0.005;
                    (t, Breakpoint::new(f, 0.1 / h as f64, 0.1, 0.0))
                }),
            ));
        }
    }
    list
}

fn labeled_partials(harmonics: usize) -> PartialList {
    let mut list = generate_partials(harmonics);
    let chan = Channelizer::new(&LinearEnvelope::constant(FUNDAMENTAL), 1).expect("valid reference");
    chan.channelize(&mut list).unwrap();
    list
}

// ═══════════════════════════════════════════════════════════════════════════════
// LABELING BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_labeling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Labeling");

    for &count in HARMONIC_COUNTS {
        group.bench_with_input(BenchmarkId::new("Channelize", count), &count, |b, &n| {
            let chan = Channelizer::new(&LinearEnvelope::constant(FUNDAMENTAL), 1).expect("valid reference");
            let source = generate_partials(n);
            b.iter(|| {
                let mut list = source.clone();
                chan.channelize(black_box(&mut list)).unwrap();
                black_box(list)
            });
        });

        group.bench_with_input(BenchmarkId::new("Sift", count), &count, |b, &n| {
            let sieve = Sieve::new(0.001).expect("valid fade");
            let source = labeled_partials(n);
            b.iter(|| {
                let mut list = source.clone();
                black_box(sieve.sift(black_box(&mut list)))
            });
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_merging(c: &mut Criterion) {
    let mut group = c.benchmark_group("Merging");

    for &count in HARMONIC_COUNTS {
        group.bench_with_input(BenchmarkId::new("Distill", count), &count, |b, &n| {
            let distiller = Distiller::new(0.005, 0.001).expect("valid times");
            let source = labeled_partials(n);
            b.iter(|| {
                let mut list = source.clone();
                black_box(distiller.distill(black_box(&mut list)).ok())
            });
        });

        group.bench_with_input(BenchmarkId::new("Collate", count), &count, |b, &n| {
            let collator = Collator::new(0.001, 0.0001).expect("valid times");
            let source = generate_partials(n);
            b.iter(|| {
                let mut list = source.clone();
                black_box(collator.collate(black_box(&mut list)))
            });
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESAMPLE + MORPH BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_resample_morph(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resample and Morph");

    for &count in HARMONIC_COUNTS {
        group.bench_with_input(BenchmarkId::new("Resample 1ms", count), &count, |b, &n| {
            let r = Resampler::new(0.001).expect("valid interval");
            let source = generate_partials(n);
            b.iter(|| {
                let mut list = source.clone();
                r.resample_all(black_box(&mut list)).unwrap();
                black_box(list)
            });
        });

        group.bench_with_input(BenchmarkId::new("Morph", count), &count, |b, &n| {
            let distiller = Distiller::new(0.005, 0.001).expect("valid times");
            let mut src = labeled_partials(n);
            distiller.distill(&mut src).expect("distillable");
            let mut tgt = src.clone();
            for p in tgt.iter_mut() {
                for (_, bp) in p.iter_mut() {
                    bp.set_frequency(bp.frequency() * 1.5);
                }
            }
            let sweep = LinearEnvelope::from_points([(0.0, 0.0), (1.0, 1.0)]);
            b.iter(|| {
                let mut m = Morpher::new(&sweep);
                m.morph(black_box(&src), black_box(&tgt)).ok();
                black_box(m.take_partials())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_labeling, bench_merging, bench_resample_morph);

criterion_main!(benches);
