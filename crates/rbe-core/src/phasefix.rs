//! Phase correction
//!
//! Rendering a partial accumulates phase from the breakpoint frequencies,
//! so the synthesized phase drifts away from the analyzed one. These
//! routines either recompute stored phases from the frequencies, or nudge
//! the frequencies so the rendered phase lands on (or near) the stored one.
//!
//! All positions are indices into the partial's breakpoint sequence.

use crate::breakpoint::{wrap_pi, Breakpoint};
use crate::partial::Partial;
use std::f64::consts::PI;

/// Default bound on frequency alteration in [`fix_frequency`], in percent.
pub const DEFAULT_MAX_FIX_PCT: f64 = 0.2;

/// Phase accumulated between two breakpoints `dt` seconds apart, assuming
/// a linear frequency sweep between them.
#[inline]
pub fn phase_travel(bp0: &Breakpoint, bp1: &Breakpoint, dt: f64) -> f64 {
    let favg = 0.5 * (bp0.frequency() + bp1.frequency());
    2.0 * PI * favg * dt
}

fn travel_between(p: &Partial, pos0: usize, pos1: usize) -> f64 {
    phase_travel(p.breakpoint(pos0), p.breakpoint(pos1), p.time_at(pos1) - p.time_at(pos0))
}

/// Recompute phases walking backward from `pos` to `stop`, each from its
/// successor. Walking stops early at a null breakpoint, whose remaining
/// predecessors are then fixed forward from `stop`.
pub fn fix_phase_backward(p: &mut Partial, stop: usize, mut pos: usize) {
    if p.is_empty() {
        return;
    }
    pos = pos.min(p.len() - 1);
    while pos > stop && !p.breakpoint(pos).is_null() {
        let fwd = pos;
        pos -= 1;
        let travel = travel_between(p, pos, fwd);
        let phase = wrap_pi(p.breakpoint(fwd).phase() - travel);
        p.breakpoint_mut(pos).set_phase(phase);
    }
    if pos > stop {
        fix_phase_forward(p, stop, pos - 1);
    }
}

/// Recompute phases walking forward from `pos` to `stop` inclusive.
///
/// A non-null breakpoint following another non-null one takes its phase
/// from its predecessor. A null predecessor instead takes its phase
/// backward from the non-null breakpoint, so onsets keep their analyzed
/// phase.
pub fn fix_phase_forward(p: &mut Partial, mut pos: usize, stop: usize) {
    if p.is_empty() {
        return;
    }
    let stop = stop.min(p.len() - 1);
    while pos < stop {
        let prev = pos;
        pos += 1;
        if p.breakpoint(pos).is_null() {
            continue;
        }
        let travel = travel_between(p, prev, pos);
        if p.breakpoint(prev).is_null() {
            let phase = wrap_pi(p.breakpoint(pos).phase() - travel);
            p.breakpoint_mut(prev).set_phase(phase);
        } else {
            let phase = wrap_pi(p.breakpoint(prev).phase() + travel);
            p.breakpoint_mut(pos).set_phase(phase);
        }
    }
}

/// Apply a uniform frequency offset to the breakpoints strictly between
/// `b` and `e` so that the phase accumulated from `b` reaches the stored
/// phase at `e`, then recompute the intermediate phases.
///
/// Nothing happens unless at least one breakpoint lies between `b` and `e`.
pub fn fix_phase_between(p: &mut Partial, b: usize, e: usize) {
    if e >= p.len() || e <= b + 1 {
        if b < p.len() && e < p.len() {
            log::debug!(
                "cannot fix phase between {} and {}, there are no Breakpoints between those times",
                p.time_at(b),
                p.time_at(e)
            );
        }
        return;
    }

    let travel: f64 = (b..e).map(|i| travel_between(p, i, i + 1)).sum();
    let deviation = wrap_pi(p.breakpoint(e).phase() - (p.breakpoint(b).phase() + travel));
    let desired = travel + deviation;

    let (t0, t1) = (p.time_at(b), p.time_at(b + 1));
    let (tn, tnm1) = (p.time_at(e), p.time_at(e - 1));
    let delta = (2.0 * (desired - travel) / (tn + tnm1 - t1 - t0)) / (2.0 * PI);

    for next in b + 1..e {
        let bp = p.breakpoint_mut(next);
        bp.set_frequency(bp.frequency() + delta);
        let newtravel = travel_between(p, next - 1, next);
        let phase = wrap_pi(p.breakpoint(next - 1).phase() + newtravel);
        p.breakpoint_mut(next).set_phase(phase);
    }
}

/// Adjust `bp1`'s frequency so that phase accumulated from `bp0` over `dt`
/// moves toward `bp1`'s stored phase.
///
/// `damping` in 0..=1 sets how much of the phase error is corrected, and
/// the frequency change is bounded by `max_fix_pct` percent. A null `bp1`
/// is untouched. A null `bp0` takes its phase backward from `bp1` instead.
pub fn match_phase_fwd(bp0: &mut Breakpoint, bp1: &mut Breakpoint, dt: f64, damping: f64, max_fix_pct: f64) {
    let mut travel = phase_travel(bp0, bp1, dt);
    if bp1.is_null() {
        return;
    }
    if bp0.is_null() {
        bp0.set_phase(wrap_pi(bp1.phase() - travel));
        return;
    }

    let err = wrap_pi(bp1.phase() - (bp0.phase() + travel));
    travel += damping * err;

    let hi = bp1.frequency() * (1.0 + max_fix_pct * 0.01);
    let lo = bp1.frequency() * (1.0 - max_fix_pct * 0.01);
    let mut ftgt = (travel / (PI * dt)) - bp0.frequency();
    if ftgt > hi {
        ftgt = hi;
    } else if ftgt < lo {
        ftgt = lo;
    }

    bp1.set_frequency(ftgt);
    bp1.set_phase(wrap_pi(bp0.phase() + phase_travel(bp0, bp1, dt)));
}

/// Nudge every non-null breakpoint's frequency toward matching its stored
/// phase, changing no frequency by more than `max_fix_pct` percent.
pub fn fix_frequency(partial: &mut Partial, max_fix_pct: f64) {
    for next in 1..partial.len() {
        if partial.breakpoint(next).is_null() {
            continue;
        }
        let dt = partial.time_at(next) - partial.time_at(next - 1);
        let mut bp0 = *partial.breakpoint(next - 1);
        let mut bp1 = *partial.breakpoint(next);
        match_phase_fwd(&mut bp0, &mut bp1, dt, 0.5, max_fix_pct);
        *partial.breakpoint_mut(next - 1) = bp0;
        *partial.breakpoint_mut(next) = bp1;
    }
}
