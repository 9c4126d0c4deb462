//! Distillation: one partial per label
//!
//! All partials sharing a non-zero label are merged into a single partial
//! covering the union of their spans. Where the longest partial is silent
//! the shorter ones contribute their breakpoints; elsewhere their energy
//! is absorbed as noise. Gaps are bridged with null breakpoints a fade
//! time away from their neighbours.

use crate::config::DistillerConfig;
use rbe_core::{
    checkpoint, CoreError, CoreResult, Label, NoProgress, Partial, PartialList, Progress,
};
use std::ops::Range;

#[derive(Debug, Clone, Copy)]
pub struct Distiller {
    fade_time: f64,
    gap_time: f64,
}

impl Distiller {
    pub fn new(fade_time: f64, gap_time: f64) -> CoreResult<Self> {
        if fade_time <= 0.0 {
            return Err(CoreError::invalid_argument("Distiller fade time must be positive."));
        }
        if gap_time <= 0.0 {
            return Err(CoreError::invalid_argument("Distiller gap time must be positive."));
        }
        Ok(Self { fade_time, gap_time })
    }

    pub fn with_config(config: DistillerConfig) -> CoreResult<Self> {
        Self::new(config.fade_time, config.gap_time)
    }

    pub fn fade_time(&self) -> f64 {
        self.fade_time
    }

    pub fn gap_time(&self) -> f64 {
        self.gap_time
    }

    /// Distill every non-zero label. Distilled partials come first in
    /// label order, unlabeled partials follow in their original order.
    /// Returns the position of the first unlabeled partial.
    pub fn distill(&self, partials: &mut PartialList) -> CoreResult<usize> {
        self.distill_with_progress(partials, &NoProgress)
    }

    /// As [`Distiller::distill`], polling `progress` between labels. On
    /// cancellation the list is left in label order, partly distilled.
    pub fn distill_with_progress(&self, partials: &mut PartialList, progress: &dyn Progress) -> CoreResult<usize> {
        log::info!("distilling {} Partials", partials.len());
        partials.sort_by_key(Partial::label);

        let mut pending = std::mem::take(partials).into_iter().peekable();
        let mut distilled = PartialList::new();
        let mut unlabeled = PartialList::new();
        let total = pending.len();
        let mut done = 0;

        while let Some(first) = pending.next() {
            let label = first.label();
            let mut same = vec![first];
            while let Some(p) = pending.next_if(|p| p.label() == label) {
                same.push(p);
            }
            done += same.len();

            if label == 0 {
                unlabeled.extend(same);
                continue;
            }
            if let Err(err) = checkpoint(progress, done, total) {
                distilled.extend(same);
                distilled.extend(unlabeled);
                distilled.extend(pending);
                *partials = distilled;
                return Err(err);
            }
            distilled.push(self.distill_one(same, label)?);
        }

        let split = distilled.len();
        distilled.extend(unlabeled);
        *partials = distilled;
        Ok(split)
    }

    /// Merge partials that all carry `label` into one.
    pub fn distill_one(&self, partials: PartialList, label: Label) -> CoreResult<Partial> {
        log::debug!("Distiller found {} Partials labeled {}", partials.len(), label);

        let mut partials: PartialList = partials.into_iter().filter(|p| !p.is_empty()).collect();
        let mut newp = Partial::with_label(label);

        if partials.len() == 1 {
            newp = partials.remove(0);
        } else if !partials.is_empty() {
            partials.sort_by(|a, b| {
                b.duration()
                    .total_cmp(&a.duration())
                    .then_with(|| a.start_time().unwrap_or(0.0).total_cmp(&b.start_time().unwrap_or(0.0)))
            });

            let mut it = partials.into_iter();
            if let Some(longest) = it.next() {
                newp = longest;
            }
            fade_in_and_out(&mut newp, self.fade_time)?;

            for mut p in it {
                fade_in_and_out(&mut p, self.fade_time)?;
                let range = find_contribution(&p, &newp, self.gap_time)?;
                if range.is_empty() {
                    newp.absorb(&p)?;
                    continue;
                }
                if range.end != p.len() {
                    let absorb_me = p.slice(range.end - 1..p.len());
                    newp.absorb(&absorb_me)?;
                }
                merge(&p.slice(range), &mut newp, self.fade_time, self.gap_time)?;
            }
        }

        newp.set_label(label);
        while newp.first().is_ok_and(|bp| bp.is_null()) {
            newp.erase_at(0);
        }
        while newp.last().is_ok_and(|bp| bp.is_null()) {
            let last = newp.len() - 1;
            newp.erase_at(last);
        }
        Ok(newp)
    }
}

/// One-shot distillation with the given fade and gap times.
pub fn distill(partials: &mut PartialList, fade_time: f64, gap_time: f64) -> CoreResult<usize> {
    Distiller::new(fade_time, gap_time)?.distill(partials)
}

/// Bracket a partial with null breakpoints unless it already starts or
/// ends silent.
pub(crate) fn fade_in_and_out(p: &mut Partial, fade_time: f64) -> CoreResult<()> {
    let first = *p.first()?;
    if !first.is_null() {
        let t = p.start_time()? - fade_time;
        p.insert(t, first.null_before(fade_time));
    }
    let last = *p.last()?;
    if !last.is_null() {
        let t = p.end_time()? + fade_time;
        p.insert(t, last.null_after(fade_time));
    }
    Ok(())
}

/// Positions of `short` that fill the first silence of `long`.
///
/// The range starts at the beginning of `short` and ends after the run of
/// breakpoints at which `long` is silent (also `clearance` later). Empty
/// when `long` is never silent under `short`.
fn find_contribution(short: &Partial, long: &Partial, clearance: f64) -> CoreResult<Range<usize>> {
    let silent = |t: f64| -> CoreResult<bool> {
        Ok(long.amplitude_at(t)? == 0.0 && long.amplitude_at(t + clearance)? == 0.0)
    };

    let mut cbeg = 0;
    while cbeg < short.len() && !silent(short.time_at(cbeg))? {
        cbeg += 1;
    }
    let mut cend = cbeg;
    while cend < short.len() && silent(short.time_at(cend))? {
        cend += 1;
    }
    if cbeg != short.len() {
        cbeg = 0;
    }
    Ok(cbeg..cend)
}

/// Splice `to_merge` into `dest`, clearing the breakpoints of `dest` it
/// overlaps (widened by the gap and fade times) and fading `dest` out and
/// back in around it.
fn merge(to_merge: &Partial, dest: &mut Partial, fade_time: f64, gap_time: f64) -> CoreResult<()> {
    let mut to_merge = to_merge.clone();
    to_merge.absorb(dest)?;
    fade_in_and_out(&mut to_merge, fade_time)?;
    let (mstart, mend) = (to_merge.start_time()?, to_merge.end_time()?);

    let mut remove_end = dest.find_after(mend + gap_time);
    while remove_end < dest.len()
        && !dest.breakpoint(remove_end).is_null()
        && dest.time_at(remove_end) < mend + gap_time + fade_time
    {
        remove_end += 1;
    }

    let mut remove_begin = dest.find_after(mstart - gap_time);
    if remove_begin != 0 {
        let mut before = remove_begin - 1;
        while remove_begin != 0
            && !dest.breakpoint(before).is_null()
            && dest.time_at(before) > mstart - gap_time - fade_time
        {
            remove_begin -= 1;
            before = before.saturating_sub(1);
        }
    }

    let at = dest.erase(remove_begin..remove_end);

    let after = dest.get(at).map(|(t, bp)| (t, *bp));
    let before = at.checked_sub(1).and_then(|i| dest.get(i)).map(|(t, bp)| (t, *bp));
    if let Some((t, bp)) = after {
        if !bp.is_null() {
            dest.insert(t - fade_time, bp.null_before(fade_time));
        }
    }
    if let Some((t, bp)) = before {
        if bp.amplitude() > 0.0 {
            dest.insert(t + fade_time, bp.null_after(fade_time));
        }
    }

    for (t, bp) in to_merge.iter() {
        dest.insert(t, *bp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rbe_core::Breakpoint;

    fn segment(label: Label, t0: f64, t1: f64, freq: f64) -> Partial {
        let n = ((t1 - t0) / 0.01).round() as usize;
        Partial::from_breakpoints(
            label,
            (0..=n).map(|i| (t0 + i as f64 * 0.01, Breakpoint::new(freq, 0.1, 0.0, 0.0))),
        )
    }

    #[test]
    fn test_rejects_non_positive_times() {
        assert!(Distiller::new(0.0, 0.001).is_err());
        assert!(Distiller::new(0.001, -1.0).is_err());
    }

    #[test]
    fn test_identical_partials_distill_to_one() {
        let mut list = vec![segment(1, 0.0, 0.2, 220.0), segment(1, 0.0, 0.2, 220.0)];
        let split = distill(&mut list, 0.001, 0.0001).unwrap();
        assert_eq!(split, 1);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].label(), 1);
        assert_relative_eq!(list[0].start_time().unwrap(), 0.0);
        assert_relative_eq!(list[0].end_time().unwrap(), 0.2);
    }

    #[test]
    fn test_disjoint_segments_are_joined() {
        let mut list = vec![
            segment(2, 0.0, 0.1, 440.0),
            segment(2, 0.3, 0.5, 441.0),
            segment(0, 0.0, 0.1, 1000.0),
        ];
        let split = distill(&mut list, 0.005, 0.001).unwrap();
        assert_eq!(split, 1);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].label(), 0);

        let p = &list[0];
        assert_relative_eq!(p.start_time().unwrap(), 0.0);
        assert_relative_eq!(p.end_time().unwrap(), 0.5);
        // silence bridges the gap
        assert_eq!(p.amplitude_at(0.2).unwrap(), 0.0);
        assert_relative_eq!(p.frequency_at(0.05).unwrap(), 440.0);
        assert_relative_eq!(p.frequency_at(0.4).unwrap(), 441.0);
    }

    #[test]
    fn test_overlapping_shorter_partial_is_absorbed() {
        let mut list = vec![segment(1, 0.0, 0.5, 100.0), segment(1, 0.1, 0.2, 103.0)];
        distill(&mut list, 0.005, 0.001).unwrap();
        assert_eq!(list.len(), 1);
        let bp = list[0].parameters_at(0.15).unwrap();
        assert_relative_eq!(bp.frequency(), 100.0);
        assert!(bp.bandwidth() > 0.0);
        assert!(bp.amplitude() > 0.1);
    }

    #[test]
    fn test_labels_sorted_and_unique() {
        let mut list = vec![
            segment(3, 0.0, 0.1, 300.0),
            segment(0, 0.0, 0.1, 50.0),
            segment(1, 0.0, 0.1, 100.0),
            segment(3, 0.2, 0.3, 300.0),
        ];
        let split = distill(&mut list, 0.001, 0.0001).unwrap();
        let labels: Vec<_> = list.iter().map(Partial::label).collect();
        assert_eq!(labels, vec![1, 3, 0]);
        assert_eq!(split, 2);
    }
}
