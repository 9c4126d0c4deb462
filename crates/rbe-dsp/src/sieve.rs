//! Sifting: resolve same-label temporal overlap by unlabeling
//!
//! Among partials sharing a label, longer partials win. A shorter partial
//! that comes within twice the fade time of a longer one still carrying
//! the label is given label 0. Nothing is removed and no breakpoint is
//! touched.

use crate::config::SieveConfig;
use rbe_core::{checkpoint, CoreError, CoreResult, Label, NoProgress, Partial, Progress};

#[derive(Debug, Clone, Copy)]
pub struct Sieve {
    fade_time: f64,
}

impl Sieve {
    pub fn new(fade_time: f64) -> CoreResult<Self> {
        if fade_time < 0.0 {
            return Err(CoreError::invalid_argument("Sieve fade time must be non-negative."));
        }
        Ok(Self { fade_time })
    }

    pub fn with_config(config: SieveConfig) -> CoreResult<Self> {
        Self::new(config.fade_time)
    }

    pub fn fade_time(&self) -> f64 {
        self.fade_time
    }

    /// Unlabel overlapping shorter partials. The order of `partials` is
    /// unchanged. Returns how many partials were unlabeled.
    pub fn sift(&self, partials: &mut [Partial]) -> usize {
        // never cancelled
        self.sift_with_progress(partials, &NoProgress).unwrap_or(0)
    }

    pub fn sift_with_progress(&self, partials: &mut [Partial], progress: &dyn Progress) -> CoreResult<usize> {
        log::info!("sifting {} Partials", partials.len());
        let clearance = 2.0 * self.fade_time;

        let mut order: Vec<usize> = (0..partials.len())
            .filter(|&i| partials[i].label() != 0 && !partials[i].is_empty())
            .collect();
        order.sort_by(|&a, &b| {
            let (pa, pb) = (&partials[a], &partials[b]);
            pa.label()
                .cmp(&pb.label())
                .then_with(|| pb.duration().total_cmp(&pa.duration()))
        });

        let labels: Vec<Label> = order.iter().map(|&i| partials[i].label()).collect();
        let total = order.len();
        let mut unlabeled = 0;
        let mut group_start = 0;
        for pos in 0..order.len() {
            checkpoint(progress, pos, total)?;
            let label = labels[pos];
            if label != labels[group_start] {
                group_start = pos;
                continue;
            }

            let idx = order[pos];
            let overlapping = order[group_start..pos]
                .iter()
                .any(|&k| partials[k].label() == label && overlaps(&partials[k], &partials[idx], clearance));
            if overlapping {
                log::debug!("Sieve unlabeling a Partial of label {label}");
                partials[idx].set_label(0);
                unlabeled += 1;
            }
        }

        log::info!("Sieve unlabeled {unlabeled} Partials");
        checkpoint(progress, total, total)?;
        Ok(unlabeled)
    }
}

fn overlaps(a: &Partial, b: &Partial, clearance: f64) -> bool {
    match (a.start_time(), a.end_time(), b.start_time(), b.end_time()) {
        (Ok(a0), Ok(a1), Ok(b0), Ok(b1)) => a1 + clearance > b0 && b1 + clearance > a0,
        _ => false,
    }
}

/// One-shot sifting with the given fade time.
pub fn sift(partials: &mut [Partial], fade_time: f64) -> CoreResult<usize> {
    Ok(Sieve::new(fade_time)?.sift(partials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_core::Breakpoint;

    fn span(label: Label, t0: f64, t1: f64) -> Partial {
        Partial::from_breakpoints(
            label,
            [
                (t0, Breakpoint::new(100.0, 0.1, 0.0, 0.0)),
                (t1, Breakpoint::new(100.0, 0.1, 0.0, 0.0)),
            ],
        )
    }

    #[test]
    fn test_shorter_overlapping_is_unlabeled() {
        let mut list = vec![span(1, 0.1, 0.3), span(1, 0.0, 0.5)];
        let n = sift(&mut list, 0.001).unwrap();
        assert_eq!(n, 1);
        assert_eq!(list[0].label(), 0);
        assert_eq!(list[1].label(), 1);
    }

    #[test]
    fn test_clearance_counts_as_overlap() {
        let mut list = vec![span(2, 0.0, 0.5), span(2, 0.5015, 0.6), span(2, 0.51, 0.6)];
        sift(&mut list, 0.001).unwrap();
        assert_eq!(list[1].label(), 0);
        // clears the first, and the second no longer carries the label
        assert_eq!(list[2].label(), 2);
    }

    #[test]
    fn test_unlabeled_partial_does_not_block() {
        // the middle one loses to the first, so the last only has to clear the first
        let mut list = vec![span(3, 0.0, 1.0), span(3, 0.9, 1.5), span(3, 1.2, 1.4)];
        sift(&mut list, 0.001).unwrap();
        let labels: Vec<_> = list.iter().map(Partial::label).collect();
        assert_eq!(labels, vec![3, 0, 3]);
    }

    #[test]
    fn test_breakpoints_untouched() {
        let mut list = vec![span(1, 0.0, 0.5), span(1, 0.2, 0.4), span(4, 0.2, 0.4)];
        let before: Vec<_> = list.iter().map(|p| p.iter().map(|(t, bp)| (t, *bp)).collect::<Vec<_>>()).collect();
        sift(&mut list, 0.001).unwrap();
        let after: Vec<_> = list.iter().map(|p| p.iter().map(|(t, bp)| (t, *bp)).collect::<Vec<_>>()).collect();
        assert_eq!(before, after);
        assert_eq!(list[2].label(), 4);
    }
}
