//! Collation: pack unlabeled partials end to end
//!
//! Unlabeled partials that never overlap in time are joined into as few
//! partials as possible, each given a fresh label above every label
//! already in use. Packing is greedy interval partitioning in order of
//! start time, which is optimal for the number of collated partials.

use crate::config::CollatorConfig;
use rbe_core::{checkpoint, max_label, partition_labeled, CoreError, CoreResult, NoProgress, Partial, PartialList, Progress};

#[derive(Debug, Clone, Copy)]
pub struct Collator {
    fade_time: f64,
    gap_time: f64,
}

impl Collator {
    pub fn new(fade_time: f64, gap_time: f64) -> CoreResult<Self> {
        if fade_time <= 0.0 {
            return Err(CoreError::invalid_argument("Collator fade time must be positive."));
        }
        if gap_time <= 0.0 {
            return Err(CoreError::invalid_argument("Collator gap time must be positive."));
        }
        Ok(Self { fade_time, gap_time })
    }

    pub fn with_config(config: CollatorConfig) -> CoreResult<Self> {
        Self::new(config.fade_time, config.gap_time)
    }

    pub fn fade_time(&self) -> f64 {
        self.fade_time
    }

    pub fn gap_time(&self) -> f64 {
        self.gap_time
    }

    /// Collate the unlabeled partials. Labeled partials keep their order
    /// at the front; collated partials follow. Empty unlabeled partials
    /// are dropped. Returns the position of the first collated partial.
    pub fn collate(&self, partials: &mut PartialList) -> usize {
        // never cancelled
        self.collate_with_progress(partials, &NoProgress).unwrap_or(partials.len())
    }

    pub fn collate_with_progress(&self, partials: &mut PartialList, progress: &dyn Progress) -> CoreResult<usize> {
        let split = partition_labeled(partials);
        let mut unlabeled: PartialList = partials.drain(split..).filter(|p| !p.is_empty()).collect();
        log::info!("collating {} unlabeled Partials", unlabeled.len());

        unlabeled.sort_by(rbe_core::partial_utils::compare_start_time_less);

        let clearance = 2.0 * self.fade_time + self.gap_time;
        let total = unlabeled.len();
        let mut collated: Vec<(f64, Partial)> = Vec::new();

        for i in 0..total {
            if let Err(err) = checkpoint(progress, i, total) {
                partials.append(&mut unlabeled);
                return Err(err);
            }
            let p = &unlabeled[i];
            let start = p.start_time()?;
            let end = p.end_time()?;

            let free = collated
                .iter()
                .enumerate()
                .filter(|(_, (cend, _))| start - cend > clearance)
                .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                .map(|(k, _)| k);

            match free {
                Some(k) => {
                    let (cend, dest) = &mut collated[k];
                    self.join(dest, p)?;
                    *cend = end;
                }
                None => collated.push((end, p.clone())),
            }
        }

        let mut label = max_label(partials);
        for (_, mut p) in collated {
            label += 1;
            p.set_label(label);
            partials.push(p);
        }
        log::info!("collated into {} Partials", partials.len() - split);
        Ok(split)
    }

    /// Append `next` to `dest`, fading out between them.
    fn join(&self, dest: &mut Partial, next: &Partial) -> CoreResult<()> {
        let last = *dest.last()?;
        if !last.is_null() {
            let t = dest.end_time()? + self.fade_time;
            dest.insert(t, last.null_after(self.fade_time));
        }
        let first = *next.first()?;
        if !first.is_null() {
            let t = next.start_time()? - self.fade_time;
            dest.insert(t, first.null_before(self.fade_time));
        }
        for (t, bp) in next.iter() {
            dest.insert(t, *bp);
        }
        Ok(())
    }
}

/// One-shot collation with the given fade and gap times.
pub fn collate(partials: &mut PartialList, fade_time: f64, gap_time: f64) -> CoreResult<usize> {
    Ok(Collator::new(fade_time, gap_time)?.collate(partials))
}
