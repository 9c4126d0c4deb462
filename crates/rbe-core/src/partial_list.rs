//! Ordered collections of partials

use crate::partial::{Label, Partial};

/// Ordered, label-non-unique collection of partials.
pub type PartialList = Vec<Partial>;

/// Copy every partial with `label` onto the end of `dst`.
pub fn copy_labeled(src: &[Partial], label: Label, dst: &mut PartialList) {
    dst.extend(src.iter().filter(|p| p.label() == label).cloned());
}

/// Move every partial with `label` from `src` onto the end of `dst`,
/// preserving the relative order of both lists.
pub fn extract_labeled(src: &mut PartialList, label: Label, dst: &mut PartialList) {
    extract_if(src, |p| p.label() == label, dst);
}

/// Move every partial matching `pred` from `src` onto the end of `dst`.
pub fn extract_if<F>(src: &mut PartialList, mut pred: F, dst: &mut PartialList)
where
    F: FnMut(&Partial) -> bool,
{
    let (matched, kept): (Vec<_>, Vec<_>) = src.drain(..).partition(|p| pred(p));
    *src = kept;
    dst.extend(matched);
}

/// Remove every partial with `label`.
pub fn remove_labeled(partials: &mut PartialList, label: Label) {
    partials.retain(|p| p.label() != label);
}

/// Stable sort by increasing label.
pub fn sort_by_label(partials: &mut [Partial]) {
    partials.sort_by_key(|p| p.label());
}

/// Move every partial of `src` onto the end of `dst`.
pub fn splice(dst: &mut PartialList, src: &mut PartialList) {
    dst.append(src);
}

/// Stable partition: labeled partials first, unlabeled ones after.
/// Returns the index of the first unlabeled partial.
pub fn partition_labeled(partials: &mut PartialList) -> usize {
    let (labeled, unlabeled): (Vec<_>, Vec<_>) = partials.drain(..).partition(|p| p.label() != 0);
    let split = labeled.len();
    partials.extend(labeled);
    partials.extend(unlabeled);
    split
}

/// Largest label in the collection, zero when there are none.
pub fn max_label(partials: &[Partial]) -> Label {
    partials.iter().map(Partial::label).max().unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Breakpoint;

    fn labeled(labels: &[Label]) -> PartialList {
        labels
            .iter()
            .enumerate()
            .map(|(i, &l)| {
                Partial::from_breakpoints(l, [(i as f64, Breakpoint::new(100.0, 0.1, 0.0, 0.0))])
            })
            .collect()
    }

    #[test]
    fn test_extract_and_copy() {
        let mut src = labeled(&[1, 2, 1, 0]);
        let mut dst = PartialList::new();
        copy_labeled(&src, 1, &mut dst);
        assert_eq!(dst.len(), 2);

        let mut moved = PartialList::new();
        extract_labeled(&mut src, 1, &mut moved);
        assert_eq!(src.len(), 2);
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().all(|p| p.label() == 1));
    }

    #[test]
    fn test_partition_is_stable() {
        let mut list = labeled(&[0, 3, 0, 1]);
        let split = partition_labeled(&mut list);
        assert_eq!(split, 2);
        let labels: Vec<_> = list.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec![3, 1, 0, 0]);
        assert_eq!(max_label(&list), 3);
    }

    #[test]
    fn test_remove_and_sort() {
        let mut list = labeled(&[4, 0, 2, 4]);
        remove_labeled(&mut list, 4);
        sort_by_label(&mut list);
        let labels: Vec<_> = list.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec![0, 2]);
    }
}
