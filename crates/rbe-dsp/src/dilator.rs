//! Piecewise-linear time warping of partials and markers

use rbe_core::{checkpoint, CoreError, CoreResult, Marker, NoProgress, Partial, Progress};

/// Time warp defined by matching initial and target control times.
///
/// If every initial time is positive, an implicit `(0, 0)` control point
/// anchors the warp at the origin.
#[derive(Debug, Clone, Default)]
pub struct Dilator {
    initial: Vec<f64>,
    target: Vec<f64>,
}

impl Dilator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel control-time sequences.
    pub fn from_times(initial: &[f64], target: &[f64]) -> CoreResult<Self> {
        if initial.len() != target.len() {
            return Err(CoreError::invalid_argument(
                "Dilator needs the same number of initial and target time points.",
            ));
        }
        let mut d = Self::new();
        for (&i, &t) in initial.iter().zip(target) {
            d.insert(i, t);
        }
        Ok(d)
    }

    /// Add a control point. Both sequences stay sorted independently.
    pub fn insert(&mut self, initial: f64, target: f64) {
        let pos = self.initial.partition_point(|&x| x <= initial);
        self.initial.insert(pos, initial);
        let pos = self.target.partition_point(|&x| x <= target);
        self.target.insert(pos, target);
    }

    /// Control points including the implicit origin, as parallel slices.
    fn control_points(&self) -> (Vec<f64>, Vec<f64>) {
        if self.initial.first().is_some_and(|&t| t > 0.0) {
            let mut initial = Vec::with_capacity(self.initial.len() + 1);
            initial.push(0.0);
            initial.extend_from_slice(&self.initial);
            let mut target = Vec::with_capacity(self.target.len() + 1);
            target.push(0.0);
            target.extend_from_slice(&self.target);
            (initial, target)
        } else {
            (self.initial.clone(), self.target.clone())
        }
    }

    /// Warped time of `t`. Outside the control points times shift by the
    /// offset of the nearest end point; inside they interpolate linearly.
    pub fn warp_time(&self, t: f64) -> f64 {
        let (initial, target) = self.control_points();
        warp(&initial, &target, t)
    }

    /// Warp a partial: breakpoint times are mapped through the warp, and
    /// a breakpoint is added at every control target strictly inside the
    /// partial's span so warped segments keep their shape.
    pub fn dilate_partial(&self, p: &mut Partial) {
        let (initial, target) = self.control_points();
        dilate_with(&initial, &target, p);
    }

    pub fn dilate_marker(&self, m: &mut Marker) {
        m.set_time(self.warp_time(m.time()));
    }

    pub fn dilate(&self, partials: &mut [Partial]) -> CoreResult<()> {
        self.dilate_with_progress(partials, &NoProgress)
    }

    pub fn dilate_with_progress(&self, partials: &mut [Partial], progress: &dyn Progress) -> CoreResult<()> {
        log::info!("dilating {} Partials", partials.len());
        let (initial, target) = self.control_points();
        let total = partials.len();
        for (i, p) in partials.iter_mut().enumerate() {
            checkpoint(progress, i, total)?;
            dilate_with(&initial, &target, p);
        }
        checkpoint(progress, total, total)
    }

    pub fn dilate_markers(&self, markers: &mut [Marker]) {
        let (initial, target) = self.control_points();
        for m in markers.iter_mut() {
            m.set_time(warp(&initial, &target, m.time()));
        }
    }
}

fn warp(initial: &[f64], target: &[f64], t: f64) -> f64 {
    let (Some(&i0), Some(&in_)) = (initial.first(), initial.last()) else {
        return t;
    };
    let idx = initial.partition_point(|&x| x < t);
    if idx == 0 {
        t + (target[0] - i0)
    } else if idx == initial.len() {
        t + (target[idx - 1] - in_)
    } else {
        let (ilo, ihi) = (initial[idx - 1], initial[idx]);
        let (tlo, thi) = (target[idx - 1], target[idx]);
        let alpha = (t - ilo) / (ihi - ilo);
        tlo + alpha * (thi - tlo)
    }
}

fn dilate_with(initial: &[f64], target: &[f64], p: &mut Partial) {
    let (Ok(start), Ok(end)) = (p.start_time(), p.end_time()) else {
        return;
    };

    let mut out = Partial::with_label(p.label());
    for (t, bp) in p.iter() {
        out.insert(warp(initial, target, t), *bp);
    }
    for (&ti, &tt) in initial.iter().zip(target) {
        if ti > start && ti < end {
            if let Ok(bp) = p.parameters_at(ti) {
                out.insert(tt, bp);
            }
        }
    }
    *p = out;
}

/// Warp partials and markers with parallel control-time sequences.
pub fn dilate(partials: &mut [Partial], markers: &mut [Marker], initial: &[f64], target: &[f64]) -> CoreResult<()> {
    let dilator = Dilator::from_times(initial, target)?;
    dilator.dilate(partials)?;
    dilator.dilate_markers(markers);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rbe_core::Breakpoint;

    #[test]
    fn test_implicit_origin() {
        let d = Dilator::from_times(&[1.0], &[2.0]).unwrap();
        assert_relative_eq!(d.warp_time(0.5), 1.0);
        assert_relative_eq!(d.warp_time(1.0), 2.0);
        assert_relative_eq!(d.warp_time(3.0), 4.0);
        assert_relative_eq!(d.warp_time(-1.0), -1.0);
    }

    #[test]
    fn test_negative_result_allowed() {
        let d = Dilator::from_times(&[0.0, 1.0], &[-0.5, 0.5]).unwrap();
        assert_relative_eq!(d.warp_time(0.0), -0.5);
        assert_relative_eq!(d.warp_time(-1.0), -1.5);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(Dilator::from_times(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_dilate_partial_inserts_control_targets() {
        let mut p = Partial::from_breakpoints(
            1,
            [
                (0.0, Breakpoint::new(100.0, 0.1, 0.0, 0.0)),
                (2.0, Breakpoint::new(300.0, 0.1, 0.0, 0.0)),
            ],
        );
        let d = Dilator::from_times(&[1.0], &[3.0]).unwrap();
        d.dilate_partial(&mut p);
        assert_eq!(p.len(), 3);
        assert_relative_eq!(p.time_at(1), 3.0);
        assert_relative_eq!(p.breakpoint(1).frequency(), 200.0);
        assert_relative_eq!(p.end_time().unwrap(), 4.0);
        assert_eq!(p.label(), 1);
    }

    #[test]
    fn test_markers_follow_warp() {
        let mut markers = vec![Marker::new(0.5, "attack"), Marker::new(2.0, "release")];
        let mut partials: Vec<Partial> = Vec::new();
        dilate(&mut partials, &mut markers, &[1.0], &[0.5]).unwrap();
        assert_relative_eq!(markers[0].time(), 0.25);
        assert_relative_eq!(markers[1].time(), 1.5);
    }
}
