//! Time-varying control functions
//!
//! [`Envelope`] is the polymorphic time -> value interface consumed by the
//! mutators and algorithms; [`LinearEnvelope`] is the piecewise-linear
//! implementation used everywhere in practice.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

/// A pure function of time.
///
/// Implementors must be cheap to clone into a boxed copy, since algorithms
/// take an owning copy of every envelope they are configured with.
pub trait Envelope: Debug + Send + Sync {
    /// Value of the function at `time` seconds.
    fn value_at(&self, time: f64) -> f64;

    /// Owning boxed copy.
    fn clone_box(&self) -> Box<dyn Envelope>;
}

impl Clone for Box<dyn Envelope> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Piecewise-linear envelope over ordered `(time, value)` breakpoints,
/// constant beyond its ends. An empty envelope evaluates to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearEnvelope {
    points: Vec<(f64, f64)>,
}

impl LinearEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope with a single breakpoint at time zero, hence constant.
    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![(0.0, value)],
        }
    }

    /// Build from `(time, value)` pairs in any order.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Self {
        let mut env = Self::new();
        for (t, v) in points {
            env.insert(t, v);
        }
        env
    }

    /// Insert a breakpoint, replacing any existing one at exactly `time`.
    pub fn insert(&mut self, time: f64, value: f64) {
        let pos = self.points.partition_point(|(t, _)| *t < time);
        match self.points.get_mut(pos) {
            Some(pt) if pt.0 == time => pt.1 = value,
            _ => self.points.insert(pos, (time, value)),
        }
    }

    /// Same as [`LinearEnvelope::insert`].
    pub fn insert_breakpoint(&mut self, time: f64, value: f64) {
        self.insert(time, value);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate `(time, value)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().copied()
    }

    /// Interpolated value at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let Some(&(_, first)) = self.points.first() else {
            return 0.0;
        };
        let hi = self.points.partition_point(|(t, _)| *t <= time);
        if hi == 0 {
            return first;
        }
        if hi == self.points.len() {
            return self.points[hi - 1].1;
        }
        let (t0, v0) = self.points[hi - 1];
        let (t1, v1) = self.points[hi];
        let alpha = (time - t0) / (t1 - t0);
        v0 + alpha * (v1 - v0)
    }

    /// Combine pointwise with `other` over the union of both breakpoint sets.
    fn combine(&mut self, other: &LinearEnvelope, op: impl Fn(f64, f64) -> f64) {
        let mut times: Vec<f64> = self.points.iter().chain(other.points.iter()).map(|p| p.0).collect();
        times.sort_by(f64::total_cmp);
        times.dedup();

        let points = times
            .into_iter()
            .map(|t| (t, op(self.value_at(t), other.value_at(t))))
            .collect();
        self.points = points;
    }

    fn map_values(&mut self, op: impl Fn(f64) -> f64) {
        for pt in self.points.iter_mut() {
            pt.1 = op(pt.1);
        }
    }
}

impl Envelope for LinearEnvelope {
    fn value_at(&self, time: f64) -> f64 {
        LinearEnvelope::value_at(self, time)
    }

    fn clone_box(&self) -> Box<dyn Envelope> {
        Box::new(self.clone())
    }
}

impl From<f64> for LinearEnvelope {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl FromIterator<(f64, f64)> for LinearEnvelope {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        Self::from_points(iter)
    }
}

macro_rules! envelope_ops {
    ($Op:ident, $op:ident, $OpAssign:ident, $op_assign:ident, $f:expr) => {
        impl $OpAssign<f64> for LinearEnvelope {
            fn $op_assign(&mut self, rhs: f64) {
                self.map_values(|v| $f(v, rhs));
            }
        }

        impl $OpAssign<&LinearEnvelope> for LinearEnvelope {
            fn $op_assign(&mut self, rhs: &LinearEnvelope) {
                self.combine(rhs, $f);
            }
        }

        impl $Op<f64> for LinearEnvelope {
            type Output = LinearEnvelope;

            fn $op(mut self, rhs: f64) -> LinearEnvelope {
                self.$op_assign(rhs);
                self
            }
        }

        impl $Op<&LinearEnvelope> for LinearEnvelope {
            type Output = LinearEnvelope;

            fn $op(mut self, rhs: &LinearEnvelope) -> LinearEnvelope {
                self.$op_assign(rhs);
                self
            }
        }
    };
}

envelope_ops!(Add, add, AddAssign, add_assign, |a: f64, b: f64| a + b);
envelope_ops!(Sub, sub, SubAssign, sub_assign, |a: f64, b: f64| a - b);
envelope_ops!(Mul, mul, MulAssign, mul_assign, |a: f64, b: f64| a * b);
envelope_ops!(Div, div, DivAssign, div_assign, |a: f64, b: f64| a / b);
