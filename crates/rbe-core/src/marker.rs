//! Named time points carried alongside partials

use serde::{Deserialize, Serialize};

/// A (time, name) pair, e.g. an attack or release point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    time: f64,
    name: String,
}

impl Marker {
    pub fn new(time: f64, name: impl Into<String>) -> Self {
        Self {
            time,
            name: name.into(),
        }
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Order markers by time.
pub fn sort_markers_by_time(markers: &mut [Marker]) {
    markers.sort_by(|a, b| a.time.total_cmp(&b.time));
}

/// Find the first marker with the given name.
pub fn find_marker<'a>(markers: &'a [Marker], name: &str) -> Option<&'a Marker> {
    markers.iter().find(|m| m.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_and_find() {
        let mut markers = vec![Marker::new(0.5, "release"), Marker::new(0.1, "attack")];
        sort_markers_by_time(&mut markers);
        assert_eq!(markers[0].name(), "attack");
        assert_eq!(find_marker(&markers, "release").map(|m| m.time()), Some(0.5));
        assert!(find_marker(&markers, "sustain").is_none());
    }
}
