//! Sample selection and sample payloads.

use super::time_sampling::{Chrono, TimeSampling};
use crate::util::{DataType, Dimensions};
use std::sync::Arc;

/// How to pick a sample from a property.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleSelector {
    Index(usize),
    /// Largest index whose time is <= t.
    TimeFloor(Chrono),
    /// Smallest index whose time is >= t.
    TimeCeil(Chrono),
    /// Closest index to t.
    TimeNear(Chrono),
}

impl SampleSelector {
    pub const fn first() -> Self {
        Self::Index(0)
    }

    /// Resolve to an index through `ts`. Time selectors clamp into
    /// `0..num_samples`; an explicit index is passed through unchecked.
    pub fn resolve(&self, ts: &TimeSampling, num_samples: usize) -> usize {
        match *self {
            Self::Index(i) => i,
            Self::TimeFloor(t) => ts.floor_index(t, num_samples).0,
            Self::TimeCeil(t) => ts.ceil_index(t, num_samples).0,
            Self::TimeNear(t) => ts.near_index(t, num_samples).0,
        }
    }
}

impl Default for SampleSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl From<usize> for SampleSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Chrono> for SampleSelector {
    fn from(time: Chrono) -> Self {
        Self::TimeNear(time)
    }
}

/// One array sample as read back from a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ArraySample {
    pub data: Arc<Vec<u8>>,
    pub dimensions: Dimensions,
    pub data_type: DataType,
}

impl ArraySample {
    pub fn new(data: impl Into<Arc<Vec<u8>>>, dimensions: Dimensions, data_type: DataType) -> Self {
        Self {
            data: data.into(),
            dimensions,
            data_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of elements (each `extent` PODs wide).
    pub fn num_points(&self) -> usize {
        self.dimensions.num_points()
    }

    pub fn is_empty(&self) -> bool {
        self.num_points() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_conversions() {
        let sel: SampleSelector = 3usize.into();
        assert_eq!(sel, SampleSelector::Index(3));
        let sel: SampleSelector = 1.5.into();
        assert_eq!(sel, SampleSelector::TimeNear(1.5));
    }

    #[test]
    fn test_selector_resolve() {
        let ts = TimeSampling::uniform(0.5, 1.0).unwrap();
        assert_eq!(SampleSelector::TimeFloor(1.7).resolve(&ts, 10), 1);
        assert_eq!(SampleSelector::TimeCeil(1.7).resolve(&ts, 10), 2);
        assert_eq!(SampleSelector::TimeNear(1.7).resolve(&ts, 10), 1);
        assert_eq!(SampleSelector::TimeFloor(100.0).resolve(&ts, 4), 3);
        assert_eq!(SampleSelector::Index(42).resolve(&ts, 4), 42);
    }

    #[test]
    fn test_array_sample_points() {
        let s = ArraySample::new(vec![0u8; 24], Dimensions::d1(2), DataType::VEC3F);
        assert_eq!(s.num_points(), 2);
        assert!(!s.is_empty());
        assert!(ArraySample::new(Vec::new(), Dimensions::d1(0), DataType::VEC3F).is_empty());
    }
}
