//! Time sampling: the mapping from sample index to time.
//!
//! A property's samples are indexed 0..n; the archive's time sampling table
//! says when each index happens. Definitions are validated on construction
//! and compared structurally so the archive can deduplicate them.

use crate::util::{Error, Result};

/// Time value in seconds.
pub type Chrono = f64;

/// `time_per_cycle` marker used when an acyclic sampling is encoded.
pub const ACYCLIC_TIME_PER_CYCLE: Chrono = f64::MAX / 32.0;

/// Tolerance for comparing sample times, scaled by magnitude above 1s.
pub const CHRONO_EPSILON: Chrono = f64::EPSILON * 32.0;

/// `a <= b` up to [`CHRONO_EPSILON`].
#[inline]
fn time_le(a: Chrono, b: Chrono) -> bool {
    a <= b + CHRONO_EPSILON * b.abs().max(1.0)
}

/// Sampling policy.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeSamplingType {
    /// Unit-rate sampling from time 0; index `i` is at time `i`.
    /// A static property holds one sample under this policy.
    Identity,

    /// `start_time + index * time_per_cycle`.
    Uniform {
        time_per_cycle: Chrono,
        start_time: Chrono,
    },

    /// `times[i % n] + (i / n) * time_per_cycle`.
    Cyclic {
        time_per_cycle: Chrono,
        times: Vec<Chrono>,
    },

    /// Explicit time per index.
    Acyclic { times: Vec<Chrono> },
}

impl TimeSamplingType {
    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    #[inline]
    pub fn is_acyclic(&self) -> bool {
        matches!(self, Self::Acyclic { .. })
    }

    pub fn samples_per_cycle(&self) -> usize {
        match self {
            Self::Identity | Self::Uniform { .. } => 1,
            Self::Cyclic { times, .. } | Self::Acyclic { times } => times.len(),
        }
    }
}

/// Validated time sampling definition.
#[derive(Clone, Debug)]
pub struct TimeSampling {
    sampling_type: TimeSamplingType,
}

impl TimeSampling {
    pub fn identity() -> Self {
        Self {
            sampling_type: TimeSamplingType::Identity,
        }
    }

    pub fn uniform(time_per_cycle: Chrono, start_time: Chrono) -> Result<Self> {
        check_cycle(time_per_cycle)?;
        if !start_time.is_finite() {
            return Err(Error::InvalidTimeSampling(format!(
                "start time {start_time} is not finite"
            )));
        }
        Ok(Self {
            sampling_type: TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            },
        })
    }

    pub fn cyclic(time_per_cycle: Chrono, times: Vec<Chrono>) -> Result<Self> {
        check_cycle(time_per_cycle)?;
        check_times(&times)?;
        Ok(Self {
            sampling_type: TimeSamplingType::Cyclic {
                time_per_cycle,
                times,
            },
        })
    }

    pub fn acyclic(times: Vec<Chrono>) -> Result<Self> {
        check_times(&times)?;
        Ok(Self {
            sampling_type: TimeSamplingType::Acyclic { times },
        })
    }

    pub fn from_type(sampling_type: TimeSamplingType) -> Result<Self> {
        match sampling_type {
            TimeSamplingType::Identity => Ok(Self::identity()),
            TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            } => Self::uniform(time_per_cycle, start_time),
            TimeSamplingType::Cyclic {
                time_per_cycle,
                times,
            } => Self::cyclic(time_per_cycle, times),
            TimeSamplingType::Acyclic { times } => Self::acyclic(times),
        }
    }

    pub fn sampling_type(&self) -> &TimeSamplingType {
        &self.sampling_type
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.sampling_type.is_identity()
    }

    /// Storage form: `(time_per_cycle, stored_times)`.
    ///
    /// Identity encodes as a unit uniform sampling from 0, so the two
    /// compare equal.
    pub fn encode(&self) -> (Chrono, Vec<Chrono>) {
        match &self.sampling_type {
            TimeSamplingType::Identity => (1.0, vec![0.0]),
            TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            } => (*time_per_cycle, vec![*start_time]),
            TimeSamplingType::Cyclic {
                time_per_cycle,
                times,
            } => (*time_per_cycle, times.clone()),
            TimeSamplingType::Acyclic { times } => (ACYCLIC_TIME_PER_CYCLE, times.clone()),
        }
    }

    /// Inverse of [`TimeSampling::encode`].
    pub fn decode(time_per_cycle: Chrono, times: Vec<Chrono>) -> Result<Self> {
        if time_per_cycle == ACYCLIC_TIME_PER_CYCLE {
            return Self::acyclic(times);
        }
        match times.as_slice() {
            [] => Err(Error::InvalidTimeSampling("no stored times".into())),
            [start] if time_per_cycle == 1.0 && *start == 0.0 => Ok(Self::identity()),
            [start] => Self::uniform(time_per_cycle, *start),
            _ => Self::cyclic(time_per_cycle, times),
        }
    }

    /// Time of sample `index`.
    pub fn sample_time(&self, index: i64) -> Result<Chrono> {
        if index < 0 {
            return Err(Error::InvalidIndex(index));
        }
        let index = index as usize;
        if let TimeSamplingType::Acyclic { times } = &self.sampling_type {
            if index >= times.len() {
                return Err(Error::OutOfRange {
                    index,
                    count: times.len(),
                });
            }
        }
        Ok(self.time_at(index))
    }

    /// Time of sample `index`; acyclic indices past the list clamp to the last time.
    fn time_at(&self, index: usize) -> Chrono {
        match &self.sampling_type {
            TimeSamplingType::Identity => index as Chrono,
            TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            } => start_time + (index as Chrono) * time_per_cycle,
            TimeSamplingType::Cyclic {
                time_per_cycle,
                times,
            } => {
                let n = times.len().max(1);
                let local = times.get(index % n).copied().unwrap_or(0.0);
                local + ((index / n) as Chrono) * time_per_cycle
            }
            TimeSamplingType::Acyclic { times } => match times.get(index) {
                Some(&t) => t,
                None => times.last().copied().unwrap_or(0.0),
            },
        }
    }

    /// Largest index in `0..num_samples` whose time is <= `time` (0 if none).
    pub fn nearest_index(&self, time: Chrono, num_samples: usize) -> usize {
        self.floor_index(time, num_samples).0
    }

    /// Floor lookup: `(index, time_of_index)`.
    pub fn floor_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        let uniform = match &self.sampling_type {
            TimeSamplingType::Identity => Some((1.0, 0.0)),
            TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            } => Some((*time_per_cycle, *start_time)),
            _ => None,
        };

        let idx = match uniform {
            Some((delta, start)) => {
                let mut idx = if time <= start {
                    0
                } else {
                    (((time - start) / delta).floor() as usize).min(num_samples - 1)
                };
                // the division can land just below an exact sample time
                while idx + 1 < num_samples && time_le(self.time_at(idx + 1), time) {
                    idx += 1;
                }
                while idx > 0 && !time_le(self.time_at(idx), time) {
                    idx -= 1;
                }
                idx
            }
            None => {
                // first index whose time exceeds the query
                let mut lo = 0;
                let mut hi = num_samples;
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if time_le(self.time_at(mid), time) {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                lo.saturating_sub(1)
            }
        };
        (idx, self.time_at(idx))
    }

    /// Smallest index whose time is >= `time`, clamped to the last sample.
    pub fn ceil_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }
        let (floor_idx, floor_time) = self.floor_index(time, num_samples);
        if time_le(time, floor_time) {
            return (floor_idx, floor_time);
        }
        let ceil_idx = (floor_idx + 1).min(num_samples - 1);
        (ceil_idx, self.time_at(ceil_idx))
    }

    /// Closest index to `time`; ties go to the earlier sample.
    pub fn near_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }
        let (floor_idx, floor_time) = self.floor_index(time, num_samples);
        if floor_idx + 1 >= num_samples || time_le(time, floor_time) {
            return (floor_idx, floor_time);
        }
        let ceil_idx = floor_idx + 1;
        let ceil_time = self.time_at(ceil_idx);
        if time - floor_time <= ceil_time - time {
            (floor_idx, floor_time)
        } else {
            (ceil_idx, ceil_time)
        }
    }
}

impl Default for TimeSampling {
    fn default() -> Self {
        Self::identity()
    }
}

/// Structural equality over the storage form.
impl PartialEq for TimeSampling {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

fn check_cycle(time_per_cycle: Chrono) -> Result<()> {
    if time_per_cycle.is_finite() && time_per_cycle > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidTimeSampling(format!(
            "time per cycle must be positive, got {time_per_cycle}"
        )))
    }
}

fn check_times(times: &[Chrono]) -> Result<()> {
    if times.is_empty() {
        return Err(Error::InvalidTimeSampling("no sample times".into()));
    }
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(Error::InvalidTimeSampling(format!("time {t} is not finite")));
    }
    if let Some(w) = times.windows(2).find(|w| w[1] < w[0]) {
        return Err(Error::InvalidTimeSampling(format!(
            "times must be non-decreasing, {} follows {}",
            w[1], w[0]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sampling() {
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap();
        assert_eq!(ts.sample_time(0).unwrap(), 0.0);
        assert!((ts.sample_time(24).unwrap() - 1.0).abs() < 1e-10);
        assert!((ts.sample_time(48).unwrap() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_negative_index_rejected() {
        let ts = TimeSampling::identity();
        assert!(matches!(ts.sample_time(-1), Err(Error::InvalidIndex(-1))));
    }

    #[test]
    fn test_acyclic_sampling() {
        let ts = TimeSampling::acyclic(vec![0.0, 0.5, 1.0, 2.0]).unwrap();
        assert_eq!(ts.sample_time(3).unwrap(), 2.0);
        assert!(matches!(ts.sample_time(4), Err(Error::OutOfRange { index: 4, count: 4 })));
        assert_eq!(ts.nearest_index(0.75, 4), 1);
        assert_eq!(ts.nearest_index(5.0, 4), 3);
        assert_eq!(ts.nearest_index(-1.0, 4), 0);
    }

    #[test]
    fn test_cyclic_sampling() {
        let ts = TimeSampling::cyclic(1.0, vec![0.0, 0.25]).unwrap();
        assert_eq!(ts.sample_time(2).unwrap(), 1.0);
        assert_eq!(ts.sample_time(3).unwrap(), 1.25);
        assert_eq!(ts.floor_index(1.1, 10), (2, 1.0));
        assert_eq!(ts.ceil_index(1.1, 10), (3, 1.25));
    }

    #[test]
    fn test_floor_ceil_near() {
        let ts = TimeSampling::uniform(1.0, 0.0).unwrap();
        assert_eq!(ts.floor_index(1.5, 10).0, 1);
        assert_eq!(ts.ceil_index(1.5, 10).0, 2);
        assert_eq!(ts.near_index(1.4, 10).0, 1);
        assert_eq!(ts.near_index(1.6, 10).0, 2);
        assert_eq!(ts.floor_index(50.0, 10).0, 9);
        assert_eq!(ts.nearest_index(3.0, 0), 0);
    }

    #[test]
    fn test_lookup_at_exact_sample_times() {
        let ts = TimeSampling::uniform(1.0 / 24.0, 1.0).unwrap();
        for i in 0..500usize {
            let t = ts.sample_time(i as i64).unwrap();
            assert_eq!(ts.nearest_index(t, 1000), i, "floor at sample {i}");
            assert_eq!(ts.ceil_index(t, 1000).0, i, "ceil at sample {i}");
            assert_eq!(ts.near_index(t, 1000).0, i, "near at sample {i}");
        }

        let acyclic = TimeSampling::acyclic((0..200).map(|i| 0.1 * i as f64).collect()).unwrap();
        assert_eq!(acyclic.floor_index(0.1 * 3.0, 200).0, 3);
        assert_eq!(acyclic.ceil_index(0.3, 200).0, 3);
    }

    #[test]
    fn test_identity_is_unit_uniform() {
        let ts = TimeSampling::identity();
        assert_eq!(ts.sample_time(5).unwrap(), 5.0);
        assert_eq!(ts, TimeSampling::uniform(1.0, 0.0).unwrap());
        assert_ne!(ts, TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            TimeSampling::acyclic(vec![0.0, 2.0, 1.0]),
            Err(Error::InvalidTimeSampling(_))
        ));
        assert!(TimeSampling::acyclic(vec![0.0, 0.0, 1.0]).is_ok());
        assert!(TimeSampling::uniform(0.0, 0.0).is_err());
        assert!(TimeSampling::cyclic(1.0, vec![]).is_err());
    }

    #[test]
    fn test_encode_decode() {
        for ts in [
            TimeSampling::identity(),
            TimeSampling::uniform(0.5, 2.0).unwrap(),
            TimeSampling::cyclic(2.0, vec![0.0, 0.5, 1.0]).unwrap(),
            TimeSampling::acyclic(vec![1.0, 3.0]).unwrap(),
        ] {
            let (tpc, times) = ts.encode();
            let back = TimeSampling::decode(tpc, times).unwrap();
            assert_eq!(back, ts);
            assert_eq!(back.sampling_type().samples_per_cycle(), ts.sampling_type().samples_per_cycle());
        }
    }
}
