//! Reading a sampled history at an arbitrary time.
//!
//! Every inter-block read goes through a [`ReadPolicy`].
//! An exact timestamp hit always returns the stored sample. Otherwise the
//! [`Interpolation`] decides how a value between two samples is produced and the
//! [`Extrapolation`] decides what happens outside of the stored range.

use crate::errors::{CbdError, CbdResult};
use serde::{Deserialize, Serialize};

/// A single timestamped value of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// How to produce a value between two stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Only exact timestamp hits are allowed.
    None,
    /// Hold the most recent sample before the requested time.
    #[default]
    Previous,
    /// Linear interpolation between the bracketing samples.
    Linear,
}

/// How to produce a value outside of the stored range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    Forbid,
    /// Use the nearest stored sample.
    #[default]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadPolicy {
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub extrapolation: Extrapolation,
}

impl ReadPolicy {
    /// Only exact timestamp hits succeed.
    pub const EXACT: ReadPolicy = ReadPolicy {
        interpolation: Interpolation::None,
        extrapolation: Extrapolation::Forbid,
    };

    /// Zero-order hold, the default for connections between blocks.
    pub const SAMPLE_AND_HOLD: ReadPolicy = ReadPolicy {
        interpolation: Interpolation::Previous,
        extrapolation: Extrapolation::Hold,
    };

    pub fn new(interpolation: Interpolation, extrapolation: Extrapolation) -> Self {
        Self {
            interpolation,
            extrapolation,
        }
    }

    /// Linear interpolation inside the stored range, failing outside of it.
    pub fn linear() -> Self {
        Self::new(Interpolation::Linear, Extrapolation::Forbid)
    }
}

/// Relative to the local sample spacing, how far a stored timestamp may be from a
/// requested one and still count as the same point.
const TIME_TOLERANCE: f64 = 1e-9;

/// Spacing of the samples around `idx`, the insertion point of the requested time.
fn local_spacing(samples: &[Sample], idx: usize, time: f64) -> f64 {
    let n = samples.len();
    if n < 2 {
        return time.abs().max(1.0);
    }
    let upper = idx.clamp(1, n - 1);
    samples[upper].time - samples[upper - 1].time
}

/// The stored sample at `time`, if there is one.
///
/// An identical timestamp always wins. Otherwise the nearest neighbour within a small
/// fraction of the local spacing is taken, which absorbs rounding in `start + k * delta`.
fn exact_hit(samples: &[Sample], idx: usize, time: f64) -> Option<Sample> {
    if let Some(sample) = samples.get(idx).filter(|s| s.time == time) {
        return Some(*sample);
    }
    let tolerance = TIME_TOLERANCE * local_spacing(samples, idx, time);
    [Some(idx), idx.checked_sub(1)]
        .into_iter()
        .flatten()
        .filter_map(|i| samples.get(i))
        .filter(|s| (s.time - time).abs() <= tolerance)
        .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
        .copied()
}

/// Read `samples` (strictly increasing in time) at `time`.
///
/// `name` is only used to describe the signal in errors.
pub fn read_samples(samples: &[Sample], time: f64, policy: ReadPolicy, name: &str) -> CbdResult<f64> {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(CbdError::NoSample {
                signal: name.to_string(),
                time,
            })
        }
    };

    let idx = samples.partition_point(|s| s.time < time);
    if let Some(sample) = exact_hit(samples, idx, time) {
        return Ok(sample.value);
    }

    if policy.interpolation == Interpolation::None {
        return Err(CbdError::NoSample {
            signal: name.to_string(),
            time,
        });
    }

    if time < first.time || time > last.time {
        return match policy.extrapolation {
            Extrapolation::Forbid => Err(CbdError::ExtrapolationNotAllowed {
                signal: name.to_string(),
                time,
                first: first.time,
                last: last.time,
            }),
            Extrapolation::Hold if time < first.time => Ok(first.value),
            Extrapolation::Hold => Ok(last.value),
        };
    }

    // first.time < time < last.time, so both neighbours exist
    let before = samples[idx - 1];
    let after = samples[idx];
    match policy.interpolation {
        Interpolation::Linear => {
            let fraction = (time - before.time) / (after.time - before.time);
            Ok(before.value + fraction * (after.value - before.value))
        }
        _ => Ok(before.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(0.0, 1.0),
            Sample::new(1.0, 3.0),
            Sample::new(2.0, -1.0),
        ]
    }

    #[test]
    fn exact_hits_ignore_the_policy() {
        let s = samples();
        assert_eq!(read_samples(&s, 1.0, ReadPolicy::EXACT, "x").unwrap(), 3.0);
        assert_eq!(read_samples(&s, 2.0, ReadPolicy::linear(), "x").unwrap(), -1.0);
        // 0.1 * 3 is not exactly 0.3 but still refers to the same grid point
        let grid = vec![Sample::new(0.1 * 3.0, 7.0)];
        assert_eq!(read_samples(&grid, 0.3, ReadPolicy::EXACT, "x").unwrap(), 7.0);
    }

    #[test]
    fn exact_hits_at_large_times() {
        let s = vec![Sample::new(10000.0, 1.0), Sample::new(10000.00001, 2.0)];
        assert_eq!(read_samples(&s, 10000.00001, ReadPolicy::EXACT, "x").unwrap(), 2.0);
        assert_eq!(read_samples(&s, 10000.0, ReadPolicy::EXACT, "x").unwrap(), 1.0);

        // Halfway between two close samples is not a hit on either of them
        let mid = read_samples(&s, 10000.000005, ReadPolicy::linear(), "x").unwrap();
        assert!(is_close!(mid, 1.5, abs_tol = 1e-3), "{}", mid);
        assert!(read_samples(&s, 10000.000005, ReadPolicy::EXACT, "x").is_err());
    }

    #[test]
    fn missing_sample_without_interpolation() {
        let err = read_samples(&samples(), 0.5, ReadPolicy::EXACT, "block.OUT1").unwrap_err();
        assert_eq!(
            err,
            CbdError::NoSample {
                signal: "block.OUT1".to_string(),
                time: 0.5
            }
        );
    }

    #[test]
    fn empty_history() {
        let res = read_samples(&[], 0.0, ReadPolicy::SAMPLE_AND_HOLD, "x");
        assert!(matches!(res, Err(CbdError::NoSample { .. })));
    }

    #[test]
    fn linear() {
        let s = samples();
        assert!(is_close!(
            read_samples(&s, 0.25, ReadPolicy::linear(), "x").unwrap(),
            1.5
        ));
        assert!(is_close!(
            read_samples(&s, 1.5, ReadPolicy::linear(), "x").unwrap(),
            1.0
        ));
    }

    #[test]
    fn previous() {
        let s = samples();
        assert_eq!(
            read_samples(&s, 1.99, ReadPolicy::SAMPLE_AND_HOLD, "x").unwrap(),
            3.0
        );
    }

    #[test]
    fn extrapolation() {
        let s = samples();
        let err = read_samples(&s, 2.5, ReadPolicy::linear(), "x").unwrap_err();
        assert!(matches!(err, CbdError::ExtrapolationNotAllowed { .. }));

        let hold = ReadPolicy::new(Interpolation::Linear, Extrapolation::Hold);
        assert_eq!(read_samples(&s, 2.5, hold, "x").unwrap(), -1.0);
        assert_eq!(read_samples(&s, -3.0, hold, "x").unwrap(), 1.0);
    }
}
