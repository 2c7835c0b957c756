//! Description of the bounds of a linear parameter sweep,
//! e.g. sweep from a start value to a stop value in steps of `step`.

use thiserror::Error;

use crate::error::{Error, Violation, join_violations};

/// Smallest voltage increment the IBM4 hardware can resolve, in volts.
///
/// Step sizes are clamped up to this floor, so a sweep may not reach its stop
/// value exactly on the last step. That is a property of the hardware voltage
/// resolution, not a defect.
pub const MIN_STEP: f64 = 0.01;

/// The bounds of a linear sweep: start, stop and the realized step size.
///
/// Construction normalizes the bounds (`start <= stop`) and computes
/// `step = max((stop - start) / (point_count - 1), MIN_STEP)`. A value of this
/// type is always well defined; invalid parameters are rejected by
/// [`SweepInterval::new`] instead of producing a half-built interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepInterval {
    point_count: usize,
    start: f64,
    stop: f64,
    step: f64,
}

/// The parameters describe no usable sweep space.
///
/// Carries every violated precondition, not just the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid sweep interval: {}", join_violations(.0))]
pub struct InvalidInterval(pub Vec<Violation>);

impl<I: embedded_io::Error> From<InvalidInterval> for Error<I> {
    fn from(err: InvalidInterval) -> Self {
        Error::Validation(err.0)
    }
}

impl SweepInterval {
    /// Build an interval from a point count and raw (unordered) bounds.
    ///
    /// Requires `point_count > 3` and a non-zero span between the bounds.
    pub fn new(point_count: usize, start: f64, stop: f64) -> Result<Self, InvalidInterval> {
        let mut violations = Vec::new();
        if point_count <= 3 {
            violations.push(Violation::TooFewPoints);
        }
        if (stop - start).abs() == 0.0 {
            violations.push(Violation::ZeroLengthInterval);
        }
        if !violations.is_empty() {
            return Err(InvalidInterval(violations));
        }

        let (lo, hi) = (start.min(stop), start.max(stop));
        let step = ((hi - lo) / (point_count - 1) as f64).max(MIN_STEP);
        Ok(Self {
            point_count,
            start: lo,
            stop: hi,
            step,
        })
    }

    /// Number of distinct points requested within the sweep space.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Lower bound of the sweep space.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Upper bound of the sweep space.
    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Realized increment, clamped below by [`MIN_STEP`].
    pub fn step(&self) -> f64 {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_normalized() {
        let interval = SweepInterval::new(12, 3.0, 1.0).unwrap();
        assert_eq!(interval.start(), 1.0);
        assert_eq!(interval.stop(), 3.0);
        assert!(interval.start() <= interval.stop());
    }

    #[test]
    fn step_spans_the_interval() {
        let interval = SweepInterval::new(5, 0.0, 2.0).unwrap();
        assert!((interval.step() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn step_is_clamped_to_the_hardware_floor() {
        // Raw arithmetic step would be 0.5 mV, far below what the DAC resolves.
        let interval = SweepInterval::new(1001, 0.0, 0.5).unwrap();
        assert_eq!(interval.step(), MIN_STEP);
    }

    #[test]
    fn step_never_drops_below_the_floor() {
        for (points, start, stop) in [(4, 0.0, 3.3), (10, 1.0, 1.01), (100, -2.0, 2.0)] {
            let interval = SweepInterval::new(points, start, stop).unwrap();
            assert!(interval.step() >= MIN_STEP);
            assert!(interval.start() <= interval.stop());
        }
    }

    #[test]
    fn too_few_points_is_rejected() {
        let err = SweepInterval::new(3, 0.0, 1.0).unwrap_err();
        assert_eq!(err.0, vec![Violation::TooFewPoints]);
    }

    #[test]
    fn zero_length_interval_is_rejected() {
        let err = SweepInterval::new(10, 1.5, 1.5).unwrap_err();
        assert_eq!(err.0, vec![Violation::ZeroLengthInterval]);
    }

    #[test]
    fn all_violations_are_reported_together() {
        let err = SweepInterval::new(2, 0.7, 0.7).unwrap_err();
        assert_eq!(
            err.0,
            vec![Violation::TooFewPoints, Violation::ZeroLengthInterval]
        );
    }
}
