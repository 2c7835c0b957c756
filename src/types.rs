//! Result types shared by the session read and sweep operations.

use strum_macros::{Display, EnumIter};

/// The closed set of read variants a session can perform.
///
/// Single kinds always take one sample; the multi-sample kinds take the
/// caller's sample count. "Binary" kinds return raw converter codes, "Voltage"
/// kinds return volts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ReadKind {
    #[strum(serialize = "Single Voltage")]
    SingleVoltage,
    #[strum(serialize = "Multiple Voltage")]
    MultipleVoltage,
    #[strum(serialize = "Average Voltage")]
    AverageVoltage,
    #[strum(serialize = "Single Binary")]
    SingleBinary,
    #[strum(serialize = "Multiple Binary")]
    MultipleBinary,
}

/// What a dispatched read returns; the variant follows the [`ReadKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// `SingleVoltage` and `AverageVoltage` results.
    Voltage(f64),
    /// `SingleBinary` result.
    Binary(i32),
    /// `MultipleVoltage` result.
    VoltageSeries(ReadingSample),
    /// `MultipleBinary` result.
    BinarySeries(Vec<i32>),
}

/// The aggregate of a multi-sample voltage read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSample {
    /// Arithmetic mean of the samples.
    pub mean: f64,
    /// Half the spread of the samples, `0.5 * (max - min)`.
    ///
    /// This is deliberately NOT a standard deviation; downstream plotting
    /// treats the half-range as the error bar.
    pub half_range: f64,
    /// The samples, in the order the device returned them.
    pub samples: Vec<f64>,
}

impl ReadingSample {
    /// Aggregate an ordered sample set into mean and half-range.
    pub fn from_samples(samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self {
                mean: 0.0,
                half_range: 0.0,
                samples,
            };
        }
        let count = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        Self {
            mean,
            half_range: 0.5 * (max - min),
            samples,
        }
    }
}

/// One step of a linear sweep: the set voltage and the averaged reading at
/// every read channel, in registry order (A2, A3, A4, A5, D2).
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub v_set: f64,
    pub inputs: [f64; 5],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_range_is_half_the_spread() {
        let sample = ReadingSample::from_samples(vec![1.10, 2.20, 3.30]);
        assert!((sample.mean - 2.20).abs() < 1e-9);
        assert!((sample.half_range - 1.10).abs() < 1e-9);
        assert_eq!(sample.samples, vec![1.10, 2.20, 3.30]);
    }

    #[test]
    fn half_range_ignores_sample_order() {
        let sample = ReadingSample::from_samples(vec![3.0, 1.0, 2.0]);
        assert!((sample.half_range - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_sample_set_aggregates_to_zero() {
        let sample = ReadingSample::from_samples(Vec::new());
        assert_eq!(sample.mean, 0.0);
        assert_eq!(sample.half_range, 0.0);
    }
}
