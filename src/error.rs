//! Our error types for IBM4 communications.

use strum_macros::Display;
use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for IBM4 serial communications.
///
/// Validation failures are reported before any wire traffic happens; every
/// other variant describes a failed transport exchange. Nothing is retried
/// automatically anywhere in this crate.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    /// Transport-level failure, tagged with the stage of the exchange.
    #[error("serial communication error during {0}")]
    Serial(Stage, I),
    /// The response held fewer numeric tokens than the requested sample count.
    #[error("response held {got} numeric tokens, {wanted} required")]
    ShortResponse { wanted: usize, got: usize },
    /// A numeric token in the response could not be interpreted.
    #[error("could not interpret a numeric token in the response")]
    InvalidToken,
    /// The identity response did not contain a complete identity line.
    #[error("malformed identity response")]
    MalformedIdentity,
    /// Discovery probed every enumerated serial port without an answer.
    #[error("no IBM4 answered on any enumerated serial port")]
    NoDevice,
    /// The response outgrew the session line buffer.
    #[error("response exceeded the session line buffer")]
    BufferOverrun,
    /// One or more preconditions failed; the operation sent nothing.
    #[error("precondition(s) violated: {}", join_violations(.0))]
    Validation(Vec<Violation>),
}

/// The stage of a transport exchange an I/O error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Open,
    Discover,
    Write,
    Read,
}

/// Every precondition a session operation checks before touching the wire.
///
/// Operations collect all violated preconditions, not just the first.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("no comms established with the device")]
    NotOpen,
    #[error("set voltage outside range [0.0, 3.3)")]
    VoltageOutOfRange,
    #[error("fixed voltage outside range [0.0, 3.3)")]
    FixedVoltageOutOfRange,
    #[error("PWM percentage outside range [0, 100]")]
    PercentageOutOfRange,
    #[error("sample count outside range (2, 10000)")]
    SampleCountOutOfRange,
    #[error("averaging count outside sweep range (3, 103)")]
    SweepSampleCountOutOfRange,
    #[error("positive channel cannot equal negative channel")]
    IdenticalChannels,
    #[error("sweep bounds not inside [0.0, 3.3)")]
    SweepBoundsOutOfRange,
    #[error("too few points in the sweep interval")]
    TooFewPoints,
    #[error("sweep interval has zero length")]
    ZeroLengthInterval,
}

pub(crate) fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
