//! This crate provides an interface for communicating with and controlling the
//! IBM4 microcontroller board (ISBY UCC revisions) used to source and measure
//! voltages in instrumentation labs.
//!
//! The IBM4 speaks a line-oriented ASCII protocol over USB serial. Commands are
//! CRLF-terminated; the board echoes each command before its payload, so
//! responses are parsed by extracting numeric tokens and keeping the trailing
//! window of the requested size.
//!
//! Command grammar (`:` separated fields):
//! * `*IDN` - identity query, response contains the `ISBY` vendor marker.
//! * `Mode<code>` - set acquisition mode (0 = DC, 1 = AC), no response.
//! * `Write<channel>:<volts %.2f>` - set an analog output, no response.
//! * `PWM<channel>:<percent>` - set a PWM duty cycle, no response.
//! * `Read<channel>:<n>` / `BRead<channel>:<n>` - n voltage / binary samples.
//! * `Average<channel>:<n>` - on-board average of n samples, one scalar back.
//! * `Diff_Read<pos>:<neg>:<n>` / `Diff_BRead...` / `Diff_Average...` -
//!   differential analogues taking two channel codes.
//!
//! The serial port used for IBM4 comms should be configured like so:
//! * Default baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None

pub mod channel;
pub mod console;
pub mod error;
pub mod port;
pub mod session;
pub mod sweep;
pub mod types;

#[cfg(test)]
mod mock_serial;

/// The byte-oriented line every session operation is built on.
///
/// Anything that can read, write and drop unread input can carry the IBM4
/// protocol; the real serial stack is wrapped by [`port::PortWrapper`] and the
/// unit tests drive the session with a scripted mock instead.
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Discard any bytes received but not yet read.
    ///
    /// The session resets the input buffer between command/response pairs so
    /// stale bytes from one exchange are never parsed as part of the next.
    fn reset_input_buffer(&mut self) -> Result<(), Self::Error>;
}
