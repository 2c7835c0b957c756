//! Real serial ports: the [`serialport`] glue behind [`Transport`], plus
//! device discovery.
//!
//! [`serialport`] hands out `Box<dyn SerialPort>` speaking `std::io`, while
//! the session wants [`embedded_io`]; [`PortWrapper`] bridges the two.

use std::time::Duration;

use embedded_io::Write as _;
use log::{debug, info};
use serialport::SerialPort;

use crate::Transport;
use crate::channel::Mode;
use crate::error::{Error, Stage};
use crate::session::{Ibm4, IDENTITY_MARKER};

type SessionResult<T> = crate::error::Result<T, IoError>;

/// Line settings for the IBM4's USB CDC serial port.
///
/// The read timeout doubles as the response framing mechanism: the board
/// writes its whole response promptly, so a timed-out read with data in hand
/// is the end of the exchange, and a large multi-sample acquisition must
/// finish within this window. Discovery probes with the much shorter probe
/// timeouts so a machine full of silent ports is scanned quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub probe_read_timeout: Duration,
    pub probe_write_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_millis(500),
            probe_read_timeout: Duration::from_millis(50),
            probe_write_timeout: Duration::from_millis(100),
        }
    }
}

/// Adapter from `Box<dyn SerialPort>` to the [`embedded_io`] traits.
pub struct PortWrapper(Box<dyn SerialPort>);

/// [`std::io::Error`] carried across the [`embedded_io`] boundary.
#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            std::io::ErrorKind::AddrNotAvailable => embedded_io::ErrorKind::AddrNotAvailable,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::AlreadyExists => embedded_io::ErrorKind::AlreadyExists,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl Transport for PortWrapper {
    fn reset_input_buffer(&mut self) -> Result<(), Self::Error> {
        self.0
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| IoError(e.into()))
    }
}

/// Open the named port with the given line settings.
pub fn open(path: &str, settings: &SerialSettings) -> SessionResult<PortWrapper> {
    let port = serialport::new(path, settings.baud_rate)
        .timeout(settings.read_timeout)
        .open()
        .map_err(|e| Error::Serial(Stage::Open, IoError(e.into())))?;
    // serialport applies one timeout to both directions; writes to a healthy
    // CDC port complete well inside the shorter write budget anyway.
    Ok(PortWrapper(port))
}

/// Open a session on an explicitly named port, skipping discovery.
pub fn connect_to(path: &str, settings: &SerialSettings, mode: Mode) -> SessionResult<Ibm4<PortWrapper>> {
    let port = open(path, settings)?;
    info!("opening IBM4 session on {path}");
    Ibm4::new(port, mode)
}

/// Probe every enumerated serial port and open a session on the first IBM4
/// that answers.
///
/// Candidates are probed with the short probe timeouts; the winner is
/// reopened with the full line settings before the session starts. Ports
/// that fail to open or answer with something else are skipped, not fatal;
/// only a fully exhausted candidate list reports [`Error::NoDevice`].
/// Returns the chosen port's path alongside the session.
pub fn connect(settings: &SerialSettings, mode: Mode) -> SessionResult<(String, Ibm4<PortWrapper>)> {
    let candidates = serialport::available_ports()
        .map_err(|e| Error::Serial(Stage::Discover, IoError(e.into())))?;
    let probe_settings = SerialSettings {
        read_timeout: settings.probe_read_timeout,
        write_timeout: settings.probe_write_timeout,
        ..*settings
    };
    let names = candidates.into_iter().map(|c| c.port_name);
    let Some((path, probe_port)) =
        first_responding(names, |path| open(path, &probe_settings).ok())
    else {
        return Err(Error::NoDevice);
    };
    drop(probe_port);
    info!("found an IBM4 on {path}");
    let session = Ibm4::new(open(&path, settings)?, mode)?;
    Ok((path, session))
}

/// Walk the candidate list and stop at the first port that answers the
/// identity probe. Later candidates are never opened.
fn first_responding<T, F>(
    candidates: impl IntoIterator<Item = String>,
    mut open_candidate: F,
) -> Option<(String, T)>
where
    T: Transport,
    F: FnMut(&str) -> Option<T>,
{
    for path in candidates {
        let Some(mut port) = open_candidate(&path) else {
            debug!("{path}: could not open, skipping");
            continue;
        };
        if !probe(&mut port) {
            debug!("{path}: no IBM4 identity, skipping");
            continue;
        }
        return Some((path, port));
    }
    None
}

/// Ask an unknown port for an identity and judge the answer.
fn probe<T: Transport>(port: &mut T) -> bool {
    if port.reset_input_buffer().is_err() || port.write_all(b"*IDN\r\n").is_err() {
        return false;
    }
    let Some(response) = drain(port) else {
        return false;
    };
    let _ = port.reset_input_buffer();
    looks_like_ibm4(&String::from_utf8_lossy(&response))
}

/// Read until the port goes quiet. Unlike the session's framed read, an empty
/// answer here is just a silent port, not an error.
fn drain<T: Transport>(port: &mut T) -> Option<Vec<u8>> {
    use embedded_io::Read as _;

    let mut response = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        match port.read(&mut chunk) {
            Ok(0) => break,
            Ok(count) => response.extend_from_slice(&chunk[..count]),
            Err(e) => {
                let kind = embedded_io::Error::kind(&e);
                if kind == embedded_io::ErrorKind::TimedOut
                    || (kind == embedded_io::ErrorKind::Other && !response.is_empty())
                {
                    break;
                }
                return None;
            }
        }
    }
    Some(response)
}

/// An IBM4 echoes the probe before its identity, so a genuine answer has more
/// than two CRLF segments and the second-from-last one (the identity line)
/// carries the vendor marker.
fn looks_like_ibm4(response: &str) -> bool {
    let segments: Vec<&str> = response.split("\r\n").collect();
    segments.len() > 2
        && segments
            .get(segments.len() - 2)
            .is_some_and(|s| s.contains(IDENTITY_MARKER))
}
