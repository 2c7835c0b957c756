//! We use this mocking module in unit tests to emulate the IBM4 end of the
//! serial link.
//!
//! The real board stays silent until it receives a command, then writes one
//! whole response and goes quiet again. The mock reproduces that shape:
//! queued responses are released one at a time, and only after at least one
//! write has happened since the previous response was released. Reading past
//! the end of the current response reports a timeout, which is how the
//! session recognises the end of a frame.

use std::collections::VecDeque;

/// Our mock type used to emulate the device end of a serial port.
#[derive(Debug, Default)]
pub struct MockSerial {
    /// Everything written to the mock port, in order
    write_buffer: Vec<u8>,
    /// Scripted responses, released one per command
    responses: VecDeque<Vec<u8>>,
    /// Remainder of the response currently being served
    current: VecDeque<u8>,
    /// Write calls since the last response was released
    pending_writes: usize,
    /// How many times the input buffer was reset
    reset_count: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
}

#[derive(Debug)]
pub enum MockSerialError {
    /// Simulated timeout: a command was sent but no response is scripted
    Timeout,
    /// Generic simulated error for testing
    SimulatedError,
    /// Would block - no data available
    WouldBlock,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockSerialError::Timeout => write!(f, "simulated timeout"),
            MockSerialError::SimulatedError => write!(f, "simulated error"),
            MockSerialError::WouldBlock => write!(f, "would block"),
        }
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.write_buffer.extend_from_slice(buf);
        self.pending_writes += 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.current.is_empty() {
            if self.pending_writes == 0 {
                // Nothing was asked of the device, so it says nothing.
                return Err(MockSerialError::WouldBlock);
            }
            let Some(next) = self.responses.pop_front() else {
                return Err(MockSerialError::Timeout);
            };
            self.current = next.into();
            self.pending_writes = 0;
        }

        let mut count = 0;
        while count < buf.len() {
            let Some(byte) = self.current.pop_front() else {
                break;
            };
            buf[count] = byte;
            count += 1;
        }
        Ok(count)
    }
}

impl crate::Transport for MockSerial {
    /// Discards only the remainder of the in-flight response. Responses not
    /// yet released stay queued, the same way unsent device output is not in
    /// the host's input buffer yet.
    fn reset_input_buffer(&mut self) -> Result<(), Self::Error> {
        self.current.clear();
        self.reset_count += 1;
        Ok(())
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response to be released after the next command
    pub fn queue_response(&mut self, data: &[u8]) {
        self.responses.push_back(data.to_vec());
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// The written data as text, for substring assertions
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.write_buffer).into_owned()
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// How many times the input buffer has been reset
    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transport;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        let test_data = b"Read0:1\r\n";

        let result = mock.write(test_data);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), test_data.len());
        assert_eq!(mock.written_data(), test_data);
    }

    #[test]
    fn test_write_multiple_times() {
        let mut mock = MockSerial::new();
        mock.write(b"a0\r\n").unwrap();
        mock.write(b"b0\r\n").unwrap();
        assert_eq!(mock.written_data(), b"a0\r\nb0\r\n");
    }

    #[test]
    fn test_response_released_only_after_a_write() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"0.55\r\n");

        let mut buffer = [0u8; 16];
        // No command yet, so the device has nothing to say.
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::WouldBlock)
        ));

        mock.write(b"Read0:1\r\n").unwrap();
        let count = mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"0.55\r\n");
    }

    #[test]
    fn test_one_response_per_command() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"0.10\r\n");
        mock.queue_response(b"0.20\r\n");

        let mut buffer = [0u8; 16];
        mock.write(b"Average0:10\r\n").unwrap();
        let count = mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"0.10\r\n");
        // The second response stays queued until another command arrives.
        assert!(mock.read(&mut buffer).is_err());

        mock.write(b"Average1:10\r\n").unwrap();
        let count = mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"0.20\r\n");
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"0.10 0.20 0.30\r\n");
        mock.write(b"Read0:3\r\n").unwrap();

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"0.10 ");
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"0.20 ");
    }

    #[test]
    fn test_timeout_when_no_response_scripted() {
        let mut mock = MockSerial::new();
        mock.write(b"Read0:1\r\n").unwrap();

        let mut buffer = [0u8; 16];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::Timeout)
        ));
    }

    #[test]
    fn test_reset_discards_only_the_in_flight_response() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"stale tail\r\n");
        mock.queue_response(b"0.42\r\n");

        let mut buffer = [0u8; 4];
        mock.write(b"Read0:1\r\n").unwrap();
        mock.read(&mut buffer).unwrap();
        mock.reset_input_buffer().unwrap();
        assert_eq!(mock.reset_count(), 1);

        // The queued second response survives the reset.
        mock.write(b"Read1:1\r\n").unwrap();
        let mut buffer = [0u8; 16];
        let count = mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"0.42\r\n");
    }

    #[test]
    fn test_write_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);

        let result = mock.write(b"Mode0\r\n");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), MockSerialError::SimulatedError));
        assert_eq!(mock.written_data().len(), 0);
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(
            MockSerialError::Timeout.kind(),
            embedded_io::ErrorKind::TimedOut
        ));
        assert!(matches!(
            MockSerialError::SimulatedError.kind(),
            embedded_io::ErrorKind::Other
        ));
    }

    #[test]
    fn test_clear_written_data() {
        let mut mock = MockSerial::new();
        mock.write(b"*IDN\r\n").unwrap();
        assert!(!mock.written_data().is_empty());

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }
}
