//! The device session: one open [`Transport`] to one IBM4.

use core::ops::Range;
use std::thread;
use std::time::Duration;

use embedded_io::Error as _;
use log::{debug, info, trace};
use strum::IntoEnumIterator;

use crate::Transport;
use crate::channel::{Mode, PwmChannel, ReadChannel, WriteChannel};
use crate::error::{Error, Result, Stage, Violation};
use crate::sweep::SweepInterval;
use crate::types::{ReadKind, Reading, ReadingSample, SweepRow};

/// Minimum output voltage the IBM4 can source.
pub const V_MIN: f64 = 0.0;
/// Maximum output voltage. The bound is exclusive: the DAC cannot reach the
/// top of its rail exactly, so a request of exactly 3.3 V is rejected.
pub const V_MAX: f64 = 3.3;
/// Vendor marker every IBM4 identity string contains.
pub const IDENTITY_MARKER: &str = "ISBY";
/// Settle time between setting a sweep voltage and reading the inputs.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

const TERMINATOR: &str = "\r\n";
/// Multi-sample reads accept `2 < n < 10000`.
const SAMPLE_COUNT_RANGE: Range<usize> = 3..10_000;
/// Sweeps cap the per-step averaging count harder, `3 < n < 103`, because a
/// sweep already takes O(steps) time.
const SWEEP_SAMPLE_RANGE: Range<usize> = 4..103;

/// A session with one IBM4 over any [`Transport`].
///
/// `L` bounds the response line buffer; the default comfortably holds the
/// largest averaged multi-sample response the firmware produces.
///
/// Construction runs the opening sequence (set mode, zero outputs, reset the
/// input buffer); any failure there reports the error and no session is
/// handed out. [`Ibm4::close`] releases the device deterministically and is
/// idempotent; dropping the session closes it as a backstop.
pub struct Ibm4<S: Transport, const L: usize = 4096> {
    interface: S,
    mode: Mode,
    settle_delay: Duration,
    open: bool,
}

impl<S: Transport, const L: usize> Ibm4<S, L> {
    /// Open a session over an already-connected transport.
    ///
    /// The analog outputs float at arbitrary values when the board powers up,
    /// so the opening sequence grounds every output before the caller gets to
    /// issue commands.
    pub fn new(interface: S, mode: Mode) -> Result<Self, S::Error> {
        let mut session = Self {
            interface,
            mode,
            settle_delay: DEFAULT_SETTLE_DELAY,
            open: true,
        };
        if let Err(err) = session.initialise(mode) {
            session.open = false;
            return Err(err);
        }
        Ok(session)
    }

    fn initialise(&mut self, mode: Mode) -> Result<(), S::Error> {
        self.set_mode(mode)?;
        self.ground_outputs()?;
        self.reset_input()
    }

    /// Whether the session is usable. False only after [`Ibm4::close`] or a
    /// failed opening sequence.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The acquisition mode set at open time (or re-set since).
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Settle delay applied between a sweep step's write and its read.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Override the sweep settle delay (defaults to [`DEFAULT_SETTLE_DELAY`]).
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    /// Zero outputs and release the session. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), S::Error> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.ground_outputs()
    }

    // -- writing to the device ------------------------------------------------

    /// Select the acquisition mode for the analog inputs.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), S::Error> {
        self.ensure_open()?;
        self.send(&format!("Mode{}{TERMINATOR}", mode.code()))?;
        self.reset_input()?;
        self.mode = mode;
        debug!("acquisition mode set to {mode}");
        Ok(())
    }

    /// Source `volts` on an analog output channel.
    ///
    /// Fire-and-forget: the device sends no acknowledgement, correctness
    /// relies on the transport's write timeout.
    pub fn write_voltage(&mut self, channel: WriteChannel, volts: f64) -> Result<(), S::Error> {
        let mut violations = self.base_violations();
        if !(V_MIN..V_MAX).contains(&volts) {
            violations.push(Violation::VoltageOutOfRange);
        }
        Self::checked(violations)?;
        self.send(&format!("Write{}:{volts:.2}{TERMINATOR}", channel.code()))
    }

    /// Set the PWM duty cycle in percent.
    ///
    /// The enhancement board routes PWM through D9, so the target pin is
    /// fixed. Fire-and-forget like [`Ibm4::write_voltage`].
    pub fn write_pwm(&mut self, percent: u8) -> Result<(), S::Error> {
        let mut violations = self.base_violations();
        if percent > 100 {
            violations.push(Violation::PercentageOutOfRange);
        }
        Self::checked(violations)?;
        self.send(&format!("PWM{}:{percent}{TERMINATOR}", PwmChannel::D9.code()))
    }

    /// Ground both analog outputs and every PWM pin.
    pub fn zero_outputs(&mut self) -> Result<(), S::Error> {
        self.ensure_open()?;
        self.ground_outputs()
    }

    fn ground_outputs(&mut self) -> Result<(), S::Error> {
        // Analog outputs first, then each PWM pin.
        self.send(&format!("a0{TERMINATOR}"))?;
        self.send(&format!("b0{TERMINATOR}"))?;
        for pin in PwmChannel::iter() {
            self.send(&format!("PWM{}:0{TERMINATOR}", pin.code()))?;
        }
        Ok(())
    }

    /// Query the identity string, e.g. `ISBY-UCC-RevA.2`.
    pub fn identify(&mut self) -> Result<String, S::Error> {
        self.ensure_open()?;
        self.reset_input()?;
        self.send(&format!("*IDN{TERMINATOR}"))?;
        let raw = self.read_response()?;
        self.reset_input()?;
        let text = String::from_utf8_lossy(&raw);
        // The board echoes the command, so the identity is the last complete
        // CRLF-terminated line of the response.
        text.rsplit(TERMINATOR)
            .nth(1)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .ok_or(Error::MalformedIdentity)
    }

    // -- single-ended reads ---------------------------------------------------

    /// One voltage sample from a read channel.
    pub fn read_single_voltage(&mut self, channel: ReadChannel) -> Result<f64, S::Error> {
        Self::checked(self.base_violations())?;
        let vals = self.exchange_voltages(&format!("Read{}:1{TERMINATOR}", channel.code()), 1)?;
        Ok(vals[0])
    }

    /// One raw converter code from a read channel.
    pub fn read_single_binary(&mut self, channel: ReadChannel) -> Result<i32, S::Error> {
        Self::checked(self.base_violations())?;
        let vals = self.exchange_binaries(&format!("BRead{}:1{TERMINATOR}", channel.code()), 1)?;
        Ok(vals[0])
    }

    /// `sample_count` voltage samples, aggregated into mean and half-range.
    pub fn read_multiple_voltage(
        &mut self,
        channel: ReadChannel,
        sample_count: usize,
    ) -> Result<ReadingSample, S::Error> {
        let mut violations = self.base_violations();
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        let cmd = format!("Read{}:{sample_count}{TERMINATOR}", channel.code());
        let samples = self.exchange_voltages(&cmd, sample_count)?;
        Ok(ReadingSample::from_samples(samples))
    }

    /// `sample_count` raw converter codes.
    pub fn read_multiple_binary(
        &mut self,
        channel: ReadChannel,
        sample_count: usize,
    ) -> Result<Vec<i32>, S::Error> {
        let mut violations = self.base_violations();
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        let cmd = format!("BRead{}:{sample_count}{TERMINATOR}", channel.code());
        self.exchange_binaries(&cmd, sample_count)
    }

    /// Mean of `sample_count` samples, averaged on the board itself; only the
    /// single returned scalar is parsed on the host.
    pub fn read_average_voltage(
        &mut self,
        channel: ReadChannel,
        sample_count: usize,
    ) -> Result<f64, S::Error> {
        let mut violations = self.base_violations();
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        let cmd = format!("Average{}:{sample_count}{TERMINATOR}", channel.code());
        let vals = self.exchange_voltages(&cmd, 1)?;
        Ok(vals[0])
    }

    /// Single entry point over the five read variants.
    ///
    /// A thin dispatcher: each arm delegates to the corresponding direct
    /// method, so both paths behave identically. Single kinds ignore
    /// `sample_count`.
    pub fn read(
        &mut self,
        channel: ReadChannel,
        kind: ReadKind,
        sample_count: usize,
    ) -> Result<Reading, S::Error> {
        match kind {
            ReadKind::SingleVoltage => self.read_single_voltage(channel).map(Reading::Voltage),
            ReadKind::MultipleVoltage => self
                .read_multiple_voltage(channel, sample_count)
                .map(Reading::VoltageSeries),
            ReadKind::AverageVoltage => self
                .read_average_voltage(channel, sample_count)
                .map(Reading::Voltage),
            ReadKind::SingleBinary => self.read_single_binary(channel).map(Reading::Binary),
            ReadKind::MultipleBinary => self
                .read_multiple_binary(channel, sample_count)
                .map(Reading::BinarySeries),
        }
    }

    /// One averaged read per read channel, in registry order.
    ///
    /// Not atomic across channels: a channel may change between samples.
    pub fn read_all_channels(
        &mut self,
        sample_count: usize,
    ) -> Result<Vec<(ReadChannel, f64)>, S::Error> {
        let mut violations = self.base_violations();
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        ReadChannel::iter()
            .map(|channel| {
                self.read_average_voltage(channel, sample_count)
                    .map(|volts| (channel, volts))
            })
            .collect()
    }

    // -- differential reads ---------------------------------------------------

    /// One differential voltage sample between two distinct read channels.
    pub fn diff_read_single(
        &mut self,
        pos: ReadChannel,
        neg: ReadChannel,
    ) -> Result<f64, S::Error> {
        let mut violations = self.base_violations();
        Self::check_distinct(pos, neg, &mut violations);
        Self::checked(violations)?;
        let cmd = format!("Diff_Read{}:{}:1{TERMINATOR}", pos.code(), neg.code());
        let vals = self.exchange_voltages(&cmd, 1)?;
        Ok(vals[0])
    }

    /// One differential raw converter code.
    pub fn diff_read_single_binary(
        &mut self,
        pos: ReadChannel,
        neg: ReadChannel,
    ) -> Result<i32, S::Error> {
        let mut violations = self.base_violations();
        Self::check_distinct(pos, neg, &mut violations);
        Self::checked(violations)?;
        let cmd = format!("Diff_BRead{}:{}:1{TERMINATOR}", pos.code(), neg.code());
        let vals = self.exchange_binaries(&cmd, 1)?;
        Ok(vals[0])
    }

    /// `sample_count` differential voltage samples, aggregated.
    pub fn diff_read_multiple(
        &mut self,
        pos: ReadChannel,
        neg: ReadChannel,
        sample_count: usize,
    ) -> Result<ReadingSample, S::Error> {
        let mut violations = self.base_violations();
        Self::check_distinct(pos, neg, &mut violations);
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        let cmd = format!(
            "Diff_Read{}:{}:{sample_count}{TERMINATOR}",
            pos.code(),
            neg.code()
        );
        let samples = self.exchange_voltages(&cmd, sample_count)?;
        Ok(ReadingSample::from_samples(samples))
    }

    /// `sample_count` differential raw converter codes.
    pub fn diff_read_multiple_binary(
        &mut self,
        pos: ReadChannel,
        neg: ReadChannel,
        sample_count: usize,
    ) -> Result<Vec<i32>, S::Error> {
        let mut violations = self.base_violations();
        Self::check_distinct(pos, neg, &mut violations);
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        let cmd = format!(
            "Diff_BRead{}:{}:{sample_count}{TERMINATOR}",
            pos.code(),
            neg.code()
        );
        self.exchange_binaries(&cmd, sample_count)
    }

    /// On-board average of `sample_count` differential samples.
    pub fn diff_read_average(
        &mut self,
        pos: ReadChannel,
        neg: ReadChannel,
        sample_count: usize,
    ) -> Result<f64, S::Error> {
        let mut violations = self.base_violations();
        Self::check_distinct(pos, neg, &mut violations);
        Self::check_sample_count(sample_count, &mut violations);
        Self::checked(violations)?;
        let cmd = format!(
            "Diff_Average{}:{}:{sample_count}{TERMINATOR}",
            pos.code(),
            neg.code()
        );
        let vals = self.exchange_voltages(&cmd, 1)?;
        Ok(vals[0])
    }

    /// Dispatcher over the five differential variants, mirroring
    /// [`Ibm4::read`].
    pub fn differential_read(
        &mut self,
        pos: ReadChannel,
        neg: ReadChannel,
        kind: ReadKind,
        sample_count: usize,
    ) -> Result<Reading, S::Error> {
        match kind {
            ReadKind::SingleVoltage => self.diff_read_single(pos, neg).map(Reading::Voltage),
            ReadKind::MultipleVoltage => self
                .diff_read_multiple(pos, neg, sample_count)
                .map(Reading::VoltageSeries),
            ReadKind::AverageVoltage => self
                .diff_read_average(pos, neg, sample_count)
                .map(Reading::Voltage),
            ReadKind::SingleBinary => self.diff_read_single_binary(pos, neg).map(Reading::Binary),
            ReadKind::MultipleBinary => self
                .diff_read_multiple_binary(pos, neg, sample_count)
                .map(Reading::BinarySeries),
        }
    }

    // -- linear sweeps --------------------------------------------------------

    /// Sweep one analog output over `interval` while the other holds
    /// `v_fixed`, reading all inputs at every step.
    ///
    /// Steps run while `v_set < interval.stop()`; with the step floor clamp
    /// the final step may fall short of (or overshoot past) the stop value.
    /// A failure at any step discards the rows collected so far. On
    /// completion the outputs are grounded; this is the only operation that
    /// zeroes outputs after a successful sequence.
    // @TODO two-channel nested sweep (outer loop over v_fixed) for BJT
    // characterisation, with a helper to unpack the per-step channel blocks.
    pub fn sweep_by_interval(
        &mut self,
        channel: WriteChannel,
        interval: &SweepInterval,
        v_fixed: f64,
        samples_per_step: usize,
    ) -> Result<Vec<SweepRow>, S::Error> {
        let mut violations = self.base_violations();
        if !(V_MIN..V_MAX).contains(&v_fixed) {
            violations.push(Violation::FixedVoltageOutOfRange);
        }
        if !SWEEP_SAMPLE_RANGE.contains(&samples_per_step) {
            violations.push(Violation::SweepSampleCountOutOfRange);
        }
        Self::checked(violations)?;

        self.write_voltage(channel.other(), v_fixed)?;
        info!("sweeping voltage on analog output {channel}");
        let mut rows = Vec::new();
        let mut v_set = interval.start();
        while v_set < interval.stop() {
            self.write_voltage(channel, v_set)?;
            thread::sleep(self.settle_delay);
            let readings = self.read_all_channels(samples_per_step)?;
            let mut inputs = [0.0_f64; 5];
            for (slot, (_, volts)) in inputs.iter_mut().zip(readings) {
                *slot = volts;
            }
            trace!("sweep step v_set = {v_set:.3} V");
            rows.push(SweepRow { v_set, inputs });
            v_set += interval.step();
        }
        info!("sweep complete after {} steps", rows.len());
        self.ground_outputs()?;
        Ok(rows)
    }

    /// Sweep by explicit bounds: builds the [`SweepInterval`] internally and
    /// delegates to [`Ibm4::sweep_by_interval`].
    pub fn sweep_by_bounds(
        &mut self,
        channel: WriteChannel,
        v_start: f64,
        v_stop: f64,
        point_count: usize,
        v_fixed: f64,
        samples_per_step: usize,
    ) -> Result<Vec<SweepRow>, S::Error> {
        let mut violations = Vec::new();
        let lo = v_start.min(v_stop);
        let hi = v_start.max(v_stop);
        if !(V_MIN..V_MAX).contains(&lo) || !(V_MIN..V_MAX).contains(&hi) {
            violations.push(Violation::SweepBoundsOutOfRange);
        }
        match SweepInterval::new(point_count, v_start, v_stop) {
            Ok(interval) if violations.is_empty() => {
                self.sweep_by_interval(channel, &interval, v_fixed, samples_per_step)
            }
            Ok(_) => Err(Error::Validation(violations)),
            Err(invalid) => {
                violations.extend(invalid.0);
                Err(Error::Validation(violations))
            }
        }
    }

    // -- framing and parsing --------------------------------------------------

    fn ensure_open(&self) -> Result<(), S::Error> {
        Self::checked(self.base_violations())
    }

    fn base_violations(&self) -> Vec<Violation> {
        if self.open {
            Vec::new()
        } else {
            vec![Violation::NotOpen]
        }
    }

    fn checked(violations: Vec<Violation>) -> Result<(), S::Error> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }

    fn check_sample_count(sample_count: usize, violations: &mut Vec<Violation>) {
        if !SAMPLE_COUNT_RANGE.contains(&sample_count) {
            violations.push(Violation::SampleCountOutOfRange);
        }
    }

    fn check_distinct(pos: ReadChannel, neg: ReadChannel, violations: &mut Vec<Violation>) {
        if pos == neg {
            violations.push(Violation::IdenticalChannels);
        }
    }

    fn send(&mut self, cmd: &str) -> Result<(), S::Error> {
        trace!("-> {}", cmd.trim_end());
        self.interface
            .write_all(cmd.as_bytes())
            .map_err(|e| Error::Serial(Stage::Write, e))
    }

    fn reset_input(&mut self) -> Result<(), S::Error> {
        self.interface
            .reset_input_buffer()
            .map_err(|e| Error::Serial(Stage::Read, e))
    }

    /// Drain one response off the transport.
    ///
    /// The board writes its whole response promptly and then goes quiet, so a
    /// read timeout with data already in hand marks the end of the exchange.
    /// The buffer may hold several CRLF-separated segments (command echo
    /// before the payload); the token-window parse accounts for that.
    fn read_response(&mut self) -> Result<heapless::Vec<u8, L>, S::Error> {
        let mut line: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            match self.interface.read(&mut chunk) {
                Ok(0) => break,
                Ok(count) => {
                    if line.extend_from_slice(&chunk[..count]).is_err() {
                        return Err(Error::BufferOverrun);
                    }
                }
                Err(e) => {
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::TimedOut | embedded_io::ErrorKind::Other
                    ) && !line.is_empty()
                    {
                        break;
                    }
                    return Err(Error::Serial(Stage::Read, e));
                }
            }
        }
        Ok(line)
    }

    /// Send `cmd`, then keep the last `wanted` numeric tokens of the response.
    ///
    /// Tokens ahead of that window are command echo and protocol noise. Fewer
    /// tokens than `wanted` is a fatal parse failure for the call, never a
    /// short result. The input buffer is reset after every exchange so the
    /// next command starts from a clean frame boundary.
    fn exchange(&mut self, cmd: &str, wanted: usize) -> Result<Vec<String>, S::Error> {
        self.send(cmd)?;
        let raw = self.read_response()?;
        self.reset_input()?;
        let text = String::from_utf8_lossy(&raw);
        let tokens = numeric_tokens(&text);
        let got = tokens.len();
        if got < wanted {
            return Err(Error::ShortResponse { wanted, got });
        }
        Ok(tokens[got - wanted..]
            .iter()
            .map(|token| (*token).to_owned())
            .collect())
    }

    fn exchange_voltages(&mut self, cmd: &str, wanted: usize) -> Result<Vec<f64>, S::Error> {
        self.exchange(cmd, wanted)?
            .iter()
            .map(|token| token.parse::<f64>().map_err(|_| Error::InvalidToken))
            .collect()
    }

    fn exchange_binaries(&mut self, cmd: &str, wanted: usize) -> Result<Vec<i32>, S::Error> {
        self.exchange(cmd, wanted)?
            .iter()
            .map(|token| token.parse::<i32>().map_err(|_| Error::InvalidToken))
            .collect()
    }
}

impl<S: Transport, const L: usize> Drop for Ibm4<S, L> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Scan `text` for numeric tokens matching `[-+]?digits[.digits*]`.
///
/// Everything else (letters, separators, stray signs) is skipped; digits
/// embedded in identifiers count as tokens, which is why callers only trust
/// the trailing window of the token list.
fn numeric_tokens(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let mut j = i;
        if bytes[j] == b'+' || bytes[j] == b'-' {
            j += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j == digits_start {
            // No digits after an optional sign: not a token, move on.
            i = start + 1;
            continue;
        }
        if j < bytes.len() && bytes[j] == b'.' {
            j += 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
        }
        tokens.push(&text[start..j]);
        i = j;
    }
    tokens
}
