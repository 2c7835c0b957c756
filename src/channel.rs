//! This module defines the channel and mode registries of the IBM4.
//!
//! Labels map to the wire codes the firmware expects. The three channel
//! namespaces are disjoint, so an operation taking a [`ReadChannel`] can never
//! be handed a write or PWM pin; parsing a label only succeeds in its own
//! namespace.

use strum_macros::{Display, EnumIter, EnumString};

/// Analog/digital input pins usable for voltage measurement.
///
/// Declaration order is the registry order used by all-channel reads and
/// sweep rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[repr(u8)]
pub enum ReadChannel {
    A2 = 0,
    A3 = 1,
    A4 = 2,
    A5 = 3,
    D2 = 4,
}

impl ReadChannel {
    /// The integer code used on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Analog output pins usable to source a voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[repr(u8)]
pub enum WriteChannel {
    A0 = 0,
    A1 = 1,
}

impl WriteChannel {
    /// The integer code used on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// The write channel that is NOT this one; a sweep holds it at a fixed
    /// voltage while this one steps.
    pub const fn other(self) -> Self {
        match self {
            WriteChannel::A0 => WriteChannel::A1,
            WriteChannel::A1 => WriteChannel::A0,
        }
    }
}

/// Digital pins usable for PWM duty-cycle output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[repr(u8)]
pub enum PwmChannel {
    D5 = 5,
    D7 = 7,
    D9 = 9,
    D10 = 10,
    D11 = 11,
    D12 = 12,
    D13 = 13,
}

impl PwmChannel {
    /// The integer code used on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Acquisition mode of the analog inputs.
///
/// * `Dc` - inputs in the range [0, 3.3).
/// * `Ac` - inputs in the range [-8, +8]; requires the BP2UP board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[repr(u8)]
pub enum Mode {
    #[strum(serialize = "DC")]
    Dc = 0,
    #[strum(serialize = "AC")]
    Ac = 1,
}

impl Mode {
    /// The integer code used on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn wire_codes_match_the_firmware_tables() {
        assert_eq!(ReadChannel::A2.code(), 0);
        assert_eq!(ReadChannel::D2.code(), 4);
        assert_eq!(WriteChannel::A0.code(), 0);
        assert_eq!(WriteChannel::A1.code(), 1);
        assert_eq!(PwmChannel::D9.code(), 9);
        assert_eq!(PwmChannel::D13.code(), 13);
        assert_eq!(Mode::Dc.code(), 0);
        assert_eq!(Mode::Ac.code(), 1);
    }

    #[test]
    fn labels_parse_only_in_their_own_namespace() {
        assert_eq!("A2".parse::<ReadChannel>(), Ok(ReadChannel::A2));
        assert_eq!("A0".parse::<WriteChannel>(), Ok(WriteChannel::A0));
        assert!("A0".parse::<ReadChannel>().is_err());
        assert!("A2".parse::<WriteChannel>().is_err());
        assert!("D9".parse::<ReadChannel>().is_err());
        assert!("D2".parse::<PwmChannel>().is_err());
    }

    #[test]
    fn registry_order_is_declaration_order() {
        let order: Vec<ReadChannel> = ReadChannel::iter().collect();
        assert_eq!(
            order,
            [
                ReadChannel::A2,
                ReadChannel::A3,
                ReadChannel::A4,
                ReadChannel::A5,
                ReadChannel::D2,
            ]
        );
    }

    #[test]
    fn mode_labels_round_trip() {
        assert_eq!(Mode::Dc.to_string(), "DC");
        assert_eq!("AC".parse::<Mode>(), Ok(Mode::Ac));
        assert!("dc".parse::<Mode>().is_err());
    }

    #[test]
    fn sweep_partner_channel() {
        assert_eq!(WriteChannel::A0.other(), WriteChannel::A1);
        assert_eq!(WriteChannel::A1.other(), WriteChannel::A0);
    }
}
