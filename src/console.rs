//! Interactive console for driving an IBM4 by hand.
//!
//! One prompt per decision, driven by [`inquire`]. A failed device command is
//! printed and the menu comes back; only a broken prompt (e.g. a closed
//! terminal) ends the loop with an error. Cancelling a nested prompt returns
//! to the menu, cancelling the menu itself quits.

use inquire::{CustomType, InquireError, Select};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::Transport;
use crate::channel::{Mode, ReadChannel, WriteChannel};
use crate::session::Ibm4;
use crate::types::{ReadKind, Reading, SweepRow};

const DEFAULT_SAMPLE_COUNT: usize = 10;

/// Top-level menu entries, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum MenuAction {
    #[strum(serialize = "Identify the device")]
    Identify,
    #[strum(serialize = "Set acquisition mode")]
    SetMode,
    #[strum(serialize = "Set an output voltage")]
    WriteVoltage,
    #[strum(serialize = "Set the PWM duty cycle")]
    WritePwm,
    #[strum(serialize = "Read a channel")]
    Read,
    #[strum(serialize = "Read a differential pair")]
    DifferentialRead,
    #[strum(serialize = "Read all channels")]
    ReadAll,
    #[strum(serialize = "Run a voltage sweep")]
    Sweep,
    #[strum(serialize = "Zero all outputs")]
    ZeroOutputs,
    #[strum(serialize = "Quit")]
    Quit,
}

/// Run the menu loop until the user quits.
pub fn run<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    loop {
        let actions: Vec<MenuAction> = MenuAction::iter().collect();
        let action = match Select::new("IBM4>", actions).prompt() {
            Ok(action) => action,
            Err(InquireError::OperationCanceled) => break,
            Err(err) => return Err(err),
        };
        match action {
            MenuAction::Identify => identify(session),
            MenuAction::SetMode => set_mode(session)?,
            MenuAction::WriteVoltage => write_voltage(session)?,
            MenuAction::WritePwm => write_pwm(session)?,
            MenuAction::Read => read(session)?,
            MenuAction::DifferentialRead => differential_read(session)?,
            MenuAction::ReadAll => read_all(session)?,
            MenuAction::Sweep => sweep(session)?,
            MenuAction::ZeroOutputs => zero_outputs(session),
            MenuAction::Quit => break,
        }
    }
    Ok(())
}

/// Lift a prompt result so that cancellation means "back to the menu".
fn optional<T>(result: Result<T, InquireError>) -> Result<Option<T>, InquireError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled) => Ok(None),
        Err(err) => Err(err),
    }
}

fn identify<S: Transport>(session: &mut Ibm4<S>) {
    match session.identify() {
        Ok(identity) => println!("{identity}"),
        Err(err) => println!("identify failed: {err}"),
    }
}

fn set_mode<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let modes: Vec<Mode> = Mode::iter().collect();
    let Some(mode) = optional(Select::new("Acquisition mode:", modes).prompt())? else {
        return Ok(());
    };
    if let Err(err) = session.set_mode(mode) {
        println!("set mode failed: {err}");
    }
    Ok(())
}

fn write_voltage<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let channels: Vec<WriteChannel> = WriteChannel::iter().collect();
    let Some(channel) = optional(Select::new("Output channel:", channels).prompt())? else {
        return Ok(());
    };
    let Some(volts) = optional(
        CustomType::<f64>::new("Voltage [0.0, 3.3):")
            .with_error_message("enter a voltage in volts")
            .prompt(),
    )?
    else {
        return Ok(());
    };
    match session.write_voltage(channel, volts) {
        Ok(()) => println!("{channel} set to {volts:.2} V"),
        Err(err) => println!("write failed: {err}"),
    }
    Ok(())
}

fn write_pwm<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let Some(percent) = optional(
        CustomType::<u8>::new("Duty cycle [0, 100]:")
            .with_error_message("enter a percentage")
            .prompt(),
    )?
    else {
        return Ok(());
    };
    match session.write_pwm(percent) {
        Ok(()) => println!("PWM duty cycle set to {percent}%"),
        Err(err) => println!("write failed: {err}"),
    }
    Ok(())
}

fn prompt_read_kind() -> Result<Option<ReadKind>, InquireError> {
    let kinds: Vec<ReadKind> = ReadKind::iter().collect();
    optional(Select::new("Read variant:", kinds).prompt())
}

fn prompt_sample_count(kind: ReadKind) -> Result<Option<usize>, InquireError> {
    // Single-sample variants never ask.
    if matches!(kind, ReadKind::SingleVoltage | ReadKind::SingleBinary) {
        return Ok(Some(1));
    }
    optional(
        CustomType::<usize>::new("Sample count:")
            .with_default(DEFAULT_SAMPLE_COUNT)
            .with_error_message("enter a sample count")
            .prompt(),
    )
}

fn print_reading(reading: &Reading) {
    match reading {
        Reading::Voltage(volts) => println!("{volts:.4} V"),
        Reading::Binary(code) => println!("{code}"),
        Reading::VoltageSeries(sample) => println!(
            "{:.4} V +/- {:.4} V over {} samples",
            sample.mean,
            sample.half_range,
            sample.samples.len()
        ),
        Reading::BinarySeries(codes) => println!("{codes:?}"),
    }
}

fn read<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let channels: Vec<ReadChannel> = ReadChannel::iter().collect();
    let Some(channel) = optional(Select::new("Input channel:", channels).prompt())? else {
        return Ok(());
    };
    let Some(kind) = prompt_read_kind()? else {
        return Ok(());
    };
    let Some(sample_count) = prompt_sample_count(kind)? else {
        return Ok(());
    };
    match session.read(channel, kind, sample_count) {
        Ok(reading) => print_reading(&reading),
        Err(err) => println!("read failed: {err}"),
    }
    Ok(())
}

fn differential_read<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let channels: Vec<ReadChannel> = ReadChannel::iter().collect();
    let Some(pos) = optional(Select::new("Positive channel:", channels.clone()).prompt())? else {
        return Ok(());
    };
    let Some(neg) = optional(Select::new("Negative channel:", channels).prompt())? else {
        return Ok(());
    };
    let Some(kind) = prompt_read_kind()? else {
        return Ok(());
    };
    let Some(sample_count) = prompt_sample_count(kind)? else {
        return Ok(());
    };
    match session.differential_read(pos, neg, kind, sample_count) {
        Ok(reading) => print_reading(&reading),
        Err(err) => println!("read failed: {err}"),
    }
    Ok(())
}

fn read_all<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let Some(sample_count) = optional(
        CustomType::<usize>::new("Sample count per channel:")
            .with_default(DEFAULT_SAMPLE_COUNT)
            .with_error_message("enter a sample count")
            .prompt(),
    )?
    else {
        return Ok(());
    };
    match session.read_all_channels(sample_count) {
        Ok(readings) => {
            for (channel, volts) in readings {
                println!("{channel}: {volts:.4} V");
            }
        }
        Err(err) => println!("read failed: {err}"),
    }
    Ok(())
}

fn print_sweep_rows(rows: &[SweepRow]) {
    println!("v_set      A2         A3         A4         A5         D2");
    for row in rows {
        print!("{:<10.4}", row.v_set);
        for volts in row.inputs {
            print!(" {volts:<10.4}");
        }
        println!();
    }
}

fn sweep<S: Transport>(session: &mut Ibm4<S>) -> Result<(), InquireError> {
    let channels: Vec<WriteChannel> = WriteChannel::iter().collect();
    let Some(channel) = optional(Select::new("Channel to sweep:", channels).prompt())? else {
        return Ok(());
    };
    let Some(v_start) = optional(CustomType::<f64>::new("Start voltage:").prompt())? else {
        return Ok(());
    };
    let Some(v_stop) = optional(CustomType::<f64>::new("Stop voltage:").prompt())? else {
        return Ok(());
    };
    let Some(point_count) = optional(
        CustomType::<usize>::new("Number of points (> 3):")
            .with_error_message("enter a point count")
            .prompt(),
    )?
    else {
        return Ok(());
    };
    let Some(v_fixed) = optional(
        CustomType::<f64>::new("Fixed voltage on the other output:")
            .with_default(0.0)
            .prompt(),
    )?
    else {
        return Ok(());
    };
    let Some(samples_per_step) = optional(
        CustomType::<usize>::new("Samples per step:")
            .with_default(DEFAULT_SAMPLE_COUNT)
            .with_error_message("enter a sample count")
            .prompt(),
    )?
    else {
        return Ok(());
    };
    match session.sweep_by_bounds(channel, v_start, v_stop, point_count, v_fixed, samples_per_step)
    {
        Ok(rows) => print_sweep_rows(&rows),
        Err(err) => println!("sweep failed: {err}"),
    }
    Ok(())
}

fn zero_outputs<S: Transport>(session: &mut Ibm4<S>) {
    match session.zero_outputs() {
        Ok(()) => println!("all outputs grounded"),
        Err(err) => println!("zero outputs failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_is_the_last_menu_entry() {
        let actions: Vec<MenuAction> = MenuAction::iter().collect();
        assert_eq!(actions.last(), Some(&MenuAction::Quit));
    }

    #[test]
    fn menu_labels_are_human_readable() {
        assert_eq!(MenuAction::Identify.to_string(), "Identify the device");
        assert_eq!(MenuAction::Sweep.to_string(), "Run a voltage sweep");
    }
}
