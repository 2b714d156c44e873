// Licensed under the Apache-2.0 license

//! Bus unwedging.
//!
//! Devices on the bus may keep power across an EC reset and be left halfway
//! through a transaction: a peer interrupted mid-write waits for more data and
//! may be holding SDA low to ack, a peer interrupted mid-read drives data out
//! on every clock. The sequence below tries to push both back to idle:
//!
//! 1. a pseudo-stop (SDA low then high while SCL is high) to abort a write;
//! 2. if the lines were not both free, one clock for a peer stuck acking its
//!    address, then another pseudo-stop attempt;
//! 3. nine clocks so a reading peer finishes its byte and sees a NACK;
//! 4. one last pseudo-stop.
//!
//! This is a heuristic. A peer in some other state may still hold the bus and
//! the next transaction will time out and come back through error recovery.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use super::common::{LineLevels, BITBANG_DELAY_US};
use crate::syscon::ClockGated;

/// Pin control for one bus
pub trait BusLines {
    type Pin: InputPin + OutputPin;

    /// Take both lines away from the peripheral as open-drain outputs, high
    fn configure_open_drain_high(&mut self);

    /// Hand both lines back to the I2C peripheral
    fn restore_alternate_function(&mut self);

    /// `(scl, sda)`
    fn pins(&mut self) -> (&mut Self::Pin, &mut Self::Pin);
}

pub type PinError<B> = <<B as BusLines>::Pin as ErrorType>::Error;

/// Sample both lines
pub fn line_levels<B: BusLines>(lines: &mut B) -> Result<LineLevels, PinError<B>> {
    let (scl, sda) = lines.pins();
    Ok(LineLevels::new(scl.is_high()?, sda.is_high()?))
}

fn both_high<B: BusLines>(lines: &mut B) -> Result<bool, PinError<B>> {
    Ok(line_levels(lines)?.idle())
}

fn pseudo_stop<B: BusLines, D: DelayNs>(lines: &mut B, delay: &mut D) -> Result<(), PinError<B>> {
    let (_, sda) = lines.pins();
    sda.set_low()?;
    delay.delay_us(BITBANG_DELAY_US);
    sda.set_high()?;
    delay.delay_us(BITBANG_DELAY_US);
    Ok(())
}

fn clock_pulse<B: BusLines, D: DelayNs>(lines: &mut B, delay: &mut D) -> Result<(), PinError<B>> {
    let (scl, _) = lines.pins();
    scl.set_low()?;
    delay.delay_us(BITBANG_DELAY_US);
    scl.set_high()?;
    delay.delay_us(BITBANG_DELAY_US);
    Ok(())
}

/// Bit-bang the bus back to idle
///
/// Leaves both lines as released GPIO outputs; the caller restores the
/// alternate function once the peripheral is configured.
pub fn unwedge<B: BusLines, D: DelayNs>(
    lines: &mut B,
    delay: &mut D,
    _gated: &ClockGated,
) -> Result<(), PinError<B>> {
    lines.configure_open_drain_high();

    if both_high(lines)? {
        pseudo_stop(lines, delay)?;
    } else {
        clock_pulse(lines, delay)?;
        if both_high(lines)? {
            pseudo_stop(lines, delay)?;
        }
    }

    for _ in 0..9 {
        clock_pulse(lines, delay)?;
    }

    if both_high(lines)? {
        pseudo_stop(lines, delay)?;
    }

    let (scl, sda) = lines.pins();
    scl.set_high()?;
    sda.set_high()?;
    Ok(())
}
