// Licensed under the Apache-2.0 license

//! # I2C Hardware Abstraction Traits
//!
//! Drivers for devices hanging off an I2C bus (battery, PMU, sensors) are
//! written against these traits rather than a concrete port, so they run the
//! same against the STM32 peripheral and the host-side simulation.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! I2cHardwareCore (bring-up, line diagnostics)
//!     └── I2cMaster (xfer + SMBus-style register helpers)
//! ```
//!
//! The slave side is interrupt driven and lives behind
//! [`SlaveBus`](crate::i2c::slave::SlaveBus) instead.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::SevenBitAddress;

use super::common::{LineLevels, XferFlags, SMBUS_MAX_BLOCK};
use super::error::Error;
use super::port::I2cPort;
use super::recovery::{BusLines, PinError};
use super::registers::I2cRegisters;
use crate::common::Logger;
use crate::dma::DmaChannel;
use crate::syscon::PeripheralClock;
use crate::task::TaskWait;

/// Core I2C hardware interface
///
/// The foundation every port provides: bring the peripheral to a known state
/// and report the electrical state of the bus.
pub trait I2cHardwareCore {
    /// Hardware-specific error type that implements embedded-hal error traits
    type Error: embedded_hal::i2c::Error + From<Error> + Debug;

    /// Error reading the bus lines
    type PinError: Debug;

    /// Reset and configure the peripheral
    ///
    /// Unwedges the bus first when the peripheral clock was off, i.e. on
    /// first bring-up or after a hard reset.
    fn init(&mut self);

    /// Instantaneous SCL/SDA levels, for bus-health diagnostics
    ///
    /// # Errors
    ///
    /// Returns the pin driver's error if either line cannot be sampled.
    fn line_levels(&mut self) -> Result<LineLevels, Self::PinError>;
}

/// I2C Master mode operations
///
/// `xfer` is the single primitive; everything else is built on it. Register
/// helpers follow the SMBus convention of a one-byte register offset written
/// before the data, with 16-bit values little-endian.
///
/// # Examples
///
/// ```rust,no_run
/// use ec_ddk::i2c::traits::I2cMaster;
///
/// fn charger_status<T: I2cMaster>(bus: &mut T) -> Result<u8, T::Error> {
///     bus.read8(0x48, 0x04)
/// }
/// ```
pub trait I2cMaster: I2cHardwareCore {
    /// Write `out` then read into `input`, as one transaction
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if both buffers are empty or `flags` is not
    ///   [`XferFlags::SINGLE`]
    /// - `Busy` if another transaction holds the port
    /// - `Timeout(stage)` if the bus or device stalled
    fn xfer(
        &mut self,
        addr: SevenBitAddress,
        out: &[u8],
        input: &mut [u8],
        flags: XferFlags,
    ) -> Result<(), Self::Error>;

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.xfer(addr, bytes, &mut [], XferFlags::SINGLE)
    }

    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.xfer(addr, &[], buffer, XferFlags::SINGLE)
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.xfer(addr, bytes, buffer, XferFlags::SINGLE)
    }

    fn read8(&mut self, addr: SevenBitAddress, offset: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8; 1];
        self.xfer(addr, &[offset], &mut value, XferFlags::SINGLE)?;
        Ok(value[0])
    }

    fn read16(&mut self, addr: SevenBitAddress, offset: u8) -> Result<u16, Self::Error> {
        let mut value = [0u8; 2];
        self.xfer(addr, &[offset], &mut value, XferFlags::SINGLE)?;
        Ok(u16::from_le_bytes(value))
    }

    fn write8(&mut self, addr: SevenBitAddress, offset: u8, value: u8) -> Result<(), Self::Error> {
        self.xfer(addr, &[offset, value], &mut [], XferFlags::SINGLE)
    }

    fn write16(
        &mut self,
        addr: SevenBitAddress,
        offset: u8,
        value: u16,
    ) -> Result<(), Self::Error> {
        let [lo, hi] = value.to_le_bytes();
        self.xfer(addr, &[offset, lo, hi], &mut [], XferFlags::SINGLE)
    }

    /// Whether a device acknowledges a one-byte register read
    fn is_present(&mut self, addr: SevenBitAddress, offset: u8) -> bool {
        self.read8(addr, offset).is_ok()
    }

    /// SMBus block read of a string
    ///
    /// Reads a length-prefixed block from register `offset` and copies at
    /// most `data.len() - 1` characters into `data`, NUL terminated. Returns
    /// the number of characters copied.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `data` is empty or longer than an SMBus block,
    /// otherwise whatever `xfer` reports.
    fn read_string(
        &mut self,
        addr: SevenBitAddress,
        offset: u8,
        data: &mut [u8],
    ) -> Result<usize, Self::Error> {
        if data.is_empty() || data.len() > SMBUS_MAX_BLOCK {
            return Err(Error::InvalidArgument.into());
        }

        let mut block = [0u8; SMBUS_MAX_BLOCK + 1];
        self.xfer(addr, &[offset], &mut block, XferFlags::SINGLE)?;

        let len = usize::from(block[0]).min(data.len() - 1);
        let text = block.get(1..=len).unwrap_or(&[]);
        if let Some(dest) = data.get_mut(..len) {
            dest.copy_from_slice(text);
        }
        if let Some(terminator) = data.get_mut(len) {
            *terminator = 0;
        }
        Ok(len)
    }
}

impl<R, C, B, K, S, L> I2cHardwareCore for I2cPort<'_, R, C, B, K, S, L>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    type Error = Error;
    type PinError = PinError<B>;

    fn init(&mut self) {
        I2cPort::init(self);
    }

    fn line_levels(&mut self) -> Result<LineLevels, PinError<B>> {
        I2cPort::line_levels(self)
    }
}

impl<R, C, B, K, S, L> I2cMaster for I2cPort<'_, R, C, B, K, S, L>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    fn xfer(
        &mut self,
        addr: SevenBitAddress,
        out: &[u8],
        input: &mut [u8],
        flags: XferFlags,
    ) -> Result<(), Error> {
        self.transfer(addr, out, input, flags)
    }
}
