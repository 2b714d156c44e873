// Licensed under the Apache-2.0 license

//! embedded-hal front end for an I2C master port.
//!
//! Lets off-the-shelf device drivers written against `embedded_hal::i2c::I2c`
//! run on any [`I2cMaster`]. The port only issues complete transactions, so
//! `transaction` accepts an optional write followed by an optional read.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::XferFlags;
use crate::i2c::error::Error;
use crate::i2c::traits::I2cMaster;
use embedded_hal::i2c::{Operation, SevenBitAddress};

pub struct I2cController<H: I2cMaster, L: Logger = NoOpLogger> {
    pub hardware: H,
    pub logger: L,
}

impl<H: I2cMaster> I2cController<H> {
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            logger: NoOpLogger,
        }
    }
}

impl<H: I2cMaster, L: Logger> I2cController<H, L> {
    pub fn with_logger(hardware: H, logger: L) -> Self {
        Self { hardware, logger }
    }

    pub fn into_inner(self) -> H {
        self.hardware
    }

    fn run(
        &mut self,
        addr: SevenBitAddress,
        out: &[u8],
        input: &mut [u8],
    ) -> Result<(), H::Error> {
        let result = self.hardware.xfer(addr, out, input, XferFlags::SINGLE);
        if let Err(error) = &result {
            self.logger.debug(format_args!(
                "i2c: 0x{addr:02x} w{} r{} failed: {error:?}",
                out.len(),
                input.len()
            ));
        }
        result
    }
}

impl<H: I2cMaster, L: Logger> embedded_hal::i2c::ErrorType for I2cController<H, L> {
    type Error = H::Error;
}

impl<H: I2cMaster, L: Logger> embedded_hal::i2c::I2c for I2cController<H, L> {
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.run(addr, &[], buffer)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.run(addr, bytes, &mut [])
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.run(addr, bytes, buffer)
    }

    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        match operations {
            [] => Ok(()),
            [Operation::Write(bytes)] => self.run(addr, bytes, &mut []),
            [Operation::Read(buffer)] => self.run(addr, &[], buffer),
            [Operation::Write(bytes), Operation::Read(buffer)] => self.run(addr, bytes, buffer),
            _ => Err(Error::InvalidArgument.into()),
        }
    }
}
