// Licensed under the Apache-2.0 license

//! Error recovery after a master transaction.

use embedded_hal::delay::DelayNs;

use super::error::Error;
use super::port::I2cPort;
use super::recovery::BusLines;
use super::registers::{cr1, sr2, I2cRegisters};
use crate::common::Logger;
use crate::dma::DmaChannel;
use crate::syscon::PeripheralClock;
use crate::task::TaskWait;
use crate::timer::Deadline;

/// Sleep between forced STOPs while waiting for the bus to idle
const STOP_RETRY_US: u32 = 1000;

impl<R, C, B, K, S, L> I2cPort<'_, R, C, B, K, S, L>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    /// Put the peripheral back in a usable state after a transaction
    ///
    /// Runs after every claimed transaction, successful or not. A claim
    /// rejection never touched the bus and is left alone.
    pub(crate) fn handle_error(&mut self, result: &Result<(), Error>) {
        if let Err(error) = result {
            if *error == Error::Busy {
                return;
            }
            self.logger.debug(format_args!(
                "i2c{}: transfer failed, code 0x{:x}",
                self.id.0,
                error.code()
            ));
            self.dump_registers();
        }
        let timed_out = matches!(result, Err(Error::Timeout(_)));

        // Clear the write-zero bits, then the read-sequence bits.
        self.regs.set_sr1(0);
        let _ = self.regs.sr1();
        let mut status2 = self.regs.sr2();

        if timed_out && self.regs.cr1() & cr1::START != 0 {
            // START never went out: the peripheral lost track of the bus,
            // most likely after a glitch on the lines.
            self.logger.warn(format_args!(
                "i2c{}: unable to send START, resetting",
                self.id.0
            ));
            self.init();
        } else {
            if timed_out && status2 & sr2::BUSY == 0 {
                self.logger
                    .warn(format_args!("i2c{}: bad BUSY bit detected", self.id.0));
                self.master_stop();
            }

            let deadline = Deadline::after(&mut self.sched, self.config.master_timeout);
            while status2 & sr2::BUSY != 0 {
                if deadline.expired(self.sched.now()) {
                    self.logger.error(format_args!(
                        "i2c{}: bus never idled, reinitializing",
                        self.id.0
                    ));
                    self.dump_registers();
                    self.init();
                    break;
                }
                self.master_stop();
                self.sched.usleep(STOP_RETRY_US);
                status2 = self.regs.sr2();
            }
        }

        self.regs.set_cr1(cr1::ACK | cr1::PE);
    }
}
