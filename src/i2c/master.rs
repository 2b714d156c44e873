// Licensed under the Apache-2.0 license

//! Master transaction engine.
//!
//! A transaction is an optional write phase followed by an optional read
//! phase, framed by a single START/STOP pair (repeated START in between).
//! Both phases move data by DMA, except a one-byte read which is too small to
//! be worth arming a channel for and is taken straight from the data register.

use embedded_hal::delay::DelayNs;

use super::common::XferFlags;
use super::error::{Error, WaitStage};
use super::port::I2cPort;
use super::recovery::BusLines;
use super::registers::{cr2, sr1, I2cRegisters};
use crate::common::Logger;
use crate::dma::DmaChannel;
use crate::syscon::PeripheralClock;
use crate::task::TaskWait;

impl<R, C, B, K, S, L> I2cPort<'_, R, C, B, K, S, L>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    /// Write `out` then read into `input` from the 7-bit `address`
    ///
    /// Fails with [`Error::Busy`] without touching the hardware if another
    /// transaction holds the port. Every other failure has been through error
    /// recovery by the time it is returned.
    pub fn transfer(
        &mut self,
        address: u8,
        out: &[u8],
        input: &mut [u8],
        flags: XferFlags,
    ) -> Result<(), Error> {
        if flags != XferFlags::SINGLE || (out.is_empty() && input.is_empty()) {
            return Err(Error::InvalidArgument);
        }
        let (Ok(out_len), Ok(in_len)) = (u16::try_from(out.len()), u16::try_from(input.len()))
        else {
            return Err(Error::InvalidArgument);
        };
        if !self.config.role.is_master() {
            return Err(Error::Unsupported);
        }
        if !self.claim.claim() {
            return Err(Error::Busy);
        }

        self.disable_interrupt();

        let address = address & 0x7f;
        let mut result = Ok(());
        if out_len > 0 {
            result = self.master_transmit(address, out, out_len, in_len == 0);
        }
        if result.is_ok() && in_len > 0 {
            result = self.master_receive(address, input, in_len);
        }
        self.handle_error(&result);

        self.enable_interrupt();
        self.claim.release();

        result
    }

    fn master_transmit(
        &mut self,
        address: u8,
        data: &[u8],
        len: u16,
        stop: bool,
    ) -> Result<(), Error> {
        self.disable_ack();

        // SAFETY: the channel only reads from `data`, which outlives the
        // `cancel` below.
        unsafe { self.tx_dma.prepare(data.as_ptr().cast_mut(), len) };
        self.tx_dma.start();
        self.regs.modify_cr2(|v| v | cr2::DMAEN);

        let result = self.master_start(address << 1).and_then(|()| {
            self.tx_dma
                .wait(&mut self.sched, self.config.dma_timeout, WaitStage::DmaTransmit)
                .into_result()
        });

        self.tx_dma.cancel();
        self.regs.modify_cr2(|v| v & !cr2::DMAEN);
        result?;

        self.wait_status(sr1::BTF, WaitStage::ByteTransmitted)?;

        if stop {
            self.master_stop();
            self.wait_until_stop_sent()?;
        }
        Ok(())
    }

    fn master_receive(&mut self, address: u8, data: &mut [u8], len: u16) -> Result<(), Error> {
        let address_byte = (address << 1) | 1;

        if len > 1 {
            self.enable_ack();
            // SAFETY: `data` is exclusively borrowed until after `cancel`.
            unsafe { self.rx_dma.prepare(data.as_mut_ptr(), len) };
            self.rx_dma.start();
            // LAST makes the peripheral NACK the final DMA byte.
            self.regs.modify_cr2(|v| v | cr2::DMAEN | cr2::LAST);

            let result = self.master_start(address_byte).and_then(|()| {
                self.rx_dma
                    .wait(&mut self.sched, self.config.dma_timeout, WaitStage::DmaReceive)
                    .into_result()
            });

            self.rx_dma.cancel();
            self.regs.modify_cr2(|v| v & !(cr2::DMAEN | cr2::LAST));
            self.disable_ack();
            result?;

            self.master_stop();
        } else {
            self.disable_ack();
            self.master_start(address_byte)?;
            self.master_stop();
            self.wait_status(sr1::RXNE, WaitStage::ReceiveNotEmpty)?;
            if let Some(byte) = data.first_mut() {
                *byte = (self.regs.dr() & 0xff) as u8;
            }
        }

        self.wait_until_stop_sent()
    }
}
