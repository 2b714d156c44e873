// Licensed under the Apache-2.0 license

//! I2C peripheral register access.
//!
//! All driver code goes through [`I2cRegisters`] so the register block can be
//! swapped for a simulation in tests.

use core::ptr::{read_volatile, write_volatile};

use super::port::PortResources;
use super::recovery::BusLines;
use crate::dma::Stm32DmaChannel;
use crate::syscon::Apb1Clock;

pub mod cr1 {
    pub const PE: u32 = 1 << 0;
    pub const START: u32 = 1 << 8;
    pub const STOP: u32 = 1 << 9;
    pub const ACK: u32 = 1 << 10;
    pub const SWRST: u32 = 1 << 15;
}

pub mod cr2 {
    pub const FREQ_MASK: u32 = 0x3f;
    pub const ITERREN: u32 = 1 << 8;
    pub const ITEVTEN: u32 = 1 << 9;
    pub const DMAEN: u32 = 1 << 11;
    pub const LAST: u32 = 1 << 12;
}

pub mod sr1 {
    pub const SB: u32 = 1 << 0;
    pub const ADDR: u32 = 1 << 1;
    pub const BTF: u32 = 1 << 2;
    pub const ADD10: u32 = 1 << 3;
    pub const STOPF: u32 = 1 << 4;
    pub const RXNE: u32 = 1 << 6;
    pub const TXE: u32 = 1 << 7;
    pub const BERR: u32 = 1 << 8;
    pub const ARLO: u32 = 1 << 9;
    pub const AF: u32 = 1 << 10;
    pub const OVR: u32 = 1 << 11;
    pub const PECERR: u32 = 1 << 12;
    pub const TIMEOUT: u32 = 1 << 14;
    /// Bits cleared by writing zero
    pub const ERRORS: u32 = 0xdf00;
}

pub mod sr2 {
    pub const MSL: u32 = 1 << 0;
    pub const BUSY: u32 = 1 << 1;
    pub const TRA: u32 = 1 << 2;
}

/// Register block of one I2C peripheral
///
/// Reads take `&self` even where hardware has read side effects (reading SR2
/// after SR1 clears `ADDR`); callers must follow the documented sequences.
pub trait I2cRegisters {
    fn cr1(&self) -> u32;
    fn set_cr1(&mut self, value: u32);
    fn cr2(&self) -> u32;
    fn set_cr2(&mut self, value: u32);
    fn oar1(&self) -> u32;
    fn set_oar1(&mut self, value: u32);
    fn oar2(&self) -> u32;
    fn dr(&self) -> u32;
    fn set_dr(&mut self, value: u32);
    fn sr1(&self) -> u32;
    fn set_sr1(&mut self, value: u32);
    fn sr2(&self) -> u32;
    fn ccr(&self) -> u32;
    fn set_ccr(&mut self, value: u32);
    fn trise(&self) -> u32;

    /// Bus address of the data register, for DMA
    fn data_register_address(&self) -> u32;

    fn modify_cr1(&mut self, f: impl FnOnce(u32) -> u32)
    where
        Self: Sized,
    {
        let value = f(self.cr1());
        self.set_cr1(value);
    }

    fn modify_cr2(&mut self, f: impl FnOnce(u32) -> u32)
    where
        Self: Sized,
    {
        let value = f(self.cr2());
        self.set_cr2(value);
    }
}

const CR1: usize = 0x00;
const CR2: usize = 0x04;
const OAR1: usize = 0x08;
const OAR2: usize = 0x0c;
const DR: usize = 0x10;
const SR1: usize = 0x14;
const SR2: usize = 0x18;
const CCR: usize = 0x1c;
const TRISE: usize = 0x20;

/// Memory-mapped STM32F1 I2C register block
#[derive(Debug)]
pub struct Stm32I2cRegs {
    base: usize,
}

impl Stm32I2cRegs {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `base` is one of the fixed I2C blocks, always mapped.
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: see `read`.
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl I2cRegisters for Stm32I2cRegs {
    fn cr1(&self) -> u32 {
        self.read(CR1)
    }
    fn set_cr1(&mut self, value: u32) {
        self.write(CR1, value);
    }
    fn cr2(&self) -> u32 {
        self.read(CR2)
    }
    fn set_cr2(&mut self, value: u32) {
        self.write(CR2, value);
    }
    fn oar1(&self) -> u32 {
        self.read(OAR1)
    }
    fn set_oar1(&mut self, value: u32) {
        self.write(OAR1, value);
    }
    fn oar2(&self) -> u32 {
        self.read(OAR2)
    }
    fn dr(&self) -> u32 {
        self.read(DR)
    }
    fn set_dr(&mut self, value: u32) {
        self.write(DR, value);
    }
    fn sr1(&self) -> u32 {
        self.read(SR1)
    }
    fn set_sr1(&mut self, value: u32) {
        self.write(SR1, value);
    }
    fn sr2(&self) -> u32 {
        self.read(SR2)
    }
    fn ccr(&self) -> u32 {
        self.read(CCR)
    }
    fn set_ccr(&mut self, value: u32) {
        self.write(CCR, value);
    }
    fn trise(&self) -> u32 {
        self.read(TRISE)
    }
    fn data_register_address(&self) -> u32 {
        (self.base + DR) as u32
    }
}

/// Fixed hardware resources of one STM32F1 I2C instance
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stm32I2cInstance {
    pub base: usize,
    pub tx_dma_channel: u8,
    pub rx_dma_channel: u8,
    pub clock: Apb1Clock,
}

impl Stm32I2cInstance {
    /// # Safety
    ///
    /// Only one handle may exist per peripheral.
    #[must_use]
    pub unsafe fn registers(&self) -> Stm32I2cRegs {
        Stm32I2cRegs { base: self.base }
    }

    /// Everything [`I2cPort::new`](super::port::I2cPort::new) needs for this
    /// instance, with the board's pins for `lines`
    ///
    /// # Safety
    ///
    /// Only one handle may exist per peripheral and per DMA channel.
    pub unsafe fn resources<B: BusLines>(
        &self,
        lines: B,
    ) -> PortResources<Stm32I2cRegs, Stm32DmaChannel, B, Apb1Clock> {
        PortResources {
            regs: self.registers(),
            tx_dma: Stm32DmaChannel::steal(self.tx_dma_channel),
            rx_dma: Stm32DmaChannel::steal(self.rx_dma_channel),
            lines,
            clock: self.clock,
        }
    }
}

macro_rules! stm32_i2c_instances {
    ($($n:literal => $base:literal, tx $tx:literal, rx $rx:literal;)*) => {
        paste::paste! {
            $(
                pub const [<I2C $n>]: Stm32I2cInstance = Stm32I2cInstance {
                    base: $base,
                    tx_dma_channel: $tx,
                    rx_dma_channel: $rx,
                    clock: Apb1Clock::[<I2C $n>],
                };
            )*
        }
    };
}

stm32_i2c_instances! {
    1 => 0x4000_5400, tx 6, rx 7;
    2 => 0x4000_5800, tx 4, rx 5;
}
