// Licensed under the Apache-2.0 license

//! Peripheral clock gating.

use core::ptr::{read_volatile, write_volatile};

/// Clock gate of a single peripheral
pub trait PeripheralClock {
    fn is_enabled(&self) -> bool;

    fn enable(&mut self);

    fn disable(&mut self);
}

/// Proof that a peripheral clock was observed gated off
///
/// Bit-banging the bus pins races with the peripheral unless its clock is
/// stopped, so the recovery routine demands one of these.
#[derive(Debug)]
pub struct ClockGated {
    _private: (),
}

impl ClockGated {
    /// Returns the proof only if `clock` is currently disabled
    pub fn confirm<C: PeripheralClock + ?Sized>(clock: &C) -> Option<Self> {
        if clock.is_enabled() {
            None
        } else {
            Some(Self { _private: () })
        }
    }
}

const RCC_BASE: usize = 0x4002_1000;
const RCC_APB1ENR: usize = RCC_BASE + 0x1c;

/// APB1 clock enable bit on STM32F1
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Apb1Clock {
    bit: u32,
}

impl Apb1Clock {
    pub const I2C1: Self = Self { bit: 1 << 21 };
    pub const I2C2: Self = Self { bit: 1 << 22 };

    fn read() -> u32 {
        // SAFETY: RCC_APB1ENR is a valid, always-mapped register on STM32F1.
        unsafe { read_volatile(RCC_APB1ENR as *const u32) }
    }

    fn write(value: u32) {
        // SAFETY: see `read`.
        unsafe { write_volatile(RCC_APB1ENR as *mut u32, value) }
    }
}

impl PeripheralClock for Apb1Clock {
    fn is_enabled(&self) -> bool {
        Self::read() & self.bit != 0
    }

    fn enable(&mut self) {
        Self::write(Self::read() | self.bit);
    }

    fn disable(&mut self) {
        Self::write(Self::read() & !self.bit);
    }
}
