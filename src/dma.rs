// Licensed under the Apache-2.0 license

//! DMA transfer helper.
//!
//! A [`Dma`] owns one channel bound to a fixed direction and peripheral data
//! register. Completion can be observed three ways:
//!
//! - [`Dma::poll`] checks the transfer-complete flag once (`nb` style);
//! - [`Dma::poll_until`] spins on it against a deadline and is the only wait
//!   allowed from interrupt context;
//! - [`Dma::wait`] enables the transfer-complete interrupt and suspends the
//!   calling task, so it is task context only.
//!
//! [`Dma::cancel`] is idempotent and leaves the channel ready for another
//! [`Dma::prepare`].

use core::convert::Infallible;
use core::ptr::{read_volatile, write_volatile};

use crate::i2c::error::{WaitOutcome, WaitStage};
use crate::task::{TaskEvent, TaskWait};
use crate::timer::{Deadline, Duration, Timebase};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    MemoryToPeripheral,
    PeripheralToMemory,
}

/// Fixed binding of a channel to a peripheral data register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DmaOption {
    pub direction: Direction,
    pub peripheral_addr: u32,
}

/// Raw DMA channel operations
pub trait DmaChannel {
    /// Program the channel without enabling it
    ///
    /// # Safety
    ///
    /// `memory` must be valid for `len` bytes of access in `direction` until
    /// the channel is disabled again.
    unsafe fn configure(&mut self, option: &DmaOption, memory: *mut u8, len: u16);

    fn enable(&mut self);

    fn disable(&mut self);

    fn is_complete(&self) -> bool;

    fn clear_complete(&mut self);

    fn set_complete_interrupt(&mut self, enabled: bool);

    /// Transfers still outstanding
    fn remaining(&self) -> u16;
}

pub struct Dma<C: DmaChannel> {
    channel: C,
    option: DmaOption,
    len: u16,
}

impl<C: DmaChannel> Dma<C> {
    pub fn new(channel: C, option: DmaOption) -> Self {
        Self {
            channel,
            option,
            len: 0,
        }
    }

    pub fn option(&self) -> &DmaOption {
        &self.option
    }

    /// Arm the channel for `len` bytes at `memory`
    ///
    /// # Safety
    ///
    /// `memory` must stay valid for `len` bytes until [`Dma::cancel`] runs.
    pub unsafe fn prepare(&mut self, memory: *mut u8, len: u16) {
        self.channel.disable();
        self.channel.clear_complete();
        self.channel.configure(&self.option, memory, len);
        self.len = len;
    }

    pub fn start(&mut self) {
        self.channel.enable();
    }

    pub fn poll(&self) -> nb::Result<(), Infallible> {
        if self.channel.is_complete() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Spin until the transfer completes or `timeout` elapses
    pub fn poll_until<T: Timebase + ?Sized>(
        &mut self,
        clock: &mut T,
        timeout: Duration,
        stage: WaitStage,
    ) -> WaitOutcome {
        let deadline = Deadline::after(clock, timeout);
        loop {
            if self.poll().is_ok() {
                return WaitOutcome::Done;
            }
            if deadline.expired(clock.now()) {
                return WaitOutcome::TimedOut(stage);
            }
        }
    }

    /// Suspend the calling task until the transfer completes or `timeout`
    /// elapses
    pub fn wait<T: TaskWait + ?Sized>(
        &mut self,
        task: &mut T,
        timeout: Duration,
        stage: WaitStage,
    ) -> WaitOutcome {
        debug_assert!(!crate::task::in_interrupt_context());
        let deadline = Deadline::after(task, timeout);
        self.channel.set_complete_interrupt(true);
        let outcome = loop {
            if self.poll().is_ok() {
                break WaitOutcome::Done;
            }
            let now = task.now();
            if deadline.expired(now) {
                break WaitOutcome::TimedOut(stage);
            }
            if task.wait_event(deadline.remaining(now)) == TaskEvent::TimedOut {
                // A completion racing the timeout still counts.
                break if self.poll().is_ok() {
                    WaitOutcome::Done
                } else {
                    WaitOutcome::TimedOut(stage)
                };
            }
        };
        self.channel.set_complete_interrupt(false);
        outcome
    }

    pub fn cancel(&mut self) {
        self.channel.disable();
        self.channel.clear_complete();
        self.channel.set_complete_interrupt(false);
    }

    /// Bytes moved since the last `prepare`
    pub fn transferred(&self) -> u16 {
        self.len.saturating_sub(self.channel.remaining())
    }
}

const DMA1_BASE: usize = 0x4002_0000;
const DMA_ISR: usize = DMA1_BASE;
const DMA_IFCR: usize = DMA1_BASE + 0x04;

const CCR_EN: u32 = 1 << 0;
const CCR_TCIE: u32 = 1 << 1;
const CCR_DIR: u32 = 1 << 4;
const CCR_MINC: u32 = 1 << 7;
const CCR_PSIZE_16: u32 = 1 << 8;

/// STM32F1 DMA1 channel (1-based index)
#[derive(Debug)]
pub struct Stm32DmaChannel {
    index: u8,
}

impl Stm32DmaChannel {
    /// # Safety
    ///
    /// Only one handle may exist per hardware channel.
    #[must_use]
    pub const unsafe fn steal(index: u8) -> Self {
        Self { index }
    }

    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        let n = usize::from(self.index.saturating_sub(1));
        (DMA1_BASE + 0x08 + 20 * n + offset) as *mut u32
    }

    fn ccr(&self) -> u32 {
        // SAFETY: channel registers are always mapped.
        unsafe { read_volatile(self.reg(0x00)) }
    }

    fn set_ccr(&mut self, value: u32) {
        // SAFETY: channel registers are always mapped.
        unsafe { write_volatile(self.reg(0x00), value) }
    }

    fn flag_shift(&self) -> u32 {
        4 * u32::from(self.index.saturating_sub(1))
    }
}

impl DmaChannel for Stm32DmaChannel {
    unsafe fn configure(&mut self, option: &DmaOption, memory: *mut u8, len: u16) {
        self.set_ccr(0);
        write_volatile(self.reg(0x04), u32::from(len));
        write_volatile(self.reg(0x08), option.peripheral_addr);
        write_volatile(self.reg(0x0c), memory as u32);
        let mut ccr = CCR_MINC | CCR_PSIZE_16;
        if option.direction == Direction::MemoryToPeripheral {
            ccr |= CCR_DIR;
        }
        self.set_ccr(ccr);
    }

    fn enable(&mut self) {
        let ccr = self.ccr();
        self.set_ccr(ccr | CCR_EN);
    }

    fn disable(&mut self) {
        let ccr = self.ccr();
        self.set_ccr(ccr & !CCR_EN);
    }

    fn is_complete(&self) -> bool {
        // SAFETY: DMA_ISR is always mapped.
        let isr = unsafe { read_volatile(DMA_ISR as *const u32) };
        isr & (1 << (self.flag_shift() + 1)) != 0
    }

    fn clear_complete(&mut self) {
        // SAFETY: DMA_IFCR is write-one-to-clear and always mapped.
        unsafe { write_volatile(DMA_IFCR as *mut u32, 1 << self.flag_shift()) }
    }

    fn set_complete_interrupt(&mut self, enabled: bool) {
        let ccr = self.ccr();
        self.set_ccr(if enabled { ccr | CCR_TCIE } else { ccr & !CCR_TCIE });
    }

    fn remaining(&self) -> u16 {
        // SAFETY: channel registers are always mapped.
        let cndtr = unsafe { read_volatile(self.reg(0x04)) };
        (cndtr & 0xffff) as u16
    }
}
