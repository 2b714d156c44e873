// Licensed under the Apache-2.0 license

//! Host-side simulation of one STM32F1 I2C instance with its DMA channels,
//! bus lines, clock gate and scheduler, plus the devices and host master on
//! the other end of the wire. Every side effect lands in one ordered log.

use core::convert::Infallible;
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use super::common::I2cConfig;
use super::lock::ClaimToken;
use super::port::{I2cPort, PortResources};
use super::recovery::BusLines;
use super::registers::{cr1, cr2, sr1, sr2, I2cRegisters};
use crate::common::test_logger::RecordingLogger;
use crate::dma::{DmaChannel, DmaOption};
use crate::i2c::common::PortId;
use crate::syscon::PeripheralClock;
use crate::task::{TaskEvent, TaskWait};
use crate::timer::{Duration, Instant, Timebase};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    Cr1,
    Cr2,
    Oar1,
    Dr,
    Sr1,
    Ccr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Chan {
    Tx,
    Rx,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PinOp {
    OpenDrainHigh,
    AlternateFunction,
    SclLow,
    SclHigh,
    SdaLow,
    SdaHigh,
    Delay(u32),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Write(Reg, u32),
    DmaConfigure(Chan, u16),
    DmaEnable(Chan),
    DmaDisable(Chan),
    Pin(PinOp),
    ClockEnable,
}

#[derive(Default)]
struct ChannelState {
    memory: Option<*mut u8>,
    remaining: u16,
    enabled: bool,
    complete: bool,
    irq: bool,
    configures: usize,
}

struct Device {
    addr: u8,
    memory: [u8; 256],
    pointer: u8,
    fresh: bool,
    ack_after_resets: u32,
    nack_holds_busy: bool,
    written: Vec<u8>,
}

impl Device {
    fn write(&mut self, byte: u8) {
        self.written.push(byte);
        if self.fresh {
            self.pointer = byte;
            self.fresh = false;
        } else {
            self.memory[usize::from(self.pointer)] = byte;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read(&mut self) -> u8 {
        let byte = self.memory[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        byte
    }
}

#[derive(Default)]
struct State {
    cr1: u32,
    cr2: u32,
    oar1: u32,
    dr_in: u8,
    sr1: u32,
    sr2: u32,
    ccr: u32,
    clock_enabled: bool,
    resets: u32,
    now: u64,
    log: Vec<Event>,
    tx: ChannelState,
    rx: ChannelState,
    devices: Vec<Device>,
    target: Option<(usize, bool)>,
    start_stuck: bool,
    stop_stuck: bool,
    busy_latched: bool,
    host_stalls: bool,
    scl_out: bool,
    sda_out: bool,
    sda_hold_clocks: u32,
    host_rx: Vec<u8>,
}

impl State {
    fn channel(&mut self, chan: Chan) -> &mut ChannelState {
        match chan {
            Chan::Tx => &mut self.tx,
            Chan::Rx => &mut self.rx,
        }
    }

    fn reset(&mut self) {
        self.cr1 = cr1::SWRST;
        self.cr2 = 0;
        self.sr1 = 0;
        self.sr2 = 0;
        self.target = None;
        self.start_stuck = false;
        self.stop_stuck = false;
        self.busy_latched = false;
        self.resets += 1;
    }

    fn write_cr1(&mut self, value: u32) {
        self.log.push(Event::Write(Reg::Cr1, value));
        if value & cr1::SWRST != 0 {
            self.reset();
            return;
        }
        self.cr1 = value;
        self.sr1 &= !sr1::STOPF;
        if value & cr1::START != 0 && !self.start_stuck {
            self.cr1 &= !cr1::START;
            self.sr1 |= sr1::SB;
            self.sr2 |= sr2::MSL | sr2::BUSY;
        }
        if value & cr1::STOP != 0 && !self.stop_stuck {
            self.cr1 &= !cr1::STOP;
            self.sr1 &= sr1::RXNE;
            self.sr2 &= !sr2::MSL;
            if !self.busy_latched {
                self.sr2 &= !sr2::BUSY;
            }
            self.target = None;
        }
    }

    fn write_cr2(&mut self, value: u32) {
        self.log.push(Event::Write(Reg::Cr2, value));
        let rising = value & !self.cr2;
        self.cr2 = value;
        let slave_transmitter = self.sr2 & sr2::TRA != 0 && self.sr2 & sr2::MSL == 0;
        if rising & cr2::DMAEN != 0 && slave_transmitter && self.tx.enabled && !self.host_stalls {
            let bytes = self.drain_tx();
            self.host_rx.extend(bytes);
        }
    }

    fn drain_tx(&mut self) -> Vec<u8> {
        let mut bytes = Vec::new();
        if let Some(ptr) = self.tx.memory {
            for i in 0..usize::from(self.tx.remaining) {
                // SAFETY: the driver keeps the source buffer alive until cancel.
                bytes.push(unsafe { *ptr.add(i) });
            }
        }
        self.tx.remaining = 0;
        self.tx.complete = true;
        bytes
    }

    fn write_dr(&mut self, value: u32) {
        self.log.push(Event::Write(Reg::Dr, value));
        if self.sr1 & sr1::SB != 0 {
            self.sr1 &= !sr1::SB;
            let addr = ((value >> 1) & 0x7f) as u8;
            let read = value & 1 != 0;
            let resets = self.resets;
            let found = self.devices.iter().position(|d| d.addr == addr);
            match found {
                Some(idx) if resets >= self.devices[idx].ack_after_resets => {
                    self.devices[idx].fresh = !read;
                    self.target = Some((idx, read));
                    self.sr1 |= sr1::ADDR;
                }
                other => {
                    self.sr1 |= sr1::AF;
                    if other.is_some_and(|idx| self.devices[idx].nack_holds_busy) {
                        self.busy_latched = true;
                    }
                }
            }
        } else if self.sr2 & sr2::TRA != 0 && self.sr2 & sr2::MSL == 0 {
            self.host_rx.push(value as u8);
        }
    }

    fn read_sr2(&mut self) -> u32 {
        let value = self.sr2;
        if self.sr1 & sr1::ADDR != 0 {
            self.sr1 &= !sr1::ADDR;
            if self.sr2 & sr2::MSL != 0 {
                self.run_master_data_phase();
            }
        }
        value
    }

    fn run_master_data_phase(&mut self) {
        let Some((idx, read)) = self.target else {
            return;
        };
        let dma = self.cr2 & cr2::DMAEN != 0;
        if !read {
            if dma && self.tx.enabled {
                let bytes = self.drain_tx();
                for byte in bytes {
                    self.devices[idx].write(byte);
                }
            }
            self.sr1 |= sr1::TXE | sr1::BTF;
        } else if dma && self.rx.enabled {
            if let Some(ptr) = self.rx.memory {
                for i in 0..usize::from(self.rx.remaining) {
                    let byte = self.devices[idx].read();
                    // SAFETY: the driver keeps the destination alive until cancel.
                    unsafe { *ptr.add(i) = byte };
                }
            }
            self.rx.remaining = 0;
            self.rx.complete = true;
        } else {
            self.dr_in = self.devices[idx].read();
            self.sr1 |= sr1::RXNE;
        }
    }
}

/// Handle to one simulated port and its surroundings
#[derive(Clone)]
pub struct Sim {
    state: Rc<RefCell<State>>,
    logger: RecordingLogger,
}

impl Sim {
    pub fn new() -> Self {
        let state = State {
            scl_out: true,
            sda_out: true,
            ..State::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            logger: RecordingLogger::default(),
        }
    }

    pub fn regs(&self) -> MockRegs {
        MockRegs { sim: self.clone() }
    }

    pub fn dma(&self, chan: Chan) -> MockDma {
        MockDma {
            sim: self.clone(),
            chan,
        }
    }

    pub fn sched(&self) -> MockSched {
        MockSched { sim: self.clone() }
    }

    pub fn delay(&self) -> MockSched {
        self.sched()
    }

    pub fn clock(&self) -> MockClock {
        MockClock { sim: self.clone() }
    }

    pub fn lines(&self) -> MockLines {
        MockLines {
            sim: self.clone(),
            scl: MockPin {
                sim: self.clone(),
                scl: true,
            },
            sda: MockPin {
                sim: self.clone(),
                scl: false,
            },
        }
    }

    pub fn logger(&self) -> RecordingLogger {
        self.logger.clone()
    }

    /// Port wired to this simulation
    pub fn port<'a>(
        &self,
        config: I2cConfig,
        claim: &'a ClaimToken,
    ) -> I2cPort<'a, MockRegs, MockDma, MockLines, MockClock, MockSched, RecordingLogger> {
        I2cPort::new(
            PortId(1),
            config,
            PortResources {
                regs: self.regs(),
                tx_dma: self.dma(Chan::Tx),
                rx_dma: self.dma(Chan::Rx),
                lines: self.lines(),
                clock: self.clock(),
            },
            self.sched(),
            claim,
            self.logger(),
        )
    }

    pub fn add_device(&self, addr: u8) {
        self.state.borrow_mut().devices.push(Device {
            addr,
            memory: [0; 256],
            pointer: 0,
            fresh: false,
            ack_after_resets: 0,
            nack_holds_busy: false,
            written: Vec::new(),
        });
    }

    fn with_device<T>(&self, addr: u8, f: impl FnOnce(&mut Device) -> T) -> T {
        let mut state = self.state.borrow_mut();
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.addr == addr)
            .expect("unknown device");
        f(device)
    }

    pub fn set_memory(&self, addr: u8, offset: u8, bytes: &[u8]) {
        self.with_device(addr, |d| {
            for (i, b) in bytes.iter().enumerate() {
                d.memory[usize::from(offset) + i] = *b;
            }
        });
    }

    pub fn memory(&self, addr: u8, offset: u8, len: usize) -> Vec<u8> {
        self.with_device(addr, |d| {
            d.memory[usize::from(offset)..usize::from(offset) + len].to_vec()
        })
    }

    pub fn written(&self, addr: u8) -> Vec<u8> {
        self.with_device(addr, |d| d.written.clone())
    }

    /// Device NACKs its address until the peripheral has seen `resets` resets
    pub fn ack_after_resets(&self, addr: u8, resets: u32) {
        self.with_device(addr, |d| d.ack_after_resets = resets);
    }

    /// A NACK from this device leaves BUSY set until the next reset
    pub fn nack_holds_busy(&self, addr: u8) {
        self.with_device(addr, |d| d.nack_holds_busy = true);
    }

    pub fn set_start_stuck(&self, stuck: bool) {
        self.state.borrow_mut().start_stuck = stuck;
    }

    pub fn set_stop_stuck(&self, stuck: bool) {
        self.state.borrow_mut().stop_stuck = stuck;
    }

    pub fn set_host_stalls(&self, stalls: bool) {
        self.state.borrow_mut().host_stalls = stalls;
    }

    pub fn set_clock_enabled(&self, enabled: bool) {
        self.state.borrow_mut().clock_enabled = enabled;
    }

    pub fn hold_sda_low_for_clocks(&self, clocks: u32) {
        self.state.borrow_mut().sda_hold_clocks = clocks;
    }

    pub fn raise_sr1(&self, bits: u32) {
        self.state.borrow_mut().sr1 |= bits;
    }

    pub fn set_sr2(&self, bits: u32) {
        self.state.borrow_mut().sr2 = bits;
    }

    pub fn sr1(&self) -> u32 {
        self.state.borrow().sr1
    }

    pub fn cr1(&self) -> u32 {
        self.state.borrow().cr1
    }

    pub fn cr2(&self) -> u32 {
        self.state.borrow().cr2
    }

    pub fn resets(&self) -> u32 {
        self.state.borrow().resets
    }

    pub fn now(&self) -> u64 {
        self.state.borrow().now
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().log.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().log.clear();
    }

    pub fn pin_ops(&self) -> Vec<PinOp> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Pin(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    pub fn dma_configures(&self, chan: Chan) -> usize {
        self.state.borrow_mut().channel(chan).configures
    }

    // Upstream host master, talking to us as a slave.

    pub fn host_write_begin(&self) {
        let mut state = self.state.borrow_mut();
        state.sr1 |= sr1::ADDR;
        state.sr2 = (state.sr2 & !sr2::TRA) | sr2::BUSY;
    }

    pub fn host_send(&self, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        if state.cr2 & cr2::DMAEN == 0 || !state.rx.enabled {
            return;
        }
        let Some(ptr) = state.rx.memory else {
            return;
        };
        let count = bytes.len().min(usize::from(state.rx.remaining));
        for (i, b) in bytes.iter().take(count).enumerate() {
            // SAFETY: the slave keeps its request buffer in place while armed.
            unsafe { *ptr.add(i) = *b };
        }
        state.rx.memory = Some(unsafe { ptr.add(count) });
        state.rx.remaining -= count as u16;
        if state.rx.remaining == 0 {
            state.rx.complete = true;
        }
    }

    pub fn host_stop(&self) {
        let mut state = self.state.borrow_mut();
        state.sr1 = (state.sr1 | sr1::STOPF) & !sr1::TXE;
        state.sr2 &= !(sr2::BUSY | sr2::TRA);
    }

    pub fn host_read_begin(&self) {
        let mut state = self.state.borrow_mut();
        state.sr1 |= sr1::ADDR | sr1::TXE;
        state.sr2 |= sr2::TRA | sr2::BUSY;
    }

    /// Bytes the host has clocked out of us
    pub fn host_received(&self) -> Vec<u8> {
        self.state.borrow().host_rx.clone()
    }
}

pub struct MockRegs {
    sim: Sim,
}

impl MockRegs {
    fn state(&self) -> std::cell::RefMut<'_, State> {
        self.sim.state.borrow_mut()
    }
}

impl I2cRegisters for MockRegs {
    fn cr1(&self) -> u32 {
        self.state().cr1
    }
    fn set_cr1(&mut self, value: u32) {
        self.state().write_cr1(value);
    }
    fn cr2(&self) -> u32 {
        self.state().cr2
    }
    fn set_cr2(&mut self, value: u32) {
        self.state().write_cr2(value);
    }
    fn oar1(&self) -> u32 {
        self.state().oar1
    }
    fn set_oar1(&mut self, value: u32) {
        let mut state = self.state();
        state.log.push(Event::Write(Reg::Oar1, value));
        state.oar1 = value;
    }
    fn oar2(&self) -> u32 {
        0
    }
    fn dr(&self) -> u32 {
        let mut state = self.state();
        state.sr1 &= !sr1::RXNE;
        u32::from(state.dr_in)
    }
    fn set_dr(&mut self, value: u32) {
        self.state().write_dr(value);
    }
    fn sr1(&self) -> u32 {
        self.state().sr1
    }
    fn set_sr1(&mut self, value: u32) {
        let mut state = self.state();
        state.log.push(Event::Write(Reg::Sr1, value));
        state.sr1 &= value | !sr1::ERRORS;
    }
    fn sr2(&self) -> u32 {
        self.state().read_sr2()
    }
    fn ccr(&self) -> u32 {
        self.state().ccr
    }
    fn set_ccr(&mut self, value: u32) {
        let mut state = self.state();
        state.log.push(Event::Write(Reg::Ccr, value));
        state.ccr = value;
    }
    fn trise(&self) -> u32 {
        0
    }
    fn data_register_address(&self) -> u32 {
        0x4000_5810
    }
}

pub struct MockDma {
    sim: Sim,
    chan: Chan,
}

impl DmaChannel for MockDma {
    unsafe fn configure(&mut self, _option: &DmaOption, memory: *mut u8, len: u16) {
        let mut state = self.sim.state.borrow_mut();
        state.log.push(Event::DmaConfigure(self.chan, len));
        let channel = state.channel(self.chan);
        channel.memory = Some(memory);
        channel.remaining = len;
        channel.configures += 1;
    }

    fn enable(&mut self) {
        let mut state = self.sim.state.borrow_mut();
        state.log.push(Event::DmaEnable(self.chan));
        state.channel(self.chan).enabled = true;
    }

    fn disable(&mut self) {
        let mut state = self.sim.state.borrow_mut();
        state.log.push(Event::DmaDisable(self.chan));
        state.channel(self.chan).enabled = false;
    }

    fn is_complete(&self) -> bool {
        self.sim.state.borrow_mut().channel(self.chan).complete
    }

    fn clear_complete(&mut self) {
        self.sim.state.borrow_mut().channel(self.chan).complete = false;
    }

    fn set_complete_interrupt(&mut self, enabled: bool) {
        self.sim.state.borrow_mut().channel(self.chan).irq = enabled;
    }

    fn remaining(&self) -> u16 {
        self.sim.state.borrow_mut().channel(self.chan).remaining
    }
}

/// Scheduler clock: every `now` call costs a microsecond
pub struct MockSched {
    sim: Sim,
}

impl Timebase for MockSched {
    fn now(&mut self) -> Instant {
        let mut state = self.sim.state.borrow_mut();
        state.now += 1;
        Instant::from_ticks(state.now)
    }

    fn usleep(&mut self, us: u32) {
        self.sim.state.borrow_mut().now += u64::from(us);
    }
}

impl TaskWait for MockSched {
    fn wait_event(&mut self, timeout: Duration) -> TaskEvent {
        let mut state = self.sim.state.borrow_mut();
        let woken = (state.tx.irq && state.tx.complete) || (state.rx.irq && state.rx.complete);
        if woken {
            state.now += 1;
            TaskEvent::Woken
        } else {
            state.now += timeout.ticks();
            TaskEvent::TimedOut
        }
    }
}

impl DelayNs for MockSched {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        let mut state = self.sim.state.borrow_mut();
        state.log.push(Event::Pin(PinOp::Delay(us)));
        state.now += u64::from(us);
    }
}

pub struct MockClock {
    sim: Sim,
}

impl PeripheralClock for MockClock {
    fn is_enabled(&self) -> bool {
        self.sim.state.borrow().clock_enabled
    }

    fn enable(&mut self) {
        let mut state = self.sim.state.borrow_mut();
        state.log.push(Event::ClockEnable);
        state.clock_enabled = true;
    }

    fn disable(&mut self) {
        self.sim.state.borrow_mut().clock_enabled = false;
    }
}

pub struct MockPin {
    sim: Sim,
    scl: bool,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut state = self.sim.state.borrow_mut();
        if self.scl {
            state.log.push(Event::Pin(PinOp::SclLow));
            state.scl_out = false;
            state.sda_hold_clocks = state.sda_hold_clocks.saturating_sub(1);
        } else {
            state.log.push(Event::Pin(PinOp::SdaLow));
            state.sda_out = false;
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut state = self.sim.state.borrow_mut();
        if self.scl {
            state.log.push(Event::Pin(PinOp::SclHigh));
            state.scl_out = true;
        } else {
            state.log.push(Event::Pin(PinOp::SdaHigh));
            state.sda_out = true;
        }
        Ok(())
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let state = self.sim.state.borrow();
        Ok(if self.scl {
            state.scl_out
        } else {
            state.sda_out && state.sda_hold_clocks == 0
        })
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

pub struct MockLines {
    sim: Sim,
    scl: MockPin,
    sda: MockPin,
}

impl BusLines for MockLines {
    type Pin = MockPin;

    fn configure_open_drain_high(&mut self) {
        let mut state = self.sim.state.borrow_mut();
        state.log.push(Event::Pin(PinOp::OpenDrainHigh));
        state.scl_out = true;
        state.sda_out = true;
    }

    fn restore_alternate_function(&mut self) {
        self.sim
            .state
            .borrow_mut()
            .log
            .push(Event::Pin(PinOp::AlternateFunction));
    }

    fn pins(&mut self) -> (&mut MockPin, &mut MockPin) {
        (&mut self.scl, &mut self.sda)
    }
}
