// Licensed under the Apache-2.0 license

//! Slave command server.
//!
//! The host writes a request packet and then reads the response back, either
//! as two transactions or with a repeated START in between. Reception runs by
//! DMA into a fixed buffer, armed when the host addresses us for writing. The
//! request becomes pending once the host stops writing (STOP, or a repeated
//! START addressing us for reading). The first transmit-empty event after
//! that runs the command and sends the framed response.
//!
//! Interrupt handlers only reach the hardware through [`SlaveBus`].
//!
//! The receive buffer is `'static` and handed to the server once, so the DMA
//! target stays put however the server itself is moved. The port is shared
//! with task code through a [`RefCell`]: on a [`PortRole::Both`] port, master
//! transactions borrow it between host exchanges.
//!
//! [`PortRole::Both`]: super::common::PortRole::Both

use core::cell::RefCell;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use super::common::SPURIOUS_READ_BYTE;
use super::error::{WaitOutcome, WaitStage};
use super::port::I2cPort;
use super::recovery::BusLines;
use super::registers::{cr2, sr1, I2cRegisters};
use super::status::StatusSnapshot;
use crate::common::Logger;
use crate::dma::DmaChannel;
use crate::host_cmd::{
    decode_request, encode_response, Framing, HostCommandHandler, HostResult, MAX_PARAM_SIZE,
    MAX_REQUEST_SIZE, MAX_RESPONSE_SIZE,
};
use crate::irq::{I2cIrq, InterruptHandler};
use crate::syscon::PeripheralClock;
use crate::task::TaskWait;

/// Hardware operations available to slave interrupt handlers
pub trait SlaveBus {
    /// Snapshot SR1/SR2 and clear what reading clears
    fn snapshot_and_clear(&mut self) -> StatusSnapshot;

    /// Record SR1 for an error interrupt without disturbing SR2
    fn capture_error_status(&mut self) -> u32;

    fn read_sr2(&mut self) -> u32;

    /// Clear the write-zero error flags in SR1
    fn clear_errors(&mut self);

    /// Finish the STOPF clear sequence
    fn clear_stop_detected(&mut self);

    /// Arm reception of up to `len` bytes into `buffer`
    ///
    /// # Safety
    ///
    /// `buffer` must stay valid, and not move, until [`SlaveBus::stop_rx`].
    unsafe fn start_rx(&mut self, buffer: *mut u8, len: u16);

    /// Stop reception, returning the number of bytes received
    fn stop_rx(&mut self) -> usize;

    fn write_data(&mut self, byte: u8);

    /// Send `data` to the host; never suspends
    fn transmit(&mut self, data: &[u8]) -> WaitOutcome;

    fn logger(&mut self) -> &mut dyn Logger;
}

impl<R, C, B, K, S, L> SlaveBus for I2cPort<'_, R, C, B, K, S, L>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    fn snapshot_and_clear(&mut self) -> StatusSnapshot {
        self.status.snapshot_and_clear(&mut self.regs)
    }

    fn capture_error_status(&mut self) -> u32 {
        self.status.capture_sr1(&self.regs)
    }

    fn read_sr2(&mut self) -> u32 {
        self.regs.sr2()
    }

    fn clear_errors(&mut self) {
        let status = self.regs.sr1();
        self.regs.set_sr1(status & !sr1::ERRORS);
    }

    fn clear_stop_detected(&mut self) {
        let _ = self.regs.sr1();
        let value = self.regs.cr1();
        self.regs.set_cr1(value);
    }

    unsafe fn start_rx(&mut self, buffer: *mut u8, len: u16) {
        self.rx_dma.prepare(buffer, len);
        self.rx_dma.start();
        self.regs.modify_cr2(|v| v | cr2::DMAEN);
    }

    fn stop_rx(&mut self) -> usize {
        let received = usize::from(self.rx_dma.transferred());
        self.rx_dma.cancel();
        self.regs.modify_cr2(|v| v & !cr2::DMAEN);
        received
    }

    fn write_data(&mut self, byte: u8) {
        self.regs.set_dr(u32::from(byte));
    }

    fn transmit(&mut self, data: &[u8]) -> WaitOutcome {
        let Ok(len) = u16::try_from(data.len()) else {
            return WaitOutcome::TimedOut(WaitStage::SlaveTransmit);
        };

        // Keep the TXE event from firing again mid-transfer.
        self.disable_interrupt();
        self.enable_ack();

        // SAFETY: the channel only reads `data`, and is cancelled before
        // this function returns.
        unsafe { self.tx_dma.prepare(data.as_ptr().cast_mut(), len) };
        self.tx_dma.start();
        self.regs.modify_cr2(|v| v | cr2::DMAEN);

        let outcome = self.tx_dma.poll_until(
            &mut self.sched,
            self.config.slave_timeout,
            WaitStage::SlaveTransmit,
        );

        self.tx_dma.cancel();
        self.regs.modify_cr2(|v| v & !cr2::DMAEN);

        if !outcome.is_done() {
            self.logger.error(format_args!(
                "i2c{}: slave response timeout, resetting",
                self.id.0
            ));
            self.init();
        }

        self.enable_interrupt();
        outcome
    }

    fn logger(&mut self) -> &mut dyn Logger {
        &mut self.logger
    }
}

/// Where the server is in a request/response exchange
///
/// Dispatch and response both happen inside the one transmit-empty event
/// that finds a request pending, with the server mutably borrowed, so they
/// never show up as states of their own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    Receiving,
    Pending,
}

/// Host command server for one slave port
pub struct SlaveServer<H: HostCommandHandler> {
    handler: H,
    state: SlaveState,
    request: &'static mut [u8; MAX_REQUEST_SIZE],
    received: usize,
    response: Vec<u8, MAX_RESPONSE_SIZE>,
}

impl<H: HostCommandHandler> SlaveServer<H> {
    /// Server receiving into `request`
    ///
    /// On target the buffer usually comes from `cortex_m::singleton!`.
    pub fn new(request: &'static mut [u8; MAX_REQUEST_SIZE], handler: H) -> Self {
        Self {
            handler,
            state: SlaveState::Idle,
            request,
            received: 0,
            response: Vec::new(),
        }
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Last response staged for the host
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    /// Event interrupt
    pub fn on_event<P: SlaveBus + ?Sized>(&mut self, bus: &mut P) {
        let status = bus.snapshot_and_clear();

        if status.master_mode() {
            bus.logger()
                .warn(format_args!("i2c slave ISR triggered in master mode, ignoring"));
            return;
        }

        if status.address_matched() {
            if status.transmitter() {
                // Repeated START for the read: the write phase is over.
                self.finish_receive(bus);
            } else {
                // A new request replaces any pending one.
                let len = MAX_REQUEST_SIZE as u16;
                // SAFETY: the buffer is `'static` and exclusively ours, so it
                // outlives the transfer wherever the server moves; we only
                // read it again after `stop_rx`.
                unsafe { bus.start_rx(self.request.as_mut_ptr(), len) };
                self.received = 0;
                self.state = SlaveState::Receiving;
            }
        } else if status.stop_detected() {
            if !status.transmitter() {
                self.finish_receive(bus);
            }
            bus.clear_stop_detected();
        }

        if status.tx_empty() {
            if self.state == SlaveState::Pending {
                self.process_command();
                if !bus.transmit(&self.response).is_done() {
                    bus.logger().warn(format_args!(
                        "i2c slave: response of {} bytes not collected",
                        self.response.len()
                    ));
                }
                self.state = SlaveState::Idle;
            } else {
                bus.write_data(SPURIOUS_READ_BYTE);
            }
        }
    }

    /// Error interrupt
    pub fn on_error<P: SlaveBus + ?Sized>(&mut self, bus: &mut P) {
        handle_error_interrupt(bus);
    }

    /// Disarm a receive in flight, dropping the partial request
    pub fn abort<P: SlaveBus + ?Sized>(&mut self, bus: &mut P) {
        if self.state == SlaveState::Receiving {
            bus.stop_rx();
        }
        self.received = 0;
        self.state = SlaveState::Idle;
    }

    fn finish_receive<P: SlaveBus + ?Sized>(&mut self, bus: &mut P) {
        if self.state == SlaveState::Receiving {
            self.received = bus.stop_rx();
            self.state = SlaveState::Pending;
        }
    }

    /// Decode the pending request, run it and stage the framed response
    fn process_command(&mut self) {
        let frame = self.request.get(..self.received).unwrap_or(&[]);
        let mut payload: Vec<u8, MAX_PARAM_SIZE> = Vec::new();

        let (framing, result) = match decode_request(frame) {
            Ok(request) => {
                let mut result = self.handler.execute(&request, &mut payload);
                if !request.checksum_valid {
                    result = HostResult::InvalidChecksum;
                    payload.clear();
                }
                (request.framing, result)
            }
            Err(error) => (error.framing, error.result),
        };

        if encode_response(framing, result, &payload, &mut self.response).is_err() {
            let _ = encode_response(
                Framing::Versioned,
                HostResult::ResponseTooBig,
                &[],
                &mut self.response,
            );
        }
    }
}

/// Error interrupt: a NACK ends every host read and is expected, anything
/// else is logged
pub fn handle_error_interrupt<P: SlaveBus + ?Sized>(bus: &mut P) {
    let status = bus.capture_error_status();
    if status & sr1::AF == 0 {
        let status2 = bus.read_sr2();
        bus.logger().error(format_args!(
            "i2c error irq: SR1=0x{status:04x} SR2=0x{status2:04x}"
        ));
    }
    bus.clear_errors();
}

/// Slave port and its server, ready to bind in an [`IrqTable`](crate::irq::IrqTable)
///
/// Task code keeps its own `&RefCell` to the port. While it holds the borrow
/// (a master transaction, which also masks the port's interrupts) events are
/// left to the hardware; the port is in master mode and the slave side has
/// nothing to do.
pub struct SlaveBinding<'p, P: SlaveBus, H: HostCommandHandler> {
    bus: &'p RefCell<P>,
    server: SlaveServer<H>,
}

impl<'p, P: SlaveBus, H: HostCommandHandler> SlaveBinding<'p, P, H> {
    pub fn new(bus: &'p RefCell<P>, server: SlaveServer<H>) -> Self {
        Self { bus, server }
    }

    pub fn server(&self) -> &SlaveServer<H> {
        &self.server
    }
}

impl<P: SlaveBus, H: HostCommandHandler> InterruptHandler for SlaveBinding<'_, P, H> {
    fn handle(&mut self, irq: I2cIrq) {
        let Ok(mut bus) = self.bus.try_borrow_mut() else {
            return;
        };
        match irq {
            I2cIrq::Event => self.server.on_event(&mut *bus),
            I2cIrq::Error => self.server.on_error(&mut *bus),
        }
    }
}

impl<P: SlaveBus, H: HostCommandHandler> Drop for SlaveBinding<'_, P, H> {
    fn drop(&mut self) {
        if let Ok(mut bus) = self.bus.try_borrow_mut() {
            self.server.abort(&mut *bus);
        }
    }
}
