// Licensed under the Apache-2.0 license

//! Port resource: one physical bus with everything needed to drive it.
//!
//! The master engine (`master.rs`), error recovery (`error_handler.rs`) and the
//! slave bus operations (`slave.rs`) add their own `impl` blocks on
//! [`I2cPort`]; this file holds construction, initialization and the
//! primitives they share.

use embedded_hal::delay::DelayNs;

use super::common::{
    I2cConfig, LineLevels, PortId, PortRole, STATUS_FAST_POLL, STATUS_POLL_SLEEP_US,
    STOP_SENT_RETRY_US,
};
use super::error::{Error, WaitStage};
use super::lock::ClaimToken;
use super::recovery::{self, BusLines, PinError};
use super::registers::{cr1, cr2, sr1, I2cRegisters};
use super::status::{StatusCache, StatusSnapshot};
use crate::common::{Logger, NoOpLogger};
use crate::dma::{Direction, Dma, DmaChannel, DmaOption};
use crate::syscon::{ClockGated, PeripheralClock};
use crate::task::TaskWait;
use crate::timer::Deadline;

/// Hardware owned by a port
pub struct PortResources<R, C, B, K> {
    pub regs: R,
    pub tx_dma: C,
    pub rx_dma: C,
    pub lines: B,
    pub clock: K,
}

pub struct I2cPort<'a, R, C, B, K, S, L = NoOpLogger>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    pub(crate) id: PortId,
    pub(crate) config: I2cConfig,
    pub(crate) regs: R,
    pub(crate) tx_dma: Dma<C>,
    pub(crate) rx_dma: Dma<C>,
    pub(crate) lines: B,
    pub(crate) clock: K,
    pub(crate) sched: S,
    pub(crate) claim: &'a ClaimToken,
    pub(crate) status: StatusCache,
    pub(crate) logger: L,
}

impl<'a, R, C, B, K, S, L> I2cPort<'a, R, C, B, K, S, L>
where
    R: I2cRegisters,
    C: DmaChannel,
    B: BusLines,
    K: PeripheralClock,
    S: TaskWait + DelayNs,
    L: Logger,
{
    pub fn new(
        id: PortId,
        config: I2cConfig,
        resources: PortResources<R, C, B, K>,
        sched: S,
        claim: &'a ClaimToken,
        logger: L,
    ) -> Self {
        let peripheral_addr = resources.regs.data_register_address();
        Self {
            id,
            config,
            regs: resources.regs,
            tx_dma: Dma::new(
                resources.tx_dma,
                DmaOption {
                    direction: Direction::MemoryToPeripheral,
                    peripheral_addr,
                },
            ),
            rx_dma: Dma::new(
                resources.rx_dma,
                DmaOption {
                    direction: Direction::PeripheralToMemory,
                    peripheral_addr,
                },
            ),
            lines: resources.lines,
            clock: resources.clock,
            sched,
            claim,
            status: StatusCache::new(),
            logger,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn role(&self) -> PortRole {
        self.config.role
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Last status snapshot taken on this port
    pub fn last_status(&self) -> StatusSnapshot {
        self.status.last()
    }

    /// Bring the peripheral to its idle, enabled state
    ///
    /// On first bring-up (clock still gated) the bus is unwedged first. The
    /// claim is taken around the bit-banging so no master transaction can
    /// start underneath it; if someone already holds it the unwedge is
    /// skipped.
    pub fn init(&mut self) {
        if let Some(gated) = ClockGated::confirm(&self.clock) {
            if self.claim.claim() {
                if recovery::unwedge(&mut self.lines, &mut self.sched, &gated).is_err() {
                    self.logger
                        .warn(format_args!("i2c{}: bus unwedge failed", self.id.0));
                }
                self.claim.release();
            }
            self.clock.enable();
        }

        self.regs.set_cr1(cr1::SWRST);
        self.regs.set_cr1(0);

        self.regs.set_ccr(self.config.ccr());
        if self.config.role.is_slave() {
            self.regs
                .set_oar1(u32::from(self.config.slave_address) << 1);
        }

        self.regs.set_cr1(cr1::ACK | cr1::PE);
        self.regs.set_cr2(
            cr2::ITERREN | cr2::ITEVTEN | (self.config.freq_mhz() & cr2::FREQ_MASK),
        );

        self.regs.set_sr1(0);

        self.lines.restore_alternate_function();
    }

    pub fn enable_interrupt(&mut self) {
        self.regs
            .modify_cr2(|v| v | cr2::ITERREN | cr2::ITEVTEN);
    }

    pub fn disable_interrupt(&mut self) {
        self.regs
            .modify_cr2(|v| v & !(cr2::ITERREN | cr2::ITEVTEN));
    }

    pub(crate) fn enable_ack(&mut self) {
        self.regs.modify_cr1(|v| v | cr1::ACK);
    }

    pub(crate) fn disable_ack(&mut self) {
        self.regs.modify_cr1(|v| v & !cr1::ACK);
    }

    /// Wait until every bit of `mask` is set in SR1
    pub(crate) fn wait_status(&mut self, mask: u32, stage: WaitStage) -> Result<(), Error> {
        let deadline = Deadline::after(&mut self.sched, self.config.master_timeout);
        loop {
            let status = self.regs.sr1();
            if status & mask == mask {
                return Ok(());
            }
            if status & sr1::ARLO != 0 {
                return Err(Error::ArbitrationLoss);
            }
            let now = self.sched.now();
            if deadline.expired(now) {
                return Err(Error::Timeout(stage));
            }
            if deadline.elapsed(now) > STATUS_FAST_POLL {
                self.sched.usleep(STATUS_POLL_SLEEP_US);
            }
        }
    }

    /// SR1 then SR2, which clears a pending address match
    pub(crate) fn read_clear_status(&mut self) -> u32 {
        let sr1 = self.regs.sr1();
        let sr2 = self.regs.sr2();
        (sr2 << 16) | (sr1 & 0xffff)
    }

    /// Send START and the address byte, wait for the peer's ack
    pub(crate) fn master_start(&mut self, address_byte: u8) -> Result<(), Error> {
        self.regs
            .modify_cr1(|v| (v & !cr1::STOP) | cr1::START);
        self.wait_status(sr1::SB, WaitStage::StartSent)?;

        self.regs.set_dr(u32::from(address_byte));
        self.wait_status(sr1::ADDR, WaitStage::AddressAcked)?;

        self.read_clear_status();
        Ok(())
    }

    pub(crate) fn master_stop(&mut self) {
        self.regs.modify_cr1(|v| v | cr1::STOP);
    }

    /// Wait for the hardware to finish sending STOP
    ///
    /// Polls hot for the first few bit periods, then backs off to sleeping
    /// between checks until the deadline.
    pub(crate) fn wait_until_stop_sent(&mut self) -> Result<(), Error> {
        let deadline = Deadline::after(&mut self.sched, self.config.stop_sent_timeout());
        let fast = self.config.stop_sent_fast();
        let mut slow = false;

        while self.regs.cr1() & cr1::STOP != 0 {
            let now = self.sched.now();
            if deadline.expired(now) {
                self.logger.error(format_args!(
                    "i2c{}: stop event deadline passed, CR1={:016b}",
                    self.id.0,
                    self.regs.cr1()
                ));
                return Err(Error::Timeout(WaitStage::StopSent));
            }

            if slow {
                self.sched.usleep(STOP_SENT_RETRY_US);
            } else if deadline.elapsed(now) >= fast {
                self.logger
                    .debug(format_args!("i2c{}: stop event taking a while", self.id.0));
                slow = true;
            }
        }
        Ok(())
    }

    /// Log every register in binary when tracing is enabled
    pub fn dump_registers(&mut self) {
        if !self.config.debug_trace {
            return;
        }
        let regs = [
            ("CR1", self.regs.cr1()),
            ("CR2", self.regs.cr2()),
            ("SR2", self.regs.sr2()),
            ("SR1", self.regs.sr1()),
            ("OAR1", self.regs.oar1()),
            ("OAR2", self.regs.oar2()),
            ("DR", self.regs.dr()),
            ("CCR", self.regs.ccr()),
            ("TRISE", self.regs.trise()),
        ];
        for (name, value) in regs {
            self.logger
                .debug(format_args!("i2c{} {:<5}: {:016b}", self.id.0, name, value));
        }
    }

    /// Instantaneous level of SCL and SDA
    pub fn line_levels(&mut self) -> Result<LineLevels, PinError<B>> {
        recovery::line_levels(&mut self.lines)
    }
}
