// Licensed under the Apache-2.0 license

//! Status register cache.
//!
//! Interrupt handlers decide what to do from one snapshot taken on entry and
//! never look at the raw status bits again, so a flag raised while the handler
//! runs is left for the next interrupt instead of being half-handled.

use super::registers::{sr1, sr2, I2cRegisters};

/// SR1/SR2 as observed at one instant
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub sr1: u32,
    pub sr2: u32,
}

impl StatusSnapshot {
    #[must_use]
    pub fn address_matched(&self) -> bool {
        self.sr1 & sr1::ADDR != 0
    }

    #[must_use]
    pub fn stop_detected(&self) -> bool {
        self.sr1 & sr1::STOPF != 0
    }

    #[must_use]
    pub fn tx_empty(&self) -> bool {
        self.sr1 & sr1::TXE != 0
    }

    #[must_use]
    pub fn ack_failed(&self) -> bool {
        self.sr1 & sr1::AF != 0
    }

    #[must_use]
    pub fn master_mode(&self) -> bool {
        self.sr2 & sr2::MSL != 0
    }

    #[must_use]
    pub fn bus_busy(&self) -> bool {
        self.sr2 & sr2::BUSY != 0
    }

    /// Slave is transmitting to the master
    #[must_use]
    pub fn transmitter(&self) -> bool {
        self.sr2 & sr2::TRA != 0
    }

    /// Combined form used by diagnostics: SR2 in the upper half
    #[must_use]
    pub fn packed(&self) -> u32 {
        (self.sr2 << 16) | (self.sr1 & 0xffff)
    }
}

/// Last status observed on a port
#[derive(Debug, Default)]
pub struct StatusCache {
    last: StatusSnapshot,
}

impl StatusCache {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: StatusSnapshot { sr1: 0, sr2: 0 },
        }
    }

    /// Read SR1, clear its write-zero bits, then read SR2
    ///
    /// The SR1-then-SR2 read sequence also clears a pending address match.
    /// Must be the only status reader in the calling context.
    pub fn snapshot_and_clear<R: I2cRegisters>(&mut self, regs: &mut R) -> StatusSnapshot {
        let sr1 = regs.sr1();
        regs.set_sr1(0);
        let sr2 = regs.sr2();
        self.last = StatusSnapshot { sr1, sr2 };
        self.last
    }

    /// Record SR1 alone, leaving SR2 and the address-match sequence untouched
    pub fn capture_sr1<R: I2cRegisters>(&mut self, regs: &R) -> u32 {
        self.last.sr1 = regs.sr1();
        self.last.sr1
    }

    #[must_use]
    pub fn last(&self) -> StatusSnapshot {
        self.last
    }
}
