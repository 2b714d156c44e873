// Licensed under the Apache-2.0 license

//! I2C System Setup Helper
//!
//! Board-level bring-up that sits above a single port: checking the board's
//! port table, deciding which bus serves the host, deriving each port's
//! configuration and gating peripheral clocks for out-of-band bus recovery.

use crate::i2c::common::{I2cConfig, I2cConfigBuilder, I2cPortDesc, I2cSpeed, PortId, PortRole};
use crate::i2c::error::Error;
use crate::i2c::traits::I2cMaster;
use crate::syscon::{ClockGated, PeripheralClock};

/// TPS65090 PMU, 7-bit address (0x90 on the wire)
pub const PMU_ADDRESS: u8 = 0x48;
/// PMU charger control register read to check the PMU is present
pub const PMU_PRESENCE_REGISTER: u8 = 0x04;

fn supported_speed(desc: &I2cPortDesc) -> bool {
    desc.kbps.checked_mul(1000) == Some(I2cSpeed::Standard.hz())
}

/// Helper for I2C system setup operations
pub struct I2cSystemSetup;

impl I2cSystemSetup {
    /// Check a board port table before any port is brought up
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - two entries name the same port
    /// * `Unsupported` - an entry asks for a bus speed the ports cannot run
    pub fn validate_port_table(table: &[I2cPortDesc]) -> Result<(), Error> {
        for (i, desc) in table.iter().enumerate() {
            if !supported_speed(desc) {
                return Err(Error::Unsupported);
            }
            if table.iter().skip(i + 1).any(|other| other.port == desc.port) {
                return Err(Error::InvalidArgument);
            }
        }
        Ok(())
    }

    /// Pick the bus the host master talks to
    ///
    /// Board variants route the host to different buses. The one carrying the
    /// TPS65090 PMU is the host bus; when the PMU does not answer on `candidate`,
    /// the host sits on `fallback`.
    ///
    /// # Arguments
    ///
    /// * `bus` - Master port for the `candidate` bus
    /// * `candidate` - Bus to look for the PMU on
    /// * `fallback` - Host bus when the PMU is absent
    pub fn detect_host_port<M: I2cMaster>(bus: &mut M, candidate: PortId, fallback: PortId) -> PortId {
        if bus.is_present(PMU_ADDRESS, PMU_PRESENCE_REGISTER) {
            candidate
        } else {
            fallback
        }
    }

    /// Configuration for one port table entry
    ///
    /// The host port answers host commands and also runs master transactions
    /// on demand; every other port is master only.
    ///
    /// # Errors
    ///
    /// * `Unsupported` - the entry's speed is not available
    pub fn port_config(
        desc: &I2cPortDesc,
        host_port: PortId,
        pclk_hz: u32,
    ) -> Result<I2cConfig, Error> {
        if !supported_speed(desc) {
            return Err(Error::Unsupported);
        }
        let role = if desc.port == host_port {
            PortRole::Both
        } else {
            PortRole::Master
        };
        Ok(I2cConfigBuilder::new()
            .role(role)
            .pclk_hz(pclk_hz)
            .speed(I2cSpeed::Standard)
            .build())
    }

    /// Stop a peripheral clock and return the proof recovery needs
    ///
    /// Returns `None` if the clock refused to stop.
    pub fn gate_clock<K: PeripheralClock>(clock: &mut K) -> Option<ClockGated> {
        clock.disable();
        ClockGated::confirm(clock)
    }
}
