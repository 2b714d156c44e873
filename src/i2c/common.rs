// Licensed under the Apache-2.0 license

//! Common types and constants for the I2C engine.
//!
//! This module provides port identities, transfer flags, timing constants and
//! the per-port configuration shared by the master and slave paths.

use crate::timer::Duration;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
}

impl I2cSpeed {
    #[must_use]
    pub fn hz(self) -> u32 {
        self as u32
    }

    /// One bus clock period
    #[must_use]
    pub fn period(self) -> Duration {
        Duration::micros(1_000_000 / u64::from(self.hz()))
    }
}

/// Physical bus instance
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub u8);

/// What a port may be used for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortRole {
    /// Host command slave only
    Slave,
    Master,
    /// Slave at rest, master when claimed
    Both,
}

impl PortRole {
    #[must_use]
    pub fn is_master(self) -> bool {
        matches!(self, PortRole::Master | PortRole::Both)
    }

    #[must_use]
    pub fn is_slave(self) -> bool {
        matches!(self, PortRole::Slave | PortRole::Both)
    }
}

/// Framing requested for a transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct XferFlags(u8);

impl XferFlags {
    pub const START: Self = Self(1 << 0);
    pub const STOP: Self = Self(1 << 1);
    /// A complete transaction: START at the beginning, STOP at the end
    pub const SINGLE: Self = Self(Self::START.0 | Self::STOP.0);

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for XferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Instantaneous electrical state of the bus lines
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineLevels(u8);

impl LineLevels {
    pub const SCL_HIGH: u8 = 1 << 0;
    pub const SDA_HIGH: u8 = 1 << 1;

    #[must_use]
    pub fn new(scl_high: bool, sda_high: bool) -> Self {
        let mut bits = 0;
        if scl_high {
            bits |= Self::SCL_HIGH;
        }
        if sda_high {
            bits |= Self::SDA_HIGH;
        }
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn scl_high(self) -> bool {
        self.0 & Self::SCL_HIGH != 0
    }

    #[must_use]
    pub fn sda_high(self) -> bool {
        self.0 & Self::SDA_HIGH != 0
    }

    #[must_use]
    pub fn idle(self) -> bool {
        self.scl_high() && self.sda_high()
    }
}

/// Board port table entry
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cPortDesc {
    pub name: &'static str,
    pub port: PortId,
    pub kbps: u32,
}

/// Fast-poll window before status waits start sleeping
pub const STATUS_FAST_POLL: Duration = Duration::micros(150);
/// Sleep between slow status polls, in microseconds
pub const STATUS_POLL_SLEEP_US: u32 = 100;
/// Stop-sent fast-poll window in bus periods
pub const STOP_SENT_FAST_PERIODS: u64 = 8;
/// Stop-sent deadline in bus periods
pub const STOP_SENT_TIMEOUT_PERIODS: u64 = 200;
/// Sleep between slow stop-sent polls, in microseconds
pub const STOP_SENT_RETRY_US: u32 = 150;
/// Half period of the bit-banged recovery clock, in microseconds
pub const BITBANG_DELAY_US: u32 = 5;
/// Byte returned to a host reading with no response staged
pub const SPURIOUS_READ_BYTE: u8 = 0xec;
/// Largest SMBus block payload
pub const SMBUS_MAX_BLOCK: usize = 32;
/// Default host command slave address, 7-bit form of 0x3c
pub const HOST_SLAVE_ADDRESS: u8 = 0x1e;

pub struct I2cConfig {
    pub role: PortRole,
    pub slave_address: u8,
    pub pclk_hz: u32,
    pub speed: I2cSpeed,
    pub master_timeout: Duration,
    pub slave_timeout: Duration,
    pub dma_timeout: Duration,
    pub debug_trace: bool,
}

impl I2cConfig {
    /// Clock control register value
    #[must_use]
    pub fn ccr(&self) -> u32 {
        self.pclk_hz / (2 * self.speed.hz())
    }

    /// `CR2.FREQ`: peripheral clock in MHz
    #[must_use]
    pub fn freq_mhz(&self) -> u32 {
        self.pclk_hz / 1_000_000
    }

    #[must_use]
    pub fn stop_sent_fast(&self) -> Duration {
        Duration::from_ticks(self.speed.period().ticks() * STOP_SENT_FAST_PERIODS)
    }

    #[must_use]
    pub fn stop_sent_timeout(&self) -> Duration {
        Duration::from_ticks(self.speed.period().ticks() * STOP_SENT_TIMEOUT_PERIODS)
    }
}

pub struct I2cConfigBuilder {
    role: PortRole,
    slave_address: u8,
    pclk_hz: u32,
    speed: I2cSpeed,
    master_timeout: Duration,
    slave_timeout: Duration,
    dma_timeout: Duration,
    debug_trace: bool,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            role: PortRole::Master,
            slave_address: HOST_SLAVE_ADDRESS,
            pclk_hz: 16_000_000,
            speed: I2cSpeed::Standard,
            master_timeout: Duration::millis(10),
            slave_timeout: Duration::millis(100),
            dma_timeout: Duration::millis(100),
            debug_trace: false,
        }
    }
    #[must_use]
    pub fn role(mut self, role: PortRole) -> Self {
        self.role = role;
        self
    }
    #[must_use]
    pub fn slave_address(mut self, address: u8) -> Self {
        self.slave_address = address & 0x7f;
        self
    }
    #[must_use]
    pub fn pclk_hz(mut self, hz: u32) -> Self {
        self.pclk_hz = hz;
        self
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = speed;
        self
    }
    #[must_use]
    pub fn master_timeout(mut self, timeout: Duration) -> Self {
        self.master_timeout = timeout;
        self
    }
    #[must_use]
    pub fn slave_timeout(mut self, timeout: Duration) -> Self {
        self.slave_timeout = timeout;
        self
    }
    #[must_use]
    pub fn dma_timeout(mut self, timeout: Duration) -> Self {
        self.dma_timeout = timeout;
        self
    }
    #[must_use]
    pub fn debug_trace(mut self, enabled: bool) -> Self {
        self.debug_trace = enabled;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            role: self.role,
            slave_address: self.slave_address,
            pclk_hz: self.pclk_hz,
            speed: self.speed,
            master_timeout: self.master_timeout,
            slave_timeout: self.slave_timeout,
            dma_timeout: self.dma_timeout,
            debug_trace: self.debug_trace,
        }
    }
}
