// Licensed under the Apache-2.0 license

//! STM32F1 I2C driver module.
//!
//! Host-command slave server, DMA-driven master transaction engine, bus
//! unwedging and post-transaction error recovery for the STM32F1 I2C
//! peripheral, plus the composable traits and embedded-hal adapter that
//! device drivers sit on.

pub mod common;
pub mod error;
pub mod error_handler;
pub mod i2c_controller;
pub mod lock;
pub mod master;
pub mod port;
pub mod recovery;
pub mod registers;
#[cfg(feature = "i2c_target")]
pub mod slave;
pub mod status;
pub mod system_setup;
pub mod traits;

#[cfg(test)]
pub(crate) mod sim;

pub use common::{I2cConfig, I2cConfigBuilder, PortId, PortRole, XferFlags};
pub use error::{Error, WaitOutcome, WaitStage};
pub use lock::ClaimToken;
pub use port::{I2cPort, PortResources};
