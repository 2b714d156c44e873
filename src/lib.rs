// Licensed under the Apache-2.0 license

// Enforce coding guidelines - prevent panic-prone patterns in production code only
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::indexing_slicing))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), no_std)]
pub mod common;
pub mod dma;
pub mod host_cmd;
pub mod i2c;
pub mod irq;
pub mod syscon;
pub mod task;
pub mod timer;
