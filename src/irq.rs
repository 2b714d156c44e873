// Licensed under the Apache-2.0 license

//! Interrupt dispatch for I2C ports.
//!
//! Each port raises two lines, event and error. Board code binds one handler
//! per port and forwards both vectors to [`IrqTable::dispatch`].

use heapless::Vec;

use crate::i2c::common::PortId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cIrq {
    Event,
    Error,
}

/// Handler bound to one port's interrupt lines
pub trait InterruptHandler {
    fn handle(&mut self, irq: I2cIrq);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindError {
    AlreadyBound,
    TableFull,
}

pub struct IrqTable<'a, const N: usize> {
    entries: Vec<(PortId, &'a mut dyn InterruptHandler), N>,
}

impl<const N: usize> Default for IrqTable<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> IrqTable<'a, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn bind(
        &mut self,
        port: PortId,
        handler: &'a mut dyn InterruptHandler,
    ) -> Result<(), BindError> {
        if self.entries.iter().any(|(id, _)| *id == port) {
            return Err(BindError::AlreadyBound);
        }
        self.entries
            .push((port, handler))
            .map_err(|_| BindError::TableFull)
    }

    /// Run the handler bound to `port`; false if there is none
    pub fn dispatch(&mut self, port: PortId, irq: I2cIrq) -> bool {
        match self.entries.iter_mut().find(|(id, _)| *id == port) {
            Some((_, handler)) => {
                handler.handle(irq);
                true
            }
            None => false,
        }
    }
}
