// Licensed under the Apache-2.0 license

//! Task-context suspension.
//!
//! Only task code may block. Interrupt handlers poll instead, so every
//! suspending API in the crate takes a `TaskWait` and every interrupt-safe one
//! takes a plain [`Timebase`](crate::timer::Timebase).

use crate::timer::{Duration, Timebase};

/// Why a suspended task resumed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskEvent {
    /// An interrupt the task was waiting on fired
    Woken,
    /// The timeout elapsed first
    TimedOut,
}

/// Scheduler hooks for the calling task
pub trait TaskWait: Timebase {
    /// Suspend until an enabled interrupt wakes the task or `timeout` elapses
    fn wait_event(&mut self, timeout: Duration) -> TaskEvent;
}

impl<T: TaskWait + ?Sized> TaskWait for &mut T {
    fn wait_event(&mut self, timeout: Duration) -> TaskEvent {
        (**self).wait_event(timeout)
    }
}

/// Whether the core is currently servicing an exception
#[cfg(target_arch = "arm")]
#[must_use]
pub fn in_interrupt_context() -> bool {
    !matches!(
        cortex_m::peripheral::SCB::vect_active(),
        cortex_m::peripheral::scb::VectActive::ThreadMode
    )
}

/// Whether the core is currently servicing an exception
#[cfg(not(target_arch = "arm"))]
#[must_use]
pub fn in_interrupt_context() -> bool {
    false
}
