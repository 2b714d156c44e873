// Licensed under the Apache-2.0 license

//! Monotonic time for bounded hardware waits.

use embedded_hal::delay::DelayNs;

/// Microsecond-resolution instant on the system timebase
pub type Instant = fugit::TimerInstantU64<1_000_000>;
/// Microsecond-resolution duration on the system timebase
pub type Duration = fugit::MicrosDurationU64;

/// Free-running microsecond clock with a sleeping delay
///
/// `usleep` may yield to other tasks when called from task context. Drivers
/// only call it from task context; interrupt handlers use `now` alone.
pub trait Timebase {
    fn now(&mut self) -> Instant;

    fn usleep(&mut self, us: u32);
}

impl<T: Timebase + ?Sized> Timebase for &mut T {
    fn now(&mut self) -> Instant {
        (**self).now()
    }

    fn usleep(&mut self, us: u32) {
        (**self).usleep(us);
    }
}

/// Point in time after which a bounded wait gives up
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Deadline {
    start: Instant,
    end: Instant,
}

impl Deadline {
    pub fn after<T: Timebase + ?Sized>(clock: &mut T, timeout: Duration) -> Self {
        let start = clock.now();
        Self {
            start,
            end: start + timeout,
        }
    }

    #[must_use]
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.end
    }

    /// Time elapsed since the deadline was armed
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.checked_duration_since(self.start)
            .unwrap_or(Duration::from_ticks(0))
    }

    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.end
            .checked_duration_since(now)
            .unwrap_or(Duration::from_ticks(0))
    }
}

/// Busy-wait delay calibrated against the core clock
///
/// Used for the bit-banged recovery sequence, where sleeping would stretch
/// the bus timing unpredictably.
#[derive(Copy, Clone, Debug)]
pub struct CycleDelay {
    cycles_per_us: u32,
}

impl CycleDelay {
    #[must_use]
    pub const fn new(core_hz: u32) -> Self {
        let cycles_per_us = core_hz / 1_000_000;
        Self {
            cycles_per_us: if cycles_per_us == 0 { 1 } else { cycles_per_us },
        }
    }

    fn spin(cycles: u32) {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::delay(cycles);
        #[cfg(not(target_arch = "arm"))]
        for _ in 0..cycles {
            core::hint::spin_loop();
        }
    }
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (u64::from(ns) * u64::from(self.cycles_per_us)).div_ceil(1000);
        Self::spin(u32::try_from(cycles).unwrap_or(u32::MAX));
    }

    fn delay_us(&mut self, us: u32) {
        Self::spin(us.saturating_mul(self.cycles_per_us));
    }
}
