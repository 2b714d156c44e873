// Licensed under the Apache-2.0 license

//! Shared plumbing used by every driver in the crate.
//!
//! Drivers take a logger type parameter (`L: Logger = NoOpLogger`) instead of
//! reaching for a global console, so a board can route driver diagnostics to
//! its debug UART while tests capture them in memory.

use core::fmt;

/// Severity of a log record
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::Error => "ERR",
            LogLevel::Warn => "WRN",
            LogLevel::Info => "INF",
            LogLevel::Debug => "DBG",
        }
    }
}

/// Sink for driver diagnostics
///
/// Implementations must not block for long: drivers log from interrupt
/// handlers as well as from task context.
pub trait Logger {
    fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>);

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }

    fn warn(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Warn, args);
    }

    fn info(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }
}

/// Logger that drops every record
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&mut self, _level: LogLevel, _args: fmt::Arguments<'_>) {}
}

/// Logger writing one line per record to an `embedded-io` sink
///
/// Records less severe than `max_level` are dropped. Write errors are ignored: there is
/// nowhere left to report them.
pub struct UartLogger<W: embedded_io::Write> {
    writer: W,
    max_level: LogLevel,
}

impl<W: embedded_io::Write> UartLogger<W> {
    pub fn new(writer: W, max_level: LogLevel) -> Self {
        Self { writer, max_level }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: embedded_io::Write> Logger for UartLogger<W> {
    fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        if level > self.max_level {
            return;
        }
        let _ = write!(self.writer, "[{}] ", level.tag());
        let _ = self.writer.write_fmt(args);
        let _ = self.writer.write_all(b"\r\n");
    }
}

impl<L: Logger + ?Sized> Logger for &mut L {
    fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        (**self).log(level, args);
    }
}
