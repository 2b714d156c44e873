// Licensed under the Apache-2.0 license

//! Error taxonomy for the I2C engine.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

/// Which bounded wait gave up
///
/// The discriminants are stable: they end up in the upper byte of the numeric
/// error code shown on the console.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WaitStage {
    StartSent = 1,
    AddressAcked = 2,
    ByteTransmitted = 3,
    StopSent = 4,
    ReceiveNotEmpty = 5,
    DmaTransmit = 6,
    DmaReceive = 7,
    SlaveTransmit = 8,
}

/// Result of a bounded hardware wait
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Done,
    TimedOut(WaitStage),
}

impl WaitOutcome {
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            WaitOutcome::Done => Ok(()),
            WaitOutcome::TimedOut(stage) => Err(Error::Timeout(stage)),
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, WaitOutcome::Done)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Port already claimed by another transaction
    Busy,
    /// Empty transaction or unsupported transfer flags
    InvalidArgument,
    Timeout(WaitStage),
    ArbitrationLoss,
    /// The port's role does not allow the operation
    Unsupported,
}

const EC_ERROR_UNKNOWN: u32 = 1;
const EC_ERROR_UNIMPLEMENTED: u32 = 2;
const EC_ERROR_TIMEOUT: u32 = 4;
const EC_ERROR_INVAL: u32 = 5;
const EC_ERROR_BUSY: u32 = 6;

impl Error {
    /// Numeric code as surfaced by console diagnostics
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Error::Busy => EC_ERROR_BUSY,
            Error::InvalidArgument => EC_ERROR_INVAL,
            Error::Timeout(stage) => EC_ERROR_TIMEOUT | (u32::from(*stage as u8) << 8),
            Error::ArbitrationLoss => EC_ERROR_UNKNOWN,
            Error::Unsupported => EC_ERROR_UNIMPLEMENTED,
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout(WaitStage::AddressAcked) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            Error::ArbitrationLoss => ErrorKind::ArbitrationLoss,
            Error::Timeout(_) => ErrorKind::Bus,
            Error::Busy | Error::InvalidArgument | Error::Unsupported => ErrorKind::Other,
        }
    }
}
