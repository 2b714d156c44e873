// Licensed under the Apache-2.0 license

//! Host command packets as carried over the I2C slave interface.
//!
//! Versioned request:
//!
//! ```text
//! [0x80 + version][command][param_len][params ...][checksum]
//! ```
//!
//! Versioned response:
//!
//! ```text
//! [result][len][payload ...][checksum]
//! ```
//!
//! Both checksums are the 8-bit sum of every preceding byte. A request whose
//! first byte is below `EC_CMD_VERSION0` is a legacy packet: the first byte is
//! the command, everything after it is parameters, there is no checksum and
//! the response is just `[result][payload ...]`.

use heapless::Vec;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// First request byte of a versioned packet, version 0
pub const EC_CMD_VERSION0: u8 = 0x80;
/// Largest parameter or response payload
pub const MAX_PARAM_SIZE: usize = 252;
/// Header, parameters and checksum of the largest request
pub const MAX_REQUEST_SIZE: usize = REQUEST_HEADER_SIZE + MAX_PARAM_SIZE + 1;
/// Header, payload and checksum of the largest response
pub const MAX_RESPONSE_SIZE: usize = RESPONSE_HEADER_SIZE + MAX_PARAM_SIZE + 1;

const REQUEST_HEADER_SIZE: usize = core::mem::size_of::<RequestHeader>();
const RESPONSE_HEADER_SIZE: usize = core::mem::size_of::<ResponseHeader>();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HostResult {
    Success = 0,
    InvalidCommand = 1,
    Error = 2,
    InvalidParam = 3,
    AccessDenied = 4,
    InvalidResponse = 5,
    InvalidVersion = 6,
    InvalidChecksum = 7,
    InProgress = 8,
    Unavailable = 9,
    Timeout = 10,
    Overflow = 11,
    InvalidHeader = 12,
    RequestTruncated = 13,
    ResponseTooBig = 14,
    BusError = 15,
    Busy = 16,
}

impl TryFrom<u8> for HostResult {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0 => HostResult::Success,
            1 => HostResult::InvalidCommand,
            2 => HostResult::Error,
            3 => HostResult::InvalidParam,
            4 => HostResult::AccessDenied,
            5 => HostResult::InvalidResponse,
            6 => HostResult::InvalidVersion,
            7 => HostResult::InvalidChecksum,
            8 => HostResult::InProgress,
            9 => HostResult::Unavailable,
            10 => HostResult::Timeout,
            11 => HostResult::Overflow,
            12 => HostResult::InvalidHeader,
            13 => HostResult::RequestTruncated,
            14 => HostResult::ResponseTooBig,
            15 => HostResult::BusError,
            16 => HostResult::Busy,
            other => return Err(other),
        })
    }
}

/// Packet layout of a request or response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Framing {
    Versioned,
    Legacy,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct RequestHeader {
    command_version: u8,
    command: u8,
    param_len: u8,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct ResponseHeader {
    result: u8,
    len: u8,
}

/// Decoded request, borrowing its parameters from the receive buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HostRequest<'a> {
    pub command: u8,
    pub version: u8,
    pub params: &'a [u8],
    pub framing: Framing,
    /// False if the trailing checksum did not match; the command still runs
    pub checksum_valid: bool,
}

/// Request that could not be decoded at all
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodeError {
    pub framing: Framing,
    pub result: HostResult,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HostResponse<'a> {
    pub result: HostResult,
    pub payload: &'a [u8],
}

/// Executes decoded host commands
pub trait HostCommandHandler {
    /// Run `request`, appending any response payload to `response`
    ///
    /// Called from the slave interrupt while the host waits on the bus, so it
    /// must return promptly.
    fn execute(
        &mut self,
        request: &HostRequest<'_>,
        response: &mut Vec<u8, MAX_PARAM_SIZE>,
    ) -> HostResult;
}

impl<H: HostCommandHandler + ?Sized> HostCommandHandler for &mut H {
    fn execute(
        &mut self,
        request: &HostRequest<'_>,
        response: &mut Vec<u8, MAX_PARAM_SIZE>,
    ) -> HostResult {
        (**self).execute(request, response)
    }
}

#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// True if the last byte is the checksum of everything before it
#[must_use]
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((last, body)) => checksum(body) == *last,
        None => false,
    }
}

pub fn decode_request(frame: &[u8]) -> Result<HostRequest<'_>, DecodeError> {
    let Some(&first) = frame.first() else {
        return Err(DecodeError {
            framing: Framing::Legacy,
            result: HostResult::InvalidHeader,
        });
    };

    if first < EC_CMD_VERSION0 {
        let params = frame.get(1..).unwrap_or(&[]);
        return Ok(HostRequest {
            command: first,
            version: 0,
            params: params.get(..MAX_PARAM_SIZE).unwrap_or(params),
            framing: Framing::Legacy,
            checksum_valid: true,
        });
    }

    let truncated = DecodeError {
        framing: Framing::Versioned,
        result: HostResult::RequestTruncated,
    };
    let (header, rest) = RequestHeader::ref_from_prefix(frame).map_err(|_| truncated)?;
    let param_len = usize::from(header.param_len);
    let params = rest.get(..param_len).ok_or(truncated)?;
    let sum = rest.get(param_len).ok_or(truncated)?;
    let body = frame
        .get(..REQUEST_HEADER_SIZE + param_len)
        .ok_or(truncated)?;

    Ok(HostRequest {
        command: header.command,
        version: header.command_version - EC_CMD_VERSION0,
        params,
        framing: Framing::Versioned,
        checksum_valid: checksum(body) == *sum,
    })
}

/// Frame a response into `out`, replacing its contents
pub fn encode_response<const N: usize>(
    framing: Framing,
    result: HostResult,
    payload: &[u8],
    out: &mut Vec<u8, N>,
) -> Result<(), HostResult> {
    out.clear();
    match framing {
        Framing::Versioned => {
            let len = u8::try_from(payload.len()).map_err(|_| HostResult::ResponseTooBig)?;
            let header = ResponseHeader {
                result: result as u8,
                len,
            };
            out.extend_from_slice(header.as_bytes())
                .map_err(|_| HostResult::ResponseTooBig)?;
            out.extend_from_slice(payload)
                .map_err(|_| HostResult::ResponseTooBig)?;
            let sum = checksum(out);
            out.push(sum).map_err(|_| HostResult::ResponseTooBig)?;
        }
        Framing::Legacy => {
            out.push(result as u8)
                .map_err(|_| HostResult::ResponseTooBig)?;
            out.extend_from_slice(payload)
                .map_err(|_| HostResult::ResponseTooBig)?;
        }
    }
    Ok(())
}

/// Parse a response as the host sees it
pub fn decode_response(framing: Framing, frame: &[u8]) -> Result<HostResponse<'_>, HostResult> {
    match framing {
        Framing::Versioned => {
            let (header, rest) =
                ResponseHeader::ref_from_prefix(frame).map_err(|_| HostResult::InvalidResponse)?;
            let len = usize::from(header.len);
            let payload = rest.get(..len).ok_or(HostResult::InvalidResponse)?;
            let framed = frame
                .get(..RESPONSE_HEADER_SIZE + len + 1)
                .ok_or(HostResult::InvalidResponse)?;
            if !verify_checksum(framed) {
                return Err(HostResult::InvalidChecksum);
            }
            let result =
                HostResult::try_from(header.result).map_err(|_| HostResult::InvalidResponse)?;
            Ok(HostResponse { result, payload })
        }
        Framing::Legacy => {
            let (&code, payload) = frame.split_first().ok_or(HostResult::InvalidResponse)?;
            let result = HostResult::try_from(code).map_err(|_| HostResult::InvalidResponse)?;
            Ok(HostResponse { result, payload })
        }
    }
}
