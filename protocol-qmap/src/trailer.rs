//! MAPv4 downlink checksum trailer.
//!
//! On ports configured for trailer-based checksum offload, every data frame
//! carries this 8-byte trailer after its payload. The deaggregator only needs
//! the trailer for length accounting, but the full layout is decoded here so
//! callers can inspect the hardware verdict.

use crate::error::ParseError;

/// Size of the downlink checksum trailer.
pub const CSUM_TRAILER_LEN: usize = 8;

/// Downlink checksum trailer (8 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///    /              |               |               |               |
///   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///   +---------------+---------------+---------------+---------------+
///  0| Reserved      |V| Reserved    | Checksum start offset         |
///   +---------------+---------------+---------------+---------------+
///  4| Checksum length               | Checksum value                |
///   +---------------+---------------+---------------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsumTrailer {
    /// Hardware checksum verification result.
    pub valid: bool,
    /// Offset from the start of the payload where checksumming began.
    pub csum_start_offset: u16,
    /// Number of bytes the hardware checksummed.
    pub csum_length: u16,
    /// One's-complement sum computed by hardware.
    pub csum_value: u16,
}

impl CsumTrailer {
    /// Parse a checksum trailer from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < CSUM_TRAILER_LEN {
            return Err(ParseError::Incomplete);
        }

        Ok(Self {
            valid: data[1] & 0x01 != 0,
            csum_start_offset: u16::from_be_bytes([data[2], data[3]]),
            csum_length: u16::from_be_bytes([data[4], data[5]]),
            csum_value: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// Encode the trailer into a byte buffer.
    ///
    /// Returns CSUM_TRAILER_LEN (8).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = 0;
        buf[1] = u8::from(self.valid);
        buf[2..4].copy_from_slice(&self.csum_start_offset.to_be_bytes());
        buf[4..6].copy_from_slice(&self.csum_length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.csum_value.to_be_bytes());
        CSUM_TRAILER_LEN
    }
}
