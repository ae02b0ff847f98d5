//! QMAP base header.
//!
//! Every downlink aggregate is a sequence of frames, each starting with this
//! fixed 4-byte header. The declared payload length excludes the header itself
//! but includes any trailing padding.

use crate::error::ParseError;

/// Size of the QMAP base header.
pub const MAP_HEADER_LEN: usize = 4;

/// QMAP base header (4 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///    /              |               |               |               |
///   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///   +---------------+---------------+---------------+---------------+
///  0| Pad len   |N|C| Mux ID        | Payload length                |
///   +---------------+---------------+---------------+---------------+
/// ```
///
/// `N` (next_hdr) announces a v5 sub-header immediately after this one.
/// `C` (cd_bit) marks the frame as a control command rather than data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    /// Number of trailing padding bytes included in the payload length.
    pub pad_len: u8,
    /// A v5 sub-header follows this header.
    pub next_hdr: bool,
    /// Command frame (control plane) instead of a data frame.
    pub cd_bit: bool,
    /// Logical channel this frame belongs to.
    pub mux_id: u8,
    /// Payload length in bytes, excluding this header, including padding.
    pub pkt_len: u16,
}

impl MapHeader {
    /// Parse a base header from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < MAP_HEADER_LEN {
            return Err(ParseError::Incomplete);
        }

        Ok(Self {
            pad_len: data[0] & 0x3f,
            next_hdr: data[0] & 0x40 != 0,
            cd_bit: data[0] & 0x80 != 0,
            mux_id: data[1],
            pkt_len: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Encode the header into a byte buffer.
    ///
    /// Returns MAP_HEADER_LEN (4).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = (self.pad_len & 0x3f)
            | if self.next_hdr { 0x40 } else { 0 }
            | if self.cd_bit { 0x80 } else { 0 };
        buf[1] = self.mux_id;
        buf[2..4].copy_from_slice(&self.pkt_len.to_be_bytes());
        MAP_HEADER_LEN
    }
}

/// v5 sub-header discriminator.
///
/// The first byte of every v5 sub-header carries the header type in bits 1-7,
/// so the kind of sub-header (and therefore its length) can be decided by
/// peeking one byte past the base header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum V5HeaderType {
    Coalescing = 0,
    CsumOffload = 1,
}

impl V5HeaderType {
    /// Classify a v5 sub-header from its first byte.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match (byte & 0xfe) >> 1 {
            0 => Some(V5HeaderType::Coalescing),
            1 => Some(V5HeaderType::CsumOffload),
            _ => None,
        }
    }

    /// Build the type byte for this sub-header kind.
    pub fn to_type_byte(self, next_hdr: bool) -> u8 {
        ((self as u8) << 1) | u8::from(next_hdr)
    }
}
