//! QMAP v5 sub-headers.
//!
//! When the base header's next_hdr bit is set, one of two sub-headers follows
//! immediately: a 4-byte checksum-offload header or a 32-byte coalescing
//! header describing a receive-coalesced superframe. The first byte of either
//! carries the type discriminator (see [`crate::header::V5HeaderType`]).

use crate::error::ParseError;
use crate::header::V5HeaderType;

/// Size of the v5 checksum-offload sub-header.
pub const CSUM_HEADER_LEN: usize = 4;

/// Size of the v5 coalescing sub-header.
pub const COAL_HEADER_LEN: usize = 32;

/// Maximum number of NLO (number-length-offset) entries in a coalescing
/// header.
pub const MAX_NLOS: usize = 6;

/// Maximum total packet count a coalescing header may describe. Also the
/// width of the per-packet checksum error mask (8 bits per NLO entry).
pub const MAX_PACKETS: u32 = 48;

/// v5 checksum-offload sub-header (4 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///    /              |               |               |               |
///   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///   +---------------+---------------+---------------+---------------+
///  0|N| Header type | Reserved    |V| Reserved                      |
///   +---------------+---------------+---------------+---------------+
/// ```
///
/// `V` reports that hardware already verified the transport checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsumHeader {
    /// Another sub-header follows this one.
    pub next_hdr: bool,
    /// Hardware checksum verification result.
    pub csum_valid: bool,
}

impl CsumHeader {
    /// Parse a checksum-offload sub-header from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < CSUM_HEADER_LEN {
            return Err(ParseError::Incomplete);
        }

        match V5HeaderType::from_type_byte(data[0]) {
            Some(V5HeaderType::CsumOffload) => {}
            _ => return Err(ParseError::UnknownHeaderType(data[0])),
        }

        Ok(Self {
            next_hdr: data[0] & 0x01 != 0,
            csum_valid: data[1] & 0x80 != 0,
        })
    }

    /// Encode the sub-header into a byte buffer.
    ///
    /// Returns CSUM_HEADER_LEN (4).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = V5HeaderType::CsumOffload.to_type_byte(self.next_hdr);
        buf[1] = if self.csum_valid { 0x80 } else { 0 };
        buf[2] = 0;
        buf[3] = 0;
        CSUM_HEADER_LEN
    }
}

/// One NLO (number-length-offset) entry of a coalescing header.
///
/// Describes a run of `num_packets` equally sized packets, each `pkt_len`
/// bytes including its IP and transport headers. Bit `i` of
/// `csum_error_bitmap` flags packet `i` of the run as failing hardware
/// checksum verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NlPair {
    pub pkt_len: u16,
    pub csum_error_bitmap: u8,
    pub num_packets: u8,
}

/// v5 coalescing sub-header (32 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///    /              |               |               |               |
///   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///   +---------------+---------------+---------------+---------------+
///  0|N| Header type | Virt chan id  | NLO count     | Close | Value |
///   +---------------+---------------+---------------+---------------+
///  4| Reserved    |V| Reserved                                      |
///   +---------------+---------------+---------------+---------------+
///  8| NLO 0: packet length          | Error bitmap  | Packet count  |
///   +---------------+---------------+---------------+---------------+
///   | ... NLO 1 through NLO 5, 4 bytes each ...                     |
///   +---------------+---------------+---------------+---------------+
/// ```
///
/// `V` reports that hardware verified the checksum of the whole superframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalHeader {
    /// Another sub-header follows this one.
    pub next_hdr: bool,
    /// Virtual channel the coalesced flow was observed on.
    pub virtual_channel_id: u8,
    /// Number of populated NLO entries.
    pub num_nlos: u8,
    /// Why hardware closed this coalescing window.
    pub close_type: u8,
    /// Sub-code qualifying `close_type`.
    pub close_value: u8,
    /// Hardware checksum verification result for the whole superframe.
    pub csum_valid: bool,
    /// NLO entries; only the first `num_nlos` are meaningful.
    pub nl_pairs: [NlPair; MAX_NLOS],
}

impl CoalHeader {
    /// Parse a coalescing sub-header from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < COAL_HEADER_LEN {
            return Err(ParseError::Incomplete);
        }

        match V5HeaderType::from_type_byte(data[0]) {
            Some(V5HeaderType::Coalescing) => {}
            _ => return Err(ParseError::UnknownHeaderType(data[0])),
        }

        let mut nl_pairs = [NlPair::default(); MAX_NLOS];
        for (i, pair) in nl_pairs.iter_mut().enumerate() {
            let base = 8 + i * 4;
            *pair = NlPair {
                pkt_len: u16::from_be_bytes([data[base], data[base + 1]]),
                csum_error_bitmap: data[base + 2],
                num_packets: data[base + 3],
            };
        }

        Ok(Self {
            next_hdr: data[0] & 0x01 != 0,
            virtual_channel_id: data[1],
            num_nlos: data[2],
            close_type: data[3] >> 4,
            close_value: data[3] & 0x0f,
            csum_valid: data[4] & 0x01 != 0,
            nl_pairs,
        })
    }

    /// Encode the sub-header into a byte buffer.
    ///
    /// Returns COAL_HEADER_LEN (32).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = V5HeaderType::Coalescing.to_type_byte(self.next_hdr);
        buf[1] = self.virtual_channel_id;
        buf[2] = self.num_nlos;
        buf[3] = (self.close_type << 4) | (self.close_value & 0x0f);
        buf[4] = u8::from(self.csum_valid);
        buf[5..8].fill(0);
        for (i, pair) in self.nl_pairs.iter().enumerate() {
            let base = 8 + i * 4;
            buf[base..base + 2].copy_from_slice(&pair.pkt_len.to_be_bytes());
            buf[base + 2] = pair.csum_error_bitmap;
            buf[base + 3] = pair.num_packets;
        }
        COAL_HEADER_LEN
    }

    /// Total packet count across all NLO entries.
    pub fn total_packets(&self) -> u32 {
        self.nl_pairs
            .iter()
            .map(|p| u32::from(p.num_packets))
            .sum()
    }

    /// Per-packet checksum error mask: 8 bits per NLO entry, NLO 0 in the
    /// low byte, so shifting right once per packet walks the superframe in
    /// order.
    pub fn error_mask(&self) -> u64 {
        let mut mask = 0u64;
        for (i, pair) in self.nl_pairs.iter().enumerate() {
            mask |= u64::from(pair.csum_error_bitmap) << (i * 8);
        }
        mask
    }
}
