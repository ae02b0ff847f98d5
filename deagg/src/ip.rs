//! IP and transport header views.
//!
//! Bounds-checked decoders over byte slices for the handful of header fields
//! the classification and segmentation paths read, plus the IPv6 extension
//! header walk. Decoders never look past the slice they are given; callers
//! fetch header bytes through [`FragDescriptor::header_ptr`] first.
//!
//! [`FragDescriptor::header_ptr`]: crate::descriptor::FragDescriptor::header_ptr

use crate::checksum::Checksum;
use crate::descriptor::FragDescriptor;
use crate::error::Error;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

pub const IPV4_MIN_HDR_LEN: u16 = 20;
pub const IPV6_HDR_LEN: u16 = 40;
pub const TCP_MIN_HDR_LEN: u16 = 20;
pub const UDP_HDR_LEN: u16 = 8;

const NEXTHDR_HOP: u8 = 0;
const NEXTHDR_ROUTING: u8 = 43;
const NEXTHDR_FRAGMENT: u8 = 44;
const NEXTHDR_AUTH: u8 = 51;
const NEXTHDR_NONE: u8 = 59;
const NEXTHDR_DEST: u8 = 60;

/// Field offsets used when patching headers in a linear buffer.
pub mod offsets {
    /// IPv4 total length (2 bytes).
    pub const IPV4_TOT_LEN: usize = 2;
    /// IPv4 identification (2 bytes).
    pub const IPV4_ID: usize = 4;
    /// IPv4 header checksum (2 bytes).
    pub const IPV4_CHECK: usize = 10;
    /// IPv6 payload length (2 bytes).
    pub const IPV6_PAYLOAD_LEN: usize = 4;
    /// TCP sequence number (4 bytes), relative to the transport header.
    pub const TCP_SEQ: usize = 4;
    /// TCP flags byte, relative to the transport header.
    pub const TCP_FLAGS: usize = 13;
    /// TCP checksum (2 bytes), relative to the transport header.
    pub const TCP_CHECK: usize = 16;
    /// UDP length (2 bytes), relative to the transport header.
    pub const UDP_LEN: usize = 4;
    /// UDP checksum (2 bytes), relative to the transport header.
    pub const UDP_CHECK: usize = 6;
}

/// TCP FIN flag bit within the flags byte.
pub const TCP_FLAG_FIN: u8 = 0x01;
/// TCP PSH flag bit within the flags byte.
pub const TCP_FLAG_PSH: u8 = 0x08;

/// Parsed IPv4 header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub header_len: u16,
    pub tot_len: u16,
    pub id: u16,
    /// Raw flags + fragment offset word.
    pub frag_word: u16,
    pub protocol: u8,
    pub check: u16,
    pub saddr: [u8; 4],
    pub daddr: [u8; 4],
}

impl Ipv4Header {
    /// Decode the fixed part of an IPv4 header. `data` must hold at least
    /// 20 bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < IPV4_MIN_HDR_LEN as usize {
            return Err(Error::OutOfBounds {
                offset: 0,
                len: u32::from(IPV4_MIN_HDR_LEN),
                actual: data.len() as u32,
            });
        }
        if data[0] >> 4 != 4 {
            return Err(Error::BadIpVersion(data[0] >> 4));
        }
        let header_len = u16::from(data[0] & 0x0f) * 4;
        if header_len < IPV4_MIN_HDR_LEN {
            return Err(Error::BadIpVersion(4));
        }

        Ok(Self {
            header_len,
            tot_len: u16::from_be_bytes([data[2], data[3]]),
            id: u16::from_be_bytes([data[4], data[5]]),
            frag_word: u16::from_be_bytes([data[6], data[7]]),
            protocol: data[9],
            check: u16::from_be_bytes([data[10], data[11]]),
            saddr: [data[12], data[13], data[14], data[15]],
            daddr: [data[16], data[17], data[18], data[19]],
        })
    }

    /// Returns true if the packet is a fragment (MF set or nonzero offset).
    pub fn is_fragment(&self) -> bool {
        self.frag_word & 0x3fff != 0
    }
}

/// Verify an IPv4 header checksum over the full header, options included.
pub fn ipv4_header_csum_ok(header: &[u8]) -> bool {
    let mut csum = Checksum::new();
    csum.add(header);
    csum.verify()
}

/// Compute the checksum for an IPv4 header whose checksum field content is
/// ignored.
pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    let mut csum = Checksum::new();
    csum.add(&header[..offsets::IPV4_CHECK]);
    csum.add(&[0, 0]);
    csum.add(&header[offsets::IPV4_CHECK + 2..]);
    csum.value()
}

/// Parsed fixed IPv6 header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub payload_len: u16,
    pub nexthdr: u8,
    pub saddr: [u8; 16],
    pub daddr: [u8; 16],
}

impl Ipv6Header {
    /// Decode the fixed IPv6 header. `data` must hold at least 40 bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < IPV6_HDR_LEN as usize {
            return Err(Error::OutOfBounds {
                offset: 0,
                len: u32::from(IPV6_HDR_LEN),
                actual: data.len() as u32,
            });
        }
        if data[0] >> 4 != 6 {
            return Err(Error::BadIpVersion(data[0] >> 4));
        }

        let mut saddr = [0u8; 16];
        let mut daddr = [0u8; 16];
        saddr.copy_from_slice(&data[8..24]);
        daddr.copy_from_slice(&data[24..40]);

        Ok(Self {
            payload_len: u16::from_be_bytes([data[4], data[5]]),
            nexthdr: data[6],
            saddr,
            daddr,
        })
    }
}

/// Parsed TCP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub seq: u32,
    /// Header length in bytes (data offset * 4).
    pub header_len: u16,
    /// Raw flags byte (FIN, SYN, RST, PSH, ACK, URG, ECE, CWR).
    pub flags: u8,
}

impl TcpHeader {
    /// Decode the fixed TCP header. `data` must hold at least 20 bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < TCP_MIN_HDR_LEN as usize {
            return Err(Error::OutOfBounds {
                offset: 0,
                len: u32::from(TCP_MIN_HDR_LEN),
                actual: data.len() as u32,
            });
        }

        Ok(Self {
            seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            header_len: u16::from(data[12] >> 4) * 4,
            flags: data[13],
        })
    }
}

/// Parsed UDP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub len: u16,
    pub check: u16,
}

impl UdpHeader {
    /// Decode a UDP header. `data` must hold at least 8 bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < UDP_HDR_LEN as usize {
            return Err(Error::OutOfBounds {
                offset: 0,
                len: u32::from(UDP_HDR_LEN),
                actual: data.len() as u32,
            });
        }

        Ok(Self {
            len: u16::from_be_bytes([data[4], data[5]]),
            check: u16::from_be_bytes([data[6], data[7]]),
        })
    }
}

/// Result of an IPv6 extension header walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtHdrWalk {
    /// Offset of the transport header within the descriptor.
    pub trans_offset: u32,
    /// The transport protocol number the chain resolved to.
    pub nexthdr: u8,
    /// Fragment offset in bytes; nonzero means the transport header is in
    /// an earlier fragment.
    pub frag_off: u16,
    /// A fragment header was present (even an atomic one with offset 0).
    pub has_frag_hdr: bool,
}

/// Walk the IPv6 extension header chain starting at `start` with the fixed
/// header's next-header value, stopping at the transport header or at a
/// fragment header with a nonzero offset.
pub fn ipv6_skip_exthdr(
    desc: &FragDescriptor,
    start: u32,
    first_nexthdr: u8,
) -> Result<ExtHdrWalk, Error> {
    let mut nexthdr = first_nexthdr;
    let mut offset = start;
    let mut has_frag_hdr = false;
    let mut scratch = [0u8; 8];

    loop {
        match nexthdr {
            NEXTHDR_NONE => return Err(Error::BadExtensionHeader),
            NEXTHDR_HOP | NEXTHDR_ROUTING | NEXTHDR_DEST | NEXTHDR_AUTH | NEXTHDR_FRAGMENT => {}
            _ => break,
        }

        let hdr = desc
            .header_ptr(offset, 8, &mut scratch)
            .ok_or(Error::BadExtensionHeader)?;

        let hdr_len = match nexthdr {
            NEXTHDR_FRAGMENT => {
                has_frag_hdr = true;
                let frag_off = u16::from_be_bytes([hdr[2], hdr[3]]) & 0xfff8;
                if frag_off != 0 {
                    // not the first fragment: no transport header here
                    return Ok(ExtHdrWalk {
                        trans_offset: offset,
                        nexthdr,
                        frag_off,
                        has_frag_hdr,
                    });
                }
                8
            }
            NEXTHDR_AUTH => (u32::from(hdr[1]) + 2) * 4,
            _ => (u32::from(hdr[1]) + 1) * 8,
        };

        nexthdr = hdr[0];
        offset = offset
            .checked_add(hdr_len)
            .ok_or(Error::BadExtensionHeader)?;
    }

    Ok(ExtHdrWalk {
        trans_offset: offset,
        nexthdr,
        frag_off: 0,
        has_frag_hdr,
    })
}
