//! Internet checksum arithmetic.
//!
//! One's-complement sums over 16-bit big-endian words, as used by IPv4
//! headers and TCP/UDP. The [`Checksum`] accumulator can be fed arbitrary
//! slices of a packet in order, including odd-length ones: a dangling byte is
//! held as the high half of a word until the next slice supplies the low
//! half, which is exactly what fragment-by-fragment walks need.

use crate::descriptor::FragDescriptor;
use crate::error::Error;

/// Incremental one's-complement checksum accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checksum {
    sum: u32,
    odd: bool,
}

impl Checksum {
    pub const fn new() -> Self {
        Self { sum: 0, odd: false }
    }

    /// Feed bytes into the sum. Slices may be split at any byte boundary;
    /// the result only depends on the concatenated byte stream.
    pub fn add(&mut self, mut bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        if self.odd {
            // complete the word started by the previous slice's last byte
            self.sum += u32::from(bytes[0]);
            self.odd = false;
            bytes = &bytes[1..];
        }

        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            self.sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
            if self.sum > 0xffff_0000 {
                self.sum = (self.sum & 0xffff) + (self.sum >> 16);
            }
        }

        if let [last] = chunks.remainder() {
            self.sum += u32::from(*last) << 8;
            self.odd = true;
        }
    }

    /// Add the IPv4 pseudo header for a transport segment of `len` bytes.
    pub fn add_pseudo_v4(&mut self, saddr: [u8; 4], daddr: [u8; 4], len: u16, proto: u8) {
        self.add(&saddr);
        self.add(&daddr);
        self.add(&[0, proto]);
        self.add(&len.to_be_bytes());
    }

    /// Add the IPv6 pseudo header for a transport segment of `len` bytes.
    pub fn add_pseudo_v6(&mut self, saddr: &[u8; 16], daddr: &[u8; 16], len: u32, proto: u8) {
        self.add(saddr);
        self.add(daddr);
        self.add(&len.to_be_bytes());
        self.add(&[0, 0, 0, proto]);
    }

    /// Fold to 16 bits without complementing.
    pub fn fold(&self) -> u16 {
        fold32(self.sum)
    }

    /// The checksum value to place on the wire.
    pub fn value(&self) -> u16 {
        !self.fold()
    }

    /// Verify a stream that included the wire checksum field: the folded
    /// sum of a correct packet is all ones.
    pub fn verify(&self) -> bool {
        self.fold() == 0xffff
    }
}

fn fold32(mut sum: u32) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// One's-complement addition of two 16-bit values.
pub fn csum16_add(a: u16, b: u16) -> u16 {
    fold32(u32::from(a) + u32::from(b))
}

/// Incrementally patch a wire checksum after replacing one 16-bit field,
/// per RFC 1624: HC' = ~(~HC + ~m + m').
pub fn csum_replace(check: u16, old: u16, new: u16) -> u16 {
    !fold32(u32::from(!check) + u32::from(!old) + u32::from(new))
}

/// Feed a byte range of a descriptor into the sum, fragment by fragment.
pub fn add_desc_range(
    csum: &mut Checksum,
    desc: &FragDescriptor,
    offset: u32,
    len: u32,
) -> Result<(), Error> {
    desc.for_each_slice(offset, len, |chunk| csum.add(chunk))
}
