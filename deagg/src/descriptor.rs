//! Fragment descriptors.
//!
//! A [`FragDescriptor`] is a zero-copy view of one packet: an ordered list of
//! fragments pointing into shared receive pages, plus the metadata the rest
//! of the pipeline accumulates (parsed header geometry, checksum verdict,
//! segmentation state). No packet bytes are copied until materialization;
//! cursor operations only adjust fragment offsets and lengths.
//!
//! Descriptors come from and return to a [`DescriptorPool`]. The consuming
//! operations ([`FragDescriptor::pull`], [`FragDescriptor::trim`]) recycle
//! the descriptor themselves when the request is invalid, so a `None` return
//! always means the descriptor is gone.

use std::sync::Arc;

use crate::error::Error;
use crate::page::PageRef;
use crate::pool::DescriptorPool;
use crate::port::Device;

/// One contiguous byte range inside a backing page.
#[derive(Debug, Clone)]
pub struct Fragment {
    page: PageRef,
    page_offset: u32,
    len: u32,
}

impl Fragment {
    pub(crate) fn new(page: PageRef, page_offset: u32, len: u32) -> Fragment {
        debug_assert!(
            page_offset as usize + len as usize <= page.len(),
            "fragment {}+{} outside page of {} bytes",
            page_offset,
            len,
            page.len()
        );
        Fragment {
            page,
            page_offset,
            len,
        }
    }

    /// The page this fragment points into.
    pub fn page(&self) -> &PageRef {
        &self.page
    }

    /// Offset of the fragment within its page.
    pub fn page_offset(&self) -> u32 {
        self.page_offset
    }

    /// Length of the fragment in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns true if the fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The fragment's bytes.
    pub fn bytes(&self) -> &[u8] {
        let start = self.page_offset as usize;
        &self.page.data()[start..start + self.len as usize]
    }
}

/// A descriptor for one packet built from page fragments.
#[derive(Debug, Default)]
pub struct FragDescriptor {
    frags: Vec<Fragment>,
    len: u32,

    /// Device the packet will be delivered on.
    pub device: Option<Arc<Device>>,

    /// IP version (4 or 6) once headers have been parsed, 0 before.
    pub ip_proto: u8,
    /// Transport protocol number once headers have been parsed.
    pub trans_proto: u8,
    /// IP header length, extension headers included.
    pub ip_len: u16,
    /// Transport header length.
    pub trans_len: u16,
    /// The four fields above describe this packet's headers.
    pub hdrs_valid: bool,

    /// The transport checksum has been verified, by hardware or software.
    pub csum_valid: bool,

    /// Index of this segment's first packet within its superframe.
    pub pkt_id: u16,
    /// Byte offset of this segment's payload within the superframe payload.
    pub data_offset: u32,
    /// Per-packet payload size for segmentation, 0 when not segmented.
    pub gso_size: u16,
    /// Number of coalesced packets this descriptor carries.
    pub gso_segs: u16,

    /// Superframe wire bytes this descriptor accounts for.
    pub coal_bytes: u32,
    /// Backing page bytes the superframe occupied.
    pub coal_bufsize: u32,

    /// IPv4 identification to stamp at materialization.
    pub ip_id: Option<u16>,
    /// TCP sequence number to stamp at materialization.
    pub tcp_seq: Option<u32>,
    /// TCP flags byte to stamp at materialization.
    pub tcp_flags: Option<u8>,

    /// Flow hash propagated to the materialized packet.
    pub hash: Option<u32>,
    /// Delivery priority propagated from the downlink buffer.
    pub priority: u32,
}

impl FragDescriptor {
    /// Total bytes viewed by this descriptor.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns true if the descriptor views no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The descriptor's fragments.
    pub fn frags(&self) -> &[Fragment] {
        &self.frags
    }

    /// Total size of the backing pages behind this descriptor's fragments.
    pub fn page_bytes(&self) -> u32 {
        self.frags.iter().map(|f| f.page.len() as u32).sum()
    }

    /// Append a fragment pointing into `page`. Pins the page.
    pub fn add_frag(&mut self, page: &PageRef, page_offset: u32, len: u32) {
        self.frags.push(Fragment::new(page.clone(), page_offset, len));
        self.len += len;
    }

    /// Append fragments viewing `len` bytes of `from` starting at `offset`.
    ///
    /// Shares pages with `from`; nothing is copied.
    pub fn add_frags_from(
        &mut self,
        from: &FragDescriptor,
        offset: u32,
        len: u32,
    ) -> Result<(), Error> {
        check_range(offset, len, from.len)?;

        let mut off = offset;
        let mut remaining = len;
        for frag in &from.frags {
            if remaining == 0 {
                break;
            }
            if off >= frag.len {
                off -= frag.len;
                continue;
            }
            let take = (frag.len - off).min(remaining);
            self.add_frag(&frag.page, frag.page_offset + off, take);
            remaining -= take;
            off = 0;
        }
        Ok(())
    }

    /// Call `f` with each contiguous slice of the byte range, in order.
    pub fn for_each_slice(
        &self,
        offset: u32,
        len: u32,
        mut f: impl FnMut(&[u8]),
    ) -> Result<(), Error> {
        check_range(offset, len, self.len)?;

        let mut off = offset;
        let mut remaining = len;
        for frag in &self.frags {
            if remaining == 0 {
                break;
            }
            if off >= frag.len {
                off -= frag.len;
                continue;
            }
            let take = (frag.len - off).min(remaining);
            let start = (frag.page_offset + off) as usize;
            f(&frag.page.data()[start..start + take as usize]);
            remaining -= take;
            off = 0;
        }
        Ok(())
    }

    /// Copy a byte range into `buf`, which must hold at least `len` bytes.
    pub fn copy_data(&self, offset: u32, len: u32, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < len as usize {
            return Err(Error::OutOfBounds {
                offset,
                len,
                actual: buf.len() as u32,
            });
        }
        let mut written = 0usize;
        self.for_each_slice(offset, len, |chunk| {
            buf[written..written + chunk.len()].copy_from_slice(chunk);
            written += chunk.len();
        })
    }

    /// Borrow a header's bytes without copying when they sit in one
    /// fragment, falling back to assembling them into `scratch` when they
    /// straddle a fragment boundary.
    ///
    /// Returns `None` if the range does not fit inside the descriptor or
    /// `len` is zero.
    pub fn header_ptr<'a>(
        &'a self,
        offset: u32,
        len: u32,
        scratch: &'a mut [u8],
    ) -> Option<&'a [u8]> {
        if len == 0 || check_range(offset, len, self.len).is_err() {
            return None;
        }
        debug_assert!(scratch.len() >= len as usize);

        let mut off = offset;
        for frag in &self.frags {
            if off < frag.len {
                if off + len <= frag.len {
                    let start = (frag.page_offset + off) as usize;
                    return Some(&frag.page.data()[start..start + len as usize]);
                }
                break;
            }
            off -= frag.len;
        }

        self.copy_data(offset, len, scratch).ok()?;
        Some(&scratch[..len as usize])
    }

    /// Advance the view past the first `n` bytes.
    ///
    /// Consumes the descriptor; pulling the whole view (or more) recycles it
    /// and returns `None`.
    pub fn pull(mut self, pool: &DescriptorPool, n: u32) -> Option<FragDescriptor> {
        if n >= self.len {
            pool.recycle(self);
            return None;
        }

        let mut remaining = n;
        while remaining > 0 {
            let frag = &mut self.frags[0];
            if frag.len > remaining {
                frag.page_offset += remaining;
                frag.len -= remaining;
                break;
            }
            remaining -= frag.len;
            self.frags.remove(0);
        }
        self.len -= n;
        Some(self)
    }

    /// Shrink the view to its first `new_len` bytes, releasing pages that
    /// fall off the tail.
    ///
    /// Consumes the descriptor; trimming to zero recycles it and returns
    /// `None`. A `new_len` at or beyond the current length is a no-op.
    pub fn trim(mut self, pool: &DescriptorPool, new_len: u32) -> Option<FragDescriptor> {
        if new_len == 0 {
            pool.recycle(self);
            return None;
        }
        if new_len >= self.len {
            return Some(self);
        }

        let mut excess = self.len - new_len;
        while excess > 0 {
            let Some(last) = self.frags.last_mut() else {
                break;
            };
            if last.len > excess {
                last.len -= excess;
                break;
            }
            excess -= last.len;
            self.frags.pop();
        }
        self.len = new_len;
        Some(self)
    }

    /// Move the fragments out, leaving the descriptor empty.
    pub(crate) fn take_frags(&mut self) -> Vec<Fragment> {
        self.len = 0;
        std::mem::take(&mut self.frags)
    }

    /// Copy the parse/segmentation metadata of `from`, leaving fragments
    /// untouched.
    pub(crate) fn copy_meta_from(&mut self, from: &FragDescriptor) {
        self.device = from.device.clone();
        self.ip_proto = from.ip_proto;
        self.trans_proto = from.trans_proto;
        self.ip_len = from.ip_len;
        self.trans_len = from.trans_len;
        self.hdrs_valid = from.hdrs_valid;
        self.csum_valid = from.csum_valid;
        self.pkt_id = from.pkt_id;
        self.data_offset = from.data_offset;
        self.gso_size = from.gso_size;
        self.gso_segs = from.gso_segs;
        self.coal_bytes = from.coal_bytes;
        self.coal_bufsize = from.coal_bufsize;
        self.ip_id = from.ip_id;
        self.tcp_seq = from.tcp_seq;
        self.tcp_flags = from.tcp_flags;
        self.hash = from.hash;
        self.priority = from.priority;
    }

    /// Drop all fragments and clear metadata, returning the descriptor to
    /// its freshly allocated state.
    pub(crate) fn reset(&mut self) {
        self.frags.clear();
        let frags = std::mem::take(&mut self.frags);
        *self = FragDescriptor {
            frags,
            ..FragDescriptor::default()
        };
    }
}

fn check_range(offset: u32, len: u32, actual: u32) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= actual => Ok(()),
        _ => Err(Error::OutOfBounds {
            offset,
            len,
            actual,
        }),
    }
}
