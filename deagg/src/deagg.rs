//! QMAP frame deaggregation.
//!
//! Hardware hands up large downlink buffers holding back-to-back QMAP
//! frames, each a base header followed by its payload. Deaggregation carves
//! one descriptor per frame out of the buffer without copying: each
//! descriptor's fragments point into the buffer's pages for exactly the
//! frame's bytes, headers included. Classification of the frame contents
//! happens later, per descriptor.

use protocol_qmap::{
    COAL_HEADER_LEN, CSUM_HEADER_LEN, CSUM_TRAILER_LEN, MAP_HEADER_LEN, MapHeader, V5HeaderType,
};

use crate::descriptor::{FragDescriptor, Fragment};
use crate::error::Error;
use crate::metrics;
use crate::page::PageRef;
use crate::port::Port;

/// A received downlink buffer: hardware-filled page fragments plus the
/// delivery priority the transport assigned to it.
#[derive(Debug, Default)]
pub struct RawBuffer {
    frags: Vec<Fragment>,
    len: u32,
    pub priority: u32,
}

impl RawBuffer {
    pub fn new(priority: u32) -> Self {
        Self {
            frags: Vec::new(),
            len: 0,
            priority,
        }
    }

    /// Append a received fragment. Pins the page.
    pub fn add_frag(&mut self, page: &PageRef, page_offset: u32, len: u32) {
        self.frags.push(Fragment::new(page.clone(), page_offset, len));
        self.len += len;
    }

    /// Total bytes in the buffer.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer's fragments.
    pub fn frags(&self) -> &[Fragment] {
        &self.frags
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the buffer.
    /// Returns `None` if the range does not fit.
    fn copy_bits(&self, offset: u32, buf: &mut [u8]) -> Option<()> {
        let len = buf.len() as u32;
        if offset.checked_add(len)? > self.len {
            return None;
        }

        let mut off = offset;
        let mut written = 0usize;
        for frag in &self.frags {
            if written == buf.len() {
                break;
            }
            if off >= frag.len() {
                off -= frag.len();
                continue;
            }
            let take = ((frag.len() - off) as usize).min(buf.len() - written);
            let start = (frag.page_offset() + off) as usize;
            buf[written..written + take]
                .copy_from_slice(&frag.page().data()[start..start + take]);
            written += take;
            off = 0;
        }
        Some(())
    }
}

/// Split a downlink buffer into per-frame descriptors, appending them to
/// `out` in wire order.
///
/// Stops at the first malformed frame: a frame that declares more bytes
/// than remain (or a zero-length frame) abandons the rest of the buffer,
/// since frame boundaries past it cannot be trusted. Descriptors carved
/// before the error are kept.
pub fn deaggregate(port: &Port, buf: &RawBuffer, out: &mut Vec<FragDescriptor>) {
    let mut start = 0u32;
    while start < buf.len() {
        match deaggregate_one(port, buf, start, out) {
            Ok(consumed) => {
                metrics::DEAGG_FRAMES.increment();
                metrics::DEAGG_BYTES.add(u64::from(consumed));
                start += consumed;
            }
            Err(Error::PoolExhausted) => break,
            Err(_) => {
                metrics::DEAGG_TRUNCATED.increment();
                break;
            }
        }
    }
}

/// Carve the frame starting at `start` out of the buffer. Returns the
/// number of buffer bytes the frame occupies, trailer and sub-header
/// included.
fn deaggregate_one(
    port: &Port,
    buf: &RawBuffer,
    start: u32,
    out: &mut Vec<FragDescriptor>,
) -> Result<u32, Error> {
    let remaining = buf.len() - start;

    let mut hdr_bytes = [0u8; MAP_HEADER_LEN];
    buf.copy_bits(start, &mut hdr_bytes).ok_or(Error::Truncated {
        declared: MAP_HEADER_LEN as u32,
        remaining,
    })?;
    let map = MapHeader::parse(&hdr_bytes)?;

    if map.pkt_len == 0 {
        return Err(Error::EmptyFrame);
    }

    let mut frame_len = MAP_HEADER_LEN as u32 + u32::from(map.pkt_len);

    if port.config.csum_trailer {
        // MAPv4: every data frame carries a trailer after its payload
        frame_len += CSUM_TRAILER_LEN as u32;
    } else if (port.config.csum_v5 || port.config.coalescing) && !map.cd_bit {
        // MAPv5: the sub-header length depends on its type byte
        let mut type_byte = [0u8];
        buf.copy_bits(start + MAP_HEADER_LEN as u32, &mut type_byte)
            .ok_or(Error::Truncated {
                declared: frame_len,
                remaining,
            })?;
        match V5HeaderType::from_type_byte(type_byte[0]) {
            Some(V5HeaderType::Coalescing) => frame_len += COAL_HEADER_LEN as u32,
            Some(V5HeaderType::CsumOffload) => frame_len += CSUM_HEADER_LEN as u32,
            None => {}
        }
    }

    if frame_len > remaining {
        return Err(Error::Truncated {
            declared: frame_len,
            remaining,
        });
    }

    let mut desc = port.pool.acquire().ok_or(Error::PoolExhausted)?;
    desc.priority = buf.priority;

    let mut off = start;
    let mut want = frame_len;
    for frag in &buf.frags {
        if want == 0 {
            break;
        }
        if off >= frag.len() {
            off -= frag.len();
            continue;
        }
        let take = (frag.len() - off).min(want);
        desc.add_frag(frag.page(), frag.page_offset() + off, take);
        want -= take;
        off = 0;
    }
    debug_assert_eq!(want, 0);

    out.push(desc);
    Ok(frame_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::page::Page;
    use crate::testutil::frame;

    fn port(config: Config) -> Port {
        Port::new(config).unwrap()
    }

    fn buffer_of(bytes: &[u8]) -> RawBuffer {
        let page = Page::from_slice(bytes);
        let mut buf = RawBuffer::new(0);
        buf.add_frag(&page, 0, bytes.len() as u32);
        buf
    }

    fn plain_config() -> Config {
        Config {
            csum_trailer: false,
            csum_v5: false,
            coalescing: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_frames_byte_conservation() {
        let mut bytes = frame(1, &[0xaa; 100], 0);
        bytes.extend(frame(2, &[0xbb; 60], 0));
        let buf = buffer_of(&bytes);

        let port = port(plain_config());
        let mut out = Vec::new();
        deaggregate(&port, &buf, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 104);
        assert_eq!(out[1].len(), 64);
        assert_eq!(out.iter().map(|d| d.len()).sum::<u32>(), buf.len());

        // each descriptor views its frame's bytes, header included
        let mut hdr = [0u8; 4];
        out[1].copy_data(0, 4, &mut hdr).unwrap();
        let map = MapHeader::parse(&hdr).unwrap();
        assert_eq!(map.mux_id, 2);
        assert_eq!(map.pkt_len, 60);

        for desc in out {
            port.pool.recycle(desc);
        }
    }

    #[test]
    fn test_frame_spanning_pages() {
        let bytes = frame(1, &[0xcc; 50], 0);
        let first = Page::from_slice(&bytes[..20]);
        let second = Page::from_slice(&bytes[20..]);
        let mut buf = RawBuffer::new(0);
        buf.add_frag(&first, 0, 20);
        buf.add_frag(&second, 0, (bytes.len() - 20) as u32);

        let port = port(plain_config());
        let mut out = Vec::new();
        deaggregate(&port, &buf, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 54);
        assert_eq!(out[0].frags().len(), 2);
    }

    #[test]
    fn test_truncated_frame_abandons_buffer() {
        let mut bytes = frame(1, &[0x11; 40], 0);
        let mut second = frame(2, &[0x22; 80], 0);
        second.truncate(30); // buffer ends mid-frame
        bytes.extend(second);
        let buf = buffer_of(&bytes);

        let port = port(plain_config());
        let mut out = Vec::new();
        deaggregate(&port, &buf, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 44);
    }

    #[test]
    fn test_zero_length_frame_abandons_buffer() {
        let mut bytes = frame(1, &[0x11; 8], 0);
        bytes.extend([0u8; 4]); // base header declaring pkt_len 0
        bytes.extend(frame(2, &[0x22; 8], 0));
        let buf = buffer_of(&bytes);

        let port = port(plain_config());
        let mut out = Vec::new();
        deaggregate(&port, &buf, &mut out);

        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_trailer_length_accounting() {
        // MAPv4 port: payload + 8-byte trailer per frame
        let payload = [0x33; 24];
        let mut bytes = frame(1, &payload, 0);
        bytes.extend([0u8; 8]); // trailer
        bytes.extend(frame(2, &payload, 0));
        bytes.extend([0u8; 8]);
        let buf = buffer_of(&bytes);

        let config = Config {
            csum_trailer: true,
            csum_v5: false,
            coalescing: false,
            ..Default::default()
        };
        let port = port(config);
        let mut out = Vec::new();
        deaggregate(&port, &buf, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 4 + 24 + 8);
        assert_eq!(out[1].len(), 4 + 24 + 8);
    }

    #[test]
    fn test_v5_csum_subheader_length_accounting() {
        use protocol_qmap::CsumHeader;

        let mut body = vec![0u8; 4];
        CsumHeader {
            next_hdr: false,
            csum_valid: true,
        }
        .encode(&mut body);
        body.extend([0x44; 32]);

        let mut bytes = Vec::new();
        let mut map = [0u8; 4];
        MapHeader {
            pad_len: 0,
            next_hdr: true,
            cd_bit: false,
            mux_id: 1,
            // pkt_len does not cover the sub-header on v5 ports
            pkt_len: 32,
        }
        .encode(&mut map);
        bytes.extend(map);
        bytes.extend(&body);

        let port = port(Config::default());
        let mut out = Vec::new();
        deaggregate(&port, &buf_from(&bytes), &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 4 + 4 + 32);
    }

    fn buf_from(bytes: &[u8]) -> RawBuffer {
        buffer_of(bytes)
    }

    #[test]
    fn test_pool_cap_drops_frames() {
        let mut bytes = frame(1, &[0x55; 16], 0);
        bytes.extend(frame(1, &[0x66; 16], 0));

        let config = Config {
            pool_prefill: 1,
            pool_cap: 1,
            ..plain_config()
        };
        let port = port(config);
        let mut out = Vec::new();
        deaggregate(&port, &buffer_of(&bytes), &mut out);

        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_priority_propagates() {
        let bytes = frame(1, &[0x77; 16], 0);
        let page = Page::from_slice(&bytes);
        let mut buf = RawBuffer::new(0xda1a);
        buf.add_frag(&page, 0, bytes.len() as u32);

        let port = port(plain_config());
        let mut out = Vec::new();
        deaggregate(&port, &buf, &mut out);
        assert_eq!(out[0].priority, 0xda1a);
    }
}
