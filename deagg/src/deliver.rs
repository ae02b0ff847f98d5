//! Packet materialization.
//!
//! The last stop before the dispatcher: a descriptor becomes a [`PacketBuf`]
//! with a small linear head holding the packet's headers and the payload
//! left in place as shared page fragments. Header fixups recorded during
//! segmentation (IPv4 ID, TCP sequence, flags) are applied to the head copy
//! here, never to the shared pages, along with length and checksum fixups:
//!
//! - verified packets with parsed headers are stamped checksum-partial with
//!   the pseudo-header sum in place, ready for hardware to finish on any
//!   retransmit path;
//! - verified packets without parsed headers are marked
//!   checksum-unnecessary;
//! - packets known bad get a deliberately wrong transport checksum, one off
//!   from correct, so the stack's own verification disposes of them.

use std::sync::Arc;

use bytes::BytesMut;

use crate::checksum::{Checksum, csum16_add, csum_replace};
use crate::descriptor::{FragDescriptor, Fragment};
use crate::ip::{IPPROTO_TCP, IPPROTO_UDP, offsets};
use crate::metrics;
use crate::port::{Device, Port};

/// Network protocol of a materialized packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketProto {
    Ipv4,
    Ipv6,
    /// Payload whose IP version nibble named neither; handed up as raw
    /// multiplexed data.
    Map,
}

/// Checksum state stamped on a materialized packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsumState {
    /// No verdict; the stack verifies the wire checksum itself.
    None,
    /// Verified; the stack may skip checksum verification.
    Unnecessary,
    /// Verified, headers parsed: the transport checksum field holds the
    /// pseudo-header sum and hardware can complete it from `start`.
    Partial {
        /// Offset of the transport header within the head.
        start: u16,
        /// Offset of the checksum field within the transport header.
        offset: u16,
    },
}

/// Segmentation geometry of a multi-packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gso {
    pub kind: GsoKind,
    pub size: u16,
    pub segs: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GsoKind {
    TcpV4,
    TcpV6,
    Udp,
}

/// A materialized packet: linear head plus shared payload fragments.
#[derive(Debug)]
pub struct PacketBuf {
    /// Linear bytes: the packet's headers when they were parsed, empty
    /// otherwise.
    pub head: BytesMut,
    frags: Vec<Fragment>,
    /// Continuation buffers carrying fragments past the per-buffer limit.
    pub next: Option<Box<PacketBuf>>,
    pub device: Arc<Device>,
    pub protocol: PacketProto,
    pub csum: CsumState,
    pub gso: Option<Gso>,
    pub hash: Option<u32>,
    pub priority: u32,
    /// Superframe wire bytes this packet accounts for.
    pub coal_bytes: u32,
    /// Backing page bytes the superframe occupied.
    pub coal_bufsize: u32,
}

impl PacketBuf {
    /// The packet's payload fragments (this buffer only).
    pub fn frags(&self) -> &[Fragment] {
        &self.frags
    }

    /// Bytes in this buffer: head plus fragments, continuations excluded.
    pub fn len(&self) -> usize {
        self.head.len() + self.frags.iter().map(|f| f.len() as usize).sum::<usize>()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes across the whole continuation chain.
    pub fn total_len(&self) -> usize {
        let mut len = self.len();
        let mut next = self.next.as_deref();
        while let Some(buf) = next {
            len += buf.len();
            next = buf.next.as_deref();
        }
        len
    }

    /// Flatten this buffer (continuations included) into a vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_len());
        let mut cur = Some(self);
        while let Some(buf) = cur {
            bytes.extend_from_slice(&buf.head);
            for frag in &buf.frags {
                bytes.extend_from_slice(frag.bytes());
            }
            cur = buf.next.as_deref();
        }
        bytes
    }
}

/// Materialize a descriptor into a deliverable packet, recycling the
/// descriptor. Returns `None` (dropping the packet) when the descriptor is
/// empty or inconsistent.
pub fn materialize(port: &Port, desc: FragDescriptor) -> Option<PacketBuf> {
    let Some(device) = desc.device.clone() else {
        port.pool.recycle(desc);
        return None;
    };
    let total = desc.len() as usize;
    if total == 0 {
        port.pool.recycle(desc);
        return None;
    }

    let mut scratch = [0u8; 1];
    let version = desc.header_ptr(0, 1, &mut scratch).map(|b| b[0] >> 4);
    let protocol = match version {
        Some(4) => PacketProto::Ipv4,
        Some(6) => PacketProto::Ipv6,
        _ => PacketProto::Map,
    };

    let mut desc = desc;
    let mut head;
    let frags;
    if desc.hdrs_valid {
        let hdr_len = (u32::from(desc.ip_len) + u32::from(desc.trans_len)) as usize;
        if hdr_len > total {
            port.pool.recycle(desc);
            return None;
        }
        head = BytesMut::with_capacity(port.config.headroom + hdr_len);
        head.resize(hdr_len, 0);
        if desc.copy_data(0, hdr_len as u32, &mut head).is_err() {
            port.pool.recycle(desc);
            return None;
        }
        if hdr_len == total {
            // header-only packet: the head is the whole packet
            frags = Vec::new();
        } else {
            desc = desc.pull(&port.pool, hdr_len as u32)?;
            frags = desc.take_frags();
        }
    } else {
        head = BytesMut::with_capacity(port.config.headroom);
        frags = desc.take_frags();
    }

    if desc.hdrs_valid {
        apply_rewrites(&desc, &mut head);
    }

    let csum = stamp_csum(&desc, &mut head, &frags, total);
    let gso = stamp_gso(&desc);

    let mut pkt = PacketBuf {
        head,
        frags,
        next: None,
        device,
        protocol,
        csum,
        gso,
        hash: desc.hash,
        priority: desc.priority,
        coal_bytes: desc.coal_bytes,
        coal_bufsize: desc.coal_bufsize,
    };
    chain_overflow_frags(port, &mut pkt);

    metrics::DELIVERED_PACKETS.increment();
    metrics::DELIVERED_BYTES.add(total as u64);
    port.pool.recycle(desc);
    Some(pkt)
}

/// Apply the segmentation header fixups to the head copy.
fn apply_rewrites(desc: &FragDescriptor, head: &mut BytesMut) {
    let ip_len = usize::from(desc.ip_len);

    if let Some(id) = desc.ip_id {
        let old = u16::from_be_bytes([head[offsets::IPV4_ID], head[offsets::IPV4_ID + 1]]);
        head[offsets::IPV4_ID..offsets::IPV4_ID + 2].copy_from_slice(&id.to_be_bytes());
        let check = u16::from_be_bytes([head[offsets::IPV4_CHECK], head[offsets::IPV4_CHECK + 1]]);
        let check = csum_replace(check, old, id);
        head[offsets::IPV4_CHECK..offsets::IPV4_CHECK + 2].copy_from_slice(&check.to_be_bytes());
    }

    if let Some(seq) = desc.tcp_seq {
        let at = ip_len + offsets::TCP_SEQ;
        head[at..at + 4].copy_from_slice(&seq.to_be_bytes());
    }

    if let Some(flags) = desc.tcp_flags {
        head[ip_len + offsets::TCP_FLAGS] = flags;
    }
}

/// Fix the length fields for the materialized size and stamp the checksum
/// state.
fn stamp_csum(
    desc: &FragDescriptor,
    head: &mut BytesMut,
    frags: &[Fragment],
    total: usize,
) -> CsumState {
    let known_transport = matches!(desc.trans_proto, IPPROTO_TCP | IPPROTO_UDP);
    if !desc.hdrs_valid || !known_transport {
        return if desc.csum_valid {
            CsumState::Unnecessary
        } else {
            CsumState::None
        };
    }

    let ip_len = usize::from(desc.ip_len);
    let trans_total = (total - ip_len) as u16;

    // length fields still describe the superframe on segmented packets
    if desc.ip_proto == 4 {
        let old = u16::from_be_bytes([head[offsets::IPV4_TOT_LEN], head[offsets::IPV4_TOT_LEN + 1]]);
        let new = total as u16;
        head[offsets::IPV4_TOT_LEN..offsets::IPV4_TOT_LEN + 2].copy_from_slice(&new.to_be_bytes());
        let check = u16::from_be_bytes([head[offsets::IPV4_CHECK], head[offsets::IPV4_CHECK + 1]]);
        let check = csum_replace(check, old, new);
        head[offsets::IPV4_CHECK..offsets::IPV4_CHECK + 2].copy_from_slice(&check.to_be_bytes());
    } else {
        let payload_len = (total - 40) as u16;
        head[offsets::IPV6_PAYLOAD_LEN..offsets::IPV6_PAYLOAD_LEN + 2]
            .copy_from_slice(&payload_len.to_be_bytes());
    }

    let check_at = ip_len
        + if desc.trans_proto == IPPROTO_TCP {
            offsets::TCP_CHECK
        } else {
            offsets::UDP_CHECK
        };

    if desc.trans_proto == IPPROTO_UDP {
        let at = ip_len + offsets::UDP_LEN;
        head[at..at + 2].copy_from_slice(&trans_total.to_be_bytes());
    }

    let mut pseudo = Checksum::new();
    if desc.ip_proto == 4 {
        let saddr = [head[12], head[13], head[14], head[15]];
        let daddr = [head[16], head[17], head[18], head[19]];
        pseudo.add_pseudo_v4(saddr, daddr, trans_total, desc.trans_proto);
    } else {
        let mut saddr = [0u8; 16];
        let mut daddr = [0u8; 16];
        saddr.copy_from_slice(&head[8..24]);
        daddr.copy_from_slice(&head[24..40]);
        pseudo.add_pseudo_v6(&saddr, &daddr, u32::from(trans_total), desc.trans_proto);
    }

    if desc.csum_valid {
        // checksum-partial: the field holds the pseudo sum, not its
        // complement
        head[check_at..check_at + 2].copy_from_slice(&pseudo.fold().to_be_bytes());
        let offset = if desc.trans_proto == IPPROTO_TCP {
            offsets::TCP_CHECK
        } else {
            offsets::UDP_CHECK
        };
        return CsumState::Partial {
            start: ip_len as u16,
            offset: offset as u16,
        };
    }

    // known bad: stamp a checksum that is off by one from correct so the
    // stack's verification rejects the packet, and never zero (which UDP
    // reads as "no checksum")
    head[check_at..check_at + 2].copy_from_slice(&[0, 0]);
    let mut full = pseudo;
    full.add(&head[ip_len..]);
    for frag in frags {
        full.add(frag.bytes());
    }
    let corrupt = csum16_add(full.value(), 1);
    head[check_at..check_at + 2].copy_from_slice(&corrupt.to_be_bytes());
    CsumState::None
}

fn stamp_gso(desc: &FragDescriptor) -> Option<Gso> {
    if desc.gso_segs <= 1 {
        return None;
    }
    let kind = match (desc.trans_proto, desc.ip_proto) {
        (IPPROTO_TCP, 4) => GsoKind::TcpV4,
        (IPPROTO_TCP, _) => GsoKind::TcpV6,
        _ => GsoKind::Udp,
    };
    Some(Gso {
        kind,
        size: desc.gso_size,
        segs: desc.gso_segs,
    })
}

/// Move fragments past the per-buffer limit into chained continuation
/// buffers.
fn chain_overflow_frags(port: &Port, pkt: &mut PacketBuf) {
    let max = port.config.max_frags_per_buf;
    if pkt.frags.len() <= max {
        return;
    }

    let overflow = pkt.frags.split_off(max);
    let mut chain: Option<Box<PacketBuf>> = None;
    for chunk in overflow.chunks(max).rev() {
        chain = Some(Box::new(PacketBuf {
            head: BytesMut::new(),
            frags: chunk.to_vec(),
            next: chain,
            device: pkt.device.clone(),
            protocol: pkt.protocol,
            csum: CsumState::None,
            gso: None,
            hash: None,
            priority: pkt.priority,
            coal_bytes: 0,
            coal_bufsize: 0,
        }));
    }
    pkt.next = chain;
}
