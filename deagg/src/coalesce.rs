//! Receive coalescing.
//!
//! Hardware coalesces runs of same-flow packets into a superframe: one set
//! of IP and transport headers followed by the concatenated payloads, with a
//! coalescing sub-header describing the packet layout and per-packet
//! checksum verdicts.
//!
//! A clean superframe on a device with hardware GRO enabled passes through
//! whole, stamped with its segmentation geometry. Anything else is
//! reconstructed: good packet runs become multi-packet segments, bad packets
//! are isolated into their own segments so one corrupt packet cannot poison
//! its neighbors. Every segment shares the superframe's pages; only header
//! fixups (sequence numbers, IPv4 IDs, flags) are recorded, to be applied at
//! materialization.

use protocol_qmap::{COAL_HEADER_LEN, CoalHeader, MAP_HEADER_LEN, MAX_NLOS, MAX_PACKETS};

use crate::descriptor::FragDescriptor;
use crate::error::Error;
use crate::ip::{
    self, IPPROTO_TCP, IPPROTO_UDP, IPV4_MIN_HDR_LEN, IPV6_HDR_LEN, TCP_FLAG_FIN, TCP_FLAG_PSH,
    TCP_MIN_HDR_LEN, UDP_HDR_LEN,
};
use crate::metrics;
use crate::port::Port;

/// Process a coalescing frame. `desc` still includes the QMAP base header
/// and the coalescing sub-header; emitted descriptors cover IP headers and
/// payload only.
pub(crate) fn process(port: &Port, desc: FragDescriptor, out: &mut Vec<FragDescriptor>) {
    // copy the header out before pulling: the pull may drop the page it
    // lives on
    let mut hdr_bytes = [0u8; COAL_HEADER_LEN];
    if desc
        .copy_data(MAP_HEADER_LEN as u32, COAL_HEADER_LEN as u32, &mut hdr_bytes)
        .is_err()
    {
        metrics::COAL_HEADER_ERRORS.increment();
        port.pool.recycle(desc);
        return;
    }

    let coal = match CoalHeader::parse(&hdr_bytes) {
        Ok(coal) => coal,
        Err(_) => {
            metrics::COAL_HEADER_ERRORS.increment();
            port.pool.recycle(desc);
            return;
        }
    };

    if check_header(&coal).is_err() {
        metrics::COAL_HEADER_ERRORS.increment();
        port.pool.recycle(desc);
        return;
    }
    metrics::COAL_PACKETS.add(u64::from(coal.total_packets()));

    let headers = (MAP_HEADER_LEN + COAL_HEADER_LEN) as u32;
    let Some(desc) = desc.pull(&port.pool, headers) else {
        return;
    };

    segment(port, desc, &coal, out);
}

fn check_header(coal: &CoalHeader) -> Result<(), Error> {
    if coal.num_nlos == 0 || usize::from(coal.num_nlos) > MAX_NLOS {
        return Err(Error::BadCoalesceHeader("nlo count"));
    }
    let mut packets = 0u32;
    for nlo in coal.nl_pairs.iter().take(usize::from(coal.num_nlos)) {
        // the per-NLO error bitmap is 8 bits wide
        if nlo.num_packets > 8 {
            return Err(Error::BadCoalesceHeader("packets per nlo"));
        }
        packets += u32::from(nlo.num_packets);
    }
    if packets == 0 || packets > MAX_PACKETS {
        return Err(Error::BadCoalesceHeader("packet count"));
    }
    Ok(())
}

/// Parse the superframe's base headers once, then either pass it through
/// whole or walk its packets and flush segments.
fn segment(port: &Port, mut desc: FragDescriptor, coal: &CoalHeader, out: &mut Vec<FragDescriptor>) {
    let Some(device) = desc.device.clone() else {
        port.pool.recycle(desc);
        return;
    };
    let mut gro = device.hw_gro;

    let mut scratch = [0u8; 60];
    let Some(first) = desc.header_ptr(0, 1, &mut scratch).map(|b| b[0]) else {
        metrics::COAL_IP_INVALID.increment();
        port.pool.recycle(desc);
        return;
    };

    match first >> 4 {
        4 => {
            let ihl = u32::from(first & 0x0f) * 4;
            if ihl < u32::from(IPV4_MIN_HDR_LEN) {
                metrics::COAL_IP_INVALID.increment();
                port.pool.recycle(desc);
                return;
            }
            let parsed = desc
                .header_ptr(0, ihl, &mut scratch)
                .and_then(|hdr| ip::Ipv4Header::parse(hdr).ok());
            let Some(iph) = parsed else {
                metrics::COAL_IP_INVALID.increment();
                port.pool.recycle(desc);
                return;
            };
            // segments carry header options verbatim, but the aggregate
            // fast path cannot describe them
            if iph.header_len != IPV4_MIN_HDR_LEN {
                gro = false;
            }
            desc.ip_proto = 4;
            desc.trans_proto = iph.protocol;
            desc.ip_len = iph.header_len;
        }
        6 => {
            let parsed = desc
                .header_ptr(0, u32::from(IPV6_HDR_LEN), &mut scratch)
                .and_then(|hdr| ip::Ipv6Header::parse(hdr).ok());
            let Some(ip6h) = parsed else {
                metrics::COAL_IP_INVALID.increment();
                port.pool.recycle(desc);
                return;
            };
            let walk = match ip::ipv6_skip_exthdr(&desc, u32::from(IPV6_HDR_LEN), ip6h.nexthdr) {
                Ok(walk) if walk.frag_off == 0 => walk,
                _ => {
                    metrics::COAL_IP_INVALID.increment();
                    port.pool.recycle(desc);
                    return;
                }
            };
            // the fast path cannot represent extension headers or atomic
            // fragments
            if walk.has_frag_hdr || walk.trans_offset > u32::from(IPV6_HDR_LEN) {
                gro = false;
            }
            desc.ip_proto = 6;
            desc.trans_proto = walk.nexthdr;
            desc.ip_len = walk.trans_offset as u16;
        }
        _ => {
            metrics::COAL_IP_INVALID.increment();
            port.pool.recycle(desc);
            return;
        }
    }

    match desc.trans_proto {
        IPPROTO_TCP => {
            let parsed = desc
                .header_ptr(u32::from(desc.ip_len), u32::from(TCP_MIN_HDR_LEN), &mut scratch)
                .and_then(|hdr| ip::TcpHeader::parse(hdr).ok());
            let Some(th) = parsed else {
                metrics::COAL_TRANS_INVALID.increment();
                port.pool.recycle(desc);
                return;
            };
            if th.header_len < TCP_MIN_HDR_LEN {
                metrics::COAL_TRANS_INVALID.increment();
                port.pool.recycle(desc);
                return;
            }
            desc.trans_len = th.header_len;
        }
        IPPROTO_UDP => desc.trans_len = UDP_HDR_LEN,
        _ => {
            metrics::COAL_TRANS_INVALID.increment();
            port.pool.recycle(desc);
            return;
        }
    }

    desc.hdrs_valid = true;
    desc.coal_bytes = desc.len();
    desc.coal_bufsize = desc.page_bytes();

    let hlen = u32::from(desc.ip_len) + u32::from(desc.trans_len);

    // clean single-NLO superframe on a GRO device: deliver it whole
    if gro && coal.num_nlos == 1 && coal.csum_valid {
        let nlo = &coal.nl_pairs[0];
        if u32::from(nlo.pkt_len) < hlen {
            metrics::COAL_HEADER_ERRORS.increment();
            port.pool.recycle(desc);
            return;
        }
        desc.csum_valid = true;
        desc.gso_size = nlo.pkt_len - hlen as u16;
        desc.gso_segs = u16::from(nlo.num_packets);
        metrics::COAL_PASSTHROUGH.increment();
        out.push(desc);
        return;
    }

    desc.pkt_id = 0;
    desc.data_offset = 0;
    desc.gso_segs = 0;

    for nlo in coal.nl_pairs.iter().take(usize::from(coal.num_nlos)) {
        let Some(per_pkt) = u32::from(nlo.pkt_len).checked_sub(hlen) else {
            metrics::COAL_HEADER_ERRORS.increment();
            break;
        };
        desc.gso_size = per_pkt as u16;

        for pkt in 0..nlo.num_packets {
            let bad = nlo.csum_error_bitmap >> pkt & 1 != 0;
            if !gro {
                if bad {
                    metrics::COAL_CSUM_ERRORS.increment();
                }
                desc.gso_segs = 1;
                flush_segment(port, &mut desc, out, !bad);
            } else if bad {
                metrics::COAL_CSUM_ERRORS.increment();
                // close out the good run, then isolate the bad packet
                flush_segment(port, &mut desc, out, true);
                desc.gso_segs = 1;
                flush_segment(port, &mut desc, out, false);
            } else {
                desc.gso_segs += 1;
            }
        }

        // a run never spans NLO entries: the packet size changes
        flush_segment(port, &mut desc, out, true);
    }

    port.pool.recycle(desc);
}

/// Emit the pending run of `gso_segs` packets as one segment descriptor
/// sharing the superframe's header and payload pages, then advance the
/// walk state past it. A no-op when no run is pending.
fn flush_segment(
    port: &Port,
    coal_desc: &mut FragDescriptor,
    out: &mut Vec<FragDescriptor>,
    mut csum_valid: bool,
) {
    let segs = coal_desc.gso_segs;
    if segs == 0 {
        return;
    }

    let hlen = u32::from(coal_desc.ip_len) + u32::from(coal_desc.trans_len);
    let dlen = u32::from(coal_desc.gso_size) * u32::from(segs);

    let Some(mut new_desc) = port.pool.acquire() else {
        return;
    };
    new_desc.copy_meta_from(coal_desc);

    if new_desc.add_frags_from(coal_desc, 0, hlen).is_err()
        || (dlen > 0
            && new_desc
                .add_frags_from(coal_desc, hlen + coal_desc.data_offset, dlen)
                .is_err())
    {
        // layout described more payload than the superframe holds
        metrics::COAL_HEADER_ERRORS.increment();
        port.pool.recycle(new_desc);
        return;
    }

    let mut scratch = [0u8; 60];
    if coal_desc.trans_proto == IPPROTO_TCP {
        let th = coal_desc
            .header_ptr(u32::from(coal_desc.ip_len), u32::from(TCP_MIN_HDR_LEN), &mut scratch)
            .and_then(|hdr| ip::TcpHeader::parse(hdr).ok());
        if let Some(th) = th {
            new_desc.tcp_seq = Some(th.seq.wrapping_add(coal_desc.data_offset));
            if th.flags & (TCP_FLAG_FIN | TCP_FLAG_PSH) != 0 {
                // FIN/PSH belong to the last packet of the superframe only
                let end = hlen + coal_desc.data_offset + dlen;
                if end < coal_desc.len() {
                    new_desc.tcp_flags = Some(th.flags & !(TCP_FLAG_FIN | TCP_FLAG_PSH));
                }
            }
        }
    } else if coal_desc.trans_proto == IPPROTO_UDP && coal_desc.ip_proto == 4 {
        let uh = coal_desc
            .header_ptr(u32::from(coal_desc.ip_len), u32::from(UDP_HDR_LEN), &mut scratch)
            .and_then(|hdr| ip::UdpHeader::parse(hdr).ok());
        if let Some(uh) = uh {
            if uh.check == 0 {
                csum_valid = true;
            }
        }
    }

    if coal_desc.ip_proto == 4 {
        let iph = coal_desc
            .header_ptr(0, u32::from(IPV4_MIN_HDR_LEN), &mut scratch)
            .and_then(|hdr| ip::Ipv4Header::parse(hdr).ok());
        if let Some(iph) = iph {
            new_desc.ip_id = Some(iph.id.wrapping_add(coal_desc.pkt_id));
        }
    }

    new_desc.csum_valid = csum_valid;
    metrics::COAL_SEGMENTS.increment();
    out.push(new_desc);

    coal_desc.data_offset += dlen;
    coal_desc.pkt_id = coal_desc.pkt_id.wrapping_add(segs);
    coal_desc.gso_segs = 0;
    // only the first segment out of a superframe reports its accounting
    coal_desc.coal_bytes = 0;
    coal_desc.coal_bufsize = 0;
}
