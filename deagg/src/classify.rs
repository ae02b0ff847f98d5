//! v5 sub-header classification.
//!
//! Data frames whose base header announces a v5 sub-header land here. The
//! sub-header's type byte picks the path: coalescing headers go to the
//! segmentation engine, checksum-offload headers resolve the packet's
//! checksum verdict before the headers are stripped.
//!
//! The hardware verdict is only trusted when the device has checksum offload
//! enabled. A frame the hardware did not vouch for is validated in software
//! by walking its fragments, so a bad packet is caught here rather than
//! after delivery.

use protocol_qmap::{CSUM_HEADER_LEN, CsumHeader, MAP_HEADER_LEN, V5HeaderType};

use crate::checksum::{self, Checksum};
use crate::coalesce;
use crate::descriptor::FragDescriptor;
use crate::error::Error;
use crate::ip::{self, IPPROTO_TCP, IPPROTO_UDP, IPV4_MIN_HDR_LEN, IPV6_HDR_LEN, UDP_HDR_LEN};
use crate::metrics;
use crate::port::Port;

/// Route a v5 data frame by its sub-header type, pushing the resulting
/// packet descriptors (stripped of QMAP headers) to `out`.
///
/// `len` is the frame's payload length with padding already deducted.
pub(crate) fn process_next_hdr(
    port: &Port,
    mut desc: FragDescriptor,
    len: u16,
    out: &mut Vec<FragDescriptor>,
) {
    let mut scratch = [0u8; CSUM_HEADER_LEN];
    let parsed = desc
        .header_ptr(MAP_HEADER_LEN as u32, CSUM_HEADER_LEN as u32, &mut scratch)
        .map(|bytes| (V5HeaderType::from_type_byte(bytes[0]), CsumHeader::parse(bytes)));
    let Some((header_type, csum_hdr)) = parsed else {
        port.pool.recycle(desc);
        return;
    };

    // either v5 data-format flag admits both sub-header types: hardware
    // that coalesces also checksums, and the frame says which it did
    match header_type {
        Some(V5HeaderType::Coalescing) => {
            metrics::COAL_SUPERFRAMES.increment();
            coalesce::process(port, desc, out);
        }
        Some(V5HeaderType::CsumOffload) => {
            let Ok(csum_hdr) = csum_hdr else {
                port.pool.recycle(desc);
                return;
            };

            let rx_checksum = desc
                .device
                .as_ref()
                .map(|dev| dev.rx_checksum)
                .unwrap_or(false);
            if !rx_checksum {
                metrics::CSUM_SKIPPED.increment();
            } else if csum_hdr.csum_valid {
                desc.csum_valid = true;
                metrics::CSUM_OK.increment();
            } else {
                match validate_checksum(&mut desc) {
                    Ok(true) => {
                        desc.csum_valid = true;
                        metrics::CSUM_OK.increment();
                    }
                    Ok(false) => {
                        metrics::CSUM_BAD.increment();
                    }
                    Err(_) => {
                        metrics::CSUM_UNSUPPORTED.increment();
                    }
                }
            }

            let headers = (MAP_HEADER_LEN + CSUM_HEADER_LEN) as u32;
            let Some(desc) = desc.pull(&port.pool, headers) else {
                return;
            };
            let Some(desc) = desc.trim(&port.pool, u32::from(len)) else {
                return;
            };
            out.push(desc);
        }
        None => {
            // unknown sub-header type
            port.pool.recycle(desc);
        }
    }
}

/// Software checksum validation of the packet starting after the QMAP and
/// checksum sub-headers.
///
/// Returns `Ok(true)` when the transport checksum verifies, `Ok(false)` when
/// it is wrong, and an error when the packet cannot be checksummed at all
/// (IP fragment, unknown transport, malformed headers).
fn validate_checksum(desc: &mut FragDescriptor) -> Result<bool, Error> {
    let offset = (MAP_HEADER_LEN + CSUM_HEADER_LEN) as u32;
    let out_of_bounds = |len: u32| Error::OutOfBounds {
        offset,
        len,
        actual: 0,
    };

    let mut scratch = [0u8; 60];
    let version = desc
        .header_ptr(offset, 1, &mut scratch)
        .ok_or_else(|| out_of_bounds(1))?[0];

    let mut csum = Checksum::new();
    let trans_proto;
    let trans_offset;
    let csum_len;

    match version >> 4 {
        4 => {
            let ihl = u32::from(version & 0x0f) * 4;
            if ihl < u32::from(IPV4_MIN_HDR_LEN) {
                return Err(Error::BadIpVersion(4));
            }
            let hdr = desc
                .header_ptr(offset, ihl, &mut scratch)
                .ok_or_else(|| out_of_bounds(ihl))?;
            let iph = ip::Ipv4Header::parse(hdr)?;
            if iph.is_fragment() {
                return Err(Error::Fragmented);
            }
            if iph.tot_len < iph.header_len
                || u32::from(iph.tot_len) > desc.len() - offset
            {
                return Err(out_of_bounds(u32::from(iph.tot_len)));
            }
            // a corrupt IP header invalidates everything parsed from it
            if !ip::ipv4_header_csum_ok(hdr) {
                return Ok(false);
            }

            desc.ip_proto = 4;
            desc.trans_proto = iph.protocol;
            desc.ip_len = iph.header_len;

            let len = iph.tot_len - iph.header_len;
            csum.add_pseudo_v4(iph.saddr, iph.daddr, len, iph.protocol);
            trans_proto = iph.protocol;
            trans_offset = offset + u32::from(iph.header_len);
            csum_len = u32::from(len);
        }
        6 => {
            let hdr = desc
                .header_ptr(offset, u32::from(IPV6_HDR_LEN), &mut scratch)
                .ok_or_else(|| out_of_bounds(u32::from(IPV6_HDR_LEN)))?;
            let ip6h = ip::Ipv6Header::parse(hdr)?;

            let walk = ip::ipv6_skip_exthdr(desc, offset + u32::from(IPV6_HDR_LEN), ip6h.nexthdr)?;
            if walk.frag_off != 0 {
                return Err(Error::Fragmented);
            }

            let ip_len = walk.trans_offset - offset;
            let ext_len = ip_len - u32::from(IPV6_HDR_LEN);
            let payload = u32::from(ip6h.payload_len);
            if payload < ext_len {
                return Err(Error::BadExtensionHeader);
            }
            let len = payload - ext_len;
            if ip_len + len > desc.len() - offset {
                return Err(out_of_bounds(len));
            }

            desc.ip_proto = 6;
            desc.trans_proto = walk.nexthdr;
            desc.ip_len = ip_len as u16;

            csum.add_pseudo_v6(&ip6h.saddr, &ip6h.daddr, len, walk.nexthdr);
            trans_proto = walk.nexthdr;
            trans_offset = walk.trans_offset;
            csum_len = len;
        }
        v => return Err(Error::BadIpVersion(v)),
    }

    match trans_proto {
        IPPROTO_TCP => {}
        IPPROTO_UDP => {
            let uh = desc
                .header_ptr(trans_offset, u32::from(UDP_HDR_LEN), &mut scratch)
                .ok_or_else(|| out_of_bounds(u32::from(UDP_HDR_LEN)))?;
            let udp = ip::UdpHeader::parse(uh)?;
            if udp.check == 0 {
                // a zero UDP checksum is legal over IPv4, forbidden over IPv6
                return Ok(desc.ip_proto == 4);
            }
        }
        other => return Err(Error::UnsupportedTransport(other)),
    }

    checksum::add_desc_range(&mut csum, desc, trans_offset, csum_len)?;
    Ok(csum.verify())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::page::Page;
    use crate::port::Device;
    use crate::testutil::{
        UdpCheck, coal_frame, tcp_v4_packet, tcp_v6_packet, udp_v4_packet, v5_csum_frame,
    };

    fn port() -> Port {
        Port::new(Config::default()).unwrap()
    }

    fn desc_for(port: &Port, frame: &[u8], device: Device) -> FragDescriptor {
        let page = Page::from_slice(frame);
        let mut desc = port.pool.acquire().unwrap();
        desc.add_frag(&page, 0, frame.len() as u32);
        desc.device = Some(Arc::new(device));
        desc
    }

    fn run(port: &Port, frame: &[u8], device: Device) -> Vec<FragDescriptor> {
        let desc = desc_for(port, frame, device);
        let payload_len = (frame.len() - MAP_HEADER_LEN - CSUM_HEADER_LEN) as u16;
        let mut out = Vec::new();
        process_next_hdr(port, desc, payload_len, &mut out);
        out
    }

    #[test]
    fn test_hw_valid_bit_trusted() {
        let pkt = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"payload", UdpCheck::Corrupt);
        let frame = v5_csum_frame(1, &pkt, true, 0);

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert_eq!(out.len(), 1);
        // headers stripped, verdict taken from hardware despite the bad csum
        assert_eq!(out[0].len(), pkt.len() as u32);
        assert!(out[0].csum_valid);
    }

    #[test]
    fn test_software_validation_good_packet() {
        let pkt = tcp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 7, 0x10, b"hello");
        let frame = v5_csum_frame(1, &pkt, false, 0);

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert_eq!(out.len(), 1);
        assert!(out[0].csum_valid);
    }

    #[test]
    fn test_software_validation_bad_packet() {
        let mut pkt = tcp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 7, 0x10, b"hello");
        let last = pkt.len() - 1;
        pkt[last] ^= 0xff;
        let frame = v5_csum_frame(1, &pkt, false, 0);

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert_eq!(out.len(), 1);
        assert!(!out[0].csum_valid);
    }

    #[test]
    fn test_software_validation_v6() {
        let saddr = {
            let mut a = [0u8; 16];
            a[0] = 0xfe;
            a[15] = 1;
            a
        };
        let daddr = {
            let mut a = [0u8; 16];
            a[0] = 0xfe;
            a[15] = 2;
            a
        };
        let pkt = tcp_v6_packet(saddr, daddr, 5000, 0x18, b"data over v6");
        let frame = v5_csum_frame(1, &pkt, false, 0);

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert_eq!(out.len(), 1);
        assert!(out[0].csum_valid);
    }

    #[test]
    fn test_udp_zero_csum_v4_accepted() {
        let pkt = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"dns", UdpCheck::Zero);
        let frame = v5_csum_frame(1, &pkt, false, 0);

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert!(out[0].csum_valid);
    }

    #[test]
    fn test_offload_disabled_leaves_packet_unverified() {
        let pkt = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"x", UdpCheck::Valid);
        let frame = v5_csum_frame(1, &pkt, true, 0);

        let mut device = Device::new("rmnet_data1");
        device.rx_checksum = false;

        let port = port();
        let out = run(&port, &frame, device);
        assert_eq!(out.len(), 1);
        assert!(!out[0].csum_valid);
    }

    #[test]
    fn test_padding_trimmed() {
        let pkt = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"abc", UdpCheck::Valid);
        let frame = v5_csum_frame(1, &pkt, true, 3);

        let port = port();
        let desc = desc_for(&port, &frame, Device::new("rmnet_data1"));
        let mut out = Vec::new();
        // payload length net of padding
        process_next_hdr(&port, desc, pkt.len() as u16, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), pkt.len() as u32);
    }

    #[test]
    fn test_ip_fragment_cannot_be_validated() {
        let mut pkt = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"frag", UdpCheck::Valid);
        pkt[6] = 0x20; // MF
        let check = crate::ip::ipv4_header_checksum(&pkt[..20]);
        pkt[10..12].copy_from_slice(&check.to_be_bytes());
        let frame = v5_csum_frame(1, &pkt, false, 0);

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert_eq!(out.len(), 1);
        assert!(!out[0].csum_valid);
    }

    #[test]
    fn test_either_v5_flag_admits_both_subheader_types() {
        use protocol_qmap::{CoalHeader, MAX_NLOS, NlPair};

        // two coalesced packets of 100 bytes each (40 headers + 60 payload)
        let pkt = tcp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], 9000, 3, 0x10, &[0x5a; 120]);
        let mut nl_pairs = [NlPair::default(); MAX_NLOS];
        nl_pairs[0] = NlPair {
            pkt_len: 100,
            csum_error_bitmap: 0,
            num_packets: 2,
        };
        let coal = CoalHeader {
            next_hdr: false,
            virtual_channel_id: 0,
            num_nlos: 1,
            close_type: 0,
            close_value: 0,
            csum_valid: true,
            nl_pairs,
        };
        let frame = coal_frame(1, &coal, &pkt);

        // checksum offload on, coalescing off: the superframe is still
        // handed to the coalesce engine rather than dropped
        let config = Config {
            csum_v5: true,
            coalescing: false,
            ..Default::default()
        };
        let port = Port::new(config).unwrap();
        let desc = desc_for(&port, &frame, Device::new("rmnet_data1"));
        let mut out = Vec::new();
        process_next_hdr(&port, desc, pkt.len() as u16, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].gso_segs, 2);
        assert!(out[0].csum_valid);
    }

    #[test]
    fn test_unknown_subheader_dropped() {
        let pkt = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"x", UdpCheck::Valid);
        let mut frame = v5_csum_frame(1, &pkt, true, 0);
        frame[MAP_HEADER_LEN] = 0x08; // type 4: unknown

        let port = port();
        let out = run(&port, &frame, Device::new("rmnet_data1"));
        assert!(out.is_empty());
        assert_eq!(port.pool.free_count(), port.pool.size());
    }
}
