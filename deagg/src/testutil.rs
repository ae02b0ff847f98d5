//! Shared packet builders for unit tests.

use protocol_qmap::{
    COAL_HEADER_LEN, COMMAND_HEADER_LEN, CSUM_HEADER_LEN, CoalHeader, CommandHeader, CsumHeader,
    MAP_HEADER_LEN, MapHeader,
};

use crate::checksum::Checksum;
use crate::ip::{IPPROTO_TCP, IPPROTO_UDP, ipv4_header_checksum};

/// A plain data frame: base header plus payload plus `pad_len` zero bytes.
pub fn frame(mux_id: u8, payload: &[u8], pad_len: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; MAP_HEADER_LEN];
    MapHeader {
        pad_len,
        next_hdr: false,
        cd_bit: false,
        mux_id,
        pkt_len: (payload.len() + pad_len as usize) as u16,
    }
    .encode(&mut bytes);
    bytes.extend_from_slice(payload);
    bytes.extend(std::iter::repeat(0u8).take(pad_len as usize));
    bytes
}

/// A v5 data frame with a checksum-offload sub-header.
pub fn v5_csum_frame(mux_id: u8, payload: &[u8], csum_valid: bool, pad_len: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; MAP_HEADER_LEN];
    MapHeader {
        pad_len,
        next_hdr: true,
        cd_bit: false,
        mux_id,
        pkt_len: (payload.len() + pad_len as usize) as u16,
    }
    .encode(&mut bytes);

    let mut sub = [0u8; CSUM_HEADER_LEN];
    CsumHeader {
        next_hdr: false,
        csum_valid,
    }
    .encode(&mut sub);
    bytes.extend(sub);

    bytes.extend_from_slice(payload);
    bytes.extend(std::iter::repeat(0u8).take(pad_len as usize));
    bytes
}

/// A v5 coalescing frame wrapping a superframe payload.
pub fn coal_frame(mux_id: u8, coal: &CoalHeader, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; MAP_HEADER_LEN];
    MapHeader {
        pad_len: 0,
        next_hdr: true,
        cd_bit: false,
        mux_id,
        pkt_len: payload.len() as u16,
    }
    .encode(&mut bytes);

    let mut sub = [0u8; COAL_HEADER_LEN];
    coal.encode(&mut sub);
    bytes.extend(sub);

    bytes.extend_from_slice(payload);
    bytes
}

/// A control command frame.
pub fn command_frame(mux_id: u8, cmd: &CommandHeader) -> Vec<u8> {
    let mut bytes = vec![0u8; MAP_HEADER_LEN];
    MapHeader {
        pad_len: 0,
        next_hdr: false,
        cd_bit: true,
        mux_id,
        pkt_len: COMMAND_HEADER_LEN as u16,
    }
    .encode(&mut bytes);

    let mut body = [0u8; COMMAND_HEADER_LEN];
    cmd.encode(&mut body);
    bytes.extend(body);
    bytes
}

pub fn ipv4_header(tot_len: u16, id: u16, protocol: u8, saddr: [u8; 4], daddr: [u8; 4]) -> [u8; 20] {
    let mut hdr = [0u8; 20];
    hdr[0] = 0x45;
    hdr[2..4].copy_from_slice(&tot_len.to_be_bytes());
    hdr[4..6].copy_from_slice(&id.to_be_bytes());
    hdr[8] = 64;
    hdr[9] = protocol;
    hdr[12..16].copy_from_slice(&saddr);
    hdr[16..20].copy_from_slice(&daddr);
    let check = ipv4_header_checksum(&hdr);
    hdr[10..12].copy_from_slice(&check.to_be_bytes());
    hdr
}

/// A TCP/IPv4 packet with correct header and transport checksums.
pub fn tcp_v4_packet(
    saddr: [u8; 4],
    daddr: [u8; 4],
    seq: u32,
    id: u16,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let tcp_len = 20 + payload.len();
    let mut pkt = Vec::with_capacity(20 + tcp_len);
    pkt.extend(ipv4_header((20 + tcp_len) as u16, id, IPPROTO_TCP, saddr, daddr));

    let mut tcp = [0u8; 20];
    tcp[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&0x0050u16.to_be_bytes());
    tcp[4..8].copy_from_slice(&seq.to_be_bytes());
    tcp[12] = 5 << 4;
    tcp[13] = flags;
    tcp[14..16].copy_from_slice(&0xffffu16.to_be_bytes());

    let mut csum = Checksum::new();
    csum.add_pseudo_v4(saddr, daddr, tcp_len as u16, IPPROTO_TCP);
    csum.add(&tcp);
    csum.add(payload);
    tcp[16..18].copy_from_slice(&csum.value().to_be_bytes());

    pkt.extend(tcp);
    pkt.extend_from_slice(payload);
    pkt
}

/// How to fill the checksum field of a built UDP packet.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum UdpCheck {
    Valid,
    Zero,
    Corrupt,
}

/// A UDP/IPv4 packet with the requested checksum treatment.
pub fn udp_v4_packet(
    saddr: [u8; 4],
    daddr: [u8; 4],
    payload: &[u8],
    check: UdpCheck,
) -> Vec<u8> {
    let udp_len = 8 + payload.len();
    let mut pkt = Vec::with_capacity(20 + udp_len);
    pkt.extend(ipv4_header((20 + udp_len) as u16, 0, IPPROTO_UDP, saddr, daddr));

    let mut udp = [0u8; 8];
    udp[0..2].copy_from_slice(&0x4000u16.to_be_bytes());
    udp[2..4].copy_from_slice(&0x0035u16.to_be_bytes());
    udp[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());

    let wire = match check {
        UdpCheck::Zero => 0,
        UdpCheck::Valid | UdpCheck::Corrupt => {
            let mut csum = Checksum::new();
            csum.add_pseudo_v4(saddr, daddr, udp_len as u16, IPPROTO_UDP);
            csum.add(&udp);
            csum.add(payload);
            let value = csum.value();
            if check == UdpCheck::Corrupt {
                value.wrapping_add(1)
            } else {
                value
            }
        }
    };
    udp[6..8].copy_from_slice(&wire.to_be_bytes());

    pkt.extend(udp);
    pkt.extend_from_slice(payload);
    pkt
}

/// A TCP/IPv6 packet with a correct transport checksum.
pub fn tcp_v6_packet(
    saddr: [u8; 16],
    daddr: [u8; 16],
    seq: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let tcp_len = 20 + payload.len();
    let mut pkt = Vec::with_capacity(40 + tcp_len);

    let mut ip = [0u8; 40];
    ip[0] = 0x60;
    ip[4..6].copy_from_slice(&(tcp_len as u16).to_be_bytes());
    ip[6] = IPPROTO_TCP;
    ip[7] = 64;
    ip[8..24].copy_from_slice(&saddr);
    ip[24..40].copy_from_slice(&daddr);
    pkt.extend(ip);

    let mut tcp = [0u8; 20];
    tcp[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&0x0050u16.to_be_bytes());
    tcp[4..8].copy_from_slice(&seq.to_be_bytes());
    tcp[12] = 5 << 4;
    tcp[13] = flags;
    tcp[14..16].copy_from_slice(&0xffffu16.to_be_bytes());

    let mut csum = Checksum::new();
    csum.add_pseudo_v6(&saddr, &daddr, tcp_len as u32, IPPROTO_TCP);
    csum.add(&tcp);
    csum.add(payload);
    tcp[16..18].copy_from_slice(&csum.value().to_be_bytes());

    pkt.extend(tcp);
    pkt.extend_from_slice(payload);
    pkt
}
