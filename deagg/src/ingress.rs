//! Ingress orchestration.
//!
//! Ties the pipeline together: received buffer chains are deaggregated into
//! per-frame descriptors, each descriptor is routed by its base header
//! (command, v5 sub-header, or plain data), and surviving packets are
//! materialized and handed to the [`Dispatch`] collaborator.

use protocol_qmap::{COMMAND_HEADER_LEN, CommandHeader, MAP_HEADER_LEN, MapHeader};

use crate::classify;
use crate::deagg::{self, RawBuffer};
use crate::deliver::{self, PacketBuf};
use crate::descriptor::FragDescriptor;
use crate::metrics;
use crate::port::Port;

/// Priority tag marking traffic on the low-latency channel. Low-latency
/// descriptors bypass the accelerator hook and their chains do not fire
/// [`Dispatch::chain_end`].
pub const LOW_LATENCY_PRIORITY: u32 = 0xda1a;

/// Collaborator interface for the ingress path.
///
/// Only [`deliver`](Dispatch::deliver) is required; the remaining hooks
/// default to no-ops.
pub trait Dispatch {
    /// A decoded control command frame.
    fn command(&mut self, _port: &Port, _cmd: &CommandHeader) {}

    /// Accelerator hook, offered every classified packet descriptor.
    /// Return the descriptor to fall through to normal delivery, or
    /// consume it (recycling via the port's pool) and return `None`.
    fn fast_path(&mut self, _port: &Port, desc: FragDescriptor) -> Option<FragDescriptor> {
        Some(desc)
    }

    /// A materialized packet ready for the stack.
    fn deliver(&mut self, pkt: PacketBuf);

    /// The end of a buffer chain; a natural point to flush batched work.
    fn chain_end(&mut self, _port: &Port) {}
}

/// Run a chain of received buffers through the full ingress pipeline.
pub fn ingress<D: Dispatch>(port: &Port, chain: &[RawBuffer], dispatch: &mut D) {
    let mut descs = Vec::new();
    for buf in chain {
        metrics::DEAGG_BUFFERS.increment();
        metrics::DEAGG_BUFFER_FRAGS.add(buf.frags().len() as u64);

        deagg::deaggregate(port, buf, &mut descs);
        for desc in descs.drain(..) {
            ingress_one(port, desc, dispatch);
        }
    }
    metrics::DEAGG_CHAINS.increment();

    // the low-latency channel delivers packet by packet; batching signals
    // would only add latency there
    let low_latency = chain
        .first()
        .is_some_and(|buf| buf.priority == LOW_LATENCY_PRIORITY);
    if !low_latency {
        dispatch.chain_end(port);
    }
}

/// Route one deaggregated frame descriptor.
fn ingress_one<D: Dispatch>(port: &Port, mut desc: FragDescriptor, dispatch: &mut D) {
    let mut scratch = [0u8; MAP_HEADER_LEN];
    let map = desc
        .header_ptr(0, MAP_HEADER_LEN as u32, &mut scratch)
        .and_then(|bytes| MapHeader::parse(bytes).ok());
    let Some(map) = map else {
        port.pool.recycle(desc);
        return;
    };

    if map.cd_bit {
        process_command(port, desc, dispatch);
        return;
    }

    if u16::from(map.pad_len) > map.pkt_len {
        port.pool.recycle(desc);
        return;
    }
    let len = map.pkt_len - u16::from(map.pad_len);

    let Some(endpoint) = port.endpoint(map.mux_id) else {
        metrics::MUX_MISS.increment();
        port.pool.recycle(desc);
        return;
    };
    desc.device = Some(endpoint.device.clone());

    let mut pkts = Vec::new();
    if map.next_hdr && (port.config.csum_v5 || port.config.coalescing) {
        classify::process_next_hdr(port, desc, len, &mut pkts);
    } else {
        // plain data frame: strip the base header, then the padding (and
        // the MAPv4 trailer, when present) off the tail
        let Some(desc) = desc.pull(&port.pool, MAP_HEADER_LEN as u32) else {
            return;
        };
        let Some(desc) = desc.trim(&port.pool, u32::from(len)) else {
            return;
        };
        pkts.push(desc);
    }

    for desc in pkts {
        let desc = if desc.priority == LOW_LATENCY_PRIORITY {
            Some(desc)
        } else {
            dispatch.fast_path(port, desc)
        };
        let Some(desc) = desc else { continue };
        if let Some(pkt) = deliver::materialize(port, desc) {
            dispatch.deliver(pkt);
        }
    }
}

fn process_command<D: Dispatch>(port: &Port, desc: FragDescriptor, dispatch: &mut D) {
    if port.config.commands {
        let mut scratch = [0u8; COMMAND_HEADER_LEN];
        let cmd = desc
            .header_ptr(MAP_HEADER_LEN as u32, COMMAND_HEADER_LEN as u32, &mut scratch)
            .and_then(|bytes| CommandHeader::parse(bytes).ok());
        if let Some(cmd) = cmd {
            let dl_marker = cmd.name().is_some_and(|name| name.is_dl_marker());
            if dl_marker && desc.priority == LOW_LATENCY_PRIORITY {
                // burst markers are meaningless on the low-latency channel
            } else {
                metrics::COMMAND_FRAMES.increment();
                dispatch.command(port, &cmd);
            }
        }
    }
    port.pool.recycle(desc);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use protocol_qmap::CommandName;

    use super::*;
    use crate::config::Config;
    use crate::deliver::CsumState;
    use crate::page::Page;
    use crate::port::Device;
    use crate::testutil::{UdpCheck, command_frame, frame, udp_v4_packet, v5_csum_frame};

    #[derive(Default)]
    struct Recorder {
        commands: Vec<CommandHeader>,
        delivered: Vec<PacketBuf>,
        chain_ends: usize,
        fast_path_consumes: bool,
        fast_path_seen: usize,
    }

    impl Dispatch for Recorder {
        fn command(&mut self, _port: &Port, cmd: &CommandHeader) {
            self.commands.push(*cmd);
        }

        fn fast_path(&mut self, port: &Port, desc: FragDescriptor) -> Option<FragDescriptor> {
            self.fast_path_seen += 1;
            if self.fast_path_consumes {
                port.pool.recycle(desc);
                None
            } else {
                Some(desc)
            }
        }

        fn deliver(&mut self, pkt: PacketBuf) {
            self.delivered.push(pkt);
        }

        fn chain_end(&mut self, _port: &Port) {
            self.chain_ends += 1;
        }
    }

    fn plain_port() -> Port {
        let config = Config {
            csum_v5: false,
            coalescing: false,
            ..Default::default()
        };
        let mut port = Port::new(config).unwrap();
        port.set_endpoint(1, Arc::new(Device::new("rmnet_data1")));
        port
    }

    fn v5_port() -> Port {
        let mut port = Port::new(Config::default()).unwrap();
        port.set_endpoint(1, Arc::new(Device::new("rmnet_data1")));
        port
    }

    fn chain_of(bytes: &[u8], priority: u32) -> Vec<RawBuffer> {
        let page = Page::from_slice(bytes);
        let mut buf = RawBuffer::new(priority);
        buf.add_frag(&page, 0, bytes.len() as u32);
        vec![buf]
    }

    #[test]
    fn test_plain_frame_delivered() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"hello", UdpCheck::Valid);
        let chain = chain_of(&frame(1, &payload, 0), 0);

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.delivered.len(), 1);
        assert_eq!(rec.delivered[0].to_vec(), payload);
        assert_eq!(rec.delivered[0].device.name, "rmnet_data1");
        assert_eq!(rec.chain_ends, 1);
        assert_eq!(port.pool.free_count(), port.pool.size());
    }

    #[test]
    fn test_padding_stripped() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"abc", UdpCheck::Valid);
        let chain = chain_of(&frame(1, &payload, 3), 0);

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.delivered.len(), 1);
        assert_eq!(rec.delivered[0].to_vec(), payload);
    }

    #[test]
    fn test_unconfigured_mux_dropped() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"x", UdpCheck::Valid);
        let chain = chain_of(&frame(9, &payload, 0), 0);

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert!(rec.delivered.is_empty());
        assert_eq!(port.pool.free_count(), port.pool.size());
    }

    #[test]
    fn test_command_routed_to_dispatcher() {
        let cmd = CommandHeader {
            command_name: CommandName::FlowEnable as u8,
            flags: 0,
            source_id: 3,
            transaction_id: 0x1001,
        };
        let chain = chain_of(&command_frame(1, &cmd), 0);

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.commands.len(), 1);
        assert_eq!(rec.commands[0], cmd);
        assert!(rec.delivered.is_empty());
        assert_eq!(port.pool.free_count(), port.pool.size());
    }

    #[test]
    fn test_commands_disabled_dropped() {
        let cmd = CommandHeader {
            command_name: CommandName::FlowEnable as u8,
            flags: 0,
            source_id: 3,
            transaction_id: 0x1001,
        };
        let chain = chain_of(&command_frame(1, &cmd), 0);

        let config = Config {
            csum_v5: false,
            coalescing: false,
            commands: false,
            ..Default::default()
        };
        let port = Port::new(config).unwrap();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert!(rec.commands.is_empty());
        assert_eq!(port.pool.free_count(), port.pool.size());
    }

    #[test]
    fn test_low_latency_dl_markers_dropped() {
        let marker = CommandHeader {
            command_name: CommandName::FlowStart as u8,
            flags: 0,
            source_id: 0,
            transaction_id: 1,
        };
        let flow = CommandHeader {
            command_name: CommandName::FlowEnable as u8,
            flags: 0,
            source_id: 0,
            transaction_id: 2,
        };
        let mut bytes = command_frame(1, &marker);
        bytes.extend(command_frame(1, &flow));
        let chain = chain_of(&bytes, LOW_LATENCY_PRIORITY);

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        // the burst marker vanishes, the flow control command survives
        assert_eq!(rec.commands.len(), 1);
        assert_eq!(rec.commands[0].transaction_id, 2);
    }

    #[test]
    fn test_chain_end_skipped_for_low_latency() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"fast", UdpCheck::Valid);
        let chain = chain_of(&frame(1, &payload, 0), LOW_LATENCY_PRIORITY);

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.delivered.len(), 1);
        assert_eq!(rec.chain_ends, 0);
        // low-latency traffic also never touches the accelerator hook
        assert_eq!(rec.fast_path_seen, 0);
    }

    #[test]
    fn test_fast_path_consumes_descriptor() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"taken", UdpCheck::Valid);
        let chain = chain_of(&frame(1, &payload, 0), 0);

        let port = plain_port();
        let mut rec = Recorder {
            fast_path_consumes: true,
            ..Default::default()
        };
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.fast_path_seen, 1);
        assert!(rec.delivered.is_empty());
        assert_eq!(port.pool.free_count(), port.pool.size());
    }

    #[test]
    fn test_v5_frame_full_path() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"verified", UdpCheck::Valid);
        let chain = chain_of(&v5_csum_frame(1, &payload, true, 0), 0);

        let port = v5_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.delivered.len(), 1);
        assert_eq!(rec.delivered[0].to_vec(), payload);
        assert_eq!(rec.delivered[0].csum, CsumState::Unnecessary);
        assert_eq!(port.pool.free_count(), port.pool.size());
    }

    #[test]
    fn test_multiple_buffers_one_chain_end() {
        let payload = udp_v4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"one", UdpCheck::Valid);
        let bytes = frame(1, &payload, 0);

        let mut chain = chain_of(&bytes, 0);
        chain.extend(chain_of(&bytes, 0));

        let port = plain_port();
        let mut rec = Recorder::default();
        ingress(&port, &chain, &mut rec);

        assert_eq!(rec.delivered.len(), 2);
        assert_eq!(rec.chain_ends, 1);
    }
}
