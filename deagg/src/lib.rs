//! Zero-copy deaggregation engine for QMAP multiplexed downlink traffic.
//!
//! Modem hardware fills large buffers with back-to-back QMAP frames and
//! hands them up as chains of page fragments. This crate carves those
//! buffers into per-packet descriptors without copying payload bytes,
//! resolves checksum offload verdicts, segments receive-coalesced
//! superframes back into individual packets, and materializes the result
//! into deliverable buffers.
//!
//! The pipeline, in order:
//!
//! 1. [`deaggregate`] splits a [`RawBuffer`] into one [`FragDescriptor`]
//!    per QMAP frame.
//! 2. Classification routes each descriptor by its headers: control
//!    commands to the dispatcher, checksum-offload frames through
//!    verification, coalesced superframes through segmentation.
//! 3. [`materialize`] turns surviving descriptors into
//!    [`PacketBuf`]s with a linear header area and zero-copy payload
//!    fragments.
//!
//! [`ingress`] runs the whole pipeline over a buffer chain, with the
//! [`Dispatch`] trait as the seam to the surrounding stack:
//!
//! ```
//! use std::sync::Arc;
//!
//! use deagg::{Config, Device, Dispatch, PacketBuf, Page, Port, RawBuffer, ingress};
//!
//! struct Stack {
//!     received: usize,
//! }
//!
//! impl Dispatch for Stack {
//!     fn deliver(&mut self, pkt: PacketBuf) {
//!         self.received += 1;
//!         let _ = pkt.to_vec();
//!     }
//! }
//!
//! // a port speaking the plain MAP format, no v5 sub-headers
//! let config = Config {
//!     csum_v5: false,
//!     coalescing: false,
//!     ..Default::default()
//! };
//! let mut port = Port::new(config).unwrap();
//! port.set_endpoint(1, Arc::new(Device::new("rmnet_data1")));
//!
//! // a buffer holding one 16-byte data frame for mux ID 1
//! let mut wire = vec![0x00, 0x01, 0x00, 0x10];
//! wire.extend([0u8; 16]);
//! let page = Page::from_slice(&wire);
//! let mut buf = RawBuffer::new(0);
//! buf.add_frag(&page, 0, wire.len() as u32);
//!
//! let mut stack = Stack { received: 0 };
//! ingress(&port, &[buf], &mut stack);
//! assert_eq!(stack.received, 1);
//! ```

pub mod checksum;
mod classify;
mod coalesce;
mod config;
mod deagg;
mod deliver;
mod descriptor;
mod error;
mod ingress;
mod ip;
mod metrics;
mod page;
mod pool;
mod port;
#[cfg(test)]
mod testutil;

pub use config::{Config, ConfigBuilder};
pub use deagg::{RawBuffer, deaggregate};
pub use deliver::{CsumState, Gso, GsoKind, PacketBuf, PacketProto, materialize};
pub use descriptor::{FragDescriptor, Fragment};
pub use error::Error;
pub use ingress::{Dispatch, LOW_LATENCY_PRIORITY, ingress};
pub use page::{Page, PageRef};
pub use pool::DescriptorPool;
pub use port::{Device, Endpoint, MAX_ENDPOINTS, Port};
