//! QMAP wire format.
//!
//! QMAP multiplexes logical network channels over a single transport by
//! prefixing every frame with a small header carrying a mux ID and a payload
//! length, letting hardware aggregate many IP packets into one downlink
//! buffer. This crate implements the framing layer only: fixed-size header
//! parse/encode over byte slices with no allocation and no I/O.
//!
//! Wire elements:
//!
//! - [`MapHeader`]: the 4-byte base header in front of every frame.
//! - [`CsumHeader`] / [`CoalHeader`]: v5 sub-headers announced by the base
//!   header's next_hdr bit, carrying hardware checksum verdicts and
//!   receive-coalescing layout.
//! - [`CsumTrailer`]: the MAPv4 per-frame checksum trailer.
//! - [`CommandHeader`]: control commands flagged by the base header's cd_bit.
//!
//! # Example
//!
//! ```
//! use protocol_qmap::{MapHeader, MAP_HEADER_LEN};
//!
//! let header = MapHeader {
//!     pad_len: 2,
//!     next_hdr: false,
//!     cd_bit: false,
//!     mux_id: 3,
//!     pkt_len: 42,
//! };
//!
//! let mut buf = [0u8; MAP_HEADER_LEN];
//! header.encode(&mut buf);
//!
//! assert_eq!(MapHeader::parse(&buf).unwrap(), header);
//! ```

mod command;
mod error;
mod header;
mod trailer;
mod v5;

pub use command::{COMMAND_HEADER_LEN, CommandHeader, CommandName};
pub use error::ParseError;
pub use header::{MAP_HEADER_LEN, MapHeader, V5HeaderType};
pub use trailer::{CSUM_TRAILER_LEN, CsumTrailer};
pub use v5::{COAL_HEADER_LEN, CSUM_HEADER_LEN, CoalHeader, CsumHeader, MAX_NLOS, MAX_PACKETS, NlPair};
