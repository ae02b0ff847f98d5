//! Error types for the deaggregation engine.

/// Errors surfaced by descriptor operations and packet validation.
///
/// Most hot-path failures are handled internally (count, recycle, drop) and
/// never reach the caller; this type covers the operations with a caller who
/// can do something about the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A byte range does not fit inside the descriptor.
    #[error("range {offset}+{len} exceeds descriptor length {actual}")]
    OutOfBounds { offset: u32, len: u32, actual: u32 },

    /// A frame declared a zero-length payload.
    #[error("empty frame")]
    EmptyFrame,

    /// A frame declared more bytes than the buffer holds.
    #[error("frame truncated: declared {declared} bytes, {remaining} available")]
    Truncated { declared: u32, remaining: u32 },

    /// The descriptor pool hit its configured cap.
    #[error("descriptor pool exhausted")]
    PoolExhausted,

    /// The IP version nibble named neither IPv4 nor IPv6.
    #[error("unsupported IP version nibble {0:#x}")]
    BadIpVersion(u8),

    /// Checksum validation cannot run on an IP fragment.
    #[error("fragmented IP packet")]
    Fragmented,

    /// IPv6 extension header walk ran off the packet or hit a bad length.
    #[error("malformed IPv6 extension header")]
    BadExtensionHeader,

    /// Transport protocol without checksum support.
    #[error("unsupported transport protocol {0}")]
    UnsupportedTransport(u8),

    /// Coalescing header describes more data than allowed or present.
    #[error("bad coalescing header: {0}")]
    BadCoalesceHeader(&'static str),

    /// Wire-format decode failure.
    #[error("wire format: {0}")]
    Parse(#[from] protocol_qmap::ParseError),

    /// Invalid configuration (static message).
    #[error("config error: {0}")]
    Config(&'static str),
}
