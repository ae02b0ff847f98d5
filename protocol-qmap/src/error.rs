//! Error types for QMAP wire parsing.

/// Error type for QMAP parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// The v5 sub-header type nibble does not name a known sub-header.
    #[error("unknown v5 header type: {0:#04x}")]
    UnknownHeaderType(u8),
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}
