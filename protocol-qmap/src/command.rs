//! QMAP control commands.
//!
//! Frames with the cd_bit set in the base header carry a control command
//! instead of a data packet. The command header follows the base header
//! directly.

use crate::error::ParseError;

/// Size of the control command header.
pub const COMMAND_HEADER_LEN: usize = 8;

/// Known control command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandName {
    /// Pause transmission on a flow.
    FlowDisable = 1,
    /// Resume transmission on a flow.
    FlowEnable = 2,
    /// Downlink marker: a burst of flow data begins.
    FlowStart = 7,
    /// Downlink marker: the burst has ended.
    FlowEnd = 8,
}

impl CommandName {
    /// Try to convert a byte to a command name.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CommandName::FlowDisable),
            2 => Some(CommandName::FlowEnable),
            7 => Some(CommandName::FlowStart),
            8 => Some(CommandName::FlowEnd),
            _ => None,
        }
    }

    /// Returns true for the downlink marker commands that bracket a burst.
    pub fn is_dl_marker(&self) -> bool {
        matches!(self, CommandName::FlowStart | CommandName::FlowEnd)
    }
}

/// Control command header (8 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///    /              |               |               |               |
///   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///   +---------------+---------------+---------------+---------------+
///  0| Command name  | Flags         | Source ID                     |
///   +---------------+---------------+---------------+---------------+
///  4| Transaction ID                                                |
///   +---------------+---------------+---------------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Raw command byte; decode with [`CommandName::from_u8`].
    pub command_name: u8,
    pub flags: u8,
    pub source_id: u16,
    pub transaction_id: u32,
}

impl CommandHeader {
    /// Parse a command header from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < COMMAND_HEADER_LEN {
            return Err(ParseError::Incomplete);
        }

        Ok(Self {
            command_name: data[0],
            flags: data[1],
            source_id: u16::from_be_bytes([data[2], data[3]]),
            transaction_id: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    /// Encode the header into a byte buffer.
    ///
    /// Returns COMMAND_HEADER_LEN (8).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.command_name;
        buf[1] = self.flags;
        buf[2..4].copy_from_slice(&self.source_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.transaction_id.to_be_bytes());
        COMMAND_HEADER_LEN
    }

    /// Decoded command name, if recognized.
    pub fn name(&self) -> Option<CommandName> {
        CommandName::from_u8(self.command_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_roundtrip() {
        for val in 0..=0xff {
            if let Some(name) = CommandName::from_u8(val) {
                assert_eq!(name as u8, val);
            }
        }
        assert_eq!(CommandName::from_u8(0), None);
        assert_eq!(CommandName::from_u8(0xff), None);
    }

    #[test]
    fn test_dl_markers() {
        assert!(CommandName::FlowStart.is_dl_marker());
        assert!(CommandName::FlowEnd.is_dl_marker());
        assert!(!CommandName::FlowEnable.is_dl_marker());
        assert!(!CommandName::FlowDisable.is_dl_marker());
    }

    #[test]
    fn test_command_header_encode_parse() {
        let header = CommandHeader {
            command_name: CommandName::FlowEnable as u8,
            flags: 0,
            source_id: 0x0102,
            transaction_id: 0xdeadbeef,
        };

        let mut buf = [0u8; COMMAND_HEADER_LEN];
        assert_eq!(header.encode(&mut buf), COMMAND_HEADER_LEN);

        let parsed = CommandHeader::parse(&buf).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.name(), Some(CommandName::FlowEnable));
    }

    #[test]
    fn test_unknown_command_still_parses() {
        let header = CommandHeader {
            command_name: 42,
            flags: 1,
            source_id: 9,
            transaction_id: 7,
        };
        let mut buf = [0u8; COMMAND_HEADER_LEN];
        header.encode(&mut buf);
        let parsed = CommandHeader::parse(&buf).unwrap();
        assert_eq!(parsed.name(), None);
    }

    #[test]
    fn test_command_header_incomplete() {
        assert!(matches!(
            CommandHeader::parse(&[0u8; 4]),
            Err(ParseError::Incomplete)
        ));
    }
}
