//! Channel identifier type

use std::fmt;

/// One-byte identifier of a logical sub-stream inside a port-forward connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// Raw forwarded bytes
    pub const DATA: ChannelId = ChannelId(0);

    /// UTF-8 diagnostics from the remote endpoint
    pub const ERROR: ChannelId = ChannelId(1);

    /// Create a new channel ID
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Slot index used for per-channel bookkeeping, if this is a known channel
    pub(crate) fn slot(&self) -> Option<usize> {
        match *self {
            ChannelId::DATA => Some(0),
            ChannelId::ERROR => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChannelId::DATA => write!(f, "data"),
            ChannelId::ERROR => write!(f, "error"),
            ChannelId(other) => write!(f, "channel-{}", other),
        }
    }
}

impl From<u8> for ChannelId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_display() {
        assert_eq!(format!("{}", ChannelId::DATA), "data");
        assert_eq!(format!("{}", ChannelId::ERROR), "error");
        assert_eq!(format!("{}", ChannelId::new(7)), "channel-7");
    }

    #[test]
    fn test_known_slots() {
        assert_eq!(ChannelId::DATA.slot(), Some(0));
        assert_eq!(ChannelId::ERROR.slot(), Some(1));
        assert_eq!(ChannelId::new(2).slot(), None);
    }
}
