//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or de-framing channel messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A message arrived without even a channel byte
    #[error("Empty frame: missing channel id")]
    EmptyFrame,

    /// The first frame on a channel was shorter than the port confirmation
    #[error("Short handshake on channel {channel}: expected {expected} bytes, got {actual}")]
    ShortHandshake {
        channel: u8,
        expected: usize,
        actual: usize,
    },

    /// A channel id outside the data/error pair of a single forwarded port
    #[error("Unknown channel: {0}")]
    UnknownChannel(u8),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
