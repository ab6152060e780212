//! Channel frame encoding/decoding
//!
//! A frame is one whole WebSocket binary message:
//! - channel: 1 byte
//! - payload: the rest of the message
//!
//! There is no length field; message boundaries come from the WebSocket layer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::channel::ChannelId;
use crate::error::ProtocolError;

/// Length of the port confirmation that opens every channel
pub const HANDSHAKE_LEN: usize = 2;

/// WebSocket subprotocol negotiated with the port-forward endpoint
pub const SUBPROTOCOL: &str = "v4.channel.k8s.io";

/// A decoded channel frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFrame {
    /// Channel this frame belongs to
    pub channel: ChannelId,
    /// Bytes after the channel id
    pub payload: Bytes,
}

impl ChannelFrame {
    /// Create a new frame
    pub fn new(channel: ChannelId, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Encode the frame into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(1 + self.payload.len());
        dst.put_u8(self.channel.as_u8());
        dst.extend_from_slice(&self.payload);
    }

    /// Decode a whole message, splitting off the channel byte
    ///
    /// The payload shares the message's allocation.
    pub fn decode(mut message: Bytes) -> Result<Self, ProtocolError> {
        if message.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let channel = ChannelId::new(message[0]);
        let payload = message.split_off(1);

        Ok(Self { channel, payload })
    }
}

/// Frame raw bytes for the data channel (`0x00 || payload`)
pub fn encode_data(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(ChannelId::DATA.as_u8());
    buf.extend_from_slice(payload);
    buf.freeze()
}
