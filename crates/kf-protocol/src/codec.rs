//! Channel codec and inbound demultiplexer

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::channel::ChannelId;
use crate::error::ProtocolError;
use crate::frame::{ChannelFrame, HANDSHAKE_LEN};

/// Encoder for outbound data-channel frames
///
/// Outbound traffic never targets the error channel, so every item is
/// framed on channel 0.
#[derive(Debug, Default)]
pub struct ChannelCodec;

impl ChannelCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Bytes> for ChannelCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ChannelFrame::new(ChannelId::DATA, payload).encode(dst);
        Ok(())
    }
}

/// What a single inbound message means for the local side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Port confirmation that opened a channel; nothing to relay
    Handshake { channel: ChannelId, port: u16 },
    /// Bytes to write to the local TCP peer
    Data(Bytes),
    /// Diagnostic text from the remote endpoint; never relayed
    Error(String),
}

/// Per-connection inbound state machine
///
/// Tracks whether each channel's handshake frame has been consumed. One
/// instance must be used per remote connection and never shared.
#[derive(Debug, Default)]
pub struct ChannelDemux {
    /// Confirmed port per channel slot, set by that channel's first frame
    confirmed: [Option<u16>; 2],
}

impl ChannelDemux {
    /// Create a demultiplexer for a freshly opened connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Port confirmed on a channel, if its handshake has been seen
    pub fn confirmed_port(&self, channel: ChannelId) -> Option<u16> {
        channel.slot().and_then(|slot| self.confirmed[slot])
    }

    /// Whether both channels have delivered their handshake frame
    pub fn is_established(&self) -> bool {
        self.confirmed.iter().all(Option::is_some)
    }

    /// Classify one whole inbound WebSocket message
    ///
    /// The first frame on each channel consumes [`HANDSHAKE_LEN`] bytes as the
    /// port confirmation; anything after those bytes is returned as regular
    /// payload for that channel.
    pub fn accept(&mut self, message: Bytes) -> Result<Inbound, ProtocolError> {
        let frame = ChannelFrame::decode(message)?;
        let channel = frame.channel;
        let slot = channel
            .slot()
            .ok_or(ProtocolError::UnknownChannel(channel.as_u8()))?;

        let mut payload = frame.payload;

        if self.confirmed[slot].is_none() {
            if payload.len() < HANDSHAKE_LEN {
                return Err(ProtocolError::ShortHandshake {
                    channel: channel.as_u8(),
                    expected: HANDSHAKE_LEN,
                    actual: payload.len(),
                });
            }

            let port = u16::from_le_bytes([payload[0], payload[1]]);
            self.confirmed[slot] = Some(port);
            tracing::trace!("Handshake on {} channel confirmed port {}", channel, port);

            payload = payload.split_off(HANDSHAKE_LEN);
            if payload.is_empty() {
                return Ok(Inbound::Handshake { channel, port });
            }
        }

        match channel {
            ChannelId::DATA => Ok(Inbound::Data(payload)),
            _ => Ok(Inbound::Error(String::from_utf8_lossy(&payload).into_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(channel: u8, port: u16) -> Bytes {
        let p = port.to_le_bytes();
        Bytes::from(vec![channel, p[0], p[1]])
    }

    #[test]
    fn test_codec_encodes_data_channel() {
        let mut codec = ChannelCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"ping"), &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x00ping");
    }

    #[test]
    fn test_two_byte_handshake_is_swallowed() {
        let mut demux = ChannelDemux::new();
        let inbound = demux.accept(handshake(0, 8080)).unwrap();
        assert_eq!(
            inbound,
            Inbound::Handshake {
                channel: ChannelId::DATA,
                port: 8080
            }
        );
        assert_eq!(demux.confirmed_port(ChannelId::DATA), Some(8080));
        assert!(!demux.is_established());
    }

    #[test]
    fn test_long_first_frame_delivers_tail() {
        let mut demux = ChannelDemux::new();
        let message = Bytes::from_static(&[0, 0x90, 0x1f, b'a', b'b', b'c']);
        let inbound = demux.accept(message).unwrap();
        assert_eq!(inbound, Inbound::Data(Bytes::from_static(b"abc")));
        assert_eq!(demux.confirmed_port(ChannelId::DATA), Some(8080));
    }

    #[test]
    fn test_second_frame_is_all_payload() {
        let mut demux = ChannelDemux::new();
        demux.accept(handshake(0, 80)).unwrap();
        let inbound = demux.accept(Bytes::from_static(&[0, 1, 2])).unwrap();
        assert_eq!(inbound, Inbound::Data(Bytes::from_static(&[1, 2])));
    }

    #[test]
    fn test_handshakes_are_per_channel() {
        let mut demux = ChannelDemux::new();
        demux.accept(handshake(0, 80)).unwrap();
        let inbound = demux.accept(handshake(1, 80)).unwrap();
        assert!(matches!(inbound, Inbound::Handshake { channel, .. } if channel == ChannelId::ERROR));
        assert!(demux.is_established());
    }

    #[test]
    fn test_error_channel_yields_text() {
        let mut demux = ChannelDemux::new();
        demux.accept(handshake(1, 80)).unwrap();
        let mut message = vec![1u8];
        message.extend_from_slice(b"connection refused");
        let inbound = demux.accept(Bytes::from(message)).unwrap();
        assert_eq!(inbound, Inbound::Error("connection refused".to_string()));
    }

    #[test]
    fn test_error_channel_first_frame_tail_is_text() {
        let mut demux = ChannelDemux::new();
        let inbound = demux
            .accept(Bytes::from_static(&[1, 0x50, 0x00, b'b', b'a', b'd']))
            .unwrap();
        assert_eq!(inbound, Inbound::Error("bad".to_string()));
    }

    #[test]
    fn test_short_handshake_rejected() {
        let mut demux = ChannelDemux::new();
        let result = demux.accept(Bytes::from_static(&[0, 0x50]));
        assert!(matches!(
            result,
            Err(ProtocolError::ShortHandshake {
                channel: 0,
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let mut demux = ChannelDemux::new();
        let result = demux.accept(Bytes::from_static(&[2, 0, 0]));
        assert!(matches!(result, Err(ProtocolError::UnknownChannel(2))));
    }
}
