//! kf-protocol: Channel framing for port-forward streams
//!
//! The remote tunnelling endpoint speaks the `v4.channel.k8s.io` WebSocket
//! subprotocol. Every binary message starts with a one-byte channel id; for a
//! single forwarded port channel 0 carries data and channel 1 carries error
//! text. The first message on each channel is a 2-byte port confirmation.

pub mod channel;
pub mod codec;
pub mod error;
pub mod frame;

pub use channel::ChannelId;
pub use codec::{ChannelCodec, ChannelDemux, Inbound};
pub use error::ProtocolError;
pub use frame::{encode_data, ChannelFrame, HANDSHAKE_LEN, SUBPROTOCOL};
