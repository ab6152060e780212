//! kf-forward: The kforward forwarding engine
//!
//! A [`ForwardSession`] exposes one remote pod port on a loopback TCP port.
//! Each accepted local connection gets its own remote stream; bytes are
//! framed with the channel codec from `kf-protocol`. Sessions reconnect on
//! their own after a failure, up to a configured ceiling.
//!
//! The [`ForwardRegistry`] starts and stops sessions in groups (templates),
//! rolling back every sibling when one forward of a template cannot start.

pub mod bridge;
pub mod health;
pub mod log;
pub mod registry;
pub mod resolve;
pub mod session;

pub use log::ForwardLog;
pub use registry::{ForwardRegistry, RunningTemplate};
pub use session::ForwardSession;
