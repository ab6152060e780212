//! Start-time lookups against the cluster
//!
//! Both resolvers run before a session binds its listener; neither is
//! consulted again until the next start cycle.

mod secrets;
mod target;

pub use secrets::resolve_secrets;
pub use target::{resolve_target, selector_string, ResolvedTarget};
