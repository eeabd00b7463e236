//! portlink: point-to-point loopback TCP message channel for host-worker bridging.
//!
//! The host binds an ephemeral loopback port ([`ChannelServer::bind`]), hands
//! the port to whatever launches the worker process, and accepts exactly one
//! connection ([`ChannelServer::accept`]). Both sides then exchange discrete
//! UTF-8 messages over a length-prefixed framing ([`ChannelEndpoint`]).
//!
//! Payloads are opaque to this crate: any structure inside the text (JSON
//! etc.) belongs to the caller, as do retry and reconnect policy. The channel
//! itself guarantees whole-frame delivery — a message is either received
//! completely or the call fails.

pub mod codec;

mod config;
mod endpoint;
mod server;
mod state;

pub use config::ChannelConfig;
pub use endpoint::{ChannelEndpoint, ChannelError, MessageSender};
pub use server::{ChannelServer, ServerError};
pub use state::ConnectionState;
