//! Transport bindings
//!
//! Two ways to reach an event loop, both ending in the same [`Connection`]:
//!
//! - raw TCP: length-prefixed frames on a plain stream socket
//! - WebSocket: HTTP upgrade at a path, one frame per binary message
//!
//! The protocol handshake runs on top of either binding before the
//! connection is handed to the endpoint.

pub mod address;
pub(crate) mod connection;
pub(crate) mod link;
pub(crate) mod tcp;
pub(crate) mod websocket;

pub use address::TransportAddress;
pub(crate) use connection::{Connection, LinkStatus};
