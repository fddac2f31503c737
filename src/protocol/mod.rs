//! Magix wire protocol
//!
//! Framing and the session handshake shared by both transport bindings.

pub mod constants;
pub mod frame;
pub mod handshake;

pub use frame::{Frame, FrameDecoder};
pub use handshake::{Handshake, HandshakeRole};
