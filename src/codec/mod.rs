//! Payload codecs
//!
//! The endpoint never encodes anything itself: every outbound message goes
//! through a [`Codec`] bound at construction time, and every inbound frame is
//! decoded by the same codec. [`JsonCodec`] is the default and matches the
//! JSON wire format used by Magix event loops.

pub mod json;

use bytes::Bytes;

use crate::error::{DecodingError, EncodingError};
use crate::message::MagixMessage;

pub use json::JsonCodec;

/// Encode and decode messages carrying payloads of type `T`
///
/// Implementations must be stateless with respect to individual messages;
/// one codec instance is shared by the broadcaster and all subscriptions.
pub trait Codec<T>: Send + Sync + 'static {
    /// Encode a message into one wire unit
    fn encode(&self, message: &MagixMessage<T>) -> Result<Bytes, EncodingError>;

    /// Decode one wire unit into a message
    fn decode(&self, bytes: &[u8]) -> Result<MagixMessage<T>, DecodingError>;
}
