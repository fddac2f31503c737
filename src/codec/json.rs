//! JSON codec backed by `serde_json`

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DecodingError, EncodingError};
use crate::message::MagixMessage;

use super::Codec;

/// JSON codec for any serde-compatible payload
///
/// Unknown keys are ignored and absent optional fields are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, message: &MagixMessage<T>) -> Result<Bytes, EncodingError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| EncodingError(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<MagixMessage<T>, DecodingError> {
        serde_json::from_slice(bytes).map_err(|e| DecodingError(e.to_string()))
    }
}
