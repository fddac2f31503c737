//! Typed payload formats
//!
//! A [`MagixFormat`] names the format tags that carry one payload type. It
//! lets a single `serde_json::Value` endpoint exchange several typed message
//! kinds: the tags build the subscription filter, and the payload is decoded
//! per message.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodingError, EncodingError};

use super::envelope::MagixMessage;
use super::filter::MagixMessageFilter;

/// Format tag sent by a format that declares no tags
pub const DEFAULT_FORMAT: &str = "magix";

/// Format tags for payloads of type `P`
///
/// The first tag is the one used when sending; all tags are accepted when
/// receiving. Duplicate tags are dropped, keeping the first occurrence.
pub struct MagixFormat<P> {
    formats: Vec<String>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> MagixFormat<P> {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for format in formats {
            let format = format.into();
            if !unique.contains(&format) {
                unique.push(format);
            }
        }

        Self {
            formats: unique,
            _payload: PhantomData,
        }
    }

    /// Accepted tags, in declaration order
    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Tag used for outgoing messages
    pub fn default_format(&self) -> &str {
        self.formats.first().map_or(DEFAULT_FORMAT, String::as_str)
    }

    pub fn accepts_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f == format)
    }

    /// `base` with its format criterion replaced by this format's tags
    pub fn filter(&self, base: MagixMessageFilter) -> MagixMessageFilter {
        MagixMessageFilter {
            format: Some(self.formats.clone()),
            ..base
        }
    }
}

impl<P: DeserializeOwned> MagixFormat<P> {
    /// Decode the payload of a generic message
    pub fn decode(&self, message: &MagixMessage<Value>) -> Result<P, DecodingError> {
        P::deserialize(message.payload()).map_err(|e| {
            DecodingError(format!(
                "payload of {:?} message: {}",
                message.format(),
                e
            ))
        })
    }
}

impl<P: Serialize> MagixFormat<P> {
    /// Build a generic message tagged with [`default_format`](Self::default_format)
    ///
    /// Use the `with_*` builders on the result to set target, id, parent id
    /// or user.
    pub fn message(
        &self,
        origin: impl Into<String>,
        payload: &P,
    ) -> Result<MagixMessage<Value>, EncodingError> {
        let payload = serde_json::to_value(payload).map_err(|e| EncodingError(e.to_string()))?;
        Ok(MagixMessage::new(self.default_format(), origin, payload))
    }
}

impl<P> Clone for MagixFormat<P> {
    fn clone(&self) -> Self {
        Self {
            formats: self.formats.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> fmt::Debug for MagixFormat<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MagixFormat")
            .field("formats", &self.formats)
            .finish()
    }
}
