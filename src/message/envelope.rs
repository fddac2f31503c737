//! Typed message envelope
//!
//! Wire layout (JSON codec):
//!
//! ```text
//! {
//!   "format":   "string, required",
//!   "origin":   "string, required",
//!   "payload":  <T>,
//!   "target":   "string, optional",
//!   "id":       "string, optional",
//!   "parentId": "string, optional",
//!   "user":     <any json, optional>
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value returned by [`MagixMessage::user_name`] when `user` is an array
pub const USER_NAME_ERROR: &str = "@error";

/// A Magix message carrying a payload of type `T`
///
/// Immutable once built. The `with_*` methods consume the message and are
/// meant for construction only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagixMessage<T> {
    format: String,
    origin: String,
    payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<Value>,
}

impl<T> MagixMessage<T> {
    /// Create a message with the required fields
    pub fn new(format: impl Into<String>, origin: impl Into<String>, payload: T) -> Self {
        Self {
            format: format.into(),
            origin: origin.into(),
            payload,
            target: None,
            id: None,
            parent_id: None,
            user: None,
        }
    }

    /// Set the target endpoint
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the message id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the id of the message this one responds to
    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach user information
    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    /// Format tag
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Sending endpoint
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Message payload
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Intended receiver, if any
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Message id, if any
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Id of the message this one answers, if any
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// User descriptor, if any
    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    /// Take ownership of the payload, discarding the metadata
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Build a new message with the same metadata and a transformed payload
    pub fn map_payload<R>(self, f: impl FnOnce(T) -> R) -> MagixMessage<R> {
        MagixMessage {
            format: self.format,
            origin: self.origin,
            payload: f(self.payload),
            target: self.target,
            id: self.id,
            parent_id: self.parent_id,
            user: self.user,
        }
    }

    /// Like [`map_payload`](Self::map_payload) but with a fallible transform
    pub fn try_map_payload<R, E>(
        self,
        f: impl FnOnce(T) -> Result<R, E>,
    ) -> Result<MagixMessage<R>, E> {
        let payload = f(self.payload)?;
        Ok(MagixMessage {
            format: self.format,
            origin: self.origin,
            payload,
            target: self.target,
            id: self.id,
            parent_id: self.parent_id,
            user: self.user,
        })
    }

    /// Build a copy of the routing metadata with a different format and origin
    pub(crate) fn rerouted<R>(&self, format: &str, origin: Option<&str>, payload: R) -> MagixMessage<R> {
        MagixMessage {
            format: format.to_string(),
            origin: origin.unwrap_or(&self.origin).to_string(),
            payload,
            target: self.target.clone(),
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            user: self.user.clone(),
        }
    }

    /// User name derived from the `user` field
    ///
    /// - absent or `null`: `None`
    /// - object: its `"name"` field
    /// - string, number or bool: its content
    /// - array: [`USER_NAME_ERROR`]
    pub fn user_name(&self) -> Option<String> {
        match self.user.as_ref()? {
            Value::Null => None,
            Value::Object(map) => map.get("name").and_then(primitive_content),
            Value::Array(_) => Some(USER_NAME_ERROR.to_string()),
            primitive => primitive_content(primitive),
        }
    }
}

fn primitive_content(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
