//! Error types for the Magix endpoint
//!
//! Construction failures surface as [`ConnectionError`], send failures as
//! [`IoError`]. Codec failures are split into [`EncodingError`] (outbound) and
//! [`DecodingError`] (inbound) so a subscriber can tell a malformed message
//! apart from a broken connection.

use std::time::Duration;

/// Result type alias using the crate's error type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection could not be established or was lost
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Payload could not be represented by the codec
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Inbound bytes did not match the expected message schema
    #[error(transparent)]
    Decoding(#[from] DecodingError),

    /// Send or receive failure on an established connection
    #[error(transparent)]
    Io(#[from] IoError),

    /// A slow subscriber fell behind and the oldest messages were dropped
    #[error("subscriber lagged behind, {skipped} messages dropped")]
    Lagged {
        /// Number of messages dropped
        skipped: u64,
    },
}

impl Error {
    /// Whether the error ends the stream it was reported on
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Error::Decoding(_) | Error::Lagged { .. })
    }
}

/// Errors raised while establishing a connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Host, port or path failed validation; nothing was dialed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Remote host could not be reached
    #[error("host unreachable: {addr}")]
    Unreachable {
        /// Address that was dialed
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Remote side refused the protocol handshake
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Connect or handshake did not finish in time
    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        /// Which phase timed out
        stage: &'static str,
        /// Configured limit
        timeout: Duration,
    },

    /// Connection was closed before it became usable
    #[error("connection closed")]
    Closed,
}

/// Errors on an established connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    /// Outbound message could not be written
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Inbound stream broke (socket error or protocol violation)
    #[error("stream broken: {0}")]
    StreamBroken(String),
}

/// Malformed frame on the wire
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Frame had no type byte
    #[error("empty frame")]
    EmptyFrame,

    /// Unknown frame type
    #[error("unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),

    /// Frame exceeds the configured maximum
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced frame size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Setup frame could not be parsed
    #[error("invalid setup frame: {0}")]
    InvalidSetup(String),

    /// Text field was not valid UTF-8
    #[error("invalid utf-8 in frame body")]
    InvalidUtf8,
}

impl From<ProtocolError> for IoError {
    fn from(err: ProtocolError) -> Self {
        IoError::StreamBroken(err.to_string())
    }
}

/// Codec could not encode a payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("encoding failed: {0}")]
pub struct EncodingError(pub String);

/// Codec could not decode inbound bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("decoding failed: {0}")]
pub struct DecodingError(pub String);
