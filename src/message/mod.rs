//! Magix message envelope, filters and typed formats
//!
//! A [`MagixMessage`] is the unit exchanged with the event loop: a typed
//! payload plus routing metadata (`format`, `origin`, `target`, ...). The
//! envelope never interprets the metadata; filtering happens server-side
//! (via the handshake stream filter) or through a [`MagixMessageFilter`]
//! layered on a single subscription. A [`MagixFormat`] maps format tags to a
//! payload type for endpoints that carry raw JSON.

pub mod envelope;
pub mod filter;
pub mod format;

pub use envelope::MagixMessage;
pub use filter::MagixMessageFilter;
pub use format::MagixFormat;
