//! Client endpoint for the Magix publish/subscribe event bus
//!
//! An [`Endpoint`] holds one connection to a Magix event loop, over raw TCP
//! or WebSocket, and exposes two operations:
//!
//! - [`Endpoint::broadcast`] sends a [`MagixMessage`] to the event loop
//! - [`Endpoint::subscribe`] returns a [`Subscription`] stream of every
//!   message the event loop delivers on that connection
//!
//! Payloads are typed: each endpoint is bound to a payload type `T` and a
//! [`Codec`] for it ([`JsonCodec`] by default).
//!
//! ```no_run
//! use futures::StreamExt;
//! use magix_rs::{Endpoint, MagixMessageFilter};
//! use serde_json::Value;
//!
//! # async fn example() -> magix_rs::Result<()> {
//! let endpoint = Endpoint::<Value>::websocket("localhost", 7777, "/magix").await?;
//! let mut inputs = endpoint.subscribe_filtered(MagixMessageFilter::default().formats(["inputs"]));
//!
//! while let Some(item) = inputs.next().await {
//!     match item {
//!         Ok(message) => println!("{} from {}", message.format(), message.origin()),
//!         Err(e) if e.is_terminal() => return Err(e),
//!         Err(e) => eprintln!("skipped: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod protocol;
pub mod stats;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use endpoint::{
    spawn_converter, spawn_portal, DecodeErrorPolicy, Endpoint, EndpointConfig,
    FormatSubscription, Subscription, SubscriptionState,
};
pub use error::{ConnectionError, DecodingError, EncodingError, Error, IoError, Result};
pub use message::{MagixFormat, MagixMessage, MagixMessageFilter};
pub use protocol::constants::{DEFAULT_MAGIX_HTTP_PORT, DEFAULT_MAGIX_RAW_PORT, DEFAULT_WS_PATH};
pub use stats::StatsSnapshot;
pub use transport::TransportAddress;
