//! Magix endpoint
//!
//! High-level API over one connection: `broadcast` outward, `subscribe` to
//! the inbound stream. Both share the same link.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, JsonCodec};
use crate::error::{EncodingError, Result};
use crate::message::{MagixMessage, MagixMessageFilter};
use crate::protocol::constants::FRAME_TYPE_SIZE;
use crate::protocol::Frame;
use crate::stats::StatsSnapshot;
use crate::transport::{Connection, TransportAddress};

use super::config::EndpointConfig;
use super::subscription::{Subscription, SubscriptionParts};

/// Client endpoint bound to one connection and one codec
///
/// # Example
/// ```no_run
/// use futures::StreamExt;
/// use magix_rs::{Endpoint, MagixMessage};
/// use serde_json::{json, Value};
///
/// # async fn example() -> magix_rs::Result<()> {
/// let endpoint = Endpoint::<Value>::tcp("localhost", 7778).await?;
///
/// let mut messages = endpoint.subscribe();
/// tokio::spawn(async move {
///     while let Some(item) = messages.next().await {
///         println!("{:?}", item);
///     }
/// });
///
/// endpoint
///     .broadcast(MagixMessage::new("controls", "my-device", json!({"value": 1})))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Endpoint<T, C = JsonCodec> {
    connection: Connection,
    codec: Arc<C>,
    config: EndpointConfig,
    next_subscription_id: AtomicU64,
    _payload: PhantomData<fn(T) -> T>,
}

impl<T> Endpoint<T, JsonCodec>
where
    T: Serialize + DeserializeOwned,
{
    /// Connect over raw TCP with the JSON codec and default configuration
    pub async fn tcp(host: &str, port: u16) -> Result<Self> {
        let address = TransportAddress::tcp(host, port)?;
        Self::connect(address, EndpointConfig::default(), JsonCodec).await
    }

    /// Connect over WebSocket with the JSON codec and default configuration
    pub async fn websocket(host: &str, port: u16, path: &str) -> Result<Self> {
        let address = TransportAddress::websocket(host, port, path)?;
        Self::connect(address, EndpointConfig::default(), JsonCodec).await
    }
}

impl<T, C> Endpoint<T, C>
where
    C: Codec<T>,
{
    /// Connect to `address` with an explicit configuration and codec
    ///
    /// Returns only once the handshake has completed.
    pub async fn connect(address: TransportAddress, config: EndpointConfig, codec: C) -> Result<Self> {
        let connection = Connection::establish(address, &config).await?;

        Ok(Self {
            connection,
            codec: Arc::new(codec),
            config,
            next_subscription_id: AtomicU64::new(1),
            _payload: PhantomData,
        })
    }

    /// Send a message to the event loop
    ///
    /// Waits until the frame is written to the transport, never for a remote
    /// acknowledgement. No retries.
    ///
    /// A message whose frame would exceed `max_frame_size` fails with
    /// [`Error::Encoding`](crate::Error::Encoding) and is never queued; the
    /// connection stays up.
    pub async fn broadcast(&self, message: MagixMessage<T>) -> Result<()> {
        let data = self.codec.encode(&message)?;

        let frame_size = FRAME_TYPE_SIZE + data.len();
        if frame_size > self.config.max_frame_size {
            tracing::warn!(
                size = frame_size,
                max = self.config.max_frame_size,
                "Refusing to send oversized message"
            );
            return Err(EncodingError(format!(
                "frame of {} bytes exceeds the {} byte limit",
                frame_size, self.config.max_frame_size
            ))
            .into());
        }
        self.connection
            .send(Frame::Message(data), self.config.send_timeout)
            .await?;
        Ok(())
    }

    /// Build and broadcast a message from its required fields
    pub async fn send(
        &self,
        format: impl Into<String>,
        origin: impl Into<String>,
        payload: T,
    ) -> Result<()> {
        self.broadcast(MagixMessage::new(format, origin, payload))
            .await
    }

    /// Subscribe to every message the connection delivers
    ///
    /// Returns immediately; messages arrive as the remote side emits them.
    pub fn subscribe(&self) -> Subscription<T, C> {
        self.subscribe_filtered(MagixMessageFilter::ALL)
    }

    /// Subscribe with a local filter applied on top of the connection stream
    pub fn subscribe_filtered(&self, filter: MagixMessageFilter) -> Subscription<T, C> {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);

        Subscription::new(SubscriptionParts {
            id,
            receiver: self.connection.subscribe(),
            codec: Arc::clone(&self.codec),
            filter,
            policy: self.config.decode_errors,
            parent: self.connection.shutdown_token().clone(),
            status: self.connection.status(),
            stats: Arc::clone(self.connection.stats()),
        })
    }
}

impl<T, C> Endpoint<T, C> {
    /// Close the connection
    ///
    /// Cancels every subscription and fails in-flight broadcasts. Idempotent.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Wait until the connection has fully shut down
    pub async fn closed(&self) {
        self.connection.closed().await;
    }

    /// Whether the connection is closed (locally or by the remote side)
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Address this endpoint is connected to
    pub fn address(&self) -> &TransportAddress {
        self.connection.address()
    }

    /// Configuration the endpoint was created with
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Current counters for this endpoint
    pub fn stats(&self) -> StatsSnapshot {
        self.connection.stats().snapshot()
    }
}

impl<T, C> std::fmt::Debug for Endpoint<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", self.connection.address())
            .field("closed", &self.connection.is_closed())
            .finish()
    }
}
