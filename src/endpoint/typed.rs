//! Typed subscriptions on JSON endpoints
//!
//! An `Endpoint<Value>` carries every message kind on the loop. A
//! [`FormatSubscription`] narrows it to the tags of one [`MagixFormat`] and
//! decodes each payload, keeping the raw message for its headers.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::Result;
use crate::message::{MagixFormat, MagixMessage, MagixMessageFilter};

use super::client::Endpoint;
use super::subscription::{Subscription, SubscriptionState};

impl<C> Endpoint<Value, C>
where
    C: Codec<Value>,
{
    /// Subscribe to messages tagged with one of `format`'s tags
    ///
    /// Origin and target criteria are taken from `filter`; its format
    /// criterion is replaced.
    pub fn subscribe_format<P>(
        &self,
        format: &MagixFormat<P>,
        filter: MagixMessageFilter,
    ) -> FormatSubscription<P, C>
    where
        P: DeserializeOwned,
    {
        FormatSubscription {
            inner: self.subscribe_filtered(format.filter(filter)),
            format: format.clone(),
        }
    }

    /// Encode `payload` with `format` and broadcast it under the format's
    /// default tag
    pub async fn send_format<P>(
        &self,
        format: &MagixFormat<P>,
        origin: impl Into<String>,
        payload: &P,
    ) -> Result<()>
    where
        P: Serialize,
    {
        let message = format.message(origin, payload)?;
        self.broadcast(message).await
    }
}

/// Stream of `(raw message, decoded payload)` pairs for one format
///
/// A payload that does not decode is handled like any undecodable message:
/// an [`Error::Decoding`](crate::Error::Decoding) item, then the endpoint's
/// decode policy applies.
pub struct FormatSubscription<P, C> {
    inner: Subscription<Value, C>,
    format: MagixFormat<P>,
}

impl<P, C> FormatSubscription<P, C>
where
    P: DeserializeOwned,
    C: Codec<Value>,
{
    /// Receive the next item
    pub async fn recv(&mut self) -> Option<Result<(MagixMessage<Value>, P)>> {
        self.next().await
    }
}

impl<P, C> FormatSubscription<P, C> {
    pub fn format(&self) -> &MagixFormat<P> {
        &self.format
    }

    /// Identifier of the underlying subscription
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.state()
    }

    /// Messages dropped because this subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.inner.dropped()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation_token()
    }

    /// Stop receiving; idempotent
    pub fn cancel(&mut self) {
        self.inner.cancel();
    }
}

impl<P, C> Stream for FormatSubscription<P, C>
where
    P: DeserializeOwned,
    C: Codec<Value>,
{
    type Item = Result<(MagixMessage<Value>, P)>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let item = match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(message)) => match this.format.decode(&message) {
                Ok(payload) => Ok((message, payload)),
                Err(e) => Err(this.inner.decode_failed(e)),
            },
            Some(Err(e)) => Err(e),
            None => return Poll::Ready(None),
        };
        Poll::Ready(Some(item))
    }
}

impl<P, C> std::fmt::Debug for FormatSubscription<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatSubscription")
            .field("formats", &self.format.formats())
            .field("inner", &self.inner)
            .finish()
    }
}
