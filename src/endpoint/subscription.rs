//! Subscription stream
//!
//! ```text
//!            ┌──────────── item / Lagged / Decoding(Skip) ─┐
//!            ▼                                             │
//!        [Active] ─────────────────────────────────────────┘
//!            │
//!            ├── remote closed gracefully ─────► [Completed]
//!            ├── link broke / Decoding(Terminate) ► [Failed]
//!            └── cancel() / drop / endpoint closed ► [Cancelled]
//! ```
//!
//! Each subscription owns its own receiver on the connection's fan-out, so
//! cancelling one never affects the others. The receiver buffer is bounded
//! (`subscription_capacity`); when a consumer falls behind, the oldest
//! messages are dropped and the consumer gets one [`Error::Lagged`] item
//! saying how many.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::codec::Codec;
use crate::error::{DecodingError, Error, Result};
use crate::message::{MagixMessage, MagixMessageFilter};
use crate::stats::EndpointStats;
use crate::transport::LinkStatus;

use super::config::DecodeErrorPolicy;

/// State of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Receiving messages
    Active,
    /// Remote side closed gracefully
    Completed,
    /// Link or decode failure ended the stream
    Failed,
    /// Consumer or endpoint stopped the stream
    Cancelled,
}

impl SubscriptionState {
    /// Whether no further items will be delivered
    pub fn is_terminal(self) -> bool {
        self != SubscriptionState::Active
    }
}

/// Live stream of messages received on an endpoint's connection
///
/// Yields `Ok(message)` in the order the connection received them. Errors
/// that do not end the stream ([`Error::Lagged`], [`Error::Decoding`] under
/// [`DecodeErrorPolicy::Skip`]) are yielded in place of the affected
/// messages. After a terminal state the stream only yields `None`.
pub struct Subscription<T, C> {
    id: u64,
    frames: Option<BroadcastStream<Bytes>>,
    codec: Arc<C>,
    filter: MagixMessageFilter,
    policy: DecodeErrorPolicy,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    status: watch::Receiver<LinkStatus>,
    state: SubscriptionState,
    dropped: u64,
    stats: Arc<EndpointStats>,
    _payload: PhantomData<fn() -> T>,
}

pub(crate) struct SubscriptionParts<C> {
    pub(crate) id: u64,
    pub(crate) receiver: Option<broadcast::Receiver<Bytes>>,
    pub(crate) codec: Arc<C>,
    pub(crate) filter: MagixMessageFilter,
    pub(crate) policy: DecodeErrorPolicy,
    pub(crate) parent: CancellationToken,
    pub(crate) status: watch::Receiver<LinkStatus>,
    pub(crate) stats: Arc<EndpointStats>,
}

impl<T, C> Subscription<T, C>
where
    C: Codec<T>,
{
    pub(crate) fn new(parts: SubscriptionParts<C>) -> Self {
        let token = parts.parent.child_token();
        let cancelled = Box::pin(token.clone().cancelled_owned());

        if parts.receiver.is_some() {
            parts.stats.subscription_opened();
            tracing::debug!(subscription = parts.id, "Subscription added");
        }

        Self {
            id: parts.id,
            frames: parts.receiver.map(BroadcastStream::new),
            codec: parts.codec,
            filter: parts.filter,
            policy: parts.policy,
            token,
            cancelled,
            status: parts.status,
            state: SubscriptionState::Active,
            dropped: 0,
            stats: parts.stats,
            _payload: PhantomData,
        }
    }

    /// Receive the next item
    ///
    /// Equivalent to `StreamExt::next`; returns `None` once terminal.
    pub async fn recv(&mut self) -> Option<Result<MagixMessage<T>>> {
        self.next().await
    }
}

impl<T, C> Subscription<T, C> {
    /// Identifier, unique per endpoint
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Messages dropped because this subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Token that cancels this subscription (and only this one)
    ///
    /// Useful to stop a subscription that was moved into another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop receiving; idempotent
    ///
    /// Buffered, undelivered messages are released immediately.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.finish(SubscriptionState::Cancelled);
    }

    fn finish(&mut self, state: SubscriptionState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;

        if self.frames.take().is_some() {
            self.stats.subscription_closed();
            tracing::debug!(
                subscription = self.id,
                state = ?state,
                dropped = self.dropped,
                "Subscription removed"
            );
        }
    }

    /// Count a message that failed to decode and apply the decode policy
    pub(super) fn decode_failed(&mut self, error: DecodingError) -> Error {
        self.stats.on_decode_failure();
        tracing::warn!(subscription = self.id, error = %error, "Failed to decode message");
        if self.policy == DecodeErrorPolicy::Terminate {
            self.finish(SubscriptionState::Failed);
        }
        error.into()
    }

    /// The fan-out closed: the reader task has published why
    fn on_link_end(&mut self) -> Option<Result<MagixMessage<T>>> {
        let status = self.status.borrow().clone();
        match status {
            LinkStatus::Failed(e) => {
                self.finish(SubscriptionState::Failed);
                Some(Err(Error::Io(e)))
            }
            LinkStatus::Shutdown => {
                self.finish(SubscriptionState::Cancelled);
                None
            }
            LinkStatus::Closed | LinkStatus::Open => {
                self.finish(SubscriptionState::Completed);
                None
            }
        }
    }
}

impl<T, C> Stream for Subscription<T, C>
where
    C: Codec<T>,
{
    type Item = Result<MagixMessage<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.state.is_terminal() {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finish(SubscriptionState::Cancelled);
            return Poll::Ready(None);
        }

        loop {
            let Some(frames) = this.frames.as_mut() else {
                return Poll::Ready(this.on_link_end());
            };

            match ready!(frames.poll_next_unpin(cx)) {
                Some(Ok(data)) => match this.codec.decode(&data) {
                    Ok(message) => {
                        if this.filter.accepts(&message) {
                            return Poll::Ready(Some(Ok(message)));
                        }
                    }
                    Err(e) => return Poll::Ready(Some(Err(this.decode_failed(e)))),
                },
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    this.dropped += skipped;
                    this.stats.on_lagged(skipped);
                    tracing::warn!(
                        subscription = this.id,
                        skipped = skipped,
                        "Subscriber lagged, oldest messages dropped"
                    );
                    return Poll::Ready(Some(Err(Error::Lagged { skipped })));
                }
                None => return Poll::Ready(this.on_link_end()),
            }
        }
    }
}

impl<T, C> Drop for Subscription<T, C> {
    fn drop(&mut self) {
        self.finish(SubscriptionState::Cancelled);
    }
}

impl<T, C> std::fmt::Debug for Subscription<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("dropped", &self.dropped)
            .finish()
    }
}
