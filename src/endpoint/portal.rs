//! Portal between two event loops
//!
//! Relays messages in both directions between two endpoints, each direction
//! with its own filter. Useful to split a loop into segments, to keep some
//! traffic local to one segment, or to bridge different loop servers.
//!
//! ```text
//!   first ── forward filter ──► second
//!   first ◄── backward filter ── second
//! ```
//!
//! Loop servers echo broadcasts back to the sender, so a message relayed one
//! way is offered to the opposite direction too. The two filters should not
//! both accept the same messages.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::message::{MagixMessage, MagixMessageFilter};

use super::client::Endpoint;

enum Step<T> {
    Relay(MagixMessage<T>),
    Skip,
    Stop,
}

/// Spawn a portal task
///
/// Messages from `first` accepted by `forward` are broadcast on `second`;
/// messages from `second` accepted by `backward` are broadcast on `first`.
/// The task ends when either side's subscription ends or a relay fails
/// terminally. Abort the returned handle to stop it early.
pub fn spawn_portal<T, C1, C2>(
    first: Arc<Endpoint<T, C1>>,
    second: Arc<Endpoint<T, C2>>,
    forward: MagixMessageFilter,
    backward: MagixMessageFilter,
) -> JoinHandle<()>
where
    T: Send + 'static,
    C1: Codec<T>,
    C2: Codec<T>,
{
    let mut from_first = first.subscribe_filtered(forward);
    let mut from_second = second.subscribe_filtered(backward);

    tokio::spawn(async move {
        tracing::debug!(
            first = %first.address(),
            second = %second.address(),
            "Portal started"
        );

        let (mut forwarded, mut returned) = (0u64, 0u64);
        loop {
            tokio::select! {
                item = from_first.next() => match step(item, "forward") {
                    Step::Relay(message) => {
                        if !relay(&second, message, "forward").await {
                            break;
                        }
                        forwarded += 1;
                    }
                    Step::Skip => {}
                    Step::Stop => break,
                },
                item = from_second.next() => match step(item, "backward") {
                    Step::Relay(message) => {
                        if !relay(&first, message, "backward").await {
                            break;
                        }
                        returned += 1;
                    }
                    Step::Skip => {}
                    Step::Stop => break,
                },
            }
        }

        tracing::debug!(forwarded = forwarded, returned = returned, "Portal closed");
    })
}

fn step<T>(item: Option<Result<MagixMessage<T>>>, direction: &'static str) -> Step<T> {
    match item {
        Some(Ok(message)) => Step::Relay(message),
        Some(Err(e)) if !e.is_terminal() => {
            tracing::debug!(direction = direction, error = %e, "Portal skipped input");
            Step::Skip
        }
        Some(Err(e)) => {
            tracing::warn!(direction = direction, error = %e, "Portal input failed");
            Step::Stop
        }
        None => Step::Stop,
    }
}

/// Returns false when the portal should stop
async fn relay<T, C>(to: &Endpoint<T, C>, message: MagixMessage<T>, direction: &'static str) -> bool
where
    C: Codec<T>,
{
    match to.broadcast(message).await {
        Ok(()) => true,
        Err(e @ Error::Encoding(_)) => {
            tracing::warn!(direction = direction, error = %e, "Portal could not encode message");
            true
        }
        Err(e) => {
            tracing::warn!(direction = direction, error = %e, "Portal relay failed, stopping");
            false
        }
    }
}
