//! Format converter service
//!
//! Listens on an endpoint, transforms matching payloads and republishes them
//! under another format on the same endpoint.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::error::Error;
use crate::message::MagixMessageFilter;

use super::client::Endpoint;

/// Spawn a converter task
///
/// Every message accepted by `filter` is passed to `transform`; a `Some`
/// result is broadcast with format `output_format`, origin `new_origin` (or
/// the source origin when `None`) and the source's target, id and user.
/// Messages already in `output_format` are never converted again.
///
/// The task ends when the subscription ends or a broadcast fails terminally.
/// Abort the returned handle to stop it early.
pub fn spawn_converter<T, C, F>(
    endpoint: Arc<Endpoint<T, C>>,
    filter: MagixMessageFilter,
    output_format: impl Into<String>,
    new_origin: Option<String>,
    mut transform: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    C: Codec<T>,
    F: FnMut(&T) -> Option<T> + Send + 'static,
{
    let output_format = output_format.into();
    let mut messages = endpoint.subscribe_filtered(filter);

    tokio::spawn(async move {
        tracing::debug!(
            subscription = messages.id(),
            output_format = %output_format,
            "Converter started"
        );

        let mut converted: u64 = 0;
        while let Some(item) = messages.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) if !e.is_terminal() => {
                    tracing::debug!(error = %e, "Converter skipped input");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Converter input failed");
                    break;
                }
            };

            if message.format() == output_format {
                continue;
            }

            let Some(payload) = transform(message.payload()) else {
                continue;
            };

            let output = message.rerouted(&output_format, new_origin.as_deref(), payload);
            match endpoint.broadcast(output).await {
                Ok(()) => converted += 1,
                Err(e @ Error::Encoding(_)) => {
                    tracing::warn!(error = %e, "Converter output could not be encoded");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Converter broadcast failed, stopping");
                    break;
                }
            }
        }

        tracing::debug!(converted = converted, "Converter finished");
    })
}
