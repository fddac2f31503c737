//! Shared connection to the event loop
//!
//! One `Connection` owns the physical link and two background tasks:
//!
//! ```text
//!   broadcast() ──► mpsc ──► [writer task] ──► socket
//!
//!   socket ──► [reader task] ──► broadcast::Sender<Bytes> ──┬─► Subscription
//!                                                           ├─► Subscription
//!                                                           └─► Subscription
//! ```
//!
//! Writes are serialized through the writer task, reads are demultiplexed by
//! the reader task. Callers never touch the socket. Inbound frames are fanned
//! out as `Bytes`, so subscribers share one allocation per message and each
//! decodes its own copy of the envelope.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::endpoint::EndpointConfig;
use crate::error::{ConnectionError, IoError};
use crate::message::MagixMessageFilter;
use crate::protocol::{Frame, Handshake};
use crate::stats::EndpointStats;

use super::address::TransportAddress;
use super::link::{FrameReader, FrameWriter, ReadError};
use super::{tcp, websocket};

/// Limit for the farewell `Close` frame on shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of the link, published by the reader task
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkStatus {
    /// Link is up
    Open,
    /// Remote side closed gracefully
    Closed,
    /// Link broke
    Failed(IoError),
    /// Local side closed the endpoint
    Shutdown,
}

type FanOut = Arc<RwLock<Option<broadcast::Sender<Bytes>>>>;

/// Frame queued for the writer task
struct Outbound {
    frame: Frame,
    done: oneshot::Sender<Result<(), IoError>>,
}

/// Handshaken connection shared by the broadcaster and all subscriptions
pub(crate) struct Connection {
    address: TransportAddress,
    outbound: mpsc::Sender<Outbound>,
    fan_out: FanOut,
    status: watch::Receiver<LinkStatus>,
    shutdown: CancellationToken,
    stats: Arc<EndpointStats>,
}

impl Connection {
    /// Dial, handshake and start the background tasks
    ///
    /// All-or-nothing: on any failure the link is dropped and no tasks are
    /// left behind.
    pub(crate) async fn establish(
        address: TransportAddress,
        config: &EndpointConfig,
    ) -> Result<Self, ConnectionError> {
        address.validate()?;

        let (mut writer, mut reader) = match &address {
            TransportAddress::Tcp { host, port } => tcp::connect_tcp(host, *port, config).await?,
            TransportAddress::WebSocket { .. } => {
                websocket::connect_websocket(&address, config).await?
            }
        };

        let handshake = client_handshake(&mut writer, &mut reader, &config.stream_filter);
        let result = match timeout(config.handshake_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout {
                stage: "handshake",
                timeout: config.handshake_timeout,
            }),
        };
        if let Err(e) = result {
            tracing::warn!(addr = %address, error = %e, "Handshake failed");
            writer.shutdown().await;
            return Err(e);
        }

        tracing::info!(addr = %address, "Connected to Magix event loop");

        // Public fields can bypass the builder floor of 1
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue.max(1));
        let (inbound_tx, _) = broadcast::channel(config.subscription_capacity.max(1));
        let fan_out: FanOut = Arc::new(RwLock::new(Some(inbound_tx)));
        let (status_tx, status_rx) = watch::channel(LinkStatus::Open);
        let shutdown = CancellationToken::new();
        let link_down = CancellationToken::new();
        let stats = Arc::new(EndpointStats::new());

        tokio::spawn(write_loop(
            writer,
            outbound_rx,
            shutdown.clone(),
            link_down.clone(),
            Arc::clone(&stats),
        ));
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&fan_out),
            status_tx,
            shutdown.clone(),
            link_down,
            Arc::clone(&stats),
            address.to_string(),
        ));

        Ok(Self {
            address,
            outbound: outbound_tx,
            fan_out,
            status: status_rx,
            shutdown,
            stats,
        })
    }

    pub(crate) fn address(&self) -> &TransportAddress {
        &self.address
    }

    pub(crate) fn stats(&self) -> &Arc<EndpointStats> {
        &self.stats
    }

    pub(crate) fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Whether the link is no longer usable
    pub(crate) fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || *self.status.borrow() != LinkStatus::Open
    }

    /// Register a new receiver on the fan-out
    ///
    /// Returns `None` once the reader task has finished.
    pub(crate) fn subscribe(&self) -> Option<broadcast::Receiver<Bytes>> {
        self.fan_out.read().as_ref().map(broadcast::Sender::subscribe)
    }

    /// Queue a frame and wait until the writer has put it on the wire
    pub(crate) async fn send(&self, frame: Frame, send_timeout: Duration) -> Result<(), IoError> {
        if self.is_closed() {
            return Err(IoError::SendFailed("connection closed".into()));
        }

        let send = async {
            let (done_tx, done_rx) = oneshot::channel();
            self.outbound
                .send(Outbound {
                    frame,
                    done: done_tx,
                })
                .await
                .map_err(|_| IoError::SendFailed("connection closed".into()))?;

            done_rx
                .await
                .map_err(|_| IoError::SendFailed("connection closed".into()))?
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                Err(IoError::SendFailed("connection closed".into()))
            }
            result = timeout(send_timeout, send) => {
                result.map_err(|_| {
                    IoError::SendFailed(format!("timed out after {send_timeout:?}"))
                })?
            }
        }
    }

    /// Close the link; idempotent
    pub(crate) fn close(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(addr = %self.address, "Closing connection");
            self.shutdown.cancel();
        }
    }

    /// Wait until the reader task has published a final status
    pub(crate) async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| *s != LinkStatus::Open).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn client_handshake(
    writer: &mut FrameWriter,
    reader: &mut FrameReader,
    filter: &MagixMessageFilter,
) -> Result<(), ConnectionError> {
    let mut handshake = Handshake::client(filter.clone());

    if let Some(setup) = handshake.generate_initial() {
        writer.send(&setup).await.map_err(|e| {
            tracing::debug!(error = %e, "Failed to send setup frame");
            ConnectionError::Closed
        })?;
    }

    while !handshake.is_done() {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(ReadError::Io(reason))) => {
                tracing::debug!(reason = %reason, "Link dropped during handshake");
                return Err(ConnectionError::Closed);
            }
            Some(Err(ReadError::Protocol(e))) => {
                return Err(ConnectionError::HandshakeRejected(e.to_string()))
            }
            None => return Err(ConnectionError::Closed),
        };

        if let Some(reply) = handshake.process(frame)? {
            writer
                .send(&reply)
                .await
                .map_err(|_| ConnectionError::Closed)?;
        }
    }

    Ok(())
}

async fn write_loop(
    mut writer: FrameWriter,
    mut outbound: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
    link_down: CancellationToken,
    stats: Arc<EndpointStats>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                let _ = timeout(CLOSE_TIMEOUT, writer.send(&Frame::Close)).await;
                writer.shutdown().await;
                break;
            }
            _ = link_down.cancelled() => break,
            next = outbound.recv() => {
                let Some(Outbound { frame, done }) = next else { break };

                match writer.send(&frame).await {
                    Ok(bytes) => {
                        stats.on_sent(bytes);
                        let _ = done.send(Ok(()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Write failed, closing link");
                        let _ = done.send(Err(e));
                        link_down.cancel();
                        break;
                    }
                }
            }
        }
    }

    // Queued sends observe a dropped `done` and fail
    outbound.close();
    tracing::debug!("Writer task finished");
}

async fn read_loop(
    mut reader: FrameReader,
    fan_out: FanOut,
    status: watch::Sender<LinkStatus>,
    shutdown: CancellationToken,
    link_down: CancellationToken,
    stats: Arc<EndpointStats>,
    addr: String,
) {
    let final_status = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break LinkStatus::Shutdown,
            _ = link_down.cancelled() => {
                break LinkStatus::Failed(IoError::StreamBroken("write side failed".into()));
            }
            next = reader.next() => match next {
                Some(Ok(Frame::Message(data))) => {
                    stats.on_received(data.len());
                    deliver(&fan_out, data);
                }
                Some(Ok(Frame::Close)) | None => break LinkStatus::Closed,
                Some(Ok(other)) => {
                    tracing::debug!(frame_type = other.frame_type(), "Ignoring unexpected frame");
                }
                Some(Err(e)) => break LinkStatus::Failed(e.into()),
            }
        }
    };

    match &final_status {
        LinkStatus::Failed(e) => tracing::warn!(addr = %addr, error = %e, "Connection lost"),
        LinkStatus::Closed => tracing::info!(addr = %addr, "Connection closed by remote"),
        _ => tracing::debug!(addr = %addr, "Reader task stopped"),
    }

    // Publish the status before closing the fan-out so subscribers that see
    // the channel close can read why
    status.send_replace(final_status);
    link_down.cancel();
    fan_out.write().take();
}

fn deliver(fan_out: &FanOut, data: Bytes) {
    if let Some(tx) = fan_out.read().as_ref() {
        // Err means no receivers, which is fine before the first subscribe
        let _ = tx.send(data);
    }
}
