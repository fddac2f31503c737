//! WebSocket binding
//!
//! Performs the HTTP upgrade with `tokio-tungstenite`; each binary message
//! then carries exactly one protocol frame.

use futures::StreamExt;
use tokio::time::timeout;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::endpoint::EndpointConfig;
use crate::error::ConnectionError;

use super::address::TransportAddress;
use super::link::{FrameReader, FrameWriter};

/// Open a WebSocket to `address`
pub(crate) async fn connect_websocket(
    address: &TransportAddress,
    config: &EndpointConfig,
) -> Result<(FrameWriter, FrameReader), ConnectionError> {
    let url = address.url(config.tls).ok_or_else(|| {
        ConnectionError::InvalidAddress(format!("not a WebSocket address: {address}"))
    })?;

    let upgrade = connect_async_with_config(url.as_str(), None, config.tcp_nodelay);
    let (ws, response) = timeout(config.connect_timeout, upgrade)
        .await
        .map_err(|_| ConnectionError::Timeout {
            stage: "connect",
            timeout: config.connect_timeout,
        })?
        .map_err(|e| upgrade_error(e, &url))?;

    tracing::debug!(url = %url, status = %response.status(), "WebSocket upgrade complete");

    let (sink, stream) = ws.split();
    Ok((
        FrameWriter::websocket(sink),
        FrameReader::websocket(stream, config.max_frame_size),
    ))
}

fn upgrade_error(err: WsError, url: &str) -> ConnectionError {
    match err {
        WsError::Io(source) => ConnectionError::Unreachable {
            addr: url.to_string(),
            source,
        },
        WsError::Url(e) => ConnectionError::InvalidAddress(e.to_string()),
        WsError::Http(response) => ConnectionError::HandshakeRejected(format!(
            "HTTP upgrade refused with status {}",
            response.status()
        )),
        WsError::ConnectionClosed | WsError::AlreadyClosed => ConnectionError::Closed,
        other => ConnectionError::HandshakeRejected(other.to_string()),
    }
}
