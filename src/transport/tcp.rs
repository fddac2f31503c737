//! Raw TCP binding

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::endpoint::EndpointConfig;
use crate::error::ConnectionError;

use super::link::{FrameReader, FrameWriter};

/// Open a TCP stream to `host:port`
pub(crate) async fn connect_tcp(
    host: &str,
    port: u16,
    config: &EndpointConfig,
) -> Result<(FrameWriter, FrameReader), ConnectionError> {
    let addr = format!("{host}:{port}");

    let stream = timeout(config.connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ConnectionError::Timeout {
            stage: "connect",
            timeout: config.connect_timeout,
        })?
        .map_err(|source| ConnectionError::Unreachable {
            addr: addr.clone(),
            source,
        })?;

    if config.tcp_nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
    }

    tracing::debug!(addr = %addr, "TCP connection established");

    let (read, write) = stream.into_split();
    Ok((
        FrameWriter::tcp(write),
        FrameReader::tcp(read, config.max_frame_size),
    ))
}
