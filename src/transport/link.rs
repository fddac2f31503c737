//! Frame-level halves of a physical connection
//!
//! Both bindings are split into a writer and a reader so the connection can
//! drive them from separate tasks. The set of bindings is closed, so the
//! halves are plain enums rather than trait objects.

use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{IoError, ProtocolError};
use crate::protocol::{Frame, FrameDecoder};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Initial read/write buffer size for raw TCP
const BUFFER_SIZE: usize = 64 * 1024;

/// Failure while reading a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadError {
    /// Socket error or truncated stream
    Io(String),
    /// Peer sent bytes that are not a valid frame
    Protocol(ProtocolError),
}

impl From<ReadError> for IoError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(reason) => IoError::StreamBroken(reason),
            ReadError::Protocol(e) => e.into(),
        }
    }
}

/// Outbound half
pub(crate) enum FrameWriter {
    Tcp {
        stream: OwnedWriteHalf,
        buf: BytesMut,
    },
    WebSocket(SplitSink<WsStream, Message>),
}

impl FrameWriter {
    pub(crate) fn tcp(stream: OwnedWriteHalf) -> Self {
        FrameWriter::Tcp {
            stream,
            buf: BytesMut::with_capacity(BUFFER_SIZE),
        }
    }

    pub(crate) fn websocket(sink: SplitSink<WsStream, Message>) -> Self {
        FrameWriter::WebSocket(sink)
    }

    /// Write one frame; returns the number of bytes put on the wire
    pub(crate) async fn send(&mut self, frame: &Frame) -> Result<usize, IoError> {
        match self {
            FrameWriter::Tcp { stream, buf } => {
                buf.clear();
                frame.encode_length_prefixed(buf).map_err(send_failed)?;
                stream.write_all(&buf[..]).await.map_err(send_failed)?;
                Ok(buf.len())
            }
            FrameWriter::WebSocket(sink) => {
                let data = frame.encode().map_err(send_failed)?;
                let len = data.len();
                sink.send(Message::Binary(data)).await.map_err(send_failed)?;
                Ok(len)
            }
        }
    }

    /// Best-effort close of the outbound direction
    pub(crate) async fn shutdown(&mut self) {
        match self {
            FrameWriter::Tcp { stream, .. } => {
                let _ = stream.shutdown().await;
            }
            FrameWriter::WebSocket(sink) => {
                let _ = sink.close().await;
            }
        }
    }
}

/// Inbound half
pub(crate) enum FrameReader {
    Tcp {
        stream: OwnedReadHalf,
        buf: BytesMut,
        decoder: FrameDecoder,
    },
    WebSocket {
        stream: SplitStream<WsStream>,
        max_frame_size: usize,
    },
}

impl FrameReader {
    pub(crate) fn tcp(stream: OwnedReadHalf, max_frame_size: usize) -> Self {
        FrameReader::Tcp {
            stream,
            buf: BytesMut::with_capacity(BUFFER_SIZE),
            decoder: FrameDecoder::new(max_frame_size),
        }
    }

    pub(crate) fn websocket(stream: SplitStream<WsStream>, max_frame_size: usize) -> Self {
        FrameReader::WebSocket {
            stream,
            max_frame_size,
        }
    }

    /// Read the next frame
    ///
    /// Returns `None` when the peer closed the connection cleanly.
    pub(crate) async fn next(&mut self) -> Option<Result<Frame, ReadError>> {
        match self {
            FrameReader::Tcp {
                stream,
                buf,
                decoder,
            } => loop {
                match decoder.decode(buf) {
                    Ok(Some(frame)) => return Some(Ok(frame)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(ReadError::Protocol(e))),
                }

                match stream.read_buf(buf).await {
                    Ok(0) if buf.is_empty() => return None,
                    Ok(0) => {
                        return Some(Err(ReadError::Io("connection closed mid-frame".into())))
                    }
                    Ok(_) => {}
                    Err(e) => return Some(Err(ReadError::Io(e.to_string()))),
                }
            },
            FrameReader::WebSocket {
                stream,
                max_frame_size,
            } => loop {
                let msg = match stream.next().await? {
                    Ok(msg) => msg,
                    Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                    Err(e) => return Some(Err(ReadError::Io(e.to_string()))),
                };

                match msg {
                    Message::Binary(data) => {
                        if data.len() > *max_frame_size {
                            return Some(Err(ReadError::Protocol(ProtocolError::FrameTooLarge {
                                size: data.len(),
                                max: *max_frame_size,
                            })));
                        }
                        return Some(Frame::decode(data).map_err(ReadError::Protocol));
                    }
                    Message::Close(_) => return None,
                    // Control frames are answered by tungstenite itself
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    Message::Text(_) => {
                        tracing::debug!("Ignoring text WebSocket message");
                    }
                }
            },
        }
    }
}

fn send_failed(err: impl std::fmt::Display) -> IoError {
    IoError::SendFailed(err.to_string())
}
