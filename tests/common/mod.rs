//! In-process Magix event loop used by the integration tests
//!
//! Speaks the client protocol over raw TCP or WebSocket on an ephemeral
//! port. Every message a client broadcasts is relayed to all connected
//! clients (sender included), and tests can push messages directly.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use magix_rs::protocol::{Frame, FrameDecoder, Handshake};
use magix_rs::{MagixMessage, MagixMessageFilter};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

/// Frame type no client understands
const GARBAGE_FRAME_TYPE: u8 = 0x55;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "magix_rs=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// How the server answers the handshake
#[derive(Debug, Clone)]
pub enum Mode {
    /// Accept and relay messages
    Accept,
    /// Reply `Reject` with the reason
    Reject(String),
    /// Read the setup and never answer
    Silent,
    /// Accept, then close immediately
    CloseAfterAccept,
    /// Answer with a frame of unknown type
    GarbageReply,
    /// Start an Accept frame, then drop the connection mid-frame
    TruncatedReply,
}

#[derive(Debug, Clone)]
enum Command {
    Message(Bytes),
    Garbage,
    Close,
}

pub struct LoopServer {
    addr: SocketAddr,
    commands: broadcast::Sender<Command>,
    shutdown: CancellationToken,
    connections: Arc<AtomicUsize>,
}

impl LoopServer {
    pub async fn tcp(mode: Mode) -> Self {
        Self::start(None, mode).await
    }

    pub async fn websocket(path: &str, mode: Mode) -> Self {
        Self::start(Some(path.to_string()), mode).await
    }

    async fn start(ws_path: Option<String>, mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, _) = broadcast::channel(1024);
        let shutdown = CancellationToken::new();
        let connections = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            commands: commands.clone(),
            shutdown: shutdown.clone(),
            connections: Arc::clone(&connections),
        };

        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => break,
                    },
                };

                let ws_path = ws_path.clone();
                let mode = mode.clone();
                let commands = commands.clone();
                let shutdown = shutdown.clone();
                let connections = Arc::clone(&connections);

                tokio::spawn(async move {
                    let peer = match ws_path {
                        None => Some(Peer::tcp(stream)),
                        Some(path) => Peer::websocket(stream, path).await,
                    };
                    if let Some(peer) = peer {
                        connections.fetch_add(1, Ordering::SeqCst);
                        serve(peer, mode, commands, shutdown).await;
                        connections.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        server
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Deliver a message to every connected client
    pub fn push<T: Serialize>(&self, message: &MagixMessage<T>) {
        self.push_raw(serde_json::to_vec(message).unwrap());
    }

    /// Deliver an arbitrary message body to every connected client
    pub fn push_raw(&self, data: impl Into<Bytes>) {
        let _ = self.commands.send(Command::Message(data.into()));
    }

    /// Send every client a frame it cannot parse
    pub fn send_garbage(&self) {
        let _ = self.commands.send(Command::Garbage);
    }

    /// Close every connection gracefully
    pub fn close_all(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

impl Drop for LoopServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Peer {
    Tcp {
        stream: TcpStream,
        buf: BytesMut,
        decoder: FrameDecoder,
    },
    WebSocket(WebSocketStream<TcpStream>),
}

impl Peer {
    fn tcp(stream: TcpStream) -> Self {
        Peer::Tcp {
            stream,
            buf: BytesMut::with_capacity(4096),
            decoder: FrameDecoder::default(),
        }
    }

    async fn websocket(stream: TcpStream, expected_path: String) -> Option<Self> {
        let check_path = move |request: &Request, response: Response| {
            if request.uri().path() == expected_path {
                Ok(response)
            } else {
                let mut error = ErrorResponse::new(Some("unknown path".to_string()));
                *error.status_mut() = StatusCode::NOT_FOUND;
                Err(error)
            }
        };

        tokio_tungstenite::accept_hdr_async(stream, check_path)
            .await
            .ok()
            .map(Peer::WebSocket)
    }

    async fn send(&mut self, frame: &Frame) -> bool {
        match self {
            Peer::Tcp { stream, .. } => {
                let mut out = BytesMut::new();
                frame.encode_length_prefixed(&mut out).unwrap();
                stream.write_all(&out[..]).await.is_ok()
            }
            Peer::WebSocket(ws) => {
                let data = frame.encode().unwrap();
                ws.send(Message::Binary(data)).await.is_ok()
            }
        }
    }

    async fn send_garbage(&mut self) -> bool {
        match self {
            Peer::Tcp { stream, .. } => stream
                .write_all(&[0, 0, 0, 1, GARBAGE_FRAME_TYPE])
                .await
                .is_ok(),
            Peer::WebSocket(ws) => ws
                .send(Message::Binary(Bytes::from_static(&[GARBAGE_FRAME_TYPE])))
                .await
                .is_ok(),
        }
    }

    async fn send_truncated(&mut self) {
        match self {
            Peer::Tcp { stream, .. } => {
                // Announces a 5 byte frame but delivers only the type byte
                let _ = stream.write_all(&[0, 0, 0, 5, 0x02]).await;
            }
            Peer::WebSocket(_) => {}
        }
    }

    async fn next(&mut self) -> Option<Frame> {
        match self {
            Peer::Tcp {
                stream,
                buf,
                decoder,
            } => loop {
                if let Some(frame) = decoder.decode(buf).ok()? {
                    return Some(frame);
                }
                match stream.read_buf(buf).await {
                    Ok(0) | Err(_) => return None,
                    Ok(_) => {}
                }
            },
            Peer::WebSocket(ws) => loop {
                match ws.next().await?.ok()? {
                    Message::Binary(data) => return Frame::decode(data).ok(),
                    Message::Close(_) => return None,
                    _ => {}
                }
            },
        }
    }

    async fn close(&mut self) {
        match self {
            Peer::Tcp { stream, .. } => {
                let _ = stream.shutdown().await;
            }
            Peer::WebSocket(ws) => {
                let _ = ws.close(None).await;
            }
        }
    }
}

async fn serve(
    mut peer: Peer,
    mode: Mode,
    commands: broadcast::Sender<Command>,
    shutdown: CancellationToken,
) {
    let Some(setup) = peer.next().await else {
        return;
    };

    match mode {
        Mode::Silent => {
            shutdown.cancelled().await;
            return;
        }
        Mode::Reject(reason) => {
            peer.send(&Frame::Reject(reason)).await;
            peer.close().await;
            return;
        }
        Mode::GarbageReply => {
            peer.send_garbage().await;
            shutdown.cancelled().await;
            return;
        }
        Mode::TruncatedReply => {
            peer.send_truncated().await;
            peer.close().await;
            return;
        }
        Mode::Accept | Mode::CloseAfterAccept => {}
    }

    // Subscribe before accepting so nothing pushed after the client's
    // connect returns can be missed
    let mut inbox = commands.subscribe();

    let mut handshake = Handshake::server();
    let reply = match handshake.process(setup) {
        Ok(Some(reply)) => reply,
        _ => return,
    };
    if !peer.send(&reply).await || !handshake.is_done() {
        return;
    }

    if matches!(mode, Mode::CloseAfterAccept) {
        peer.send(&Frame::Close).await;
        peer.close().await;
        return;
    }

    let filter = handshake.filter().clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                peer.send(&Frame::Close).await;
                break;
            }
            command = inbox.recv() => match command {
                Ok(Command::Message(data)) => {
                    if passes(&filter, &data) && !peer.send(&Frame::Message(data)).await {
                        break;
                    }
                }
                Ok(Command::Garbage) => {
                    if !peer.send_garbage().await {
                        break;
                    }
                }
                Ok(Command::Close) | Err(broadcast::error::RecvError::Closed) => {
                    peer.send(&Frame::Close).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
            frame = peer.next() => match frame {
                Some(Frame::Message(data)) => {
                    let _ = commands.send(Command::Message(data));
                }
                Some(Frame::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    peer.close().await;
}

/// Server-side stream filter; undecodable bodies are passed through
fn passes(filter: &MagixMessageFilter, data: &[u8]) -> bool {
    match serde_json::from_slice::<MagixMessage<Value>>(data) {
        Ok(message) => filter.accepts(&message),
        Err(_) => true,
    }
}
