//! Magix session handshake
//!
//! The handshake runs once per connection, right after the transport is up:
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- Setup (version, filter) ------->|
//!   |                                        |
//!   |<------ Accept ------------------------|   or
//!   |<------ Reject (reason) ---------------|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! The same state machine drives both roles so in-process servers (and the
//! integration tests) can speak the protocol without duplicating it.

use crate::error::ConnectionError;
use crate::message::MagixMessageFilter;

use super::constants::PROTOCOL_VERSION;
use super::frame::Frame;

/// Handshake role (client or server)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Client needs to send Setup
    Initial,
    /// Server waiting for Setup
    WaitingForSetup,
    /// Client waiting for Accept/Reject
    WaitingForReply,
    /// Handshake complete
    Done,
    /// Handshake refused (by either side)
    Failed,
}

/// Handshake state machine
#[derive(Debug)]
pub struct Handshake {
    role: HandshakeRole,
    state: HandshakeState,
    /// Client: filter to announce. Server: filter announced by the peer.
    filter: MagixMessageFilter,
}

impl Handshake {
    /// Client side, announcing `filter` as the server-side stream filter
    pub fn client(filter: MagixMessageFilter) -> Self {
        Self {
            role: HandshakeRole::Client,
            state: HandshakeState::Initial,
            filter,
        }
    }

    /// Server side
    pub fn server() -> Self {
        Self {
            role: HandshakeRole::Server,
            state: HandshakeState::WaitingForSetup,
            filter: MagixMessageFilter::ALL,
        }
    }

    /// Which side of the exchange this is
    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    /// Check if handshake is complete
    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Stream filter: the one announced (client) or received (server)
    pub fn filter(&self) -> &MagixMessageFilter {
        &self.filter
    }

    /// Generate the opening frame
    ///
    /// For client: returns Setup.
    /// For server: returns None (server waits for Setup first).
    pub fn generate_initial(&mut self) -> Option<Frame> {
        match (self.role, self.state) {
            (HandshakeRole::Client, HandshakeState::Initial) => {
                self.state = HandshakeState::WaitingForReply;
                Some(Frame::Setup {
                    version: PROTOCOL_VERSION,
                    filter: self.filter.clone(),
                })
            }
            _ => None,
        }
    }

    /// Process a frame from the peer and return the reply, if any
    ///
    /// For server receiving Setup: returns Accept, or Reject on a version mismatch.
    /// For client receiving Accept: returns None (handshake done).
    pub fn process(&mut self, frame: Frame) -> Result<Option<Frame>, ConnectionError> {
        match self.state {
            HandshakeState::WaitingForSetup => self.process_setup(frame),
            HandshakeState::WaitingForReply => self.process_reply(frame),
            HandshakeState::Done => Ok(None),
            HandshakeState::Initial | HandshakeState::Failed => Err(
                ConnectionError::HandshakeRejected("handshake not in progress".into()),
            ),
        }
    }

    fn process_setup(&mut self, frame: Frame) -> Result<Option<Frame>, ConnectionError> {
        match frame {
            Frame::Setup { version, filter } => {
                if version != PROTOCOL_VERSION {
                    self.state = HandshakeState::Failed;
                    return Ok(Some(Frame::Reject(format!(
                        "unsupported protocol version {version}, expected {PROTOCOL_VERSION}"
                    ))));
                }

                self.filter = filter;
                self.state = HandshakeState::Done;
                Ok(Some(Frame::Accept))
            }
            Frame::Close => {
                self.state = HandshakeState::Failed;
                Err(ConnectionError::Closed)
            }
            other => {
                self.state = HandshakeState::Failed;
                Err(ConnectionError::HandshakeRejected(format!(
                    "expected setup, got frame type 0x{:02x}",
                    other.frame_type()
                )))
            }
        }
    }

    fn process_reply(&mut self, frame: Frame) -> Result<Option<Frame>, ConnectionError> {
        match frame {
            Frame::Accept => {
                self.state = HandshakeState::Done;
                Ok(None)
            }
            Frame::Reject(reason) => {
                self.state = HandshakeState::Failed;
                Err(ConnectionError::HandshakeRejected(reason))
            }
            Frame::Close => {
                self.state = HandshakeState::Failed;
                Err(ConnectionError::Closed)
            }
            other => {
                self.state = HandshakeState::Failed;
                Err(ConnectionError::HandshakeRejected(format!(
                    "expected accept, got frame type 0x{:02x}",
                    other.frame_type()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_client_server_handshake() {
        let filter = MagixMessageFilter::default().formats(["controls"]);
        let mut client = Handshake::client(filter.clone());
        let mut server = Handshake::server();

        // Server never opens
        assert!(server.generate_initial().is_none());

        let setup = client
            .generate_initial()
            .expect("Client should generate Setup");
        assert!(client.generate_initial().is_none());

        let reply = server
            .process(setup)
            .unwrap()
            .expect("Server should reply");
        assert_eq!(reply, Frame::Accept);
        assert!(server.is_done());
        assert_eq!(server.filter(), &filter);

        assert_eq!(client.process(reply).unwrap(), None);
        assert!(client.is_done());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut server = Handshake::server();
        let reply = server
            .process(Frame::Setup {
                version: PROTOCOL_VERSION + 1,
                filter: MagixMessageFilter::ALL,
            })
            .unwrap();

        assert!(matches!(reply, Some(Frame::Reject(_))));
        assert!(!server.is_done());

        let mut client = Handshake::client(MagixMessageFilter::ALL);
        client.generate_initial();
        let result = client.process(reply.unwrap());
        assert!(matches!(result, Err(ConnectionError::HandshakeRejected(_))));
        assert!(!client.is_done());
    }

    #[test]
    fn test_unexpected_frames() {
        let mut client = Handshake::client(MagixMessageFilter::ALL);
        client.generate_initial();
        let result = client.process(Frame::Message(Bytes::from_static(b"{}")));
        assert!(matches!(result, Err(ConnectionError::HandshakeRejected(_))));

        let mut server = Handshake::server();
        assert!(matches!(
            server.process(Frame::Close),
            Err(ConnectionError::Closed)
        ));
    }

    #[test]
    fn test_client_must_open_first() {
        let mut client = Handshake::client(MagixMessageFilter::ALL);
        assert!(client.process(Frame::Accept).is_err());
    }
}
