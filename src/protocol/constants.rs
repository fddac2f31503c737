//! Protocol constants

/// Wire protocol version sent in the setup frame
pub const PROTOCOL_VERSION: u8 = 1;

/// Default port for HTTP/WebSocket connections
pub const DEFAULT_MAGIX_HTTP_PORT: u16 = 7777;

/// Default port for raw TCP connections
pub const DEFAULT_MAGIX_RAW_PORT: u16 = 7778;

/// Default WebSocket routing path
pub const DEFAULT_WS_PATH: &str = "/magix";

/// Size of the length prefix on raw TCP frames
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the frame type byte that precedes every body
pub const FRAME_TYPE_SIZE: usize = 1;

/// Default maximum frame size (type byte + body)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// Frame types
pub const FRAME_SETUP: u8 = 0x01;
pub const FRAME_ACCEPT: u8 = 0x02;
pub const FRAME_REJECT: u8 = 0x03;
pub const FRAME_MESSAGE: u8 = 0x10;
pub const FRAME_CLOSE: u8 = 0x7F;
