//! Endpoint configuration

use std::time::Duration;

use crate::message::MagixMessageFilter;
use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;

/// What a subscription does with a message the codec cannot decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// Yield the error and keep the subscription active
    #[default]
    Skip,
    /// Yield the error and end the subscription
    Terminate,
}

/// Endpoint configuration options
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Limit for opening the socket (and the WebSocket upgrade)
    pub connect_timeout: Duration,

    /// Limit for the Setup/Accept exchange
    pub handshake_timeout: Duration,

    /// Limit for a single broadcast to reach the transport
    pub send_timeout: Duration,

    /// Per-subscription buffer; the oldest messages are dropped beyond it
    pub subscription_capacity: usize,

    /// Outbound frames queued ahead of the writer
    pub outbound_queue: usize,

    /// Largest accepted frame (type byte + body)
    pub max_frame_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Use `wss://` for WebSocket connections
    pub tls: bool,

    /// Decode failure handling for subscriptions
    pub decode_errors: DecodeErrorPolicy,

    /// Filter sent to the server during the handshake
    pub stream_filter: MagixMessageFilter,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            subscription_capacity: 256,
            outbound_queue: 64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tcp_nodelay: true,
            tls: false,
            decode_errors: DecodeErrorPolicy::Skip,
            stream_filter: MagixMessageFilter::ALL,
        }
    }
}

impl EndpointConfig {
    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set per-subscription buffer capacity (at least 1)
    pub fn subscription_capacity(mut self, capacity: usize) -> Self {
        self.subscription_capacity = capacity.max(1);
        self
    }

    /// Set outbound queue length (at least 1)
    pub fn outbound_queue(mut self, len: usize) -> Self {
        self.outbound_queue = len.max(1);
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(u32::MAX as usize);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Use TLS for WebSocket connections
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// Set decode failure policy
    pub fn decode_errors(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_errors = policy;
        self
    }

    /// Set the server-side stream filter
    pub fn stream_filter(mut self, filter: MagixMessageFilter) -> Self {
        self.stream_filter = filter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EndpointConfig::default();

        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.subscription_capacity, 256);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.decode_errors, DecodeErrorPolicy::Skip);
        assert!(config.tcp_nodelay);
        assert!(!config.tls);
        assert!(config.stream_filter.is_all());
    }

    #[test]
    fn test_builder_capacity_floor() {
        let config = EndpointConfig::default()
            .subscription_capacity(0)
            .outbound_queue(0);

        assert_eq!(config.subscription_capacity, 1);
        assert_eq!(config.outbound_queue, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let filter = MagixMessageFilter::default().formats(["controls"]);
        let config = EndpointConfig::default()
            .connect_timeout(Duration::from_secs(1))
            .handshake_timeout(Duration::from_millis(500))
            .send_timeout(Duration::from_secs(2))
            .tcp_nodelay(false)
            .tls(true)
            .decode_errors(DecodeErrorPolicy::Terminate)
            .stream_filter(filter.clone());

        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.handshake_timeout, Duration::from_millis(500));
        assert_eq!(config.send_timeout, Duration::from_secs(2));
        assert!(!config.tcp_nodelay);
        assert!(config.tls);
        assert_eq!(config.decode_errors, DecodeErrorPolicy::Terminate);
        assert_eq!(config.stream_filter, filter);
    }
}
