//! Remote endpoint addresses

use std::fmt;

use crate::error::ConnectionError;

/// Where and how to reach a Magix event loop
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportAddress {
    /// Raw TCP stream
    Tcp {
        host: String,
        port: u16,
    },
    /// WebSocket upgrade at `path`
    WebSocket {
        host: String,
        port: u16,
        path: String,
    },
}

impl TransportAddress {
    /// Validated raw TCP address
    pub fn tcp(host: impl Into<String>, port: u16) -> Result<Self, ConnectionError> {
        let address = TransportAddress::Tcp {
            host: host.into(),
            port,
        };
        address.validate()?;
        Ok(address)
    }

    /// Validated WebSocket address
    pub fn websocket(
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Result<Self, ConnectionError> {
        let address = TransportAddress::WebSocket {
            host: host.into(),
            port,
            path: path.into(),
        };
        address.validate()?;
        Ok(address)
    }

    /// Host name or IP literal
    pub fn host(&self) -> &str {
        match self {
            TransportAddress::Tcp { host, .. } | TransportAddress::WebSocket { host, .. } => host,
        }
    }

    /// Port number
    pub fn port(&self) -> u16 {
        match self {
            TransportAddress::Tcp { port, .. } | TransportAddress::WebSocket { port, .. } => *port,
        }
    }

    /// Check host, port and path
    ///
    /// - host: non-empty, no whitespace, no `/`
    /// - port: 1..=65535
    /// - path: starts with `/`
    pub fn validate(&self) -> Result<(), ConnectionError> {
        let host = self.host();
        if host.is_empty() {
            return Err(ConnectionError::InvalidAddress("host is empty".into()));
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ConnectionError::InvalidAddress(format!(
                "host contains invalid characters: {host:?}"
            )));
        }
        if self.port() == 0 {
            return Err(ConnectionError::InvalidAddress("port must be in 1..=65535".into()));
        }
        if let TransportAddress::WebSocket { path, .. } = self {
            if !path.starts_with('/') {
                return Err(ConnectionError::InvalidAddress(format!(
                    "path must start with '/': {path:?}"
                )));
            }
        }
        Ok(())
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        let host = self.host();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port())
        } else {
            format!("{}:{}", host, self.port())
        }
    }

    /// WebSocket URL; `None` for TCP addresses
    pub fn url(&self, tls: bool) -> Option<String> {
        match self {
            TransportAddress::WebSocket { path, .. } => {
                let scheme = if tls { "wss" } else { "ws" };
                Some(format!("{}://{}{}", scheme, self.authority(), path))
            }
            TransportAddress::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportAddress::Tcp { .. } => write!(f, "tcp://{}", self.authority()),
            TransportAddress::WebSocket { path, .. } => {
                write!(f, "ws://{}{}", self.authority(), path)
            }
        }
    }
}
