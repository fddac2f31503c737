//! Counters for a single endpoint
//!
//! Updated from the connection tasks and from subscriptions, so every field
//! is an atomic. Read them through [`EndpointStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by an endpoint, its connection tasks and its subscriptions
#[derive(Debug)]
pub struct EndpointStats {
    connected_at: Instant,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    decode_failures: AtomicU64,
    lagged_messages: AtomicU64,
    active_subscriptions: AtomicU64,
}

/// Point-in-time copy of [`EndpointStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages written to the transport
    pub messages_sent: u64,
    /// Frame bytes written to the transport
    pub bytes_sent: u64,
    /// Messages read from the transport
    pub messages_received: u64,
    /// Frame bytes read from the transport
    pub bytes_received: u64,
    /// Inbound messages a subscription failed to decode
    pub decode_failures: u64,
    /// Messages dropped because a subscriber fell behind
    pub lagged_messages: u64,
    /// Subscriptions currently active
    pub active_subscriptions: u64,
    /// Time since the connection was established
    pub uptime: Duration,
}

impl EndpointStats {
    /// Fresh counters; uptime starts now
    pub fn new() -> Self {
        Self {
            connected_at: Instant::now(),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            lagged_messages: AtomicU64::new(0),
            active_subscriptions: AtomicU64::new(0),
        }
    }

    pub(crate) fn on_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_lagged(&self, skipped: u64) {
        self.lagged_messages.fetch_add(skipped, Ordering::Relaxed);
    }

    pub(crate) fn subscription_opened(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscription_closed(&self) {
        // Saturating: never wraps below zero
        let _ = self
            .active_subscriptions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Get a copy of the current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            lagged_messages: self.lagged_messages.load(Ordering::Relaxed),
            active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed),
            uptime: self.connected_at.elapsed(),
        }
    }
}

impl Default for EndpointStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// Average inbound throughput in bits per second
    pub fn receive_bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}
