//! Magix client endpoint
//!
//! Provides the user-facing surface on top of one transport connection:
//! - Broadcasting typed messages to the event loop
//! - Subscribing to the inbound message stream, optionally filtered
//! - Typed format subscriptions on JSON endpoints
//! - Converter and portal services built on the two above

pub mod client;
pub mod config;
pub mod converter;
pub mod portal;
pub mod subscription;
pub mod typed;

pub use client::Endpoint;
pub use config::{DecodeErrorPolicy, EndpointConfig};
pub use converter::spawn_converter;
pub use portal::spawn_portal;
pub use subscription::{Subscription, SubscriptionState};
pub use typed::FormatSubscription;
