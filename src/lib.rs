//! # ssehub
//!
//! `ssehub` is an in-memory, topic-based publish/subscribe hub that fans JSON
//! messages out to long-lived server-push streams, one per subscriber.
//!
//! The core only hands each subscriber a [`ClientStream`] and does not care
//! how it reaches the wire. Despite the name, the bundled delivery driver in
//! `transport` speaks WebSocket rather than Server-Sent Events.
//!
//! ## Core Modules
//!
//! - `broker`: the `Hub` registry, `Topic`s and the wire envelope encoder.
//! - `client`: a subscriber, its private topics and its outbound stream.
//! - `config`: loading server and hub configuration.
//! - `transport`: a WebSocket delivery driver and command handler.
//! - `utils`: the shared error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

pub use broker::{Envelope, Frame, Hub, Topic, Visibility};
pub use client::{Client, ClientStream, DeliveryState};
pub use utils::{PubSubError, Result};
