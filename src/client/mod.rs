//! The `client` module defines a subscriber of the hub.
//!
//! It provides the `Client` struct, which owns a subscriber's private topics
//! and delivery state, and `ClientStream`, the receiving end of its outbound
//! queue that a delivery driver drains.

pub mod pubsub_client;
pub use pubsub_client::{Client, ClientStream, Delivery, DeliveryState};

#[cfg(test)]
mod tests;
