//! The `transport` module connects the hub to the network.
//!
//! It defines the command/reply protocol spoken by connected clients, the
//! handler that maps commands onto hub operations, and a WebSocket server that
//! acts as the delivery driver for each connection.

pub mod handler;
pub mod message;
pub mod websocket;
