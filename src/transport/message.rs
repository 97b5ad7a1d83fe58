//! Commands a connected client sends, and the replies it gets back.
//!
//! Replies are tagged with `type`; envelope frames (see
//! [`crate::broker::message`]) never carry a top-level `type`, so a consumer
//! can tell the two apart on the same socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },

    #[serde(rename = "create_topic")]
    CreateTopic { topic: String },

    #[serde(rename = "remove_topic")]
    RemoveTopic { topic: String },

    #[serde(rename = "publish")]
    Publish { topic: String, data: Value },

    /// Unregister this client from the hub; the server then closes the socket.
    #[serde(rename = "remove")]
    Remove {},
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome { client_id: String },

    #[serde(rename = "ok")]
    Ok {},

    #[serde(rename = "error")]
    Error { status: u16, message: String },
}
