//! Registration surface: turns parsed commands into client operations and
//! their results into replies.

use std::sync::Arc;

use tracing::debug;

use crate::broker::Hub;
use crate::client::Client;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::Result;

pub fn handle(hub: &Hub, client: &Arc<Client>, msg: ClientMessage) -> ServerMessage {
    let result: Result<()> = match msg {
        ClientMessage::Subscribe { topic } => client.subscribe(&topic),
        ClientMessage::Unsubscribe { topic } => client.unsubscribe(&topic),
        ClientMessage::CreateTopic { topic } => client.create_private_topic(&topic).map(|_| ()),
        ClientMessage::RemoveTopic { topic } => client.remove_private_topic(&topic),
        ClientMessage::Publish { topic, data } => client.publish(&topic, &data).map(|_| ()),
        ClientMessage::Remove {} => hub.remove_client(client.id()),
    };

    match result {
        Ok(()) => ServerMessage::Ok {},
        Err(e) => {
            debug!(client = %client.id(), "request failed: {e}");
            ServerMessage::Error {
                status: e.status(),
                message: e.to_string(),
            }
        }
    }
}

/// Parse and handle one text message. Malformed input gets a 400 reply.
pub fn handle_text(hub: &Hub, client: &Arc<Client>, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => handle(hub, client, msg),
        Err(err) => ServerMessage::Error {
            status: 400,
            message: format!("invalid message: {err}"),
        },
    }
}
