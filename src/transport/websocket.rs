//! WebSocket transport
//!
//! Reference delivery driver and registration surface on top of the hub:
//! - Accept TCP/WebSocket connections; the client id is taken from the
//!   `client_id` query parameter of the upgrade request, or generated
//! - Greet with a `welcome` reply carrying the id, then attach the client's
//!   stream and forward every frame as a text message
//! - Parse JSON commands and answer each with an `ok`/`error` reply
//!
//! The client stays registered after the socket goes away; only its stream is
//! dropped, which puts it back to idle. Reconnecting with the same id resumes
//! with a fresh initial snapshot. A client that is done for good sends a
//! `remove` command, otherwise its entry lives as long as the hub.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::broker::Hub;
use crate::transport::handler;
use crate::transport::message::ServerMessage;

pub const CLIENT_ID_PARAM: &str = "client_id";

pub async fn start_websocket_server(addr: &str, hub: Arc<Hub>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, hub).await;
    Ok(())
}

/// Accept connections on an already bound listener until accepting fails.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) {
    while let Ok((stream, peer)) = listener.accept().await {
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, hub).await {
                warn!(%peer, "connection error: {e}");
            }
        });
    }
}

fn client_id_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == CLIENT_ID_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn reply(msg: &ServerMessage) -> Option<WsMessage> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(WsMessage::text(text)),
        Err(e) => {
            warn!("failed to encode reply: {e}");
            None
        }
    }
}

async fn handle_connection(stream: TcpStream, hub: Arc<Hub>) -> Result<(), tungstenite::Error> {
    let mut requested_id = None;
    let ws_stream = accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            requested_id = client_id_from_query(req.uri().query());
            Ok(resp)
        },
    )
    .await?;

    let client = hub.get_or_create_client(requested_id.as_deref().unwrap_or(""));
    let client_id = client.id().to_string();
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = ServerMessage::Welcome {
        client_id: client_id.clone(),
    };
    if let Some(msg) = reply(&welcome) {
        ws_sender.send(msg).await?;
    }

    let mut frames = client.attach();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WsMessage>();

    let writer = {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => WsMessage::text(frame.to_string()),
                        None => {
                            // superseded or removed from the hub
                            let _ = ws_sender.send(WsMessage::Close(None)).await;
                            break;
                        }
                    },
                    reply = reply_rx.recv() => match reply {
                        Some(reply) => reply,
                        None => break,
                    },
                };
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(client = %client_id, "failed to send: {e}");
                    break;
                }
            }
            // `frames` is dropped here, which puts the client back to idle
        })
    };

    info!(client = %client_id, "connected");

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(client = %client_id, "read error: {e}");
                break;
            }
        };
        match msg {
            WsMessage::Text(text) => {
                let response = handler::handle_text(&hub, &client, text.as_str());
                let Some(response) = reply(&response) else {
                    continue;
                };
                if reply_tx.send(response).is_err() {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    drop(reply_tx);
    let _ = writer.await;
    info!(client = %client_id, "disconnected");
    Ok(())
}
