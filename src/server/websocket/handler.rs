//! WebSocket upgrade handler and per-socket message loop.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::TopicConnectionManager;
use super::messages::{msg_types, system, topics, ClientMessage, ServerMessage};
use crate::server::metrics;
use crate::server::state::ServerState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (connection_id, rx) = state.connections.register().await;
    metrics::ws_connection_opened();
    debug!("WebSocket connection {} established", connection_id);

    let (mut sender, receiver) = socket.split();

    let connected = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            connection_id,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );
    if send_message(&mut sender, &connected).await.is_err() {
        state.connections.unregister(connection_id).await;
        metrics::ws_connection_closed();
        return;
    }

    let mut send_task = tokio::spawn(forward_outgoing(rx, sender));
    let mut recv_task = tokio::spawn(process_incoming(
        receiver,
        connection_id,
        state.connections.clone(),
        state.clone(),
    ));

    // Whichever side finishes first tears the connection down.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.connections.unregister(connection_id).await;
    metrics::ws_connection_closed();
    debug!("WebSocket connection {} closed", connection_id);
}

async fn forward_outgoing(
    mut rx: mpsc::Receiver<ServerMessage>,
    mut sender: SplitSink<WebSocket, Message>,
) {
    while let Some(message) = rx.recv().await {
        if send_message(&mut sender, &message).await.is_err() {
            break;
        }
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}

async fn process_incoming(
    mut receiver: SplitStream<WebSocket>,
    connection_id: usize,
    connections: std::sync::Arc<TopicConnectionManager>,
    state: ServerState,
) {
    while let Some(result) = receiver.next().await {
        let message = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket receive error on {}: {}", connection_id, e);
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&message) {
            Ok(client_message) => {
                handle_client_message(connection_id, client_message, &state).await
            }
            Err(e) => Some(ServerMessage::new(
                msg_types::ERROR,
                system::Error::new("invalid_message", format!("Could not parse message: {}", e)),
            )),
        };

        if let Some(reply) = reply {
            if !connections.send_to(connection_id, reply).await {
                break;
            }
        }
    }
}

async fn handle_client_message(
    connection_id: usize,
    message: ClientMessage,
    state: &ServerState,
) -> Option<ServerMessage> {
    match message.msg_type.as_str() {
        msg_types::PING => Some(ServerMessage::new(msg_types::PONG, system::Pong)),
        msg_types::SUBSCRIBE => match parse_topic_request(&message) {
            Ok(request) => {
                let show_exists = match state.catalog_store.get_show(&request.show_id) {
                    Ok(show) => show.is_some(),
                    Err(e) => {
                        warn!("Failed to look up show {}: {:#}", request.show_id, e);
                        false
                    }
                };
                if !show_exists {
                    return Some(ServerMessage::new(
                        msg_types::ERROR,
                        system::Error::new(
                            "unknown_show",
                            format!("No show with id {}", request.show_id),
                        ),
                    ));
                }
                state
                    .connections
                    .subscribe(connection_id, &request.show_id)
                    .await;
                Some(ServerMessage::new(
                    msg_types::SUBSCRIBED,
                    topics::TopicAck {
                        show_id: request.show_id,
                    },
                ))
            }
            Err(reply) => Some(reply),
        },
        msg_types::UNSUBSCRIBE => match parse_topic_request(&message) {
            Ok(request) => {
                state
                    .connections
                    .unsubscribe(connection_id, &request.show_id)
                    .await;
                Some(ServerMessage::new(
                    msg_types::UNSUBSCRIBED,
                    topics::TopicAck {
                        show_id: request.show_id,
                    },
                ))
            }
            Err(reply) => Some(reply),
        },
        other => Some(ServerMessage::new(
            msg_types::ERROR,
            system::Error::new("unknown_type", format!("Unknown message type '{}'", other)),
        )),
    }
}

fn parse_topic_request(message: &ClientMessage) -> Result<topics::TopicRequest, ServerMessage> {
    serde_json::from_value(message.payload.clone()).map_err(|e| {
        ServerMessage::new(
            msg_types::ERROR,
            system::Error::new("invalid_payload", format!("Bad topic payload: {}", e)),
        )
    })
}
