//! Manages the WebSocket connection lifecycle of a notification subscriber.

use super::{
    hub::Envelope,
    protocol::{Control, ServerMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{error, info, instrument, warn};

use crate::handlers::ApiError;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(user_id) = params
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        return ApiError::Unauthorized("userId query parameter is required".to_string())
            .into_response();
    };

    let notifications = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, notifications))
}

/// Forwards the user's notifications until either side goes away.
#[instrument(name = "ws_session", skip(socket, notifications))]
async fn handle_socket(socket: WebSocket, user_id: String, mut notifications: Receiver<Envelope>) {
    info!("WebSocket subscriber connected");
    let (mut socket_tx, mut socket_rx) = socket.split();

    let connected = ServerMessage::Control(Control::Connected {
        user_id: user_id.clone(),
    });
    if let Err(e) = send_msg(&mut socket_tx, connected).await {
        error!(error = ?e, "Failed to confirm subscription");
        return;
    }

    loop {
        tokio::select! {
            incoming = socket_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = ?e, "Error receiving from client WebSocket");
                    break;
                }
            },
            received = notifications.recv() => match received {
                Ok(envelope) if envelope.recipient == user_id => {
                    if let Err(e) = send_msg(&mut socket_tx, envelope.notification.into()).await {
                        warn!(error = ?e, "Failed to push notification; closing");
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Subscriber lagged behind");
                    let lagged = ServerMessage::Control(Control::Lagged { missed });
                    if send_msg(&mut socket_tx, lagged).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("WebSocket subscriber disconnected");
}

/// A helper function to serialize and send a `ServerMessage` to the client.
async fn send_msg(socket_tx: &mut SplitSink<WebSocket, Message>, msg: ServerMessage) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
