//! Defines the WebSocket message protocol between the API server and the browser client.

use super::hub::Notification;
use serde::Serialize;

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum ServerMessage {
    Control(Control),
    /// A notification addressed to the connected user.
    Notification(Notification),
}

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    /// Confirms the subscription once the socket is open.
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String },
    /// Some notifications were skipped because the client fell behind.
    Lagged { missed: u64 },
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        ServerMessage::Notification(notification)
    }
}
