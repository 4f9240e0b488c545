use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Announce identity for this connection. The token is the same JWT the
    /// REST API issues; it must be re-sent on every reconnect — the server
    /// keeps no session state across transport reconnects.
    Join { token: String },

    /// Send a chat message to a connected user.
    ///
    /// `sender` must match the joined identity. `client_temp_id` is echoed
    /// back in `message-sent` so the client can map its optimistic entry to
    /// the canonical ID. The client-supplied timestamp is advisory only —
    /// the persisted record always carries the server clock.
    SendMessage {
        sender: Uuid,
        recipient: Uuid,
        content: String,
        client_temp_id: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Join accepted; identity confirmed for this connection.
    Ready { user_id: Uuid, username: String },

    /// A message addressed to this user was persisted. Emitted to the
    /// recipient's channel only — never echoed to the sender, who already
    /// holds an optimistic local copy.
    MessageDelivered {
        id: Uuid,
        sender: Uuid,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// Confirmation to the sender: the message was persisted under `id`.
    MessageSent {
        id: Uuid,
        client_temp_id: Option<String>,
    },

    /// A send failed. The message was not persisted and will not be
    /// delivered.
    MessageError { reason: String },
}
