use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The `{id, username}` shape returned by connection listings — the caller
/// always sees the other party, never their own record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
}

/// Lifecycle of a connection record: `pending -> {accepted, rejected}`,
/// terminal per record. A pair only becomes requestable again once an
/// accepted record has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A directed connection-request record. Once accepted it represents a
/// bidirectional "may message" relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub requester: Uuid,
    pub recipient: Uuid,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical chat message representation at the store boundary.
///
/// All wire-format renaming (`senderId`, `text`, `timestamp`, ...) happens
/// in the external-interface DTOs, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Uuid,
    pub recipient: Uuid,
    pub content: String,
    pub conversation_key: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Derive the order-independent conversation identity for a participant
/// pair: SHA-256 over the sorted IDs joined with `$`, hex-encoded.
///
/// Used uniformly for storage grouping; both directions of a pair map to
/// the same key.
pub fn conversation_key(a: Uuid, b: Uuid) -> String {
    let mut pair = [a.to_string(), b.to_string()];
    pair.sort();
    let digest = Sha256::digest(pair.join("$").as_bytes());
    hex::encode(digest)
}
