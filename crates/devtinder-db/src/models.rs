//! Row-mapping helpers shared by the query modules.
//!
//! Domain types live in devtinder-types; this module converts SQLite rows
//! into them and owns the canonical timestamp format.

use chrono::{DateTime, SecondsFormat, Utc};
use devtinder_types::models::{Connection, ConnectionStatus, Message};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

/// Database row for a registered user. Kept distinct from the API-facing
/// `User` because it carries the password hash.
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// Fixed-width RFC 3339 with millisecond precision and a `Z` suffix.
/// Lexicographic comparison of these strings matches chronological order,
/// which the pagination and dedup queries rely on.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Column order: id, requester, recipient, status, created_at, updated_at.
pub(crate) fn row_to_connection(row: &Row<'_>) -> rusqlite::Result<Connection> {
    let id: String = row.get(0)?;
    let requester: String = row.get(1)?;
    let recipient: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    let status = ConnectionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown connection status '{status}'").into(),
        )
    })?;

    Ok(Connection {
        id: parse_uuid(0, &id)?,
        requester: parse_uuid(1, &requester)?,
        recipient: parse_uuid(2, &recipient)?,
        status,
        created_at: parse_ts(4, &created_at)?,
        updated_at: parse_ts(5, &updated_at)?,
    })
}

/// Column order: id, conversation_key, sender, recipient, content, read,
/// created_at.
pub(crate) fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_key: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let recipient: String = row.get(3)?;
    let content: String = row.get(4)?;
    let read: bool = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(Message {
        id: parse_uuid(0, &id)?,
        sender: parse_uuid(2, &sender)?,
        recipient: parse_uuid(3, &recipient)?,
        content,
        conversation_key,
        read,
        created_at: parse_ts(6, &created_at)?,
    })
}
