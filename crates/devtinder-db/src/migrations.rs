use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Directed request records. Uniqueness holds on the ordered pair;
        -- the unordered-pair invariant is enforced by request_connection's
        -- either-direction lookup.
        CREATE TABLE IF NOT EXISTS connections (
            id          TEXT PRIMARY KEY,
            requester   TEXT NOT NULL REFERENCES users(id),
            recipient   TEXT NOT NULL REFERENCES users(id),
            status      TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(requester, recipient)
        );

        CREATE INDEX IF NOT EXISTS idx_connections_recipient
            ON connections(recipient, status);

        -- Flat per-message table keyed by conversation. Timestamps are
        -- fixed-width RFC 3339 (millisecond precision, Z suffix) so that
        -- lexicographic order equals chronological order.
        CREATE TABLE IF NOT EXISTS messages (
            id                TEXT PRIMARY KEY,
            conversation_key  TEXT NOT NULL,
            sender            TEXT NOT NULL REFERENCES users(id),
            recipient         TEXT NOT NULL REFERENCES users(id),
            content           TEXT NOT NULL,
            read              INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_key, created_at, id);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(recipient, read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
