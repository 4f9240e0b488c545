//! Message store: idempotent append, newest-anchored pagination, unread
//! accounting.
//!
//! Retrieval order within a conversation is `created_at` ascending with the
//! message ID as tie-breaker, so pagination stays stable when concurrent
//! senders land on the same millisecond.

use chrono::{Duration, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;
use uuid::Uuid;

use devtinder_types::models::{Message, conversation_key};

use crate::models::{fmt_ts, row_to_message};
use crate::{Database, Result, StoreError};

/// Two writes of the same (conversation, sender, content) inside this
/// window are one logical send — the defense against the HTTP path and the
/// socket path both firing for a single message.
const DEDUP_WINDOW_MS: i64 = 2_000;

const MESSAGE_COLUMNS: &str = "id, conversation_key, sender, recipient, content, read, created_at";

impl Database {
    /// Persist a message from `sender` to `recipient`.
    ///
    /// Requires an accepted connection between the pair; nothing is written
    /// when the check fails. If an equivalent message landed within the
    /// dedup window, the original row is returned and the duplicate is
    /// discarded. ID and timestamp are always server-assigned.
    pub fn append_message(&self, sender: Uuid, recipient: Uuid, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyContent);
        }
        if !self.is_connected(sender, recipient)? {
            return Err(StoreError::NotConnected);
        }

        let key = conversation_key(sender, recipient);
        let now = Utc::now();

        self.with_conn(|conn| {
            let prior = conn
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE conversation_key = ?1 AND sender = ?2 AND content = ?3
                         ORDER BY created_at DESC, id DESC
                         LIMIT 1"
                    ),
                    (&key, sender.to_string(), content),
                    row_to_message,
                )
                .optional()?;

            if let Some(prev) = prior {
                let age = now.signed_duration_since(prev.created_at);
                if age.abs() < Duration::milliseconds(DEDUP_WINDOW_MS) {
                    debug!(id = %prev.id, "suppressed duplicate message append");
                    return Ok(prev);
                }
            }

            let message = Message {
                id: Uuid::new_v4(),
                sender,
                recipient,
                content: content.to_string(),
                conversation_key: key.clone(),
                read: false,
                created_at: now,
            };

            conn.execute(
                "INSERT INTO messages (id, conversation_key, sender, recipient, content, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                (
                    message.id.to_string(),
                    &key,
                    sender.to_string(),
                    recipient.to_string(),
                    content,
                    fmt_ts(now),
                ),
            )?;

            Ok(message)
        })
    }

    /// Page through a conversation, anchored to the newest end: page 1 holds
    /// the `limit` most recent messages, page 2 the `limit` immediately
    /// preceding those, and so on. Every page is in chronological
    /// (oldest-first) order. Returns `(messages, total, pages)`; an empty
    /// conversation yields an empty page and zero totals.
    pub fn list_messages(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Message>, u64, u64)> {
        let page = page.max(1) as u64;
        let limit = limit.max(1) as u64;
        let key = conversation_key(user_a, user_b);

        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_key = ?1",
                [&key],
                |row| row.get(0),
            )?;

            // Walk backward from the newest end: page N covers the slice
            // [total - N*limit, total - (N-1)*limit) in chronological order.
            let start = total.saturating_sub(page * limit);
            let end = total.saturating_sub((page - 1) * limit);
            let count = end - start;

            if count == 0 {
                let pages = total.div_ceil(limit);
                return Ok((Vec::new(), total, pages));
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_key = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;

            let rows = stmt.query_map((&key, count, start), row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }

            Ok((messages, total, total.div_ceil(limit)))
        })
    }

    /// Number of unread messages addressed to `user` across all
    /// conversations. Real counts are possible here because the store keeps
    /// a flat per-message table with a read flag.
    pub fn count_unread(&self, user: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient = ?1 AND read = 0",
                [user.to_string()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Mark every message addressed to `user` in the conversation with
    /// `other` as read. Returns how many rows flipped.
    pub fn mark_conversation_read(&self, user: Uuid, other: Uuid) -> Result<u64> {
        let key = conversation_key(user, other);
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET read = 1
                 WHERE conversation_key = ?1 AND recipient = ?2 AND read = 0",
                (&key, user.to_string()),
            )?;
            Ok(updated as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{test_db, user};

    fn connect(db: &Database, a: Uuid, b: Uuid) {
        db.request_connection(a, b).unwrap();
        db.accept_connection(b, a).unwrap();
    }

    /// Rewrites a message's timestamp so dedup-window tests don't sleep.
    fn backdate(db: &Database, id: Uuid, ms: i64) {
        db.with_conn(|conn| {
            let ts = fmt_ts(Utc::now() - Duration::milliseconds(ms));
            conn.execute(
                "UPDATE messages SET created_at = ?1 WHERE id = ?2",
                (ts, id.to_string()),
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn append_requires_an_accepted_connection() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        assert!(matches!(
            db.append_message(a, b, "hi"),
            Err(StoreError::NotConnected)
        ));

        // The failed attempt must leave no row behind.
        let (_, total, _) = db.list_messages(a, b, 1, 20).unwrap();
        assert_eq!(total, 0);

        // Pending is not enough either.
        db.request_connection(a, b).unwrap();
        assert!(matches!(
            db.append_message(a, b, "hi"),
            Err(StoreError::NotConnected)
        ));

        db.accept_connection(b, a).unwrap();
        db.append_message(a, b, "hi").unwrap();
    }

    #[test]
    fn append_rejects_blank_content() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        connect(&db, a, b);

        for blank in ["", "   ", "\n\t"] {
            assert!(matches!(
                db.append_message(a, b, blank),
                Err(StoreError::EmptyContent)
            ));
        }
    }

    #[test]
    fn append_is_idempotent_within_the_window() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        connect(&db, a, b);

        let first = db.append_message(a, b, "hello").unwrap();
        // Same logical send arriving twice (HTTP + socket double fire).
        let second = db.append_message(a, b, " hello ").unwrap();
        assert_eq!(first.id, second.id);

        let (_, total, _) = db.list_messages(a, b, 1, 20).unwrap();
        assert_eq!(total, 1);

        // Outside the window the same text is a new message.
        backdate(&db, first.id, 3_000);
        let third = db.append_message(a, b, "hello").unwrap();
        assert_ne!(first.id, third.id);

        let (_, total, _) = db.list_messages(a, b, 1, 20).unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn dedup_is_scoped_to_sender_and_content() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        connect(&db, a, b);

        db.append_message(a, b, "hello").unwrap();
        // Different sender, same text: both survive.
        db.append_message(b, a, "hello").unwrap();
        // Same sender, different text: survives.
        db.append_message(a, b, "hello!").unwrap();

        let (_, total, _) = db.list_messages(a, b, 1, 20).unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn empty_conversation_paginates_to_zero() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        let (messages, total, pages) = db.list_messages(a, b, 1, 20).unwrap();
        assert!(messages.is_empty());
        assert_eq!(total, 0);
        assert_eq!(pages, 0);
    }

    #[test]
    fn pagination_is_newest_anchored_and_complete() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        connect(&db, a, b);

        let mut sent = Vec::new();
        for i in 0..25 {
            let from = if i % 3 == 0 { b } else { a };
            let to = if from == a { b } else { a };
            let msg = db.append_message(from, to, &format!("msg-{i}")).unwrap();
            // Space the timestamps out so ordering is unambiguous.
            backdate(&db, msg.id, (25 - i as i64) * 10_000);
            sent.push(msg.id);
        }

        for limit in [1u32, 4, 7, 20, 25, 40] {
            let (page1, total, pages) = db.list_messages(a, b, 1, limit).unwrap();
            assert_eq!(total, 25);
            assert_eq!(pages, 25u64.div_ceil(limit as u64));

            // Page 1 holds the newest slice, in chronological order.
            assert_eq!(page1.last().unwrap().id, *sent.last().unwrap());

            // Concatenating pages from the oldest back to page 1 must
            // reconstruct the full conversation with no gaps or repeats.
            let mut reconstructed = Vec::new();
            for page in (1..=pages as u32).rev() {
                let (chunk, _, _) = db.list_messages(a, b, page, limit).unwrap();
                reconstructed.extend(chunk.into_iter().map(|m| m.id));
            }
            assert_eq!(reconstructed, sent);

            // Pages past the end are empty, not an error.
            let (beyond, _, _) = db.list_messages(a, b, pages as u32 + 1, limit).unwrap();
            assert!(beyond.is_empty());
        }
    }

    #[test]
    fn pagination_direction_is_symmetric() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        connect(&db, a, b);

        db.append_message(a, b, "one").unwrap();
        let (from_a, _, _) = db.list_messages(a, b, 1, 20).unwrap();
        let (from_b, _, _) = db.list_messages(b, a, 1, 20).unwrap();
        assert_eq!(from_a[0].id, from_b[0].id);
    }

    #[test]
    fn unread_counts_follow_the_read_flag() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        connect(&db, a, b);
        connect(&db, c, b);

        db.append_message(a, b, "from alice").unwrap();
        db.append_message(c, b, "from carol").unwrap();
        db.append_message(b, a, "reply").unwrap();

        assert_eq!(db.count_unread(b).unwrap(), 2);
        assert_eq!(db.count_unread(a).unwrap(), 1);
        assert_eq!(db.count_unread(c).unwrap(), 0);

        // Reading the Alice conversation clears only that counter.
        assert_eq!(db.mark_conversation_read(b, a).unwrap(), 1);
        assert_eq!(db.count_unread(b).unwrap(), 1);
        assert_eq!(db.mark_conversation_read(b, a).unwrap(), 0);
    }

    #[test]
    fn removal_cuts_off_messaging() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        connect(&db, a, b);

        db.append_message(a, b, "hi").unwrap();
        db.remove_connection(a, b).unwrap();

        assert!(matches!(
            db.append_message(b, a, "still there?"),
            Err(StoreError::NotConnected)
        ));

        // History survives the removal; only new sends are gated.
        let (_, total, _) = db.list_messages(a, b, 1, 20).unwrap();
        assert_eq!(total, 1);
    }
}
