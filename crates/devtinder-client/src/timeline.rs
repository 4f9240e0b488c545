//! Per-conversation timeline merging three sources: paginated history,
//! optimistic local entries, and live `message-delivered` events.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Two entries without a server-ID match are the same logical message when
/// sender and trimmed content agree and their timestamps fall within this
/// tolerance — the clocks involved are a client and a server, so exact
/// equality is never expected.
const DEDUP_TOLERANCE_MS: i64 = 2_000;

/// A server-confirmed message, as it arrives from a history fetch or a
/// `message-delivered` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedMessage {
    pub id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry in the merged timeline. An optimistic entry starts with only a
/// temp ID; `confirm` fills in the server ID when `message-sent` arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub server_id: Option<Uuid>,
    pub temp_id: Option<String>,
    pub sender: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Insertion order, used to keep sorting stable on exact timestamp ties.
    seq: u64,
}

impl TimelineEntry {
    pub fn is_confirmed(&self) -> bool {
        self.server_id.is_some()
    }
}

/// Ordered, duplicate-free message sequence for one conversation.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    next_seq: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add the local entry shown immediately on send, before any server
    /// round-trip. Returns false if an equivalent entry is already present.
    pub fn push_optimistic(
        &mut self,
        temp_id: impl Into<String>,
        sender: Uuid,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.merge(None, Some(temp_id.into()), sender, content, timestamp)
    }

    /// Merge a server-confirmed message (history fetch or live delivery).
    /// Returns false if it deduplicated against an existing entry.
    pub fn insert_confirmed(&mut self, msg: ConfirmedMessage) -> bool {
        self.merge(Some(msg.id), None, msg.sender, &msg.content, msg.timestamp)
    }

    /// Upgrade the optimistic entry with its canonical ID when the
    /// `message-sent` confirmation arrives. Returns false when no entry
    /// carries that temp ID (a duplicate or very late confirmation).
    pub fn confirm(&mut self, temp_id: &str, server_id: Uuid) -> bool {
        // If the canonical record already landed through another source,
        // drop the still-unconfirmed optimistic entry instead of creating
        // a second entry with the same server ID.
        if self.entries.iter().any(|e| e.server_id == Some(server_id)) {
            let before = self.entries.len();
            self.entries
                .retain(|e| e.server_id.is_some() || e.temp_id.as_deref() != Some(temp_id));
            return self.entries.len() != before;
        }

        match self
            .entries
            .iter_mut()
            .find(|e| e.server_id.is_none() && e.temp_id.as_deref() == Some(temp_id))
        {
            Some(entry) => {
                entry.server_id = Some(server_id);
                true
            }
            None => false,
        }
    }

    /// Merge an older history page during backfill. Returns how many
    /// entries were actually added, so the UI can anchor its scroll
    /// position to the height delta the prepend introduced.
    pub fn prepend_page(&mut self, older: impl IntoIterator<Item = ConfirmedMessage>) -> usize {
        older
            .into_iter()
            .filter(|msg| self.insert_confirmed(msg.clone()))
            .count()
    }

    fn merge(
        &mut self,
        server_id: Option<Uuid>,
        temp_id: Option<String>,
        sender: Uuid,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let content = content.trim();

        if self.is_duplicate(server_id, sender, content, timestamp) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(TimelineEntry {
            server_id,
            temp_id,
            sender,
            content: content.to_string(),
            timestamp,
            seq,
        });

        // Timestamps are the authoritative order; seq keeps exact ties
        // stable in insertion order.
        self.entries.sort_by_key(|e| (e.timestamp, e.seq));
        true
    }

    /// A candidate duplicates an existing entry if their server IDs match,
    /// or — when an ID comparison is not possible — if sender, trimmed
    /// content, and a near-identical timestamp all agree. Two entries with
    /// distinct server IDs are never duplicates, however similar they look.
    fn is_duplicate(
        &self,
        server_id: Option<Uuid>,
        sender: Uuid,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let tolerance = Duration::milliseconds(DEDUP_TOLERANCE_MS);

        self.entries.iter().any(|e| match (server_id, e.server_id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                e.sender == sender
                    && e.content == content
                    && (e.timestamp - timestamp).abs() <= tolerance
            }
        })
    }
}
