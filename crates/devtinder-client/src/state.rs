//! Multi-conversation chat state: one timeline per partner, the active
//! conversation, and per-partner unread counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::timeline::{ConfirmedMessage, Timeline};

#[derive(Debug, Default)]
pub struct ChatState {
    timelines: HashMap<Uuid, Timeline>,
    active: Option<Uuid>,
    unread: HashMap<Uuid, u32>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the active conversation. Opening a conversation clears its
    /// unread counter — the user is now looking at it.
    pub fn set_active(&mut self, partner: Option<Uuid>) {
        self.active = partner;
        if let Some(partner) = partner {
            self.unread.insert(partner, 0);
        }
    }

    pub fn active(&self) -> Option<Uuid> {
        self.active
    }

    pub fn timeline(&self, partner: Uuid) -> Option<&Timeline> {
        self.timelines.get(&partner)
    }

    pub fn unread_count(&self, partner: Uuid) -> u32 {
        self.unread.get(&partner).copied().unwrap_or(0)
    }

    /// Record the optimistic entry for a message the user just sent.
    pub fn push_optimistic(
        &mut self,
        partner: Uuid,
        temp_id: impl Into<String>,
        self_id: Uuid,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.timelines
            .entry(partner)
            .or_default()
            .push_optimistic(temp_id, self_id, content, timestamp)
    }

    /// Apply a live `message-delivered` event. The conversation is keyed by
    /// the sender (the partner); a delivery into a conversation the user is
    /// not looking at bumps its unread counter. Returns false when the
    /// event deduplicated away.
    pub fn on_delivered(&mut self, msg: ConfirmedMessage) -> bool {
        let partner = msg.sender;
        let inserted = self.timelines.entry(partner).or_default().insert_confirmed(msg);

        if inserted && self.active != Some(partner) {
            *self.unread.entry(partner).or_insert(0) += 1;
        }
        inserted
    }

    /// Apply the `message-sent` confirmation for an optimistic entry.
    pub fn on_sent_confirmation(&mut self, partner: Uuid, temp_id: &str, server_id: Uuid) -> bool {
        match self.timelines.get_mut(&partner) {
            Some(timeline) => timeline.confirm(temp_id, server_id),
            None => false,
        }
    }

    /// Merge a fetched history page (newest-anchored page 1 or an older
    /// backfill page). Returns how many entries were added, which doubles
    /// as the scroll-anchor count during backfill.
    pub fn merge_history(
        &mut self,
        partner: Uuid,
        messages: impl IntoIterator<Item = ConfirmedMessage>,
    ) -> usize {
        self.timelines
            .entry(partner)
            .or_default()
            .prepend_page(messages)
    }

    /// Drop all local state for a conversation (e.g. after the connection
    /// was removed).
    pub fn clear_chat(&mut self, partner: Uuid) {
        self.timelines.remove(&partner);
        self.unread.remove(&partner);
        if self.active == Some(partner) {
            self.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(offset_ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + offset_ms).unwrap()
    }

    fn delivered(sender: Uuid, content: &str, offset_ms: i64) -> ConfirmedMessage {
        ConfirmedMessage {
            id: Uuid::new_v4(),
            sender,
            content: content.to_string(),
            timestamp: ts(offset_ms),
        }
    }

    #[test]
    fn delivery_to_inactive_conversation_bumps_unread() {
        let mut state = ChatState::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        state.set_active(Some(alice));

        assert!(state.on_delivered(delivered(bob, "hey", 0)));
        assert!(state.on_delivered(delivered(bob, "you there?", 5_000)));
        assert_eq!(state.unread_count(bob), 2);

        // The active conversation never accumulates unread.
        assert!(state.on_delivered(delivered(alice, "hi", 0)));
        assert_eq!(state.unread_count(alice), 0);
    }

    #[test]
    fn activating_a_conversation_clears_its_unread() {
        let mut state = ChatState::new();
        let bob = Uuid::new_v4();

        state.on_delivered(delivered(bob, "hey", 0));
        assert_eq!(state.unread_count(bob), 1);

        state.set_active(Some(bob));
        assert_eq!(state.unread_count(bob), 0);
    }

    #[test]
    fn duplicate_delivery_does_not_double_count() {
        let mut state = ChatState::new();
        let bob = Uuid::new_v4();
        let msg = delivered(bob, "hey", 0);

        assert!(state.on_delivered(msg.clone()));
        assert!(!state.on_delivered(msg));
        assert_eq!(state.unread_count(bob), 1);
    }

    #[test]
    fn optimistic_send_confirm_and_history_round_trip() {
        let mut state = ChatState::new();
        let me = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let server_id = Uuid::new_v4();

        state.set_active(Some(bob));
        state.push_optimistic(bob, "temp-1", me, "hello bob", ts(0));
        assert!(state.on_sent_confirmation(bob, "temp-1", server_id));

        // A later refetch of page 1 re-sends the canonical record; it must
        // dedup against the confirmed entry by ID.
        let added = state.merge_history(
            bob,
            [ConfirmedMessage {
                id: server_id,
                sender: me,
                content: "hello bob".into(),
                timestamp: ts(400),
            }],
        );
        assert_eq!(added, 0);
        assert_eq!(state.timeline(bob).unwrap().len(), 1);
    }

    #[test]
    fn clear_chat_forgets_the_conversation() {
        let mut state = ChatState::new();
        let bob = Uuid::new_v4();

        state.on_delivered(delivered(bob, "hey", 0));
        state.set_active(Some(bob));
        state.clear_chat(bob);

        assert!(state.timeline(bob).is_none());
        assert_eq!(state.unread_count(bob), 0);
        assert_eq!(state.active(), None);
    }
}
