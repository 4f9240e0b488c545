//! Per-user session registry for the live delivery channel.
//!
//! Each connected client is addressable by its own user ID — delivery is a
//! single-hop "send to this user's channel" regardless of which
//! conversation is active. The registry is an explicit object owned by the
//! transport layer and injected where needed, never ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use devtinder_types::events::GatewayEvent;

/// Manages the live channels of all connected clients.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Per-user targeted send channels: user_id -> (conn_id, sender).
    /// At most one live connection per user; a reconnect takes the slot
    /// over and the stale connection's teardown leaves it untouched.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a user's channel. Returns (conn_id, receiver); the conn_id
    /// must be passed back on unregister so a stale disconnect never evicts
    /// a newer connection.
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a user's channel, but only if conn_id still owns it.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user's live connection. A user
    /// with no live connection simply misses the event — offline recipients
    /// catch up from persisted storage on their next history fetch.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Whether the user currently has a live connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_targets_only_the_addressed_user() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        dispatcher
            .send_to_user(
                bob,
                GatewayEvent::MessageError {
                    reason: "test".into(),
                },
            )
            .await;

        assert!(bob_rx.try_recv().is_ok());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .send_to_user(
                Uuid::new_v4(),
                GatewayEvent::MessageError {
                    reason: "dropped".into(),
                },
            )
            .await;
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_evict_a_newer_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(user).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(user).await;

        // The old connection's teardown runs after the reconnect.
        dispatcher.unregister_user_channel(user, old_conn).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher
            .send_to_user(
                user,
                GatewayEvent::MessageError {
                    reason: "still here".into(),
                },
            )
            .await;
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_with_matching_conn_id_removes_the_channel() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (conn_id, _rx) = dispatcher.register_user_channel(user).await;
        dispatcher.unregister_user_channel(user, conn_id).await;
        assert!(!dispatcher.is_online(user).await);
    }
}
