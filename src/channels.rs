use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

pub const ADMIN_GROUP: &str = "admins";
pub const GENERAL_GROUP: &str = "general_notifications";

pub fn user_group(user_id: uuid::Uuid) -> String {
    format!("user_{}", user_id)
}

pub fn order_group(order_id: uuid::Uuid) -> String {
    format!("order_{}", order_id)
}

/// Group-addressed pub/sub used to push JSON messages to WebSocket
/// connections. Each group is a bounded broadcast channel created on first
/// subscribe; groups whose last receiver is gone are pruned on the next send.
#[derive(Clone)]
pub struct ChannelLayer {
    groups: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
    capacity: usize,
}

impl Default for ChannelLayer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ChannelLayer {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Join a group, creating it if needed. Dropping the receiver leaves
    /// the group.
    pub async fn subscribe(&self, group: &str) -> broadcast::Receiver<String> {
        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Serialize `message` once and fan it out to every member of `group`.
    /// Returns the number of receivers the message reached.
    pub async fn group_send<T: Serialize>(&self, group: &str, message: &T) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(group, error = %err, "dropping unserializable group message");
                return 0;
            }
        };

        let delivered = {
            let groups = self.groups.read().await;
            match groups.get(group) {
                Some(tx) => tx.send(payload).unwrap_or(0),
                None => return 0,
            }
        };

        if delivered == 0 {
            // Last receiver is gone; drop the group entry.
            let mut groups = self.groups.write().await;
            if groups
                .get(group)
                .is_some_and(|tx| tx.receiver_count() == 0)
            {
                groups.remove(group);
            }
        }

        delivered
    }

    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let layer = ChannelLayer::new(8);
        let mut a = layer.subscribe("user_1").await;
        let mut b = layer.subscribe("user_1").await;

        let delivered = layer
            .group_send("user_1", &serde_json::json!({"type": "ping"}))
            .await;
        assert_eq!(delivered, 2);

        let msg_a = a.recv().await.unwrap();
        let msg_b = b.recv().await.unwrap();
        assert_eq!(msg_a, msg_b);
        assert!(msg_a.contains("ping"));
    }

    #[tokio::test]
    async fn send_to_unknown_group_is_a_noop() {
        let layer = ChannelLayer::new(8);
        let delivered = layer.group_send("nobody", &serde_json::json!({})).await;
        assert_eq!(delivered, 0);
        assert_eq!(layer.group_count().await, 0);
    }

    #[tokio::test]
    async fn dead_groups_are_pruned_on_send() {
        let layer = ChannelLayer::new(8);
        let rx = layer.subscribe("user_2").await;
        assert_eq!(layer.group_count().await, 1);

        drop(rx);
        let delivered = layer.group_send("user_2", &serde_json::json!({})).await;
        assert_eq!(delivered, 0);
        assert_eq!(layer.group_count().await, 0);
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let layer = ChannelLayer::new(8);
        let mut orders = layer.subscribe("order_9").await;
        let mut other = layer.subscribe("user_3").await;

        layer
            .group_send("order_9", &serde_json::json!({"order": 9}))
            .await;

        assert!(orders.recv().await.unwrap().contains("order"));
        assert!(matches!(
            other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
