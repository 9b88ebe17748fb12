//! Order event fan-out: WebSocket notifications plus cache invalidation.
//! Fired after the surrounding transaction commits; failures are logged and
//! never surfaced to the request that triggered them.

use serde_json::{Value, json};

use crate::{
    channels::{ADMIN_GROUP, order_group, user_group},
    models::Order,
    state::AppState,
};

pub fn order_created_payload(order: &Order) -> Value {
    json!({
        "type": "notification",
        "data": {
            "notification_type": "order_created",
            "order_id": order.id,
            "order_number": order.order_number,
            "user_id": order.user_id,
            "status": order.status,
            "total_amount": order.total_amount,
            "message": format!("New order {} has been placed", order.order_number),
            "timestamp": order.created_at,
        }
    })
}

pub fn order_updated_payload(order: &Order, old_status: &str) -> Value {
    json!({
        "type": "notification",
        "data": {
            "notification_type": "order_updated",
            "order_id": order.id,
            "order_number": order.order_number,
            "user_id": order.user_id,
            "status": order.status,
            "old_status": old_status,
            "total_amount": order.total_amount,
            "message": format!(
                "Order {} status updated to {}",
                order.order_number, order.status
            ),
            "timestamp": order.updated_at,
        }
    })
}

fn admin_order_payload(order: &Order, user_email: &str) -> Value {
    json!({
        "type": "notification",
        "data": {
            "notification_type": "new_order_admin",
            "order_id": order.id,
            "order_number": order.order_number,
            "user_email": user_email,
            "total_amount": order.total_amount,
            "message": format!("New order {} from {}", order.order_number, user_email),
            "timestamp": order.created_at,
        }
    })
}

pub async fn order_created(state: &AppState, order: &Order, user_email: &str) {
    let payload = order_created_payload(order);
    state
        .channels
        .group_send(&user_group(order.user_id), &payload)
        .await;
    state
        .channels
        .group_send(&order_group(order.id), &payload)
        .await;
    state
        .channels
        .group_send(ADMIN_GROUP, &admin_order_payload(order, user_email))
        .await;

    invalidate_order_caches(state, order).await;
    state
        .cache
        .delete_pattern(&format!("user:{}:cart:*", order.user_id))
        .await;

    tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
}

pub async fn order_updated(state: &AppState, order: &Order, old_status: &str) {
    let payload = order_updated_payload(order, old_status);
    state
        .channels
        .group_send(&user_group(order.user_id), &payload)
        .await;
    state
        .channels
        .group_send(&order_group(order.id), &payload)
        .await;
    state.channels.group_send(ADMIN_GROUP, &payload).await;

    invalidate_order_caches(state, order).await;

    tracing::info!(
        order_id = %order.id,
        from = old_status,
        to = %order.status,
        "order status changed"
    );
}

async fn invalidate_order_caches(state: &AppState, order: &Order) {
    state
        .cache
        .delete_pattern(&format!("user:{}:orders:*", order.user_id))
        .await;
    state
        .cache
        .delete_pattern(&format!("order:{}:*", order.id))
        .await;
    state.cache.delete_pattern("orders:admin:*").await;
    state.cache.invalidate_group("stats").await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            order_number: "ORD-20250101-abcd1234".into(),
            status: "processing".into(),
            payment_status: "pending".into(),
            subtotal: 2000,
            total_amount: 2000,
            shipping_address_line1: "1 Main St".into(),
            shipping_address_line2: None,
            shipping_city: "Springfield".into(),
            shipping_state: "IL".into(),
            shipping_postal_code: "62701".into(),
            shipping_country: "USA".into(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn created_payload_carries_order_fields() {
        let order = sample_order();
        let payload = order_created_payload(&order);
        assert_eq!(payload["type"], "notification");
        assert_eq!(payload["data"]["notification_type"], "order_created");
        assert_eq!(payload["data"]["order_id"], json!(order.id));
        assert_eq!(payload["data"]["total_amount"], 2000);
    }

    #[test]
    fn updated_payload_records_old_status() {
        let order = sample_order();
        let payload = order_updated_payload(&order, "pending");
        assert_eq!(payload["data"]["notification_type"], "order_updated");
        assert_eq!(payload["data"]["old_status"], "pending");
        assert_eq!(payload["data"]["status"], "processing");
    }

    #[tokio::test]
    async fn created_event_reaches_user_order_and_admin_groups() {
        use crate::channels::ChannelLayer;

        let order = sample_order();
        let channels = ChannelLayer::new(8);
        let mut user_rx = channels.subscribe(&user_group(order.user_id)).await;
        let mut order_rx = channels.subscribe(&order_group(order.id)).await;
        let mut admin_rx = channels.subscribe(ADMIN_GROUP).await;

        // No DB needed: events only touch channels and cache.
        let state = AppState::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
            crate::cache::CacheManager::disabled(),
            channels,
        );

        order_created(&state, &order, "buyer@example.com").await;

        let user_msg = user_rx.recv().await.unwrap();
        assert!(user_msg.contains("order_created"));
        let order_msg = order_rx.recv().await.unwrap();
        assert!(order_msg.contains("order_created"));
        let admin_msg = admin_rx.recv().await.unwrap();
        assert!(admin_msg.contains("new_order_admin"));
        assert!(admin_msg.contains("buyer@example.com"));
    }
}
