use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatusHistory};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub shipping_address_line1: String,
    pub shipping_address_line2: Option<String>,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkUpdateOrderStatusRequest {
    pub order_ids: Vec<Uuid>,
    pub status: String,
    pub notes: Option<String>,
}

/// Per-order outcome of a bulk status change. Orders that could not be
/// updated are reported in `errors` without failing the whole request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkUpdateResult {
    pub updated_orders: Vec<Uuid>,
    pub errors: Vec<String>,
    pub total_updated: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub status_history: Vec<OrderStatusHistory>,
}

/// Admin order row joined with the buyer's email.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminOrderRow {
    #[serde(flatten)]
    pub order: Order,
    pub user_email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminOrderList {
    pub items: Vec<AdminOrderRow>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub processing_orders: i64,
    pub shipped_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub refunded_orders: i64,
    pub total_revenue: i64,
    pub average_order_value: i64,
}
