use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub sku: String,
    pub price: i64,
    pub stock: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub url: String,
    pub alt_text: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub subtotal: i64,
    pub total_amount: i64,
    pub shipping_address_line1: String,
    pub shipping_address_line2: Option<String>,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status.as_str(), status::PENDING | status::PROCESSING)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i32,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub old_status: Option<String>,
    pub new_status: String,
    pub changed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle statuses and the allowed-transition table.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const SHIPPED: &str = "shipped";
    pub const DELIVERED: &str = "delivered";
    pub const CANCELLED: &str = "cancelled";
    pub const REFUNDED: &str = "refunded";

    pub const ALL: [&str; 6] = [
        PENDING, PROCESSING, SHIPPED, DELIVERED, CANCELLED, REFUNDED,
    ];

    pub const PAYMENT_STATUSES: [&str; 5] =
        ["pending", "processing", "completed", "failed", "refunded"];

    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }

    pub fn is_valid_payment(status: &str) -> bool {
        PAYMENT_STATUSES.contains(&status)
    }

    /// Statuses an order may move to from `from`. Cancelled and refunded
    /// are terminal.
    pub fn allowed_transitions(from: &str) -> &'static [&'static str] {
        match from {
            PENDING => &[PROCESSING, CANCELLED],
            PROCESSING => &[SHIPPED, CANCELLED],
            SHIPPED => &[DELIVERED, REFUNDED],
            DELIVERED => &[REFUNDED],
            _ => &[],
        }
    }

    pub fn can_transition(from: &str, to: &str) -> bool {
        allowed_transitions(from).contains(&to)
    }
}

/// Lowercase, keep alphanumerics, collapse everything else into single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("ORD-{}-{}", date, short)
}

/// SKU derived from category and product name when none is supplied.
pub fn build_sku(category_name: &str, product_name: &str) -> String {
    let cat: String = category_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect();
    let name = slugify(product_name);
    let name: String = name.chars().take(10).collect();
    format!("{}-{}", cat.to_ascii_uppercase(), name.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_allows_forward_progress() {
        assert!(status::can_transition("pending", "processing"));
        assert!(status::can_transition("pending", "cancelled"));
        assert!(status::can_transition("processing", "shipped"));
        assert!(status::can_transition("shipped", "delivered"));
        assert!(status::can_transition("delivered", "refunded"));
    }

    #[test]
    fn transition_table_rejects_skips_and_terminal_states() {
        assert!(!status::can_transition("pending", "delivered"));
        assert!(!status::can_transition("pending", "shipped"));
        assert!(!status::can_transition("shipped", "cancelled"));
        assert!(!status::can_transition("cancelled", "pending"));
        assert!(!status::can_transition("refunded", "pending"));
        assert!(status::allowed_transitions("cancelled").is_empty());
        assert!(status::allowed_transitions("refunded").is_empty());
    }

    #[test]
    fn unknown_status_is_invalid() {
        assert!(!status::is_valid("confirmed"));
        assert!(status::is_valid("processing"));
        assert!(status::is_valid_payment("completed"));
        assert!(!status::is_valid_payment("paid"));
    }

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("Wireless Mouse"), "wireless-mouse");
        assert_eq!(slugify("  USB-C  Hub!! "), "usb-c-hub");
        assert_eq!(slugify("Déjà vu"), "d-j-vu");
    }

    #[test]
    fn order_number_has_date_and_short_id() {
        let id = Uuid::new_v4();
        let number = build_order_number(id);
        assert!(number.starts_with("ORD-"));
        assert!(number.ends_with(&id.to_string()[..8]));
        assert_eq!(number.len(), "ORD-".len() + 8 + 1 + 8);
    }

    #[test]
    fn sku_combines_category_and_name() {
        assert_eq!(build_sku("Electronics", "Wireless Mouse"), "ELE-WIRELESS-M");
        assert_eq!(build_sku("TV", "4K Panel"), "TV-4K-PANEL");
    }
}
