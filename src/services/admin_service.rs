use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    cache::{CacheStats, CacheTier, keys},
    dto::{
        cache::{CacheClearResult, CacheFlushResult, CacheWarmResult, ClearCacheRequest},
        orders::{
            AdminOrderList, AdminOrderRow, BulkUpdateOrderStatusRequest, BulkUpdateResult,
            OrderStats, OrderWithItems, UpdateOrderStatusRequest, UpdatePaymentStatusRequest,
        },
        products::ProductList,
        users::{UserList, UserProfile},
    },
    error::{AppError, AppResult},
    events,
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, Product, User, status},
    response::{ApiResponse, Meta},
    routes::params::{AdminOrderListQuery, LowStockQuery, Pagination, ProductQuery, SortOrder},
    services::{
        category_service,
        order_service::{append_history, load_order_details},
        product_service,
    },
    state::AppState,
};

#[derive(FromRow)]
struct OrderWithEmailRow {
    #[sqlx(flatten)]
    order: Order,
    user_email: String,
}

fn apply_order_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AdminOrderListQuery) {
    builder.push(" WHERE TRUE");
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        builder.push(" AND o.status = ").push_bind(status.clone());
    }
    if let Some(payment) = query.payment_status.as_ref().filter(|s| !s.is_empty()) {
        builder
            .push(" AND o.payment_status = ")
            .push_bind(payment.clone());
    }
    if let Some(email) = query.user_email.as_ref().filter(|s| !s.is_empty()) {
        builder
            .push(" AND u.email ILIKE ")
            .push_bind(format!("%{}%", email));
    }
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: AdminOrderListQuery,
) -> AppResult<ApiResponse<AdminOrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut builder = QueryBuilder::new(
        "SELECT o.*, u.email AS user_email FROM orders o JOIN users u ON u.id = o.user_id",
    );
    apply_order_filters(&mut builder, &query);
    builder
        .push(" ORDER BY o.created_at ")
        .push(sort_order.as_sql());
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);

    let rows: Vec<OrderWithEmailRow> = builder
        .build_query_as()
        .fetch_all(&state.pool)
        .await?;

    let mut count_builder =
        QueryBuilder::new("SELECT count(*) FROM orders o JOIN users u ON u.id = o.user_id");
    apply_order_filters(&mut count_builder, &query);
    let total: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| AdminOrderRow {
            order: row.order,
            user_email: row.user_email,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Orders",
        AdminOrderList { items },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let data = load_order_details(state, order).await?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    if !status::is_valid(&payload.status) {
        return Err(AppError::BadRequest("Invalid order status".into()));
    }

    let mut txn = state.pool.begin().await?;

    let existing: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if !status::can_transition(&existing.status, &payload.status) {
        return Err(AppError::BadRequest(format!(
            "Cannot change status from '{}' to '{}'",
            existing.status, payload.status
        )));
    }

    let old_status = existing.status.clone();
    let order: Order = sqlx::query_as(
        "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&payload.status)
    .fetch_one(&mut *txn)
    .await?;

    let default_note = format!("Status changed from {} to {}", old_status, payload.status);
    append_history(
        &mut txn,
        order.id,
        Some(&old_status),
        &payload.status,
        Some(user.user_id),
        Some(payload.notes.as_deref().unwrap_or(&default_note)),
    )
    .await?;

    txn.commit().await?;

    events::order_updated(state, &order, &old_status).await;

    Ok(ApiResponse::success(
        "Order updated",
        order,
        Some(Meta::empty()),
    ))
}

/// Payment status moves freely within its value set; the change is recorded
/// as a history note with the order status left untouched.
pub async fn update_payment_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdatePaymentStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    if !status::is_valid_payment(&payload.payment_status) {
        return Err(AppError::BadRequest("Invalid payment status".into()));
    }

    let mut txn = state.pool.begin().await?;

    let existing: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let old_payment = existing.payment_status.clone();
    let order: Order = sqlx::query_as(
        "UPDATE orders SET payment_status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&payload.payment_status)
    .fetch_one(&mut *txn)
    .await?;

    let default_note = format!(
        "Payment status changed from {} to {}",
        old_payment, payload.payment_status
    );
    append_history(
        &mut txn,
        order.id,
        Some(&order.status),
        &order.status,
        Some(user.user_id),
        Some(payload.notes.as_deref().unwrap_or(&default_note)),
    )
    .await?;

    txn.commit().await?;

    events::order_updated(state, &order, &order.status).await;

    Ok(ApiResponse::success(
        "Payment status updated",
        order,
        Some(Meta::empty()),
    ))
}

/// Apply one status change to many orders in a single transaction. Orders
/// that are missing or whose current status forbids the transition are
/// reported per id; the remaining orders are still updated.
pub async fn bulk_update_order_status(
    state: &AppState,
    user: &AuthUser,
    payload: BulkUpdateOrderStatusRequest,
) -> AppResult<ApiResponse<BulkUpdateResult>> {
    ensure_admin(user)?;
    if payload.order_ids.is_empty() {
        return Err(AppError::BadRequest("order_ids must not be empty".into()));
    }
    if !status::is_valid(&payload.status) {
        return Err(AppError::BadRequest("Invalid order status".into()));
    }

    let mut txn = state.pool.begin().await?;
    let mut updated: Vec<(Order, String)> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for id in &payload.order_ids {
        let existing: Option<Order> =
            sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *txn)
                .await?;
        let existing = match existing {
            Some(o) => o,
            None => {
                errors.push(format!("Order {} not found", id));
                continue;
            }
        };
        if !status::can_transition(&existing.status, &payload.status) {
            errors.push(format!(
                "Cannot change order {} from '{}' to '{}'",
                id, existing.status, payload.status
            ));
            continue;
        }

        let old_status = existing.status.clone();
        let order: Order = sqlx::query_as(
            "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&payload.status)
        .fetch_one(&mut *txn)
        .await?;

        let default_note = format!("Bulk status change from {} to {}", old_status, payload.status);
        append_history(
            &mut txn,
            order.id,
            Some(&old_status),
            &payload.status,
            Some(user.user_id),
            Some(payload.notes.as_deref().unwrap_or(&default_note)),
        )
        .await?;
        updated.push((order, old_status));
    }

    txn.commit().await?;

    for (order, old_status) in &updated {
        events::order_updated(state, order, old_status).await;
    }

    let updated_orders: Vec<Uuid> = updated.iter().map(|(o, _)| o.id).collect();
    let total_updated = updated_orders.len();
    Ok(ApiResponse::success(
        "Bulk update finished",
        BulkUpdateResult {
            updated_orders,
            errors,
            total_updated,
        },
        Some(Meta::empty()),
    ))
}

pub async fn order_stats(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderStats>> {
    ensure_admin(user)?;

    let cache_key = keys::order_stats();
    if let Some(cached) = state.cache.get::<OrderStats>(&cache_key).await {
        return Ok(ApiResponse::success("Order stats", cached, None));
    }

    #[derive(FromRow)]
    struct StatsRow {
        total_orders: i64,
        pending_orders: i64,
        processing_orders: i64,
        shipped_orders: i64,
        delivered_orders: i64,
        cancelled_orders: i64,
        refunded_orders: i64,
        total_revenue: i64,
    }

    let row: StatsRow = sqlx::query_as(
        r#"
        SELECT count(*) AS total_orders,
               count(*) FILTER (WHERE status = 'pending') AS pending_orders,
               count(*) FILTER (WHERE status = 'processing') AS processing_orders,
               count(*) FILTER (WHERE status = 'shipped') AS shipped_orders,
               count(*) FILTER (WHERE status = 'delivered') AS delivered_orders,
               count(*) FILTER (WHERE status = 'cancelled') AS cancelled_orders,
               count(*) FILTER (WHERE status = 'refunded') AS refunded_orders,
               coalesce(sum(total_amount) FILTER (WHERE status <> 'cancelled'), 0) AS total_revenue
        FROM orders
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let average_order_value = if row.total_orders > 0 {
        row.total_revenue / row.total_orders
    } else {
        0
    };

    let stats = OrderStats {
        total_orders: row.total_orders,
        pending_orders: row.pending_orders,
        processing_orders: row.processing_orders,
        shipped_orders: row.shipped_orders,
        delivered_orders: row.delivered_orders,
        cancelled_orders: row.cancelled_orders,
        refunded_orders: row.refunded_orders,
        total_revenue: row.total_revenue,
        average_order_value,
    };

    state.cache.set(&cache_key, &stats, CacheTier::Medium).await;
    Ok(ApiResponse::success("Order stats", stats, None))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let items: Vec<Product> = sqlx::query_as(
        r#"
        SELECT * FROM products
        WHERE stock <= $1
        ORDER BY stock ASC, created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(threshold)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT count(*) FROM products WHERE stock <= $1")
        .bind(threshold)
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Low stock",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    delta: i32,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let mut txn = state.pool.begin().await?;
    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *txn)
            .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let new_stock = product.stock + delta;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let updated: Product = sqlx::query_as(
        "UPDATE products SET stock = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(new_stock)
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    state.cache.invalidate_group("product").await;
    state.cache.invalidate_group("products").await;
    tracing::info!(product_id = %updated.id, delta, new_stock, "inventory adjusted");

    Ok(ApiResponse::success(
        "Inventory updated",
        updated,
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let users: Vec<User> =
        sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;

    let total: (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    let items = users.into_iter().map(UserProfile::from).collect();
    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(meta),
    ))
}

/// Key groups an admin may clear selectively. Matches the prefixes used by
/// `cache::keys`.
const CLEARABLE_GROUPS: &[&str] = &[
    "product",
    "products",
    "categories",
    "order",
    "user",
    "stats",
];

pub async fn cache_stats(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CacheStats>> {
    ensure_admin(user)?;
    let stats = state.cache.stats().await;
    Ok(ApiResponse::success("Cache stats", stats, None))
}

pub async fn clear_cache(
    state: &AppState,
    user: &AuthUser,
    payload: ClearCacheRequest,
) -> AppResult<ApiResponse<CacheClearResult>> {
    ensure_admin(user)?;
    if payload.groups.is_empty() {
        return Err(AppError::BadRequest("groups must not be empty".into()));
    }
    for group in &payload.groups {
        if !CLEARABLE_GROUPS.contains(&group.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unknown cache group '{}'. Valid groups: {}",
                group,
                CLEARABLE_GROUPS.join(", ")
            )));
        }
    }

    let mut keys_deleted: u64 = 0;
    for group in &payload.groups {
        keys_deleted += state.cache.invalidate_group(group).await;
    }
    tracing::info!(groups = ?payload.groups, keys_deleted, "cache groups cleared");

    Ok(ApiResponse::success(
        "Cache cleared",
        CacheClearResult {
            cleared_groups: payload.groups,
            keys_deleted,
        },
        Some(Meta::empty()),
    ))
}

pub async fn flush_cache(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CacheFlushResult>> {
    ensure_admin(user)?;
    let keys_deleted = state.cache.delete_pattern("*").await;
    tracing::warn!(keys_deleted, "cache flushed");
    Ok(ApiResponse::success(
        "Cache flushed",
        CacheFlushResult { keys_deleted },
        Some(Meta::empty()),
    ))
}

/// Pre-populate the hottest read paths so the first requests after a flush
/// or deploy hit warm entries.
pub async fn warm_cache(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CacheWarmResult>> {
    ensure_admin(user)?;
    let mut warmed = Vec::new();

    category_service::list_categories(state).await?;
    warmed.push("categories".to_string());

    let default_query = ProductQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        q: None,
        category: None,
        min_price: None,
        max_price: None,
        in_stock: None,
        featured: None,
        sort_by: None,
        sort_order: None,
    };
    product_service::list_products(state, default_query).await?;
    warmed.push("products".to_string());

    let featured_query = ProductQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        q: None,
        category: None,
        min_price: None,
        max_price: None,
        in_stock: None,
        featured: Some(true),
        sort_by: None,
        sort_order: None,
    };
    product_service::list_products(state, featured_query).await?;
    warmed.push("featured_products".to_string());

    tracing::info!(warmed = ?warmed, "cache warmed");
    Ok(ApiResponse::success(
        "Cache warmed",
        CacheWarmResult { warmed },
        Some(Meta::empty()),
    ))
}
