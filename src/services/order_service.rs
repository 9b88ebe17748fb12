use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    cache::{CacheTier, keys},
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    error::{AppError, AppResult},
    events,
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatusHistory, build_order_number, status},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let status_filter = query.status.as_deref().filter(|s| !s.is_empty());

    let cache_key = keys::user_orders(user.user_id, &query.fingerprint());
    if let Some((items, total)) = state.cache.get::<(Vec<Order>, i64)>(&cache_key).await {
        let meta = Meta::new(page, limit, total);
        return Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)));
    }

    let order_sql = query.sort_order.unwrap_or(SortOrder::Desc).as_sql();
    let sql = format!(
        r#"
        SELECT * FROM orders
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at {}
        LIMIT $3 OFFSET $4
        "#,
        order_sql
    );
    let items: Vec<Order> = sqlx::query_as(&sql)
        .bind(user.user_id)
        .bind(status_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM orders WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(user.user_id)
    .bind(status_filter)
    .fetch_one(&state.pool)
    .await?;

    state
        .cache
        .set(&cache_key, &(&items, total.0), CacheTier::Short)
        .await;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let cache_key = keys::order_detail(user.user_id, id);
    if let Some(cached) = state.cache.get::<OrderWithItems>(&cache_key).await {
        return Ok(ApiResponse::success("Order", cached, Some(Meta::empty())));
    }

    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let data = load_order_details(state, order).await?;
    state.cache.set(&cache_key, &data, CacheTier::Short).await;
    Ok(ApiResponse::success("Order", data, Some(Meta::empty())))
}

pub async fn load_order_details(state: &AppState, order: Order) -> AppResult<OrderWithItems> {
    let items: Vec<OrderItem> =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
            .bind(order.id)
            .fetch_all(&state.pool)
            .await?;

    let status_history: Vec<OrderStatusHistory> = sqlx::query_as(
        "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at DESC",
    )
    .bind(order.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(OrderWithItems {
        order,
        items,
        status_history,
    })
}

#[derive(Debug, FromRow)]
struct CheckoutRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    sku: String,
    price: i64,
    stock: i32,
    is_active: bool,
}

/// Create an order from the user's cart. Everything below runs in one
/// transaction: cart and product rows are locked, stock is validated and
/// decremented, order plus items plus the initial history row are written,
/// and the cart is cleared. The notification fan-out happens after commit.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.shipping_address_line1.trim().is_empty()
        || payload.shipping_city.trim().is_empty()
        || payload.shipping_postal_code.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "shipping address is incomplete".to_string(),
        ));
    }

    let mut txn = state.pool.begin().await?;

    let rows: Vec<CheckoutRow> = sqlx::query_as(
        r#"
        SELECT ci.product_id, ci.quantity, p.name, p.sku, p.price, p.stock, p.is_active
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE c.user_id = $1
        ORDER BY ci.created_at
        FOR UPDATE OF ci, p
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&mut *txn)
    .await?;

    if rows.is_empty() {
        return Err(AppError::BadRequest(
            "Cart is empty. Cannot create order.".to_string(),
        ));
    }

    let mut total_amount: i64 = 0;
    for row in &rows {
        if !row.is_active {
            return Err(AppError::BadRequest(format!(
                "Product '{}' is no longer available",
                row.name
            )));
        }
        if row.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if row.quantity > row.stock {
            return Err(AppError::BadRequest(format!(
                "Only {} units of '{}' available",
                row.stock, row.name
            )));
        }
        total_amount += row.price * row.quantity as i64;
    }

    let order_id = Uuid::new_v4();
    let order_number = build_order_number(order_id);

    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders
            (id, user_id, order_number, status, payment_status, subtotal, total_amount,
             shipping_address_line1, shipping_address_line2, shipping_city, shipping_state,
             shipping_postal_code, shipping_country, notes)
        VALUES ($1, $2, $3, 'pending', 'pending', $4, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(user.user_id)
    .bind(&order_number)
    .bind(total_amount)
    .bind(&payload.shipping_address_line1)
    .bind(&payload.shipping_address_line2)
    .bind(&payload.shipping_city)
    .bind(&payload.shipping_state)
    .bind(&payload.shipping_postal_code)
    .bind(&payload.shipping_country)
    .bind(&payload.notes)
    .fetch_one(&mut *txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(rows.len());
    for row in &rows {
        // Snapshot the product at order time for historical accuracy.
        let item: OrderItem = sqlx::query_as(
            r#"
            INSERT INTO order_items
                (id, order_id, product_id, product_name, product_sku, quantity, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(row.product_id)
        .bind(&row.name)
        .bind(&row.sku)
        .bind(row.quantity)
        .bind(row.price)
        .fetch_one(&mut *txn)
        .await?;
        items.push(item);

        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1")
            .bind(row.product_id)
            .bind(row.quantity)
            .execute(&mut *txn)
            .await?;
    }

    let status_history = vec![
        append_history(
            &mut txn,
            order.id,
            None,
            status::PENDING,
            Some(user.user_id),
            Some("Order created successfully"),
        )
        .await?,
    ];

    sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND c.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .execute(&mut *txn)
    .await?;

    txn.commit().await?;

    let user_email: (String,) = sqlx::query_as("SELECT email FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_one(&state.pool)
        .await?;
    events::order_created(state, &order, &user_email.0).await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order,
            items,
            status_history,
        },
        Some(Meta::empty()),
    ))
}

/// Users may cancel their own order while it is pending or processing.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let mut txn = state.pool.begin().await?;

    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(user.user_id)
            .fetch_optional(&mut *txn)
            .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if !order.can_be_cancelled() {
        return Err(AppError::BadRequest(format!(
            "Cannot cancel an order in status '{}'",
            order.status
        )));
    }

    let old_status = order.status.clone();
    let order: Order = sqlx::query_as(
        "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(order.id)
    .bind(status::CANCELLED)
    .fetch_one(&mut *txn)
    .await?;

    append_history(
        &mut txn,
        order.id,
        Some(&old_status),
        status::CANCELLED,
        Some(user.user_id),
        Some("Cancelled by customer"),
    )
    .await?;

    txn.commit().await?;

    events::order_updated(state, &order, &old_status).await;

    let data = load_order_details(state, order).await?;
    Ok(ApiResponse::success(
        "Order cancelled",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn append_history(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: Uuid,
    old_status: Option<&str>,
    new_status: &str,
    changed_by: Option<Uuid>,
    notes: Option<&str>,
) -> AppResult<OrderStatusHistory> {
    let row: OrderStatusHistory = sqlx::query_as(
        r#"
        INSERT INTO order_status_history
            (id, order_id, old_status, new_status, changed_by, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(old_status)
    .bind(new_status)
    .bind(changed_by)
    .bind(notes)
    .fetch_one(&mut **txn)
    .await?;
    Ok(row)
}
