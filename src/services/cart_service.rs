use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem, Product},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Carts are created lazily on first access.
pub async fn get_or_create_cart(pool: &DbPool, user_id: Uuid) -> AppResult<Cart> {
    let existing: Option<Cart> = sqlx::query_as("SELECT * FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if let Some(cart) = existing {
        return Ok(cart);
    }

    // Concurrent first access races on the unique user_id; fall back to the
    // winner's row.
    let cart: Cart = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id) VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(cart)
}

#[derive(FromRow)]
struct CartRow {
    item_id: Uuid,
    quantity: i32,
    #[sqlx(flatten)]
    product: ProductColumns,
}

#[derive(FromRow)]
struct ProductColumns {
    id: Uuid,
    category_id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    sku: String,
    price: i64,
    stock: i32,
    low_stock_threshold: i32,
    is_active: bool,
    is_featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductColumns> for Product {
    fn from(row: ProductColumns) -> Self {
        Product {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            sku: row.sku,
            price: row.price,
            stock: row.stock,
            low_stock_threshold: row.low_stock_threshold,
            is_active: row.is_active,
            is_featured: row.is_featured,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart = get_or_create_cart(&state.pool, user.user_id).await?;

    let rows: Vec<CartRow> = sqlx::query_as(
        r#"
        SELECT ci.id AS item_id, ci.quantity,
               p.id, p.category_id, p.name, p.slug, p.description, p.sku, p.price,
               p.stock, p.low_stock_threshold, p.is_active, p.is_featured,
               p.created_at, p.updated_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at
        "#,
    )
    .bind(cart.id)
    .fetch_all(&state.pool)
    .await?;

    let mut total_items: i64 = 0;
    let mut total_price: i64 = 0;
    let items: Vec<CartItemDto> = rows
        .into_iter()
        .map(|row| {
            let product: Product = row.product.into();
            let subtotal = product.price * row.quantity as i64;
            total_items += row.quantity as i64;
            total_price += subtotal;
            CartItemDto {
                id: row.item_id,
                product,
                quantity: row.quantity,
                subtotal,
            }
        })
        .collect();

    let data = CartDto {
        id: cart.id,
        items,
        total_items,
        total_price,
        created_at: cart.created_at,
        updated_at: cart.updated_at,
    };
    Ok(ApiResponse::success("Cart", data, None))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE id = $1 AND is_active")
            .bind(payload.product_id)
            .fetch_optional(&state.pool)
            .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::BadRequest("product not found or inactive".into())),
    };
    if product.stock <= 0 {
        return Err(AppError::BadRequest("Product is out of stock".into()));
    }

    let cart = get_or_create_cart(&state.pool, user.user_id).await?;

    let existing: Option<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id)
            .bind(payload.product_id)
            .fetch_optional(&state.pool)
            .await?;

    // Adding an item already in the cart increments its quantity.
    let new_quantity = existing.as_ref().map_or(0, |item| item.quantity) + payload.quantity;
    if new_quantity > product.stock {
        return Err(AppError::BadRequest(format!(
            "Only {} units available in stock",
            product.stock
        )));
    }

    let cart_item: CartItem = if let Some(item) = existing {
        sqlx::query_as(
            r#"
            UPDATE cart_items
            SET quantity = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(new_quantity)
        .fetch_one(&state.pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cart.id)
        .bind(payload.product_id)
        .bind(new_quantity)
        .fetch_one(&state.pool)
        .await?
    };

    invalidate_cart_cache(state, user.user_id).await;
    Ok(ApiResponse::success("Added to cart", cart_item, None))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    #[derive(FromRow)]
    struct ItemWithStock {
        id: Uuid,
        stock: i32,
    }

    let item: Option<ItemWithStock> = sqlx::query_as(
        r#"
        SELECT ci.id, p.stock
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE ci.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let item = match item {
        Some(i) => i,
        None => return Err(AppError::NotFound),
    };
    if payload.quantity > item.stock {
        return Err(AppError::BadRequest(format!(
            "Only {} units available in stock",
            item.stock
        )));
    }

    let cart_item: CartItem = sqlx::query_as(
        r#"
        UPDATE cart_items
        SET quantity = $2, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(item.id)
    .bind(payload.quantity)
    .fetch_one(&state.pool)
    .await?;

    invalidate_cart_cache(state, user.user_id).await;
    Ok(ApiResponse::success("Cart item updated", cart_item, None))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND ci.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    invalidate_cart_cache(state, user.user_id).await;
    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND c.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    invalidate_cart_cache(state, user.user_id).await;
    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn invalidate_cart_cache(state: &AppState, user_id: Uuid) {
    state
        .cache
        .delete_pattern(&format!("user:{}:cart:*", user_id))
        .await;
}
