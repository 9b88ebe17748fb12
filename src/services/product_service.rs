use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    cache::{CacheTier, keys},
    dto::products::{CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, Product, ProductImage, build_sku, slugify},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

fn apply_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    builder.push(" WHERE is_active");

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = query.category {
        builder.push(" AND category_id = ").push_bind(category);
    }
    if let Some(min_price) = query.min_price {
        builder.push(" AND price >= ").push_bind(min_price);
    }
    if let Some(max_price) = query.max_price {
        builder.push(" AND price <= ").push_bind(max_price);
    }
    if let Some(in_stock) = query.in_stock {
        if in_stock {
            builder.push(" AND stock > 0");
        } else {
            builder.push(" AND stock = 0");
        }
    }
    if let Some(featured) = query.featured {
        builder.push(" AND is_featured = ").push_bind(featured);
    }
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let cache_key = keys::product_list(&query.fingerprint());
    if let Some((items, total)) = state.cache.get::<(Vec<Product>, i64)>(&cache_key).await {
        let meta = Meta::new(page, limit, total);
        return Ok(ApiResponse::success(
            "Products",
            ProductList { items },
            Some(meta),
        ));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut builder = QueryBuilder::new("SELECT * FROM products");
    apply_filters(&mut builder, &query);
    builder
        .push(" ORDER BY ")
        .push(sort_by.as_sql())
        .push(" ")
        .push(sort_order.as_sql());
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);

    let items: Vec<Product> = builder
        .build_query_as()
        .fetch_all(&state.pool)
        .await?;

    let mut count_builder = QueryBuilder::new("SELECT count(*) FROM products");
    apply_filters(&mut count_builder, &query);
    let total: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;

    state
        .cache
        .set(&cache_key, &(&items, total.0), CacheTier::Short)
        .await;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let cache_key = keys::product_detail(id);
    if let Some(cached) = state.cache.get::<ProductDetail>(&cache_key).await {
        return Ok(ApiResponse::success("Product", cached, None));
    }

    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let category: Category = sqlx::query_as("SELECT * FROM categories WHERE id = $1")
        .bind(product.category_id)
        .fetch_one(&state.pool)
        .await?;

    let images: Vec<ProductImage> =
        sqlx::query_as("SELECT * FROM product_images WHERE product_id = $1 ORDER BY position")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;

    let detail = ProductDetail {
        product,
        category,
        images,
    };
    state.cache.set(&cache_key, &detail, CacheTier::Medium).await;
    Ok(ApiResponse::success("Product", detail, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<ProductDetail>> {
    ensure_admin(user)?;
    if payload.price <= 0 {
        return Err(AppError::BadRequest("price must be greater than 0".into()));
    }
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let category: Option<Category> = sqlx::query_as("SELECT * FROM categories WHERE id = $1")
        .bind(payload.category_id)
        .fetch_optional(&state.pool)
        .await?;
    let category = match category {
        Some(c) => c,
        None => return Err(AppError::BadRequest("category not found".into())),
    };

    let slug = slugify(&payload.name);
    let sku = payload
        .sku
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| build_sku(&category.name, &payload.name));

    let mut txn = state.pool.begin().await?;

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products
            (id, category_id, name, slug, description, sku, price, stock,
             low_stock_threshold, is_active, is_featured)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.category_id)
    .bind(&payload.name)
    .bind(&slug)
    .bind(&payload.description)
    .bind(&sku)
    .bind(payload.price)
    .bind(payload.stock)
    .bind(payload.low_stock_threshold.unwrap_or(10))
    .bind(payload.is_active.unwrap_or(true))
    .bind(payload.is_featured.unwrap_or(false))
    .fetch_one(&mut *txn)
    .await?;

    let mut images = Vec::with_capacity(payload.images.len());
    for (position, image) in payload.images.iter().enumerate() {
        let image: ProductImage = sqlx::query_as(
            r#"
            INSERT INTO product_images (id, product_id, url, alt_text, position)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product.id)
        .bind(&image.url)
        .bind(&image.alt_text)
        .bind(position as i32)
        .fetch_one(&mut *txn)
        .await?;
        images.push(image);
    }

    txn.commit().await?;

    invalidate_product_caches(state).await;
    tracing::info!(product_id = %product.id, name = %product.name, "product created");

    Ok(ApiResponse::success(
        "Product created",
        ProductDetail {
            product,
            category,
            images,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    if let Some(category_id) = payload.category_id {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM categories WHERE id = $1")
            .bind(category_id)
            .fetch_optional(&state.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::BadRequest("category not found".into()));
        }
    }
    if payload.price.is_some_and(|p| p <= 0) {
        return Err(AppError::BadRequest("price must be greater than 0".into()));
    }
    if payload.stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let category_id = payload.category_id.unwrap_or(existing.category_id);
    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description);
    let price = payload.price.unwrap_or(existing.price);
    let stock = payload.stock.unwrap_or(existing.stock);
    let low_stock_threshold = payload
        .low_stock_threshold
        .unwrap_or(existing.low_stock_threshold);
    let is_active = payload.is_active.unwrap_or(existing.is_active);
    let is_featured = payload.is_featured.unwrap_or(existing.is_featured);

    let product: Product = sqlx::query_as(
        r#"
        UPDATE products
        SET category_id = $2, name = $3, description = $4, price = $5, stock = $6,
            low_stock_threshold = $7, is_active = $8, is_featured = $9, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(category_id)
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(stock)
    .bind(low_stock_threshold)
    .bind(is_active)
    .bind(is_featured)
    .fetch_one(&state.pool)
    .await?;

    invalidate_product_caches(state).await;
    state.cache.delete(&keys::product_detail(id)).await;

    Ok(ApiResponse::success(
        "Updated",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    invalidate_product_caches(state).await;
    state.cache.delete(&keys::product_detail(id)).await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Product writes ripple into category counts, search results and stats.
async fn invalidate_product_caches(state: &AppState) {
    state.cache.invalidate_group("product").await;
    state.cache.invalidate_group("products").await;
    state.cache.invalidate_group("categories").await;
    state.cache.invalidate_group("category").await;
    state.cache.invalidate_group("search").await;
    state.cache.invalidate_group("stats").await;
}
