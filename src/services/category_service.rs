use uuid::Uuid;

use crate::{
    cache::{CacheTier, keys},
    dto::categories::{
        CategoryList, CategoryWithCount, CreateCategoryRequest, UpdateCategoryRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, slugify},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let cache_key = keys::category_list();
    if let Some(cached) = state.cache.get::<CategoryList>(&cache_key).await {
        return Ok(ApiResponse::success("Categories", cached, None));
    }

    let items: Vec<CategoryWithCount> = sqlx::query_as(
        r#"
        SELECT c.*,
               (SELECT count(*) FROM products p
                WHERE p.category_id = c.id AND p.is_active) AS products_count
        FROM categories c
        WHERE c.is_active
        ORDER BY c.name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let data = CategoryList { items };
    state.cache.set(&cache_key, &data, CacheTier::Long).await;
    Ok(ApiResponse::success("Categories", data, None))
}

pub async fn get_category(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<CategoryWithCount>> {
    let category: Option<CategoryWithCount> = sqlx::query_as(
        r#"
        SELECT c.*,
               (SELECT count(*) FROM products p
                WHERE p.category_id = c.id AND p.is_active) AS products_count
        FROM categories c
        WHERE c.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let category = match category {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Category", category, None))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let slug = payload
        .slug
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&payload.name));

    let exist: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM categories WHERE name = $1 OR slug = $2")
            .bind(&payload.name)
            .bind(&slug)
            .fetch_optional(&state.pool)
            .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Category already exists".into()));
    }

    let category: Category = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, slug, description)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.name)
    .bind(&slug)
    .bind(&payload.description)
    .fetch_one(&state.pool)
    .await?;

    invalidate_category_caches(state).await;
    Ok(ApiResponse::success(
        "Category created",
        category,
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing: Option<Category> = sqlx::query_as("SELECT * FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description);
    let is_active = payload.is_active.unwrap_or(existing.is_active);

    let category: Category = sqlx::query_as(
        r#"
        UPDATE categories
        SET name = $2, description = $3, is_active = $4, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(is_active)
    .fetch_one(&state.pool)
    .await?;

    invalidate_category_caches(state).await;
    Ok(ApiResponse::success(
        "Category updated",
        category,
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let in_use: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM products WHERE category_id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    if in_use.is_some() {
        return Err(AppError::BadRequest(
            "Category still has products".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    invalidate_category_caches(state).await;
    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Category writes also invalidate product listings: counts and category
/// names are embedded there.
async fn invalidate_category_caches(state: &AppState) {
    state.cache.invalidate_group("category").await;
    state.cache.invalidate_group("categories").await;
    state.cache.invalidate_group("product").await;
    state.cache.invalidate_group("products").await;
}
