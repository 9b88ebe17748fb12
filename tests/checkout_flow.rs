use std::{sync::OnceLock, time::Duration};

use storefront_api::{
    cache::CacheManager,
    channels::{ChannelLayer, user_group},
    db::create_pool,
    dto::{
        cart::AddToCartRequest,
        orders::{BulkUpdateOrderStatusRequest, CheckoutRequest, UpdateOrderStatusRequest},
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::Product,
    routes::params::{LowStockQuery, Pagination},
    services::{admin_service, cart_service, order_service},
    state::AppState,
};
use uuid::Uuid;

// Both tests truncate the shared database; run them one at a time.
fn db_lock() -> &'static tokio::sync::Mutex<()> {
    static LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| tokio::sync::Mutex::new(()))
}

// Integration flow: user fills a cart and checks out; admin walks the order
// through its status machine and sees the product in the low-stock list.
#[tokio::test]
async fn checkout_and_admin_status_flow() -> anyhow::Result<()> {
    let _guard = db_lock().lock().await;
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    let product = create_product(&state, "Test Widget", 1000, 10).await?;

    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Listen for the order_created notification before checking out.
    let mut user_feed = state.channels.subscribe(&user_group(user_id)).await;

    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let checkout_resp = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            shipping_address_line1: "1 Main St".into(),
            shipping_address_line2: None,
            shipping_city: "Springfield".into(),
            shipping_state: "IL".into(),
            shipping_postal_code: "62701".into(),
            shipping_country: "USA".into(),
            notes: None,
        },
    )
    .await?;
    let placed = checkout_resp.data.expect("checkout payload");
    assert_eq!(placed.order.status, "pending");
    assert_eq!(placed.order.total_amount, 2000);
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].product_name, "Test Widget");
    assert_eq!(placed.status_history.len(), 1);
    assert_eq!(placed.status_history[0].old_status, None);
    assert_eq!(placed.status_history[0].new_status, "pending");

    // Stock was decremented and the cart cleared inside the transaction.
    let stocked: (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product.id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(stocked.0, 8);

    let cart = cart_service::get_cart(&state, &auth_user).await?;
    assert!(cart.data.expect("cart payload").items.is_empty());

    // The user group got the order_created push.
    let pushed = tokio::time::timeout(Duration::from_secs(1), user_feed.recv()).await??;
    assert!(pushed.contains("order_created"));
    assert!(pushed.contains(&placed.order.order_number));

    // Skipping straight to shipped is rejected.
    let skipped = admin_service::update_order_status(
        &state,
        &auth_admin,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
            notes: None,
        },
    )
    .await;
    assert!(matches!(skipped, Err(AppError::BadRequest(_))));

    // pending -> processing -> shipped walks the machine forward.
    for next in ["processing", "shipped"] {
        let updated = admin_service::update_order_status(
            &state,
            &auth_admin,
            placed.order.id,
            UpdateOrderStatusRequest {
                status: next.into(),
                notes: None,
            },
        )
        .await?;
        assert_eq!(updated.data.expect("order payload").status, next);
    }

    // A shipped order can no longer be cancelled by the customer.
    let cancelled = order_service::cancel_order(&state, &auth_user, placed.order.id).await;
    assert!(matches!(cancelled, Err(AppError::BadRequest(_))));

    // Every transition left a history row: pending, processing, shipped.
    let history: (i64,) =
        sqlx::query_as("SELECT count(*) FROM order_status_history WHERE order_id = $1")
            .bind(placed.order.id)
            .fetch_one(&state.pool)
            .await?;
    assert_eq!(history.0, 3);

    // Low stock should include the product after stock decreased to 8.
    let low = admin_service::list_low_stock(
        &state,
        &auth_admin,
        LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            threshold: Some(10),
        },
    )
    .await?;
    assert!(
        low.data
            .expect("low stock payload")
            .items
            .iter()
            .any(|p| p.id == product.id),
        "expected product to appear in low-stock list"
    );

    // A second order stays pending so the bulk change has a valid target.
    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await?;
    let second = order_service::checkout(&state, &auth_user, sample_checkout())
        .await?
        .data
        .expect("checkout payload");

    // Bulk change to processing: the shipped order and the unknown id are
    // reported as errors, the pending order goes through.
    let missing_id = Uuid::new_v4();
    let bulk = admin_service::bulk_update_order_status(
        &state,
        &auth_admin,
        BulkUpdateOrderStatusRequest {
            order_ids: vec![placed.order.id, second.order.id, missing_id],
            status: "processing".into(),
            notes: None,
        },
    )
    .await?
    .data
    .expect("bulk payload");
    assert_eq!(bulk.updated_orders, vec![second.order.id]);
    assert_eq!(bulk.total_updated, 1);
    assert_eq!(bulk.errors.len(), 2);
    assert!(bulk.errors.iter().any(|e| e.contains(&missing_id.to_string())));

    let note: (String,) = sqlx::query_as(
        "SELECT notes FROM order_status_history WHERE order_id = $1 AND new_status = 'processing'",
    )
    .bind(second.order.id)
    .fetch_one(&state.pool)
    .await?;
    assert_eq!(note.0, "Bulk status change from pending to processing");

    Ok(())
}

// Two checkouts of the same cart racing: the cart rows are locked, so one
// order is created and the loser sees an already-empty cart.
#[tokio::test]
async fn concurrent_checkout_creates_one_order() -> anyhow::Result<()> {
    let _guard = db_lock().lock().await;
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;
    let user_id = create_user(&state, "user", "racer@example.com").await?;
    let product = create_product(&state, "Race Widget", 500, 5).await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };

    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await?;

    let (a, b) = tokio::join!(
        order_service::checkout(&state, &auth_user, sample_checkout()),
        order_service::checkout(&state, &auth_user, sample_checkout()),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::BadRequest(_)))),
        "loser should fail on the emptied cart"
    );

    let orders: (i64,) = sqlx::query_as("SELECT count(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(orders.0, 1);

    let stocked: (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product.id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(stocked.0, 4);

    Ok(())
}

fn sample_checkout() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address_line1: "1 Main St".into(),
        shipping_address_line2: None,
        shipping_city: "Springfield".into(),
        shipping_state: "IL".into(),
        shipping_postal_code: "62701".into(),
        shipping_country: "USA".into(),
        notes: None,
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs.
    sqlx::query(
        "TRUNCATE TABLE order_status_history, order_items, orders, cart_items, carts, \
         product_images, products, categories, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    Ok(AppState::new(
        pool,
        CacheManager::disabled(),
        ChannelLayer::default(),
    ))
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, 'dummy', $3) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(role)
    .fetch_one(&state.pool)
    .await?;
    Ok(row.0)
}

async fn create_product(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Product> {
    let category_id: (Uuid,) = sqlx::query_as(
        "INSERT INTO categories (id, name, slug) VALUES ($1, 'Testing', 'testing') RETURNING id",
    )
    .bind(Uuid::new_v4())
    .fetch_one(&state.pool)
    .await?;

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products (id, category_id, name, slug, sku, price, stock)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(category_id.0)
    .bind(name)
    .bind("test-widget")
    .bind("TES-WIDGET")
    .bind(price)
    .bind(stock)
    .fetch_one(&state.pool)
    .await?;
    Ok(product)
}
