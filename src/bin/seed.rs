use storefront_api::{
    config::AppConfig,
    db::create_pool,
    models::{build_sku, slugify},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123!", "admin").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user1234", "user").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(row.0)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = [
        ("Electronics", "Gadgets and accessories"),
        ("Apparel", "Clothing and wearables"),
        ("Books", "Print and digital reading"),
    ];

    let mut category_ids = Vec::new();
    for (name, desc) in categories {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO categories (id, name, slug, description)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO UPDATE SET description = EXCLUDED.description
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slugify(name))
        .bind(desc)
        .fetch_one(pool)
        .await?;
        category_ids.push((name, row.0));
    }

    let products = [
        ("Electronics", "Wireless Mouse", "Low-latency 2.4GHz mouse", 2999_i64, 120),
        ("Electronics", "USB-C Hub", "7-in-1 hub with HDMI", 4599, 60),
        ("Apparel", "Crab Hoodie", "Warm hoodie with a crab print", 5500, 40),
        ("Books", "Systems Programming", "From registers to runtimes", 3900, 80),
    ];

    for (category, name, desc, price, stock) in products {
        let category_id = category_ids
            .iter()
            .find(|(n, _)| *n == category)
            .map(|(_, id)| *id)
            .ok_or_else(|| anyhow::anyhow!("unknown category {category}"))?;

        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, slug, description, sku, price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id)
        .bind(name)
        .bind(slugify(name))
        .bind(desc)
        .bind(build_sku(category, name))
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
