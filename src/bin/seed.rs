use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user").await?;
    seed_catalog(&pool).await?;
    seed_coupons(&pool).await?;
    seed_push_subscription(&pool, admin_id).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, role: &str) -> anyhow::Result<Uuid> {
    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        ("Trail Hoodie", "Fleece-lined hoodie", 550000, 50),
        ("Canvas Tote", "Everyday carry bag", 120000, 100),
        ("Enamel Mug", "Camp-style mug", 50000, 200),
        ("Wool Socks", "Midweight hiking socks", 80000, 75),
    ];

    for (name, desc, price, stock) in products {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .fetch_optional(pool)
        .await?;

        // Give the hoodie a couple of variants so variant-level stock is
        // exercised out of the box.
        if name == "Trail Hoodie" {
            if let Some((product_id,)) = row {
                for (color, size, price, stock) in [
                    ("black", "M", 550000i64, 20),
                    ("black", "L", 550000, 15),
                    ("forest", "M", 580000, 10),
                ] {
                    sqlx::query(
                        r#"
                        INSERT INTO product_variants (id, product_id, color, size, price, stock)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        ON CONFLICT (product_id, color, size) DO NOTHING
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(product_id)
                    .bind(color)
                    .bind(size)
                    .bind(price)
                    .bind(stock)
                    .execute(pool)
                    .await?;
                }
            }
        }
    }

    println!("Seeded catalog");
    Ok(())
}

async fn seed_coupons(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, discount_type, value, min_order_amount, max_discount_amount, usage_limit)
        VALUES ($1, 'WELCOME10', 'percentage', 10, 100000, 50000, NULL)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, discount_type, value, min_order_amount, usage_limit)
        VALUES ($1, 'FLAT500', 'fixed', 50000, 200000, 100)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .execute(pool)
    .await?;

    println!("Seeded coupons");
    Ok(())
}

async fn seed_push_subscription(pool: &sqlx::PgPool, admin_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO push_subscriptions (id, user_id, endpoint)
        VALUES ($1, $2, 'https://push.example.com/admin-console')
        ON CONFLICT (user_id, endpoint) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .execute(pool)
    .await?;

    println!("Seeded admin push subscription");
    Ok(())
}
