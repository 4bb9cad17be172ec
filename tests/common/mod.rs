#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use serde_json::Value;
use uuid::Uuid;

use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    entity::{coupons, product_variants, products, push_subscriptions, users},
    push::PushTransport,
    state::AppState,
};

/// Integration tests need a real Postgres; skip when none is configured.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

/// Push transport that records every delivery attempt.
pub struct RecordingPush {
    pub sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn push(&self, endpoint: &str, payload: &Value) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("push log poisoned")
            .push((endpoint.to_string(), payload.clone()));
        Ok(())
    }
}

/// Push transport whose every delivery fails.
pub struct FailingPush;

#[async_trait]
impl PushTransport for FailingPush {
    async fn push(&self, _endpoint: &str, _payload: &Value) -> anyhow::Result<()> {
        anyhow::bail!("endpoint unreachable")
    }
}

pub async fn setup_state(
    database_url: &str,
    push: Arc<dyn PushTransport>,
) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE coupon_usages, coupons, notifications, push_subscriptions, order_items, \
         orders, cart_items, product_variants, products, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState::new(pool, orm, push))
}

pub async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(user.id)
}

pub async fn create_product(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<products::Model> {
    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

pub async fn create_variant(
    state: &AppState,
    product_id: Uuid,
    color: &str,
    size: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<product_variants::Model> {
    let variant = product_variants::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        color: Set(color.to_string()),
        size: Set(size.to_string()),
        price: Set(price),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(variant)
}

pub async fn create_coupon(
    state: &AppState,
    code: &str,
    discount_type: &str,
    value: i64,
    min_order_amount: Option<i64>,
    max_discount_amount: Option<i64>,
    usage_limit: Option<i32>,
) -> anyhow::Result<coupons::Model> {
    let coupon = coupons::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        discount_type: Set(discount_type.to_string()),
        value: Set(value),
        min_order_amount: Set(min_order_amount),
        max_discount_amount: Set(max_discount_amount),
        is_active: Set(true),
        expires_at: Set(None),
        usage_limit: Set(usage_limit),
        used_count: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(coupon)
}

pub async fn subscribe_push(
    state: &AppState,
    user_id: Uuid,
    endpoint: &str,
) -> anyhow::Result<()> {
    push_subscriptions::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        endpoint: Set(endpoint.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}

pub async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = products::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.stock)
}

pub async fn variant_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let variant = product_variants::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("variant exists");
    Ok(variant.stock)
}
