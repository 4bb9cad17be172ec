mod common;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serial_test::serial;
use std::sync::Arc;

use common::{
    FailingPush, RecordingPush, create_product, create_user, create_variant, product_stock,
    setup_state, subscribe_push, variant_stock,
};
use storefront_api::{
    dto::{
        cart::AddToCartRequest,
        orders::{CancelOrderRequest, PlaceOrderRequest, RequestedItem, ReturnOrderRequest},
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        notifications::{Column as NotifCol, Entity as Notifications},
        orders::{self, Entity as Orders},
    },
    error::AppError,
    lifecycle::OrderStatus,
    middleware::auth::AuthUser,
    models::{PaymentMethod, ShippingAddress},
    services::{cart_service, order_service},
};

fn ship_to() -> ShippingAddress {
    ShippingAddress {
        name: "Asha Rao".to_string(),
        phone: "+91-9000000000".to_string(),
        line1: "12 Lake View Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        postal_code: "560001".to_string(),
        country: "IN".to_string(),
    }
}

fn order_request(coupon: Option<&str>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: None,
        shipping_address: ship_to(),
        payment_method: PaymentMethod::Cod,
        coupon: coupon.map(String::from),
    }
}

// Checkout reserves both product- and variant-level stock; cancellation
// restores it exactly once.
#[tokio::test]
#[serial]
async fn checkout_reserves_stock_and_cancel_restores_it() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let push = RecordingPush::new();
    let state = setup_state(&url, push.clone()).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    subscribe_push(&state, admin_id, "https://push.example.com/admin").await?;

    let product = create_product(&state, "Trail Hoodie", 1000, 10).await?;
    let variant = create_variant(&state, product.id, "black", "M", 1200, 5).await?;

    let auth = AuthUser {
        user_id,
        role: "user".to_string(),
    };

    cart_service::add_to_cart(
        &state.pool,
        &auth,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
            color: None,
            size: None,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state.pool,
        &auth,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
            color: Some("black".to_string()),
            size: Some("M".to_string()),
        },
    )
    .await?;

    let placed = order_service::place_order(&state, Some(&auth), order_request(None)).await?;
    let order = placed.data.expect("order payload").order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, "unpaid");
    assert_eq!(order.subtotal, 2 * 1000 + 1200);
    assert_eq!(order.total_amount, order.subtotal);

    assert_eq!(product_stock(&state, product.id).await?, 8);
    assert_eq!(variant_stock(&state, variant.id).await?, 4);

    let cart_left = CartItems::find()
        .filter(CartCol::UserId.eq(user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(cart_left, 0, "checkout should clear the stored cart");

    assert!(
        !push.sent.lock().expect("push log").is_empty(),
        "admin endpoint should receive the order-created push"
    );

    let cancelled = order_service::cancel_order(
        &state,
        &auth,
        order.id,
        CancelOrderRequest {
            reason: "changed my mind".to_string(),
        },
    )
    .await?;
    let cancelled = cancelled.data.expect("order payload").order;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(
        cancelled.cancellation_reason.as_deref(),
        Some("changed my mind")
    );

    // Round trip: reserve then release is a no-op on the counters.
    assert_eq!(product_stock(&state, product.id).await?, 10);
    assert_eq!(variant_stock(&state, variant.id).await?, 5);

    // A second cancel fails at the status guard and must not touch stock.
    let err = order_service::cancel_order(
        &state,
        &auth,
        order.id,
        CancelOrderRequest {
            reason: "again".to_string(),
        },
    )
    .await
    .expect_err("second cancel must be rejected");
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(product_stock(&state, product.id).await?, 10);
    assert_eq!(variant_stock(&state, variant.id).await?, 5);

    let admin_feed = Notifications::find()
        .filter(NotifCol::RecipientId.is_null())
        .count(&state.orm)
        .await?;
    assert!(
        admin_feed >= 2,
        "order creation and cancellation should both notify admins"
    );

    Ok(())
}

#[tokio::test]
#[serial]
async fn cancel_requires_ownership() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let state = setup_state(&url, RecordingPush::new()).await?;

    let owner_id = create_user(&state, "user", "owner@example.com").await?;
    let other_id = create_user(&state, "user", "other@example.com").await?;
    let product = create_product(&state, "Enamel Mug", 500, 10).await?;

    let owner = AuthUser {
        user_id: owner_id,
        role: "user".to_string(),
    };
    cart_service::add_to_cart(
        &state.pool,
        &owner,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
            color: None,
            size: None,
        },
    )
    .await?;
    let placed = order_service::place_order(&state, Some(&owner), order_request(None)).await?;
    let order = placed.data.expect("order payload").order;

    let other = AuthUser {
        user_id: other_id,
        role: "user".to_string(),
    };
    let err = order_service::cancel_order(
        &state,
        &other,
        order.id,
        CancelOrderRequest {
            reason: "not mine".to_string(),
        },
    )
    .await
    .expect_err("non-owner cancel must be rejected");
    assert!(matches!(err, AppError::Forbidden));
    assert_eq!(product_stock(&state, product.id).await?, 9);

    Ok(())
}

// A failed reservation leaves nothing behind: no order row, no counter
// movement.
#[tokio::test]
#[serial]
async fn insufficient_stock_aborts_without_side_effects() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let state = setup_state(&url, RecordingPush::new()).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let product = create_product(&state, "Wool Socks", 800, 1).await?;

    let auth = AuthUser {
        user_id,
        role: "user".to_string(),
    };
    cart_service::add_to_cart(
        &state.pool,
        &auth,
        AddToCartRequest {
            product_id: product.id,
            quantity: 5,
            color: None,
            size: None,
        },
    )
    .await?;

    let err = order_service::place_order(&state, Some(&auth), order_request(None))
        .await
        .expect_err("reservation must fail");
    assert!(matches!(err, AppError::InsufficientStock(_)));

    assert_eq!(product_stock(&state, product.id).await?, 1);
    assert_eq!(Orders::find().count(&state.orm).await?, 0);

    Ok(())
}

// A variant descriptor that matches nothing fails the order rather than
// falling back to the product counter.
#[tokio::test]
#[serial]
async fn unknown_variant_never_touches_product_stock() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let state = setup_state(&url, RecordingPush::new()).await?;

    let product = create_product(&state, "Trail Hoodie", 1000, 10).await?;
    create_variant(&state, product.id, "black", "M", 1200, 5).await?;

    let request = PlaceOrderRequest {
        items: Some(vec![RequestedItem {
            product_id: product.id,
            quantity: 1,
            color: Some("purple".to_string()),
            size: Some("XL".to_string()),
            price: 1200,
        }]),
        shipping_address: ship_to(),
        payment_method: PaymentMethod::Cod,
        coupon: None,
    };
    let err = order_service::place_order(&state, None, request)
        .await
        .expect_err("missing variant must fail the order");
    assert!(matches!(err, AppError::BadRequest(_)));

    assert_eq!(product_stock(&state, product.id).await?, 10);
    assert_eq!(Orders::find().count(&state.orm).await?, 0);

    Ok(())
}

#[tokio::test]
#[serial]
async fn guest_checkout_uses_caller_items() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let state = setup_state(&url, RecordingPush::new()).await?;

    let product = create_product(&state, "Canvas Tote", 700, 10).await?;

    let request = PlaceOrderRequest {
        items: Some(vec![RequestedItem {
            product_id: product.id,
            quantity: 3,
            color: None,
            size: None,
            price: 650,
        }]),
        shipping_address: ship_to(),
        payment_method: PaymentMethod::Online,
        coupon: None,
    };
    let placed = order_service::place_order(&state, None, request).await?;
    let payload = placed.data.expect("order payload");

    assert_eq!(payload.order.user_id, None);
    // Total is recomputed server-side from the caller's unit prices.
    assert_eq!(payload.order.subtotal, 3 * 650);
    assert_eq!(payload.order.status, OrderStatus::Paid);
    assert_eq!(payload.order.payment_status, "paid");
    assert!(payload.order.paid_at.is_some());
    assert_eq!(product_stock(&state, product.id).await?, 7);

    Ok(())
}

#[tokio::test]
#[serial]
async fn return_request_flags_order_without_stock_movement() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let state = setup_state(&url, RecordingPush::new()).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let product = create_product(&state, "Trail Hoodie", 1000, 10).await?;

    let auth = AuthUser {
        user_id,
        role: "user".to_string(),
    };
    cart_service::add_to_cart(
        &state.pool,
        &auth,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
            color: None,
            size: None,
        },
    )
    .await?;
    let placed = order_service::place_order(&state, Some(&auth), order_request(None)).await?;
    let order = placed.data.expect("order payload").order;

    let err = order_service::request_return(
        &state,
        &auth,
        order.id,
        ReturnOrderRequest {
            reason: "   ".to_string(),
        },
    )
    .await
    .expect_err("blank reason must be rejected");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = order_service::request_return(
        &state,
        &auth,
        order.id,
        ReturnOrderRequest {
            reason: "wrong size".to_string(),
        },
    )
    .await
    .expect_err("return before delivery must be rejected");
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let delivered = Orders::find_by_id(order.id)
        .one(&state.orm)
        .await?
        .expect("order exists");
    let mut active: orders::ActiveModel = delivered.into();
    active.status = Set("delivered".to_string());
    active.update(&state.orm).await?;

    let returned = order_service::request_return(
        &state,
        &auth,
        order.id,
        ReturnOrderRequest {
            reason: "wrong size".to_string(),
        },
    )
    .await?;
    let returned = returned.data.expect("order payload").order;
    assert_eq!(returned.status, OrderStatus::ReturnRequested);
    assert_eq!(returned.return_reason.as_deref(), Some("wrong size"));

    // The reservation stays in place until the back office resolves the
    // return.
    assert_eq!(product_stock(&state, product.id).await?, 8);

    Ok(())
}

// Push delivery is best-effort; a dead endpoint never fails the mutation.
#[tokio::test]
#[serial]
async fn push_failures_are_swallowed() -> anyhow::Result<()> {
    let Some(url) = common::test_database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return Ok(());
    };
    let state = setup_state(&url, Arc::new(FailingPush)).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    subscribe_push(&state, admin_id, "https://push.example.com/dead").await?;
    let product = create_product(&state, "Enamel Mug", 500, 10).await?;

    let auth = AuthUser {
        user_id,
        role: "user".to_string(),
    };
    cart_service::add_to_cart(
        &state.pool,
        &auth,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
            color: None,
            size: None,
        },
    )
    .await?;

    let placed = order_service::place_order(&state, Some(&auth), order_request(None)).await?;
    let order = placed.data.expect("order payload").order;
    order_service::cancel_order(
        &state,
        &auth,
        order.id,
        CancelOrderRequest {
            reason: "no longer needed".to_string(),
        },
    )
    .await?;

    // The durable record still exists even though every push failed.
    let admin_feed = Notifications::find()
        .filter(NotifCol::RecipientId.is_null())
        .count(&state.orm)
        .await?;
    assert!(admin_feed >= 2);

    Ok(())
}
