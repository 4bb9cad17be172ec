//! Order service: the entry point for every customer-facing order
//! mutation.
//!
//! Creation runs reserve → insert → coupon apply → cart clear inside one
//! transaction, so a failure at any step leaves no visible effect.
//! Cancellation and return requests take the order row FOR UPDATE and
//! check the lifecycle state machine before writing, which is also what
//! keeps stock release at exactly-once.

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CancelOrderRequest, OrderList, OrderWithItems, PlaceOrderRequest, RequestedItem,
        ReturnOrderRequest,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{self, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{self, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    lifecycle::OrderStatus,
    middleware::auth::AuthUser,
    models::{Order, OrderItem, PaymentMethod, ShippingAddress},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        coupon_service,
        inventory::{self, StockLine, VariantKey},
        notification_service,
    },
    state::AppState,
};

/// A line item priced and named at order time.
struct ResolvedLine {
    product_id: Uuid,
    product_name: String,
    variant: Option<VariantKey>,
    quantity: i32,
    price: i64,
}

pub async fn place_order(
    state: &AppState,
    user: Option<&AuthUser>,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let customer = user.map(|u| u.user_id);
    let txn = state.orm.begin().await?;

    // Authenticated callers order their stored cart at live catalog
    // prices; guests bring their own items and prices.
    let lines = match user {
        Some(caller) => resolve_cart_lines(&txn, caller.user_id).await?,
        None => resolve_guest_lines(&txn, payload.items.as_deref().unwrap_or(&[])).await?,
    };
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let subtotal: i64 = lines
        .iter()
        .map(|line| line.price * line.quantity as i64)
        .sum();

    let quoted = match payload.coupon.as_deref() {
        Some(code) => Some(coupon_service::validate(&txn, code, customer, subtotal).await?),
        None => None,
    };
    let discount_amount = quoted.as_ref().map_or(0, |quote| quote.discount_amount);
    let total_amount = (subtotal - discount_amount).max(0);

    let stock_lines: Vec<StockLine> = lines
        .iter()
        .map(|line| StockLine {
            product_id: line.product_id,
            variant: line.variant.clone(),
            quantity: line.quantity,
        })
        .collect();
    inventory::reserve(&txn, &stock_lines).await?;

    let (status, payment_status, paid_at) = match payload.payment_method {
        PaymentMethod::Cod => (OrderStatus::Pending, "unpaid", None),
        PaymentMethod::Online => (OrderStatus::Paid, "paid", Some(Utc::now())),
    };

    let order_id = Uuid::new_v4();
    let shipping_address = serde_json::to_value(&payload.shipping_address)
        .map_err(|err| AppError::Internal(err.into()))?;

    let order = orders::ActiveModel {
        id: Set(order_id),
        user_id: Set(customer),
        subtotal: Set(subtotal),
        discount_amount: Set(discount_amount),
        total_amount: Set(total_amount),
        coupon_code: Set(quoted.as_ref().map(|quote| quote.coupon.code.clone())),
        status: Set(status.as_str().to_string()),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        payment_status: Set(payment_status.to_string()),
        shipping_address: Set(shipping_address),
        invoice_number: Set(build_invoice_number(order_id)),
        cancellation_reason: Set(None),
        return_reason: Set(None),
        admin_note: Set(None),
        paid_at: Set(paid_at.map(Into::into)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = order_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            variant_color: Set(line.variant.as_ref().map(|key| key.color.clone())),
            variant_size: Set(line.variant.as_ref().map(|key| key.size.clone())),
            quantity: Set(line.quantity),
            price: Set(line.price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    // Consume the coupon only after the order row exists; the usage
    // record references it. A conflict here rolls back the reservation.
    if let Some(code) = payload.coupon.as_deref() {
        coupon_service::apply(&txn, code, customer, order.id, subtotal).await?;
    }

    if let Some(caller) = user {
        CartItems::delete_many()
            .filter(CartCol::UserId.eq(caller.user_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        customer,
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": order.total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let message = format!(
        "Order {} placed for {}",
        order.invoice_number, order.total_amount
    );
    if let Err(err) = notification_service::notify_admins(
        state,
        "order_created",
        "New order received",
        &message,
        Some(format!("/admin/orders/{}", order.id)),
    )
    .await
    {
        tracing::warn!(error = %err, "admin notification failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(OrderCol::Id.eq(id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.user_id != Some(user.user_id) {
        return Err(AppError::Forbidden);
    }
    let status = parse_status(&order.status)?;
    if !status.can_cancel() {
        return Err(AppError::InvalidTransition(
            "Order cannot be cancelled at this stage".to_string(),
        ));
    }

    let item_models = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    let stock_lines: Vec<StockLine> = item_models.iter().map(stock_line_from_item).collect();

    let mut active: orders::ActiveModel = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().to_string());
    active.cancellation_reason = Set(Some(payload.reason.clone()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    // The status guard above makes this the only release for this order.
    inventory::release(&txn, &stock_lines).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "reason": payload.reason })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let message = format!(
        "Order {} was cancelled by the customer: {}",
        order.invoice_number, payload.reason
    );
    if let Err(err) = notification_service::notify_admins(
        state,
        "order_cancelled",
        "Order cancelled",
        &message,
        Some(format!("/admin/orders/{}", order.id)),
    )
    .await
    {
        tracing::warn!(error = %err, "admin notification failed");
    }

    let items = item_models.into_iter().map(order_item_from_entity).collect();
    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn request_return(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ReturnOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.reason.trim().is_empty() {
        return Err(AppError::BadRequest("Return reason is required".to_string()));
    }

    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(OrderCol::Id.eq(id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_owner = order.user_id == Some(user.user_id);
    if !is_owner && user.role != "admin" {
        return Err(AppError::Forbidden);
    }
    let status = parse_status(&order.status)?;
    if !status.can_request_return() {
        return Err(AppError::InvalidTransition(
            "Only delivered orders can be returned".to_string(),
        ));
    }

    // No stock movement here; the physical return is inspected by a
    // back-office flow before counters change.
    let mut active: orders::ActiveModel = order.into();
    active.status = Set(OrderStatus::ReturnRequested.as_str().to_string());
    active.return_reason = Set(Some(payload.reason.clone()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_return_request",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "reason": payload.reason })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let message = format!(
        "Return requested for order {}: {}",
        order.invoice_number, payload.reason
    );
    if let Err(err) = notification_service::notify_admins(
        state,
        "return_requested",
        "Return requested",
        &message,
        Some(format!("/admin/orders/{}", order.id)),
    )
    .await
    {
        tracing::warn!(error = %err, "admin notification failed");
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Return requested",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<Order>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

async fn resolve_cart_lines(
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> AppResult<Vec<ResolvedLine>> {
    let rows = CartItems::find()
        .filter(CartCol::UserId.eq(user_id))
        .all(txn)
        .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        if row.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".to_string()));
        }
        let product = Products::find_by_id(row.product_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Product {} not found", row.product_id))
            })?;

        let (variant, price) = match (row.variant_color, row.variant_size) {
            (Some(color), Some(size)) => {
                let variant = ProductVariants::find()
                    .filter(VariantCol::ProductId.eq(product.id))
                    .filter(VariantCol::Color.eq(color.clone()))
                    .filter(VariantCol::Size.eq(size.clone()))
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        AppError::BadRequest(format!(
                            "No {} / {} variant for product {}",
                            color, size, product.id
                        ))
                    })?;
                (Some(VariantKey { color, size }), variant.price)
            }
            (None, None) => (None, product.price),
            _ => {
                return Err(AppError::BadRequest(
                    "Cart item variant requires both color and size".to_string(),
                ));
            }
        };

        lines.push(ResolvedLine {
            product_id: product.id,
            product_name: product.name,
            variant,
            quantity: row.quantity,
            price,
        });
    }
    Ok(lines)
}

async fn resolve_guest_lines(
    txn: &DatabaseTransaction,
    items: &[RequestedItem],
) -> AppResult<Vec<ResolvedLine>> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
        if item.price < 0 {
            return Err(AppError::BadRequest("price cannot be negative".to_string()));
        }
        let product = Products::find_by_id(item.product_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Product {} not found", item.product_id))
            })?;

        let variant = match (item.color.clone(), item.size.clone()) {
            (Some(color), Some(size)) => Some(VariantKey { color, size }),
            (None, None) => None,
            _ => {
                return Err(AppError::BadRequest(
                    "Item variant requires both color and size".to_string(),
                ));
            }
        };

        lines.push(ResolvedLine {
            product_id: product.id,
            product_name: product.name,
            variant,
            quantity: item.quantity,
            price: item.price,
        });
    }
    Ok(lines)
}

fn stock_line_from_item(item: &OrderItemModel) -> StockLine {
    let variant = match (&item.variant_color, &item.variant_size) {
        (Some(color), Some(size)) => Some(VariantKey {
            color: color.clone(),
            size: size.clone(),
        }),
        _ => None,
    };
    StockLine {
        product_id: item.product_id,
        variant,
        quantity: item.quantity,
    }
}

fn parse_status(value: &str) -> AppResult<OrderStatus> {
    OrderStatus::from_db(value)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status {value}")))
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let status = parse_status(&model.status)?;
    let payment_method = PaymentMethod::from_db(&model.payment_method).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unknown payment method {}",
            model.payment_method
        ))
    })?;
    let shipping_address: ShippingAddress = serde_json::from_value(model.shipping_address)
        .map_err(|err| AppError::Internal(err.into()))?;

    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        total_amount: model.total_amount,
        coupon_code: model.coupon_code,
        status,
        payment_method,
        payment_status: model.payment_status,
        shipping_address,
        invoice_number: model.invoice_number,
        cancellation_reason: model.cancellation_reason,
        return_reason: model.return_reason,
        admin_note: model.admin_note,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: model.product_name,
        variant_color: model.variant_color,
        variant_size: model.variant_size,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("INV-{}-{}", date, short)
}
