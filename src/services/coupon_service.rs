//! Coupon engine: eligibility checks, discount math, and commit-time
//! consumption.
//!
//! `validate` serves the pre-checkout UI; `apply` re-runs the same checks
//! inside the order transaction and then consumes the coupon. Keeping
//! both closes the race between quoting a discount and committing the
//! order.

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::coupons::{
        CouponList, CouponQuoteResponse, CreateCouponRequest, UpdateCouponRequest,
        ValidateCouponRequest,
    },
    entity::coupon_usages::{self, Column as UsageCol, Entity as CouponUsages},
    entity::coupons::{self, Column as CouponCol, Entity as Coupons, Model as CouponModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Coupon, DiscountType},
    response::{ApiResponse, Meta},
    routes::params::CouponListQuery,
    state::AppState,
};

/// A validated coupon and the discount it grants for a given cart total.
#[derive(Debug)]
pub struct CouponQuote {
    pub coupon: CouponModel,
    pub discount_amount: i64,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Percentage coupons take `cart_total * value / 100`, capped by
/// `max_discount_amount`; fixed coupons take `value`. Either way the
/// discount never exceeds the cart total.
pub fn compute_discount(
    discount_type: DiscountType,
    value: i64,
    max_discount_amount: Option<i64>,
    cart_total: i64,
) -> i64 {
    let raw = match discount_type {
        DiscountType::Percentage => {
            let discount = cart_total * value / 100;
            max_discount_amount.map_or(discount, |cap| discount.min(cap))
        }
        DiscountType::Fixed => value,
    };
    raw.clamp(0, cart_total)
}

/// Run the eligibility checks in order; the first failure wins.
/// Guests (`customer` = None) skip only the already-used check.
pub async fn validate<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    customer: Option<Uuid>,
    cart_total: i64,
) -> AppResult<CouponQuote> {
    let normalized = normalize_code(code);
    let coupon = Coupons::find()
        .filter(CouponCol::Code.eq(normalized))
        .filter(CouponCol::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(expires_at) = coupon.expires_at {
        if expires_at <= Utc::now() {
            return Err(AppError::BadRequest("Coupon has expired".to_string()));
        }
    }

    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(AppError::BadRequest(
                "Coupon usage limit reached".to_string(),
            ));
        }
    }

    if let Some(user_id) = customer {
        let used = CouponUsages::find()
            .filter(UsageCol::CouponId.eq(coupon.id))
            .filter(UsageCol::UserId.eq(user_id))
            .one(conn)
            .await?;
        if used.is_some() {
            return Err(AppError::BadRequest(
                "You have already used this coupon".to_string(),
            ));
        }
    }

    if let Some(min) = coupon.min_order_amount {
        if cart_total < min {
            return Err(AppError::BadRequest(format!(
                "Minimum order amount for this coupon is {min}"
            )));
        }
    }

    let discount_type = parse_discount_type(&coupon.discount_type)?;
    let discount_amount =
        compute_discount(discount_type, coupon.value, coupon.max_discount_amount, cart_total);

    Ok(CouponQuote {
        coupon,
        discount_amount,
    })
}

/// Consume the coupon inside the order transaction: re-validate, bump
/// `used_count` guarded by the limit in the UPDATE itself, and record the
/// per-customer usage. Conflicts surface as `CouponConflict` and roll the
/// whole order back.
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    customer: Option<Uuid>,
    order_id: Uuid,
    cart_total: i64,
) -> AppResult<CouponQuote> {
    let quote = validate(conn, code, customer, cart_total).await?;

    let res = Coupons::update_many()
        .col_expr(CouponCol::UsedCount, Expr::col(CouponCol::UsedCount).add(1))
        .filter(CouponCol::Id.eq(quote.coupon.id))
        .filter(
            Condition::any()
                .add(CouponCol::UsageLimit.is_null())
                .add(Expr::col(CouponCol::UsedCount).lt(Expr::col(CouponCol::UsageLimit))),
        )
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::CouponConflict(
            "Coupon usage limit reached".to_string(),
        ));
    }

    if let Some(user_id) = customer {
        let usage = coupon_usages::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(quote.coupon.id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            created_at: NotSet,
        };
        if let Err(err) = usage.insert(conn).await {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return Err(AppError::CouponConflict(
                    "You have already used this coupon".to_string(),
                ));
            }
            return Err(err.into());
        }
    }

    Ok(quote)
}

pub async fn validate_for_cart(
    state: &AppState,
    user: Option<&AuthUser>,
    payload: ValidateCouponRequest,
) -> AppResult<ApiResponse<CouponQuoteResponse>> {
    let quote = validate(
        &state.orm,
        &payload.code,
        user.map(|u| u.user_id),
        payload.cart_total,
    )
    .await?;

    let discount_type = parse_discount_type(&quote.coupon.discount_type)?;
    let data = CouponQuoteResponse {
        success: true,
        code: quote.coupon.code.clone(),
        discount_amount: quote.discount_amount,
        discount_type,
        value: quote.coupon.value,
    };
    Ok(ApiResponse::success("Coupon is valid", data, Some(Meta::empty())))
}

/// `available=true` lists coupons the caller could apply right now;
/// anything else is the full admin listing.
pub async fn list_coupons(
    state: &AppState,
    user: Option<&AuthUser>,
    query: CouponListQuery,
) -> AppResult<ApiResponse<CouponList>> {
    let available = query.available.unwrap_or(false);

    let coupons = if available {
        let now = Utc::now();
        let candidates = Coupons::find()
            .filter(CouponCol::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(CouponCol::ExpiresAt.is_null())
                    .add(CouponCol::ExpiresAt.gt(now)),
            )
            .filter(
                Condition::any()
                    .add(CouponCol::UsageLimit.is_null())
                    .add(Expr::col(CouponCol::UsedCount).lt(Expr::col(CouponCol::UsageLimit))),
            )
            .order_by_asc(CouponCol::Code)
            .all(&state.orm)
            .await?;

        match user {
            Some(caller) => {
                let used: Vec<Uuid> = CouponUsages::find()
                    .filter(UsageCol::UserId.eq(caller.user_id))
                    .all(&state.orm)
                    .await?
                    .into_iter()
                    .map(|usage| usage.coupon_id)
                    .collect();
                candidates
                    .into_iter()
                    .filter(|coupon| !used.contains(&coupon.id))
                    .collect()
            }
            None => candidates,
        }
    } else {
        let caller = user.ok_or(AppError::Unauthorized)?;
        ensure_admin(caller)?;
        Coupons::find()
            .order_by_asc(CouponCol::Code)
            .all(&state.orm)
            .await?
    };

    let items = coupons
        .into_iter()
        .map(coupon_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Coupons",
        CouponList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;

    let code = normalize_code(&payload.code);
    if code.is_empty() {
        return Err(AppError::BadRequest("Coupon code is required".to_string()));
    }
    if payload.value <= 0 {
        return Err(AppError::BadRequest(
            "Coupon value must be greater than 0".to_string(),
        ));
    }
    if payload.discount_type == DiscountType::Percentage && payload.value > 100 {
        return Err(AppError::BadRequest(
            "Percentage value cannot exceed 100".to_string(),
        ));
    }
    if payload.discount_type == DiscountType::Fixed && payload.max_discount_amount.is_some() {
        return Err(AppError::BadRequest(
            "max_discount_amount only applies to percentage coupons".to_string(),
        ));
    }
    if payload.usage_limit.is_some_and(|limit| limit <= 0) {
        return Err(AppError::BadRequest(
            "usage_limit must be greater than 0".to_string(),
        ));
    }

    let active = coupons::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        discount_type: Set(payload.discount_type.as_str().to_string()),
        value: Set(payload.value),
        min_order_amount: Set(payload.min_order_amount),
        max_discount_amount: Set(payload.max_discount_amount),
        is_active: Set(payload.is_active),
        expires_at: Set(payload.expires_at.map(Into::into)),
        usage_limit: Set(payload.usage_limit),
        used_count: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    };

    let coupon = match active.insert(&state.orm).await {
        Ok(model) => model,
        Err(err) => {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return Err(AppError::BadRequest(
                    "Coupon code already exists".to_string(),
                ));
            }
            return Err(err.into());
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_create",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon created",
        coupon_from_entity(coupon)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;

    let existing = Coupons::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.value.is_some_and(|value| value <= 0) {
        return Err(AppError::BadRequest(
            "Coupon value must be greater than 0".to_string(),
        ));
    }

    let mut active: coupons::ActiveModel = existing.into();
    if let Some(value) = payload.value {
        active.value = Set(value);
    }
    if let Some(min) = payload.min_order_amount {
        active.min_order_amount = Set(Some(min));
    }
    if let Some(cap) = payload.max_discount_amount {
        active.max_discount_amount = Set(Some(cap));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(expires_at) = payload.expires_at {
        active.expires_at = Set(Some(expires_at.into()));
    }
    if let Some(limit) = payload.usage_limit {
        active.usage_limit = Set(Some(limit));
    }
    active.updated_at = Set(Utc::now().into());
    let coupon = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_update",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon updated",
        coupon_from_entity(coupon)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let res = Coupons::delete_by_id(id).exec(&state.orm).await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_delete",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn parse_discount_type(value: &str) -> AppResult<DiscountType> {
    DiscountType::from_db(value)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown discount type {value}")))
}

fn coupon_from_entity(model: CouponModel) -> AppResult<Coupon> {
    let discount_type = parse_discount_type(&model.discount_type)?;
    Ok(Coupon {
        id: model.id,
        code: model.code,
        discount_type,
        value: model.value,
        min_order_amount: model.min_order_amount,
        max_discount_amount: model.max_discount_amount,
        is_active: model.is_active,
        expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
        usage_limit: model.usage_limit,
        used_count: model.used_count,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
