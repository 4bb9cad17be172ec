use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::coupons::{
        CouponList, CouponQuoteResponse, CreateCouponRequest, UpdateCouponRequest,
        ValidateCouponRequest,
    },
    error::AppResult,
    middleware::auth::{AuthUser, OptionalAuthUser},
    models::Coupon,
    response::ApiResponse,
    routes::params::CouponListQuery,
    services::coupon_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/validate", post(validate_coupon))
        .route("/{id}", put(update_coupon).delete(delete_coupon))
}

#[utoipa::path(
    post,
    path = "/api/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is valid for the cart", body = ApiResponse<CouponQuoteResponse>),
        (status = 400, description = "Expired / limit reached / already used / below minimum"),
        (status = 404, description = "No such active coupon"),
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    user: OptionalAuthUser,
    Json(payload): Json<ValidateCouponRequest>,
) -> AppResult<Json<ApiResponse<CouponQuoteResponse>>> {
    let resp = coupon_service::validate_for_cart(&state, user.0.as_ref(), payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/coupons",
    params(
        ("available" = Option<bool>, Query, description = "true lists coupons the caller can apply; otherwise admin-only full listing")
    ),
    responses(
        (status = 200, description = "Coupons", body = ApiResponse<CouponList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    user: OptionalAuthUser,
    Query(query): Query<CouponListQuery>,
) -> AppResult<Json<ApiResponse<CouponList>>> {
    let resp = coupon_service::list_coupons(&state, user.0.as_ref(), query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = ApiResponse<Coupon>),
        (status = 400, description = "Duplicate code / validation failure"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCouponRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Coupon>>)> {
    let resp = coupon_service::create_coupon(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/coupons/{id}",
    params(
        ("id" = Uuid, Path, description = "Coupon ID")
    ),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = ApiResponse<Coupon>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponRequest>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let resp = coupon_service::update_coupon(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/coupons/{id}",
    params(
        ("id" = Uuid, Path, description = "Coupon ID")
    ),
    responses(
        (status = 200, description = "Coupon deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = coupon_service::delete_coupon(&state, &user, id).await?;
    Ok(Json(resp))
}
