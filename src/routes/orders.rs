use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CancelOrderRequest, OrderList, OrderWithItems, PlaceOrderRequest, ReturnOrderRequest,
    },
    error::AppResult,
    middleware::auth::{AuthUser, OptionalAuthUser},
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", put(cancel_order))
        .route("/{id}/return", put(request_return))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Empty cart / insufficient stock / invalid payload"),
        (status = 409, description = "Coupon conflict"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: OptionalAuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderWithItems>>)> {
    let resp = order_service::place_order(&state, user.0.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "List caller's orders", body = ApiResponse<OrderList>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Order cannot be cancelled at this stage"),
        (status = 403, description = "Not the order's owner"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::cancel_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/return",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = ReturnOrderRequest,
    responses(
        (status = 200, description = "Return requested", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Missing reason / order not delivered"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn request_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::request_return(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
