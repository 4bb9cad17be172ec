use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::notifications::NotificationList,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Notification,
    response::ApiResponse,
    routes::params::Pagination,
    services::notification_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/{id}/read", put(mark_read))
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Notification feed for the caller", body = ApiResponse<NotificationList>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<NotificationList>>> {
    let resp = notification_service::list_notifications(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Marked read", body = ApiResponse<Notification>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let resp = notification_service::mark_read(&state, &user, id).await?;
    Ok(Json(resp))
}
