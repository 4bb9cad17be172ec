//! Notification dispatcher.
//!
//! The persisted row is the durable record; push delivery is a
//! best-effort side channel, so endpoint failures are logged and
//! swallowed.

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    dto::notifications::NotificationList,
    entity::notifications::{self, Column as NotifCol, Entity as Notifications, Model as NotificationModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Notification, Recipient},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn notify_admins(
    state: &AppState,
    kind: &str,
    title: &str,
    message: &str,
    link: Option<String>,
) -> AppResult<()> {
    dispatch(state, Recipient::Admin, kind, title, message, link).await
}

/// Single-recipient form, used by status-progression flows.
pub async fn notify_customer(
    state: &AppState,
    customer_id: Uuid,
    kind: &str,
    title: &str,
    message: &str,
    link: Option<String>,
) -> AppResult<()> {
    dispatch(state, Recipient::User(customer_id), kind, title, message, link).await
}

async fn dispatch(
    state: &AppState,
    recipient: Recipient,
    kind: &str,
    title: &str,
    message: &str,
    link: Option<String>,
) -> AppResult<()> {
    let notification = notifications::ActiveModel {
        id: Set(Uuid::new_v4()),
        recipient_id: Set(recipient.to_column()),
        kind: Set(kind.to_string()),
        title: Set(title.to_string()),
        message: Set(message.to_string()),
        link: Set(link.clone()),
        is_read: Set(false),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let endpoints: Vec<(String,)> = match recipient {
        Recipient::Admin => {
            sqlx::query_as(
                r#"
                SELECT ps.endpoint
                FROM push_subscriptions ps
                JOIN users u ON u.id = ps.user_id
                WHERE u.role = 'admin'
                "#,
            )
            .fetch_all(&state.pool)
            .await?
        }
        Recipient::User(user_id) => {
            sqlx::query_as("SELECT endpoint FROM push_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&state.pool)
                .await?
        }
    };

    let payload = serde_json::json!({
        "notification_id": notification.id,
        "kind": kind,
        "title": title,
        "message": message,
        "link": link,
    });
    for (endpoint,) in endpoints {
        if let Err(err) = state.push.push(&endpoint, &payload).await {
            tracing::warn!(error = %err, endpoint = %endpoint, "push delivery failed");
        }
    }

    Ok(())
}

/// Admins see the group feed alongside anything addressed to them;
/// customers only their own.
pub async fn list_notifications(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<NotificationList>> {
    let (page, limit, offset) = pagination.normalize();

    let mut condition = Condition::any().add(NotifCol::RecipientId.eq(user.user_id));
    if user.role == "admin" {
        condition = condition.add(NotifCol::RecipientId.is_null());
    }

    let finder = Notifications::find()
        .filter(condition)
        .order_by_desc(NotifCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(notification_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Notifications",
        NotificationList { items },
        Some(meta),
    ))
}

pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Notification>> {
    let notification = Notifications::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let visible = match notification.recipient_id {
        None => user.role == "admin",
        Some(recipient) => recipient == user.user_id,
    };
    if !visible {
        return Err(AppError::Forbidden);
    }

    let mut active: notifications::ActiveModel = notification.into();
    active.is_read = Set(true);
    let notification = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Notification read",
        notification_from_entity(notification),
        Some(Meta::empty()),
    ))
}

fn notification_from_entity(model: NotificationModel) -> Notification {
    Notification {
        id: model.id,
        recipient: Recipient::from_column(model.recipient_id),
        kind: model.kind,
        title: model.title,
        message: model.message,
        link: model.link,
        is_read: model.is_read,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
