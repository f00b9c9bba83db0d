use axum::extract::{Extension, Json, Path, Query, State};

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::page,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{Notification, NotificationQuery};

/// 只允许操作自己的通知
async fn find_owned(state: &AppState, claims: &Claims, notification_id: &str) -> AppResult<Notification> {
    let notification = Notification::find_by_id(&state.pool, notification_id)
        .await?
        .ok_or_else(|| AppError::NotFound("通知不存在".into()))?;

    if notification.user_id != claims.sub {
        return Err(AppError::Forbidden("无权操作该通知".into()));
    }
    Ok(notification)
}

#[axum::debug_handler]
pub async fn list_notifications(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let (skip, limit) = page(query.skip, query.limit);
    let notifications =
        Notification::list_for_user(&state.pool, &claims.sub, query.is_read, skip, limit).await?;
    Ok(success_to_api_response(notifications))
}

#[axum::debug_handler]
pub async fn mark_notification_read(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    find_owned(&state, &claims, &notification_id).await?;

    let notification = Notification::mark_read(&state.pool, &notification_id)
        .await?
        .ok_or_else(|| AppError::NotFound("通知不存在".into()))?;
    Ok(success_to_api_response(notification))
}

#[axum::debug_handler]
pub async fn delete_notification(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> AppResult<Json<ApiResponse<bool>>> {
    find_owned(&state, &claims, &notification_id).await?;

    if !Notification::delete(&state.pool, &notification_id).await? {
        return Err(AppError::NotFound("通知不存在".into()));
    }
    Ok(success_to_api_response(true))
}
