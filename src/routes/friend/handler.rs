use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::{
        notification::{CreateNotificationRequest, Notification, NotificationType},
        user::User,
    },
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{
    CreateFriendshipRequest, Friendship, FriendshipStatus, StatusQuery, UpdateFriendshipRequest,
};

/// 只有好友关系的双方可以操作
async fn find_involving(state: &AppState, claims: &Claims, friendship_id: &str) -> AppResult<Friendship> {
    let friendship = Friendship::find_by_id(&state.pool, friendship_id)
        .await?
        .ok_or_else(|| AppError::NotFound("好友关系不存在".into()))?;

    if !friendship.involves(&claims.sub) {
        return Err(AppError::Forbidden("无权操作该好友关系".into()));
    }
    Ok(friendship)
}

#[axum::debug_handler]
pub async fn send_request(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateFriendshipRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Friendship>>)> {
    let sender = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    if User::find_by_id(&state.pool, &req.receiver_id).await?.is_none() {
        return Err(AppError::NotFound("对方用户不存在".into()));
    }

    let friendship = Friendship::create(&state.pool, &sender.id, &req.receiver_id).await?;

    Notification::dispatch(
        &state.pool,
        CreateNotificationRequest {
            sender_id: Some(sender.id.clone()),
            friendship_id: Some(friendship.id.clone()),
            ..CreateNotificationRequest::new(
                &friendship.receiver_id,
                NotificationType::FriendRequest,
                format!("{} sent you a friend request", sender.username),
            )
        },
    )
    .await;

    Ok((StatusCode::CREATED, success_to_api_response(friendship)))
}

#[axum::debug_handler]
pub async fn list_friends(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let friends = Friendship::list_friends(&state.pool, &claims.sub, query.status).await?;
    Ok(success_to_api_response(friends))
}

#[axum::debug_handler]
pub async fn list_requests(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<ApiResponse<Vec<Friendship>>>> {
    let friendships = Friendship::list_for_user(&state.pool, &claims.sub, query.status).await?;
    Ok(success_to_api_response(friendships))
}

#[axum::debug_handler]
pub async fn get_between(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<Friendship>>> {
    let friendship = Friendship::find_between(&state.pool, &claims.sub, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("好友关系不存在".into()))?;
    Ok(success_to_api_response(friendship))
}

#[axum::debug_handler]
pub async fn update_status(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(friendship_id): Path<String>,
    Json(req): Json<UpdateFriendshipRequest>,
) -> AppResult<Json<ApiResponse<Friendship>>> {
    let current = find_involving(&state, &claims, &friendship_id).await?;

    // 接受或拒绝只能由接收方操作
    if matches!(req.status, FriendshipStatus::Accepted | FriendshipStatus::Rejected)
        && current.receiver_id != claims.sub
    {
        return Err(AppError::Forbidden("只有接收方可以处理好友请求".into()));
    }

    let friendship = Friendship::update_status(&state.pool, &friendship_id, req.status)
        .await?
        .ok_or_else(|| AppError::NotFound("好友关系不存在".into()))?;

    // 接受请求后通知发起方
    if req.status == FriendshipStatus::Accepted && current.status != FriendshipStatus::Accepted {
        Notification::dispatch(
            &state.pool,
            CreateNotificationRequest {
                sender_id: Some(claims.sub.clone()),
                friendship_id: Some(friendship.id.clone()),
                ..CreateNotificationRequest::new(
                    &friendship.sender_id,
                    NotificationType::FriendAccepted,
                    "Your friend request was accepted".into(),
                )
            },
        )
        .await;
    }

    Ok(success_to_api_response(friendship))
}

#[axum::debug_handler]
pub async fn delete_friendship(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(friendship_id): Path<String>,
) -> AppResult<Json<ApiResponse<bool>>> {
    find_involving(&state, &claims, &friendship_id).await?;

    if !Friendship::delete(&state.pool, &friendship_id).await? {
        return Err(AppError::NotFound("好友关系不存在".into()));
    }
    Ok(success_to_api_response(true))
}
