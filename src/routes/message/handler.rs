use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::{
        PageQuery,
        group::Group,
        notification::{CreateNotificationRequest, Notification, NotificationType},
        page,
        user::User,
    },
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{CreateMessageRequest, EditMessageRequest, Message, MessageWithAttachments};

async fn is_member(state: &AppState, group_id: &str, user_id: &str) -> AppResult<bool> {
    Ok(Group::find_member(&state.pool, group_id, user_id)
        .await?
        .is_some())
}

async fn find_message(state: &AppState, message_id: &str) -> AppResult<MessageWithAttachments> {
    Message::find_by_id(&state.pool, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("消息不存在".into()))
}

/// 接收者或群成员
async fn is_recipient(state: &AppState, message: &Message, user_id: &str) -> AppResult<bool> {
    match (&message.receiver_id, &message.group_id) {
        (Some(receiver_id), _) => Ok(receiver_id == user_id),
        (None, Some(group_id)) => is_member(state, group_id, user_id).await,
        (None, None) => Ok(false),
    }
}

/// 回复只能指向同一会话或同一群内的消息
async fn check_reply_target(
    state: &AppState,
    reply_to: &str,
    sender_id: &str,
    receiver_id: Option<&str>,
    group_id: Option<&str>,
) -> AppResult<()> {
    let target = find_message(state, reply_to).await?;
    if !target.message.in_thread(sender_id, receiver_id, group_id) {
        return Err(AppError::Validation("回复的消息不在当前会话中".into()));
    }
    Ok(())
}

fn require_sender(message: &Message, claims: &Claims) -> AppResult<()> {
    if message.sender_id != claims.sub {
        return Err(AppError::Forbidden("只能操作自己发送的消息".into()));
    }
    Ok(())
}

async fn fan_out(state: &AppState, sender: &User, message: &Message) -> AppResult<()> {
    let preview: String = message.content.chars().take(50).collect();

    if let Some(receiver_id) = &message.receiver_id {
        Notification::dispatch(
            &state.pool,
            CreateNotificationRequest {
                sender_id: Some(sender.id.clone()),
                message_id: Some(message.id.clone()),
                ..CreateNotificationRequest::new(
                    receiver_id,
                    NotificationType::Message,
                    format!("{}: {}", sender.username, preview),
                )
            },
        )
        .await;
    } else if let Some(group_id) = &message.group_id {
        for member in Group::list_members(&state.pool, group_id).await? {
            if member.user_id == sender.id {
                continue;
            }
            Notification::dispatch(
                &state.pool,
                CreateNotificationRequest {
                    sender_id: Some(sender.id.clone()),
                    group_id: Some(group_id.clone()),
                    message_id: Some(message.id.clone()),
                    ..CreateNotificationRequest::new(
                        &member.user_id,
                        NotificationType::GroupMessage,
                        format!("{}: {}", sender.username, preview),
                    )
                },
            )
            .await;
        }
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn send_message(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MessageWithAttachments>>)> {
    req.validate()?;

    let sender = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;

    if let Some(group_id) = &req.group_id {
        if Group::find_by_id(&state.pool, group_id).await?.is_none() {
            return Err(AppError::NotFound("群组不存在".into()));
        }
        if !is_member(&state, group_id, &sender.id).await? {
            return Err(AppError::Forbidden("不是群成员，无法发送消息".into()));
        }
    }
    if let Some(receiver_id) = &req.receiver_id {
        if User::find_by_id(&state.pool, receiver_id).await?.is_none() {
            return Err(AppError::NotFound("接收者不存在".into()));
        }
    }

    if let Some(reply_to) = &req.reply_to_message_id {
        check_reply_target(
            &state,
            reply_to,
            &sender.id,
            req.receiver_id.as_deref(),
            req.group_id.as_deref(),
        )
        .await?;
    }

    let created = Message::create(&state.pool, req, &sender.id).await?;

    if let Err(e) = fan_out(&state, &sender, &created.message).await {
        tracing::warn!("Failed to notify recipients of {}: {}", created.message.id, e);
    }

    Ok((StatusCode::CREATED, success_to_api_response(created)))
}

#[axum::debug_handler]
pub async fn get_message(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> AppResult<Json<ApiResponse<MessageWithAttachments>>> {
    let found = find_message(&state, &message_id).await?;

    if found.message.sender_id != claims.sub && !is_recipient(&state, &found.message, &claims.sub).await? {
        return Err(AppError::Forbidden("无权查看该消息".into()));
    }
    Ok(success_to_api_response(found))
}

#[axum::debug_handler]
pub async fn update_message(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Json(req): Json<EditMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    req.validate()?;
    let found = find_message(&state, &message_id).await?;
    require_sender(&found.message, &claims)?;

    if let Some(reply_to) = &req.reply_to_message_id {
        let message = &found.message;
        check_reply_target(
            &state,
            reply_to,
            &message.sender_id,
            message.receiver_id.as_deref(),
            message.group_id.as_deref(),
        )
        .await?;
    }

    let message = Message::update(&state.pool, &message_id, req.into())
        .await?
        .ok_or_else(|| AppError::NotFound("消息不存在".into()))?;
    Ok(success_to_api_response(message))
}

#[axum::debug_handler]
pub async fn delete_message(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> AppResult<Json<ApiResponse<bool>>> {
    let found = find_message(&state, &message_id).await?;
    require_sender(&found.message, &claims)?;

    Message::delete(&state.pool, &message_id).await?;
    Ok(success_to_api_response(true))
}

#[axum::debug_handler]
pub async fn mark_message_read(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let found = find_message(&state, &message_id).await?;
    if !is_recipient(&state, &found.message, &claims.sub).await? {
        return Err(AppError::Forbidden("只有接收者可以标记已读".into()));
    }

    let message = Message::mark_read(&state.pool, &message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("消息不存在".into()))?;
    Ok(success_to_api_response(message))
}

#[axum::debug_handler]
pub async fn list_conversation(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<Vec<MessageWithAttachments>>>> {
    let (skip, limit) = page(query.skip, query.limit);
    let messages = Message::list_conversation(&state.pool, &claims.sub, &user_id, skip, limit).await?;
    Ok(success_to_api_response(messages))
}

#[axum::debug_handler]
pub async fn list_group_messages(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<Vec<MessageWithAttachments>>>> {
    if Group::find_by_id(&state.pool, &group_id).await?.is_none() {
        return Err(AppError::NotFound("群组不存在".into()));
    }
    if !is_member(&state, &group_id, &claims.sub).await? {
        return Err(AppError::Forbidden("不是群成员，无法查看消息".into()));
    }

    let (skip, limit) = page(query.skip, query.limit);
    let messages = Message::list_group(&state.pool, &group_id, skip, limit).await?;
    Ok(success_to_api_response(messages))
}
