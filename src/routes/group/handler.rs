use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::notification::{CreateNotificationRequest, Notification, NotificationType},
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{
    AddMemberRequest, CreateGroupRequest, Group, GroupMember, NameQuery, UpdateGroupRequest,
    UpdateMemberRequest,
};

async fn find_group(state: &AppState, group_id: &str) -> AppResult<Group> {
    Group::find_by_id(&state.pool, group_id)
        .await?
        .ok_or_else(|| AppError::NotFound("群组不存在".into()))
}

/// 群组修改类操作需要管理员身份
async fn require_admin(state: &AppState, group_id: &str, user_id: &str) -> AppResult<Group> {
    let group = find_group(state, group_id).await?;

    match Group::find_member(&state.pool, group_id, user_id).await? {
        Some(member) if member.is_admin => Ok(group),
        _ => Err(AppError::Forbidden("只有群管理员可以执行此操作".into())),
    }
}

/// 群主的管理员身份和成员资格只能由群主本人变更
fn protect_creator(group: &Group, target_id: &str, claims: &Claims) -> AppResult<()> {
    if target_id == group.creator_id && claims.sub != group.creator_id {
        return Err(AppError::Forbidden("不能变更群主的成员身份".into()));
    }
    Ok(())
}

async fn invite(state: &AppState, group: &Group, inviter_id: &str, user_id: &str) {
    Notification::dispatch(
        &state.pool,
        CreateNotificationRequest {
            sender_id: Some(inviter_id.to_string()),
            group_id: Some(group.id.clone()),
            ..CreateNotificationRequest::new(
                user_id,
                NotificationType::GroupInvitation,
                format!("You were added to group {}", group.name),
            )
        },
    )
    .await;
}

#[axum::debug_handler]
pub async fn create_group(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Group>>)> {
    req.validate()?;

    let group = Group::create(&state.pool, req, &claims.sub).await?;

    for member in Group::list_members(&state.pool, &group.id).await? {
        if member.user_id != claims.sub {
            invite(&state, &group, &claims.sub, &member.user_id).await;
        }
    }

    Ok((StatusCode::CREATED, success_to_api_response(group)))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> AppResult<Json<ApiResponse<Group>>> {
    let group = find_group(&state, &group_id).await?;
    Ok(success_to_api_response(group))
}

#[axum::debug_handler]
pub async fn find_by_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> AppResult<Json<ApiResponse<Group>>> {
    let group = Group::find_by_name(&state.pool, &query.name)
        .await?
        .ok_or_else(|| AppError::NotFound("群组不存在".into()))?;
    Ok(success_to_api_response(group))
}

#[axum::debug_handler]
pub async fn list_my_groups(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<Group>>>> {
    let groups = Group::list_for_user(&state.pool, &claims.sub).await?;
    Ok(success_to_api_response(groups))
}

#[axum::debug_handler]
pub async fn update_group(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<UpdateGroupRequest>,
) -> AppResult<Json<ApiResponse<Group>>> {
    req.validate()?;
    require_admin(&state, &group_id, &claims.sub).await?;

    let group = Group::update(&state.pool, &group_id, req).await?;
    Ok(success_to_api_response(group))
}

#[axum::debug_handler]
pub async fn delete_group(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> AppResult<Json<ApiResponse<bool>>> {
    let group = find_group(&state, &group_id).await?;
    if group.creator_id != claims.sub {
        return Err(AppError::Forbidden("只有群主可以解散群组".into()));
    }

    if !Group::delete(&state.pool, &group_id).await? {
        return Err(AppError::NotFound("群组不存在".into()));
    }
    Ok(success_to_api_response(true))
}

#[axum::debug_handler]
pub async fn list_members(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<GroupMember>>>> {
    find_group(&state, &group_id).await?;
    let members = Group::list_members(&state.pool, &group_id).await?;
    Ok(success_to_api_response(members))
}

#[axum::debug_handler]
pub async fn add_member(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<GroupMember>>)> {
    let group = require_admin(&state, &group_id, &claims.sub).await?;

    let member = Group::add_member(&state.pool, &group_id, &req.user_id, req.is_admin).await?;
    invite(&state, &group, &claims.sub, &member.user_id).await;

    Ok((StatusCode::CREATED, success_to_api_response(member)))
}

#[axum::debug_handler]
pub async fn update_member(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(String, String)>,
    Json(req): Json<UpdateMemberRequest>,
) -> AppResult<Json<ApiResponse<GroupMember>>> {
    let group = require_admin(&state, &group_id, &claims.sub).await?;
    protect_creator(&group, &user_id, &claims)?;

    let member = Group::set_member_admin(&state.pool, &group_id, &user_id, req.is_admin).await?;
    Ok(success_to_api_response(member))
}

#[axum::debug_handler]
pub async fn remove_member(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<bool>>> {
    // 成员可以自己退群
    if user_id != claims.sub {
        let group = require_admin(&state, &group_id, &claims.sub).await?;
        protect_creator(&group, &user_id, &claims)?;
    }

    Group::remove_member(&state.pool, &group_id, &user_id).await?;
    Ok(success_to_api_response(true))
}
