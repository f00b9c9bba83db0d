use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::{PageQuery, page},
    utils::{ApiResponse, Claims, generate_token, success_to_api_response},
};

use super::model::{
    CreateUserRequest, LoginRequest, RegisterResponse, TokenResponse,
    UpdateUserRequest, User,
};

fn issue_token(subject: &str, state: &AppState) -> AppResult<TokenResponse> {
    let (access_token, expires_at) = generate_token(subject, None, &state.config)?;
    Ok(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        expires_at,
    })
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<RegisterResponse>>)> {
    req.validate()?;

    // 检查用户名格式
    if !req.username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(AppError::Validation(
            "用户名格式无效，只允许使用字母、数字和下划线".into(),
        ));
    }

    let user = User::create(&state.pool, req).await?;
    let token = issue_token(&user.id, &state)?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(RegisterResponse { user, token }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let user = User::authenticate(&state.pool, &req.email, &req.password)
        .await?
        .ok_or(AppError::Unauthorized)?;

    tracing::info!("User logged in: {}", user.id);
    Ok(success_to_api_response(issue_token(&user.id, &state)?))
}

#[axum::debug_handler]
pub async fn refresh_token(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    Ok(success_to_api_response(issue_token(&claims.sub, &state)?))
}

#[axum::debug_handler]
pub async fn get_me(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn update_me(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    req.validate()?;

    let user = User::update(&state.pool, &claims.sub, req)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn delete_me(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = User::delete(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let (skip, limit) = page(query.skip, query.limit);
    let users = User::list(&state.pool, skip, limit).await?;
    Ok(success_to_api_response(users))
}

#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = User::find_by_id(&state.pool, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    Ok(success_to_api_response(user))
}
