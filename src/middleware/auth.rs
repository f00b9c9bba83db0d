use axum::{
    RequestExt,
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::user::User,
    utils::verify_token,
};

/// 校验 Bearer token，并把 Claims 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let TypedHeader(Authorization(bearer)) = req
        .extract_parts::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| AppError::Unauthorized)?;

    let claims = verify_token(bearer.token(), &state.config).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Unauthorized
    })?;

    // 用户被删除或停用后 token 立即失效
    match User::find_by_id(&state.pool, &claims.sub).await? {
        Some(user) if user.is_active => {}
        _ => return Err(AppError::Unauthorized),
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
