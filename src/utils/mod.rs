use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, AppResult};

// 测试中降低成本，避免拖慢用例
const HASH_COST: u32 = if cfg!(test) { 4 } else { DEFAULT_COST };

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), HASH_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
}

fn jwt_algorithm(config: &Config) -> Result<Algorithm, jsonwebtoken::errors::Error> {
    config.jwt_algorithm.parse::<Algorithm>()
}

/// 签发令牌，`ttl` 为空时使用配置中的有效期。返回令牌和过期时间戳
pub fn generate_token(
    subject: &str,
    ttl: Option<Duration>,
    config: &Config,
) -> AppResult<(String, i64)> {
    let now = Utc::now();
    let ttl = match ttl {
        Some(ttl) => Some(ttl),
        None => i64::try_from(config.jwt_expiration_secs)
            .ok()
            .and_then(Duration::try_seconds),
    };
    let expiration = ttl
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::Internal("令牌有效期超出范围".into()))?
        .timestamp();

    let claims = Claims {
        sub: subject.to_string(),
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::new(jwt_algorithm(config)?),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    tracing::debug!("Generated token for subject: {}", subject);
    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(jwt_algorithm(config)?);
    // 过期即失效
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;

    Ok(token_data.claims)
}

/// 通用的API响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 错误码，0表示成功
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const CONFLICT: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        project_name: "Chat App".into(),
        api_base_uri: "/api/v1".into(),
        database_url: "sqlite::memory:".into(),
        database_max_connections: 1,
        jwt_secret: "test-secret".into(),
        jwt_algorithm: "HS256".into(),
        jwt_expiration_secs: 3600,
        server_host: "127.0.0.1".into(),
        server_port: 8000,
        mail: Default::default(),
        first_admin_email: None,
        first_admin_username: None,
        first_admin_password: None,
    }
}
