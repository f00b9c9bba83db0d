use std::env;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct MailConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub port: Option<u16>,
    pub server: Option<String>,
    pub tls: bool,
    pub ssl: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub project_name: String,
    pub api_base_uri: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub mail: MailConfig,
    pub first_admin_email: Option<String>,
    pub first_admin_username: Option<String>,
    pub first_admin_password: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("缺少环境变量 {0}")]
    Missing(&'static str),
    #[error("环境变量 {0} 的值无效")]
    Invalid(&'static str),
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

/// 分钟换算成秒，溢出视为无效配置
fn expiration_secs(minutes: Option<String>) -> Result<u64, ConfigError> {
    let minutes = match minutes {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid("ACCESS_TOKEN_EXPIRE_MINUTES"))?,
        None => 60,
    };
    minutes
        .checked_mul(60)
        .filter(|secs| i64::try_from(*secs).is_ok())
        .ok_or(ConfigError::Invalid("ACCESS_TOKEN_EXPIRE_MINUTES"))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 令牌有效期，单位分钟
        let jwt_expiration_secs = expiration_secs(env::var("ACCESS_TOKEN_EXPIRE_MINUTES").ok())?;

        Ok(Config {
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "Chat App".into()),
            api_base_uri: env::var("API_V1_STR").unwrap_or_else(|_| "/api/v1".into()),
            database_url: required("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            jwt_secret: required("SECRET_KEY")?,
            jwt_algorithm: env::var("ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            jwt_expiration_secs,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            mail: MailConfig {
                username: env::var("MAIL_USERNAME").ok(),
                password: env::var("MAIL_PASSWORD").ok(),
                from: env::var("MAIL_FROM").ok(),
                port: env::var("MAIL_PORT").ok().and_then(|v| v.parse().ok()),
                server: env::var("MAIL_SERVER").ok(),
                tls: parse_flag(env::var("MAIL_TLS").ok(), true),
                ssl: parse_flag(env::var("MAIL_SSL").ok(), false),
            },
            first_admin_email: env::var("FIRST_ADMIN_EMAIL").ok(),
            first_admin_username: env::var("FIRST_ADMIN_USERNAME").ok(),
            first_admin_password: env::var("FIRST_ADMIN_PASSWORD").ok(),
        })
    }

    /// 是否配置了发信账号
    pub fn mail_enabled(&self) -> bool {
        self.mail.server.is_some() && self.mail.username.is_some()
    }
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("TRUE") | Some("True") => true,
        Some("0") | Some("false") | Some("FALSE") | Some("False") => false,
        _ => default,
    }
}
