use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::utils::{hash_password, verify_password};

pub(crate) const USER_COLUMNS: &str = "id, username, email, first_name, last_name, \
     hashed_password, is_active, is_online, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub is_online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "邮箱格式无效"))]
    pub email: String,
    #[validate(length(min = 3, max = 50, message = "用户名长度必须在3到50个字符之间"))]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "密码长度必须在6到128个字符之间"))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// 只更新提供的字段
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "邮箱格式无效"))]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 50, message = "用户名长度必须在3到50个字符之间"))]
    pub username: Option<String>,
    #[validate(length(min = 6, max = 128, message = "密码长度必须在6到128个字符之间"))]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_online: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    #[serde(flatten)]
    pub token: TokenResponse,
}

impl User {
    pub async fn create(pool: &SqlitePool, req: CreateUserRequest) -> AppResult<Self> {
        let password_hash = hash_password(&req.password)?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, hashed_password,
                               is_active, is_online, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&req.username)
        .bind(&req.email)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        tracing::info!("Created user: {}", user.id);
        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> AppResult<Option<Self>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<Self>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<Self>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> AppResult<Vec<Self>> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            ORDER BY created_at, rowid
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// 用户不存在时返回 None；提供密码时重新哈希
    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        req: UpdateUserRequest,
    ) -> AppResult<Option<Self>> {
        let password_hash = req.password.as_deref().map(hash_password).transpose()?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE(?, username),
                email = COALESCE(?, email),
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                hashed_password = COALESCE(?, hashed_password),
                is_active = COALESCE(?, is_active),
                is_online = COALESCE(?, is_online),
                updated_at = ?
            WHERE id = ?
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(req.username)
        .bind(req.email)
        .bind(req.first_name)
        .bind(req.last_name)
        .bind(password_hash)
        .bind(req.is_active)
        .bind(req.is_online)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn delete(pool: &SqlitePool, user_id: &str) -> AppResult<Option<Self>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        if let Some(ref u) = user {
            tracing::info!("Deleted user: {}", u.id);
        }
        Ok(user)
    }

    /// 邮箱不存在、密码错误或账号停用都返回 None，调用方无法区分
    pub async fn authenticate(
        pool: &SqlitePool,
        email: &str,
        password: &str,
    ) -> AppResult<Option<Self>> {
        let Some(user) = Self::find_by_email(pool, email).await? else {
            return Ok(None);
        };

        if !user.is_active {
            return Ok(None);
        }

        match verify_password(password, &user.hashed_password) {
            Ok(true) => Ok(Some(user)),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::warn!("Password verification failed for {}: {}", user.id, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::error::AppError;

    pub(crate) async fn create_test_user(pool: &SqlitePool, name: &str) -> User {
        User::create(
            pool,
            CreateUserRequest {
                email: format!("{}@example.com", name),
                username: name.to_string(),
                password: "password123".into(),
                first_name: None,
                last_name: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_hashes_password() {
        let pool = test_pool().await;
        let user = create_test_user(&pool, "alice").await;

        assert_ne!(user.hashed_password, "password123");
        assert!(user.is_active);
        assert!(!user.is_online);
        assert!(verify_password("password123", &user.hashed_password).unwrap());
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_conflict() {
        let pool = test_pool().await;
        create_test_user(&pool, "alice").await;

        let same_email = User::create(
            &pool,
            CreateUserRequest {
                email: "alice@example.com".into(),
                username: "alice2".into(),
                password: "password123".into(),
                first_name: None,
                last_name: None,
            },
        )
        .await;
        assert!(matches!(same_email, Err(AppError::Conflict(_))));

        let same_username = User::create(
            &pool,
            CreateUserRequest {
                email: "other@example.com".into(),
                username: "alice".into(),
                password: "password123".into(),
                first_name: None,
                last_name: None,
            },
        )
        .await;
        assert!(matches!(same_username, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn lookups_by_id_email_and_username() {
        let pool = test_pool().await;
        let user = create_test_user(&pool, "bob").await;

        let by_id = User::find_by_id(&pool, &user.id).await.unwrap().unwrap();
        let by_email = User::find_by_email(&pool, "bob@example.com").await.unwrap().unwrap();
        let by_name = User::find_by_username(&pool, "bob").await.unwrap().unwrap();

        assert_eq!(by_id.id, user.id);
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_name.id, user.id);
        assert!(User::find_by_id(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_respects_skip_and_limit() {
        let pool = test_pool().await;
        for name in ["u1", "u2", "u3", "u4"] {
            create_test_user(&pool, name).await;
        }

        let page = User::list(&pool, 1, 2).await.unwrap();
        let names: Vec<_> = page.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn update_sets_only_provided_fields_and_rehashes() {
        let pool = test_pool().await;
        let user = create_test_user(&pool, "carol").await;

        let updated = User::update(
            &pool,
            &user.id,
            UpdateUserRequest {
                first_name: Some("Carol".into()),
                password: Some("new-password".into()),
                is_online: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(updated.username, "carol");
        assert_eq!(updated.email, "carol@example.com");
        assert_eq!(updated.first_name.as_deref(), Some("Carol"));
        assert!(updated.is_online);
        assert!(updated.updated_at.is_some());
        assert!(verify_password("new-password", &updated.hashed_password).unwrap());
        assert!(!verify_password("password123", &updated.hashed_password).unwrap());
    }

    #[tokio::test]
    async fn update_missing_user_is_none() {
        let pool = test_pool().await;
        let result = User::update(&pool, "missing", UpdateUserRequest::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_returns_removed_row() {
        let pool = test_pool().await;
        let user = create_test_user(&pool, "dave").await;

        let deleted = User::delete(&pool, &user.id).await.unwrap();
        assert_eq!(deleted.unwrap().id, user.id);
        assert!(User::delete(&pool, &user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_fails_closed() {
        let pool = test_pool().await;
        let user = create_test_user(&pool, "erin").await;

        let ok = User::authenticate(&pool, "erin@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(ok.unwrap().id, user.id);

        let wrong_password = User::authenticate(&pool, "erin@example.com", "nope")
            .await
            .unwrap();
        let unknown_email = User::authenticate(&pool, "nobody@example.com", "password123")
            .await
            .unwrap();
        assert!(wrong_password.is_none());
        assert!(unknown_email.is_none());
    }

    #[tokio::test]
    async fn inactive_user_cannot_authenticate() {
        let pool = test_pool().await;
        let user = create_test_user(&pool, "frank").await;
        User::update(
            &pool,
            &user.id,
            UpdateUserRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let result = User::authenticate(&pool, "frank@example.com", "password123")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
