use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const NOTIFICATION_COLUMNS: &str = "id, user_id, sender_id, group_id, message_id, \
     friendship_id, type, message, is_read, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationType {
    FriendRequest,
    FriendAccepted,
    Message,
    GroupInvitation,
    GroupMessage,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::FriendRequest => "friend_request",
            NotificationType::FriendAccepted => "friend_accepted",
            NotificationType::Message => "message",
            NotificationType::GroupInvitation => "group_invitation",
            NotificationType::GroupMessage => "group_message",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friend_request" => Ok(NotificationType::FriendRequest),
            "friend_accepted" => Ok(NotificationType::FriendAccepted),
            "message" => Ok(NotificationType::Message),
            "group_invitation" => Ok(NotificationType::GroupInvitation),
            "group_message" => Ok(NotificationType::GroupMessage),
            other => Err(AppError::Validation(format!(
                "无效的通知类型: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub sender_id: Option<String>,
    pub group_id: Option<String>,
    pub message_id: Option<String>,
    pub friendship_id: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// 类型以字符串接收，在写入前校验
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    pub sender_id: Option<String>,
    pub group_id: Option<String>,
    pub message_id: Option<String>,
    pub friendship_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub content: String,
}

impl CreateNotificationRequest {
    pub fn new(user_id: &str, notification_type: NotificationType, content: String) -> Self {
        Self {
            user_id: user_id.to_string(),
            notification_type: notification_type.to_string(),
            content,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub is_read: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl Notification {
    pub async fn create(pool: &SqlitePool, req: CreateNotificationRequest) -> AppResult<Self> {
        if req.sender_id.is_none()
            && req.group_id.is_none()
            && req.message_id.is_none()
            && req.friendship_id.is_none()
        {
            return Err(AppError::Validation(
                "sender_id、group_id、message_id、friendship_id 至少提供一个"
                    .into(),
            ));
        }

        let notification_type = req.notification_type.parse::<NotificationType>()?;

        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (id, user_id, sender_id, group_id, message_id,
                                       friendship_id, type, message, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&req.user_id)
        .bind(&req.sender_id)
        .bind(&req.group_id)
        .bind(&req.message_id)
        .bind(&req.friendship_id)
        .bind(notification_type)
        .bind(&req.content)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(notification)
    }

    /// 社交事件的通知投递，失败只记录日志，不影响主流程
    pub async fn dispatch(pool: &SqlitePool, req: CreateNotificationRequest) {
        let user_id = req.user_id.clone();
        let notification_type = req.notification_type.clone();

        match Self::create(pool, req).await {
            Ok(n) => tracing::debug!("Notification {} ({}) sent to {}", n.id, notification_type, user_id),
            Err(e) => tracing::warn!(
                "Failed to send {} notification to {}: {}",
                notification_type,
                user_id,
                e
            ),
        }
    }

    pub async fn find_by_id(pool: &SqlitePool, notification_id: &str) -> AppResult<Option<Self>> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"
        ))
        .bind(notification_id)
        .fetch_optional(pool)
        .await?;

        Ok(notification)
    }

    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        is_read: Option<bool>,
        skip: i64,
        limit: i64,
    ) -> AppResult<Vec<Self>> {
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE user_id = ? AND (? IS NULL OR is_read = ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user_id)
        .bind(is_read)
        .bind(is_read)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    pub async fn mark_read(pool: &SqlitePool, notification_id: &str) -> AppResult<Option<Self>> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET is_read = 1 WHERE id = ? RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(notification_id)
        .fetch_optional(pool)
        .await?;

        Ok(notification)
    }

    pub async fn delete(pool: &SqlitePool, notification_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(notification_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
