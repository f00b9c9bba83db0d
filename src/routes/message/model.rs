use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, group_id, content, is_read, \
     is_edited, reply_to_message_id, created_at, edited_at, updated_at";
const ATTACHMENT_COLUMNS: &str = "id, message_id, file_url, file_name, file_type, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub group_id: Option<String>,
    pub content: String,
    pub is_read: bool,
    pub is_edited: bool,
    pub reply_to_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: String,
    pub message_id: String,
    pub file_url: String,
    pub file_name: Option<String>,
    pub file_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageWithAttachments {
    #[serde(flatten)]
    pub message: Message,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAttachmentRequest {
    #[validate(length(min = 1, max = 512, message = "附件地址不能为空"))]
    pub file_url: String,
    pub file_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "附件类型不能为空"))]
    pub file_type: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateMessageRequest {
    pub receiver_id: Option<String>,
    pub group_id: Option<String>,
    #[validate(length(min = 1, message = "消息内容不能为空"))]
    pub content: String,
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub attachments: Vec<CreateAttachmentRequest>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMessageRequest {
    #[validate(length(min = 1, message = "消息内容不能为空"))]
    pub content: Option<String>,
    pub is_read: Option<bool>,
    pub is_edited: Option<bool>,
    pub reply_to_message_id: Option<String>,
}

/// 发送者可修改的字段，已读和编辑标记不对外开放
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, message = "消息内容不能为空"))]
    pub content: Option<String>,
    pub reply_to_message_id: Option<String>,
}

impl From<EditMessageRequest> for UpdateMessageRequest {
    fn from(req: EditMessageRequest) -> Self {
        UpdateMessageRequest {
            content: req.content,
            reply_to_message_id: req.reply_to_message_id,
            ..Default::default()
        }
    }
}

impl Message {
    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// 是否属于给定的群，或给定双方之间的私聊
    pub fn in_thread(&self, user_id: &str, receiver_id: Option<&str>, group_id: Option<&str>) -> bool {
        match (group_id, receiver_id) {
            (Some(group_id), _) => self.group_id.as_deref() == Some(group_id),
            (None, Some(receiver_id)) => match self.receiver_id.as_deref() {
                Some(r) => {
                    (self.sender_id == user_id && r == receiver_id)
                        || (self.sender_id == receiver_id && r == user_id)
                }
                None => false,
            },
            (None, None) => false,
        }
    }

    /// 消息和附件在同一事务内写入
    pub async fn create(
        pool: &SqlitePool,
        req: CreateMessageRequest,
        sender_id: &str,
    ) -> AppResult<MessageWithAttachments> {
        if req.receiver_id.is_some() == req.group_id.is_some() {
            return Err(AppError::Validation(
                "receiver_id 和 group_id 必须且只能提供一个".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, group_id, content,
                                  is_read, is_edited, reply_to_message_id, created_at)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(sender_id)
        .bind(&req.receiver_id)
        .bind(&req.group_id)
        .bind(&req.content)
        .bind(&req.reply_to_message_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut attachments = Vec::with_capacity(req.attachments.len());
        for attachment in req.attachments {
            let row = sqlx::query_as::<_, Attachment>(&format!(
                r#"
                INSERT INTO attachments (id, message_id, file_url, file_name, file_type, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING {ATTACHMENT_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(&message.id)
            .bind(attachment.file_url)
            .bind(attachment.file_name)
            .bind(attachment.file_type)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            attachments.push(row);
        }

        tx.commit().await?;

        tracing::debug!(
            "Message {} from {} with {} attachment(s)",
            message.id,
            sender_id,
            attachments.len()
        );
        Ok(MessageWithAttachments {
            message,
            attachments,
        })
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        message_id: &str,
    ) -> AppResult<Option<MessageWithAttachments>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(message_id)
        .fetch_optional(pool)
        .await?;

        match message {
            Some(message) => Ok(with_attachments(pool, vec![message]).await?.pop()),
            None => Ok(None),
        }
    }

    /// 两个用户之间的私聊，按时间倒序
    pub async fn list_conversation(
        pool: &SqlitePool,
        user_a: &str,
        user_b: &str,
        skip: i64,
        limit: i64,
    ) -> AppResult<Vec<MessageWithAttachments>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE (sender_id = ? AND receiver_id = ?)
               OR (sender_id = ? AND receiver_id = ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;

        with_attachments(pool, messages).await
    }

    pub async fn list_group(
        pool: &SqlitePool,
        group_id: &str,
        skip: i64,
        limit: i64,
    ) -> AppResult<Vec<MessageWithAttachments>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE group_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(group_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;

        with_attachments(pool, messages).await
    }

    /// 修改内容时标记为已编辑
    pub async fn update(
        pool: &SqlitePool,
        message_id: &str,
        req: UpdateMessageRequest,
    ) -> AppResult<Option<Self>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET is_edited = CASE WHEN ?1 IS NOT NULL AND ?1 <> content THEN 1
                                 ELSE COALESCE(?2, is_edited) END,
                edited_at = CASE WHEN ?1 IS NOT NULL AND ?1 <> content THEN ?3
                                 ELSE edited_at END,
                content = COALESCE(?1, content),
                is_read = COALESCE(?4, is_read),
                reply_to_message_id = COALESCE(?5, reply_to_message_id),
                updated_at = ?3
            WHERE id = ?6
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(req.content)
        .bind(req.is_edited)
        .bind(Utc::now())
        .bind(req.is_read)
        .bind(req.reply_to_message_id)
        .bind(message_id)
        .fetch_optional(pool)
        .await?;

        Ok(message)
    }

    pub async fn delete(pool: &SqlitePool, message_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("消息不存在".into()));
        }
        Ok(())
    }

    pub async fn mark_read(pool: &SqlitePool, message_id: &str) -> AppResult<Option<Self>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "UPDATE messages SET is_read = 1 WHERE id = ? RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .fetch_optional(pool)
        .await?;

        Ok(message)
    }
}

/// 批量加载附件，保持消息原有顺序
async fn with_attachments(
    pool: &SqlitePool,
    messages: Vec<Message>,
) -> AppResult<Vec<MessageWithAttachments>> {
    if messages.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE message_id IN ("
    ));
    let mut ids = builder.separated(", ");
    for message in &messages {
        ids.push_bind(message.id.clone());
    }
    ids.push_unseparated(") ORDER BY created_at, rowid");

    let rows = builder
        .build_query_as::<Attachment>()
        .fetch_all(pool)
        .await?;

    let mut by_message: HashMap<String, Vec<Attachment>> = HashMap::new();
    for attachment in rows {
        by_message
            .entry(attachment.message_id.clone())
            .or_default()
            .push(attachment);
    }

    Ok(messages
        .into_iter()
        .map(|message| {
            let attachments = by_message.remove(&message.id).unwrap_or_default();
            MessageWithAttachments {
                message,
                attachments,
            }
        })
        .collect())
}
