use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::routes::user::{USER_COLUMNS, User};

const FRIENDSHIP_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";

/// 状态之间没有强制的流转规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Friendship {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFriendshipRequest {
    pub receiver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFriendshipRequest {
    pub status: FriendshipStatus,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<FriendshipStatus>,
}

impl Friendship {
    /// 检查和插入在同一事务内完成；两人之间已有关系（不分方向）时返回 Conflict
    pub async fn create(pool: &SqlitePool, sender_id: &str, receiver_id: &str) -> AppResult<Self> {
        if sender_id == receiver_id {
            return Err(AppError::Validation("不能添加自己为好友".into()));
        }

        let mut tx = pool.begin().await?;

        if Self::find_between(&mut *tx, sender_id, receiver_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("好友关系已存在".into()));
        }

        let friendship = sqlx::query_as::<_, Friendship>(&format!(
            r#"
            INSERT INTO friendships (id, sender_id, receiver_id, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FRIENDSHIP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(FriendshipStatus::Pending)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            // 并发请求由唯一索引兜底
            AppError::Conflict(_) => AppError::Conflict("好友关系已存在".into()),
            other => other,
        })?;

        tx.commit().await?;

        tracing::info!(
            "Created friendship {} from {} to {}",
            friendship.id,
            sender_id,
            receiver_id
        );
        Ok(friendship)
    }

    pub async fn find_by_id(pool: &SqlitePool, friendship_id: &str) -> AppResult<Option<Self>> {
        let friendship = sqlx::query_as::<_, Friendship>(&format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE id = ?"
        ))
        .bind(friendship_id)
        .fetch_optional(pool)
        .await?;

        Ok(friendship)
    }

    /// 对称查询，两个方向都匹配
    pub async fn find_between<'e, E>(
        executor: E,
        user_id: &str,
        other_user_id: &str,
    ) -> AppResult<Option<Self>>
    where
        E: SqliteExecutor<'e>,
    {
        let friendship = sqlx::query_as::<_, Friendship>(&format!(
            r#"
            SELECT {FRIENDSHIP_COLUMNS} FROM friendships
            WHERE (sender_id = ? AND receiver_id = ?)
               OR (sender_id = ? AND receiver_id = ?)
            "#
        ))
        .bind(user_id)
        .bind(other_user_id)
        .bind(other_user_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        Ok(friendship)
    }

    /// 返回好友关系中的另一方
    pub async fn list_friends(
        pool: &SqlitePool,
        user_id: &str,
        status: Option<FriendshipStatus>,
    ) -> AppResult<Vec<User>> {
        let friends = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE id IN (
                SELECT CASE WHEN sender_id = ? THEN receiver_id ELSE sender_id END
                FROM friendships
                WHERE (sender_id = ? OR receiver_id = ?)
                  AND (? IS NULL OR status = ?)
            )
            ORDER BY username
            "#
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(status)
        .bind(status)
        .fetch_all(pool)
        .await?;

        Ok(friends)
    }

    /// 用户作为任意一方的好友关系记录
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        status: Option<FriendshipStatus>,
    ) -> AppResult<Vec<Self>> {
        let friendships = sqlx::query_as::<_, Friendship>(&format!(
            r#"
            SELECT {FRIENDSHIP_COLUMNS} FROM friendships
            WHERE (sender_id = ? OR receiver_id = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC, rowid DESC
            "#
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(status)
        .bind(status)
        .fetch_all(pool)
        .await?;

        Ok(friendships)
    }

    pub async fn update_status(
        pool: &SqlitePool,
        friendship_id: &str,
        status: FriendshipStatus,
    ) -> AppResult<Option<Self>> {
        let friendship = sqlx::query_as::<_, Friendship>(&format!(
            r#"
            UPDATE friendships
            SET status = ?, updated_at = ?
            WHERE id = ?
            RETURNING {FRIENDSHIP_COLUMNS}
            "#
        ))
        .bind(status)
        .bind(Utc::now())
        .bind(friendship_id)
        .fetch_optional(pool)
        .await?;

        Ok(friendship)
    }

    pub async fn delete(pool: &SqlitePool, friendship_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM friendships WHERE id = ?")
            .bind(friendship_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::routes::user::create_test_user;

    async fn count_rows(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM friendships")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;

        let f = Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();
        assert_eq!(f.status, FriendshipStatus::Pending);
        assert_eq!(f.sender_id, alice.id);
        assert_eq!(f.receiver_id, bob.id);
    }

    #[tokio::test]
    async fn find_between_is_symmetric() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let f = Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();

        let forward = Friendship::find_between(&pool, &alice.id, &bob.id)
            .await
            .unwrap()
            .unwrap();
        let backward = Friendship::find_between(&pool, &bob.id, &alice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forward.id, f.id);
        assert_eq!(backward.id, f.id);
    }

    #[tokio::test]
    async fn duplicate_pair_creates_no_new_row() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();

        let again = Friendship::create(&pool, &alice.id, &bob.id).await;
        let reversed = Friendship::create(&pool, &bob.id, &alice.id).await;

        assert!(matches!(again, Err(AppError::Conflict(_))));
        assert!(matches!(reversed, Err(AppError::Conflict(_))));
        assert_eq!(count_rows(&pool).await, 1);
    }

    #[tokio::test]
    async fn pair_index_rejects_direct_duplicate_insert() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();

        // 绕过事务内检查，直接写入反向记录
        let result = sqlx::query(
            "INSERT INTO friendships (id, sender_id, receiver_id, status, created_at) \
             VALUES ('dup', ?, ?, 'pending', '2024-01-01T00:00:00+00:00')",
        )
        .bind(&bob.id)
        .bind(&alice.id)
        .execute(&pool)
        .await;

        assert!(matches!(result.map_err(AppError::from), Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn self_friendship_is_rejected() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;

        let result = Friendship::create(&pool, &alice.id, &alice.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn list_friends_returns_only_counterparts() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let carol = create_test_user(&pool, "carol").await;
        let dave = create_test_user(&pool, "dave").await;

        let ab = Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();
        Friendship::create(&pool, &carol.id, &alice.id).await.unwrap();
        // 与 alice 无关的关系
        Friendship::create(&pool, &bob.id, &dave.id).await.unwrap();
        Friendship::update_status(&pool, &ab.id, FriendshipStatus::Accepted)
            .await
            .unwrap();

        let friends = Friendship::list_friends(&pool, &alice.id, None).await.unwrap();
        let names: Vec<_> = friends.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let accepted = Friendship::list_friends(&pool, &alice.id, Some(FriendshipStatus::Accepted))
            .await
            .unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, bob.id);

        let pending = Friendship::list_for_user(&pool, &alice.id, Some(FriendshipStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].involves(&carol.id));
    }

    #[tokio::test]
    async fn update_status_accepts_any_transition() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let f = Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();

        for status in [
            FriendshipStatus::Blocked,
            FriendshipStatus::Pending,
            FriendshipStatus::Rejected,
            FriendshipStatus::Accepted,
        ] {
            let updated = Friendship::update_status(&pool, &f.id, status)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.status, status);
            assert!(updated.updated_at.is_some());
        }

        assert!(
            Friendship::update_status(&pool, "missing", FriendshipStatus::Accepted)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_reports_false_when_absent() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let f = Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();

        assert!(Friendship::delete(&pool, &f.id).await.unwrap());
        assert!(!Friendship::delete(&pool, &f.id).await.unwrap());
        assert!(Friendship::find_by_id(&pool, &f.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_deletion_cascades_to_friendships() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        Friendship::create(&pool, &alice.id, &bob.id).await.unwrap();

        User::delete(&pool, &bob.id).await.unwrap();
        assert_eq!(count_rows(&pool).await, 0);
    }
}
