use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

const GROUP_COLUMNS: &str = "id, name, description, image_url, creator_id, created_at, updated_at";
const MEMBER_COLUMNS: &str = "id, group_id, user_id, is_admin, joined_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupMember {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "群组名称长度必须在1到100个字符之间"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 255))]
    pub image_url: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "群组名称长度必须在1到100个字符之间"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 255))]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

impl Group {
    /// 群组、创建者（管理员）和初始成员在同一事务内写入
    pub async fn create(
        pool: &SqlitePool,
        req: CreateGroupRequest,
        creator_id: &str,
    ) -> AppResult<Self> {
        let mut tx = pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM groups WHERE name = ?")
            .bind(&req.name)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Err(AppError::Conflict("群组名称已存在".into()));
        }

        let now = Utc::now();
        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO groups (id, name, description, image_url, creator_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.image_url)
        .bind(creator_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // 创建者作为第一个管理员加入
        insert_member(&mut tx, &group.id, creator_id, true).await?;

        let mut seen = HashSet::new();
        for member_id in &req.member_ids {
            if member_id == creator_id || !seen.insert(member_id.as_str()) {
                continue;
            }
            insert_member(&mut tx, &group.id, member_id, false).await?;
        }

        tx.commit().await?;

        tracing::info!("Created group {} ({}) by {}", group.id, group.name, creator_id);
        Ok(group)
    }

    pub async fn find_by_id(pool: &SqlitePool, group_id: &str) -> AppResult<Option<Self>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?"
        ))
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        Ok(group)
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<Self>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(group)
    }

    pub async fn update(
        pool: &SqlitePool,
        group_id: &str,
        req: UpdateGroupRequest,
    ) -> AppResult<Self> {
        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            UPDATE groups
            SET name = COALESCE(?, name),
                description = COALESCE(?, description),
                image_url = COALESCE(?, image_url),
                updated_at = ?
            WHERE id = ?
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(req.name)
        .bind(req.description)
        .bind(req.image_url)
        .bind(Utc::now())
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("群组不存在".into()))?;

        Ok(group)
    }

    /// 成员和群消息随外键级联删除
    pub async fn delete(pool: &SqlitePool, group_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(group_id)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!("Deleted group {}", group_id);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_member(
        pool: &SqlitePool,
        group_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> AppResult<GroupMember> {
        if Self::find_by_id(pool, group_id).await?.is_none() {
            return Err(AppError::NotFound("群组不存在".into()));
        }

        if Self::find_member(pool, group_id, user_id).await?.is_some() {
            return Err(AppError::Conflict(
                "用户已经是群成员".into(),
            ));
        }

        let mut conn = pool.acquire().await?;
        let member = insert_member(&mut conn, group_id, user_id, is_admin).await?;

        tracing::info!("User {} joined group {}", user_id, group_id);
        Ok(member)
    }

    pub async fn remove_member(pool: &SqlitePool, group_id: &str, user_id: &str) -> AppResult<()> {
        if Self::find_by_id(pool, group_id).await?.is_none() {
            return Err(AppError::NotFound("群组不存在".into()));
        }

        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "用户不是群成员".into(),
            ));
        }

        tracing::info!("User {} left group {}", user_id, group_id);
        Ok(())
    }

    pub async fn set_member_admin(
        pool: &SqlitePool,
        group_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> AppResult<GroupMember> {
        let member = sqlx::query_as::<_, GroupMember>(&format!(
            r#"
            UPDATE group_members SET is_admin = ?
            WHERE group_id = ? AND user_id = ?
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(is_admin)
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不是群成员".into()))?;

        Ok(member)
    }

    pub async fn find_member(
        pool: &SqlitePool,
        group_id: &str,
        user_id: &str,
    ) -> AppResult<Option<GroupMember>> {
        let member = sqlx::query_as::<_, GroupMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = ? AND user_id = ?"
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn list_members(pool: &SqlitePool, group_id: &str) -> AppResult<Vec<GroupMember>> {
        let members = sqlx::query_as::<_, GroupMember>(&format!(
            r#"
            SELECT {MEMBER_COLUMNS} FROM group_members
            WHERE group_id = ?
            ORDER BY joined_at, rowid
            "#
        ))
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Self>> {
        let groups = sqlx::query_as::<_, Group>(&format!(
            r#"
            SELECT {GROUP_COLUMNS} FROM groups
            WHERE id IN (SELECT group_id FROM group_members WHERE user_id = ?)
            ORDER BY name
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(groups)
    }
}

async fn insert_member(
    conn: &mut sqlx::SqliteConnection,
    group_id: &str,
    user_id: &str,
    is_admin: bool,
) -> AppResult<GroupMember> {
    let member = sqlx::query_as::<_, GroupMember>(&format!(
        r#"
        INSERT INTO group_members (id, group_id, user_id, is_admin, joined_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING {MEMBER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(group_id)
    .bind(user_id)
    .bind(is_admin)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;

    Ok(member)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::routes::user::create_test_user;

    pub(crate) fn group_request(name: &str, member_ids: Vec<String>) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.to_string(),
            description: Some("test group".into()),
            image_url: None,
            member_ids,
        }
    }

    #[tokio::test]
    async fn create_adds_creator_as_admin_and_dedups_members() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let carol = create_test_user(&pool, "carol").await;

        let group = Group::create(
            &pool,
            group_request(
                "rustaceans",
                vec![bob.id.clone(), alice.id.clone(), bob.id.clone(), carol.id.clone()],
            ),
            &alice.id,
        )
        .await
        .unwrap();
        assert_eq!(group.creator_id, alice.id);

        let members = Group::list_members(&pool, &group.id).await.unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].user_id, alice.id);
        assert!(members[0].is_admin);
        assert!(members[1..].iter().all(|m| !m.is_admin));
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        Group::create(&pool, group_request("dup", vec![]), &alice.id)
            .await
            .unwrap();

        let result = Group::create(&pool, group_request("dup", vec![]), &alice.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn create_with_unknown_member_rolls_back() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;

        let result = Group::create(
            &pool,
            group_request("ghosts", vec!["no-such-user".into()]),
            &alice.id,
        )
        .await;
        assert!(result.is_err());
        assert!(Group::find_by_name(&pool, "ghosts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_overwrites_provided_fields() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let group = Group::create(&pool, group_request("before", vec![]), &alice.id)
            .await
            .unwrap();

        let updated = Group::update(
            &pool,
            &group.id,
            UpdateGroupRequest {
                name: Some("after".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "after");
        assert_eq!(updated.description.as_deref(), Some("test group"));

        let missing = Group::update(&pool, "missing", UpdateGroupRequest::default()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn add_member_rejects_missing_group_and_duplicates() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let group = Group::create(&pool, group_request("g", vec![]), &alice.id)
            .await
            .unwrap();

        let member = Group::add_member(&pool, &group.id, &bob.id, false).await.unwrap();
        assert!(!member.is_admin);

        let again = Group::add_member(&pool, &group.id, &bob.id, false).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let no_group = Group::add_member(&pool, "missing", &bob.id, false).await;
        assert!(matches!(no_group, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_member_rejects_missing_group_or_membership() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let group = Group::create(&pool, group_request("g", vec![bob.id.clone()]), &alice.id)
            .await
            .unwrap();

        Group::remove_member(&pool, &group.id, &bob.id).await.unwrap();
        assert!(Group::find_member(&pool, &group.id, &bob.id).await.unwrap().is_none());

        let again = Group::remove_member(&pool, &group.id, &bob.id).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));

        let no_group = Group::remove_member(&pool, "missing", &alice.id).await;
        assert!(matches!(no_group, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn set_member_admin_toggles_flag() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let group = Group::create(&pool, group_request("g", vec![bob.id.clone()]), &alice.id)
            .await
            .unwrap();

        let promoted = Group::set_member_admin(&pool, &group.id, &bob.id, true)
            .await
            .unwrap();
        assert!(promoted.is_admin);

        let missing = Group::set_member_admin(&pool, &group.id, "nobody", true).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_for_user_returns_joined_groups() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        Group::create(&pool, group_request("beta", vec![bob.id.clone()]), &alice.id)
            .await
            .unwrap();
        Group::create(&pool, group_request("alpha", vec![]), &bob.id)
            .await
            .unwrap();
        Group::create(&pool, group_request("gamma", vec![]), &alice.id)
            .await
            .unwrap();

        let groups = Group::list_for_user(&pool, &bob.id).await.unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn delete_cascades_to_members() {
        let pool = test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let group = Group::create(&pool, group_request("g", vec![bob.id.clone()]), &alice.id)
            .await
            .unwrap();

        assert!(Group::delete(&pool, &group.id).await.unwrap());
        assert!(!Group::delete(&pool, &group.id).await.unwrap());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM group_members")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
