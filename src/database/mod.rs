// 数据库连接池与表结构初始化

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::Config;
use crate::error::AppResult;
use crate::routes::user::{CreateUserRequest, User};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT,
        last_name TEXT,
        hashed_password TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        is_online INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS friendships (
        id TEXT PRIMARY KEY,
        sender_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        receiver_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'accepted', 'rejected', 'blocked')),
        created_at TEXT NOT NULL,
        updated_at TEXT,
        CHECK (sender_id <> receiver_id)
    )
    "#,
    // 同一对用户（不分方向）只允许一条好友关系
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair
        ON friendships (min(sender_id, receiver_id), max(sender_id, receiver_id))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        image_url TEXT,
        creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_members (
        id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        is_admin INTEGER NOT NULL DEFAULT 0,
        joined_at TEXT NOT NULL,
        UNIQUE (group_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        sender_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        receiver_id TEXT REFERENCES users(id) ON DELETE CASCADE,
        group_id TEXT REFERENCES groups(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        is_edited INTEGER NOT NULL DEFAULT 0,
        reply_to_message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        edited_at TEXT,
        updated_at TEXT,
        CHECK (NOT (receiver_id IS NULL AND group_id IS NULL)),
        CHECK (NOT (receiver_id IS NOT NULL AND group_id IS NOT NULL))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_messages_group ON messages (group_id, created_at)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages (sender_id, receiver_id, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attachments (
        id TEXT PRIMARY KEY,
        message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        file_url TEXT NOT NULL,
        file_name TEXT,
        file_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        sender_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        group_id TEXT REFERENCES groups(id) ON DELETE SET NULL,
        message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
        friendship_id TEXT REFERENCES friendships(id) ON DELETE SET NULL,
        type TEXT NOT NULL CHECK (type IN (
            'friend_request', 'friend_accepted', 'message', 'group_invitation', 'group_message'
        )),
        message TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, created_at)
    "#,
];

/// 创建连接池。内存数据库每个连接都是独立的库，因此只保留一个常驻连接
pub async fn connect(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if config.database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect_with(options)
            .await?
    };

    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Database schema is up to date");
    Ok(())
}

/// 建表并按配置写入初始管理员
pub async fn init_db(pool: &SqlitePool, config: &Config) -> AppResult<()> {
    migrate(pool).await?;
    seed_admin(pool, config).await?;
    Ok(())
}

pub async fn seed_admin(pool: &SqlitePool, config: &Config) -> AppResult<Option<User>> {
    let Some(email) = config.first_admin_email.as_deref() else {
        return Ok(None);
    };

    if User::find_by_email(pool, email).await?.is_some() {
        tracing::debug!("Initial admin {} already exists", email);
        return Ok(None);
    }

    let (Some(username), Some(password)) = (
        config.first_admin_username.clone(),
        config.first_admin_password.clone(),
    ) else {
        tracing::warn!("FIRST_ADMIN_EMAIL is set without username or password, skipping");
        return Ok(None);
    };

    let admin = User::create(
        pool,
        CreateUserRequest {
            email: email.to_string(),
            username,
            password,
            first_name: None,
            last_name: None,
        },
    )
    .await?;

    tracing::info!("Created initial admin user: {}", admin.id);
    Ok(Some(admin))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = connect(&crate::utils::test_config()).await.unwrap();
    migrate(&pool).await.unwrap();
    pool
}
