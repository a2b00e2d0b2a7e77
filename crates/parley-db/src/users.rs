use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub nickname: String,
    pub public_key: Option<String>,
    pub avatar_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, nickname, public_key, avatar_ref, created_at";

pub async fn get_by_public_key(
    pool: &DbPool,
    public_key: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {COLUMNS} FROM users WHERE public_key = ?1"
    ))
    .bind(public_key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn set_avatar_ref(pool: &DbPool, id: i64, avatar_ref: &str) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET avatar_ref = ?2 WHERE id = ?1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(avatar_ref)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    nickname: &str,
    public_key: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, nickname, public_key) VALUES (?1, ?2, ?3) RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(nickname)
    .bind(public_key)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
