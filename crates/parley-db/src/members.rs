use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRow {
    pub user_id: i64,
    pub server_id: i64,
    pub joined_nickname: String,
    pub joined_at: DateTime<Utc>,
}

pub async fn get_member(
    pool: &DbPool,
    user_id: i64,
    server_id: i64,
) -> Result<Option<MemberRow>, DbError> {
    let row = sqlx::query_as::<_, MemberRow>(
        "SELECT user_id, server_id, joined_nickname, joined_at FROM server_members \
         WHERE user_id = ?1 AND server_id = ?2",
    )
    .bind(user_id)
    .bind(server_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Idempotent enrollment (§4.1 "member is enrolled in the server
/// (idempotent)").
pub async fn ensure_member(
    pool: &DbPool,
    user_id: i64,
    server_id: i64,
    nickname: &str,
) -> Result<MemberRow, DbError> {
    if let Some(existing) = get_member(pool, user_id, server_id).await? {
        return Ok(existing);
    }
    let row = sqlx::query_as::<_, MemberRow>(
        "INSERT INTO server_members (user_id, server_id, joined_nickname) VALUES (?1, ?2, ?3) \
         RETURNING user_id, server_id, joined_nickname, joined_at",
    )
    .bind(user_id)
    .bind(server_id)
    .bind(nickname)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn list_members(pool: &DbPool, server_id: i64) -> Result<Vec<MemberRow>, DbError> {
    let rows = sqlx::query_as::<_, MemberRow>(
        "SELECT user_id, server_id, joined_nickname, joined_at FROM server_members \
         WHERE server_id = ?1",
    )
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn remove_member(pool: &DbPool, user_id: i64, server_id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM server_members WHERE user_id = ?1 AND server_id = ?2")
        .bind(user_id)
        .bind(server_id)
        .execute(pool)
        .await?;
    Ok(())
}
