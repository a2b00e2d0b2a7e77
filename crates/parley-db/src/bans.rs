use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BanRow {
    pub id: i64,
    pub server_id: i64,
    pub user_id: i64,
    pub banned_by: i64,
    pub reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, server_id, user_id, banned_by, reason, expires_at, created_at";

pub async fn create_ban(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    user_id: i64,
    banned_by: i64,
    reason: Option<&str>,
) -> Result<BanRow, DbError> {
    let row = sqlx::query_as::<_, BanRow>(&format!(
        "INSERT INTO bans (id, server_id, user_id, banned_by, reason) VALUES (?1, ?2, ?3, ?4, ?5) \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(server_id)
    .bind(user_id)
    .bind(banned_by)
    .bind(reason)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// The active (non-expired) ban for (server, user), if any. Expired rows
/// are lazily purged here rather than by a background sweep (§3 "Ban").
pub async fn active_ban(
    pool: &DbPool,
    server_id: i64,
    user_id: i64,
) -> Result<Option<BanRow>, DbError> {
    sqlx::query(
        "DELETE FROM bans WHERE server_id = ?1 AND user_id = ?2 \
         AND expires_at IS NOT NULL AND expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
    )
    .bind(server_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, BanRow>(&format!(
        "SELECT {COLUMNS} FROM bans WHERE server_id = ?1 AND user_id = ?2 LIMIT 1"
    ))
    .bind(server_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
