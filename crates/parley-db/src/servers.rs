use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub icon_ref: Option<String>,
    pub max_users: i64,
    pub max_webcam_producers: i64,
    pub max_screen_producers: i64,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, name, description, icon_ref, max_users, max_webcam_producers, \
     max_screen_producers, password_hash, created_at";

pub async fn create_server(
    pool: &DbPool,
    id: i64,
    name: &str,
    password_hash: Option<&str>,
) -> Result<ServerRow, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(&format!(
        "INSERT INTO servers (id, name, password_hash) VALUES (?1, ?2, ?3) \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_server(pool: &DbPool, id: i64) -> Result<Option<ServerRow>, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(&format!("SELECT {COLUMNS} FROM servers WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Returns the sole default server, creating it (with its default channels
/// and roles left to the caller/bootstrap module) if absent (§3 invariant:
/// exactly one default server exists after bootstrap).
pub async fn get_any_server(pool: &DbPool) -> Result<Option<ServerRow>, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(&format!(
        "SELECT {COLUMNS} FROM servers ORDER BY id ASC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_server(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
    max_users: Option<i64>,
    max_webcam_producers: Option<i64>,
    max_screen_producers: Option<i64>,
) -> Result<ServerRow, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(&format!(
        "UPDATE servers SET name = COALESCE(?2, name), description = COALESCE(?3, description), \
         max_users = COALESCE(?4, max_users), \
         max_webcam_producers = COALESCE(?5, max_webcam_producers), \
         max_screen_producers = COALESCE(?6, max_screen_producers) \
         WHERE id = ?1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(max_users)
    .bind(max_webcam_producers)
    .bind(max_screen_producers)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn set_icon_ref(pool: &DbPool, id: i64, icon_ref: &str) -> Result<ServerRow, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(&format!(
        "UPDATE servers SET icon_ref = ?2 WHERE id = ?1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(icon_ref)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
