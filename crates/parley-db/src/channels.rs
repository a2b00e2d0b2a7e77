use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub server_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub position: i64,
    pub max_users: i64,
    pub join_power: i64,
    pub talk_power: i64,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, server_id, parent_id, name, description, position, max_users, \
     join_power, talk_power, is_default, created_at";

#[allow(clippy::too_many_arguments)]
pub async fn create_channel(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    parent_id: Option<i64>,
    name: &str,
    position: i32,
    is_default: bool,
) -> Result<ChannelRow, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(&format!(
        "INSERT INTO channels (id, server_id, parent_id, name, position, is_default) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(server_id)
    .bind(parent_id)
    .bind(name)
    .bind(position)
    .bind(is_default)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_channel(pool: &DbPool, id: i64) -> Result<Option<ChannelRow>, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(&format!("SELECT {COLUMNS} FROM channels WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_channels_for_server(
    pool: &DbPool,
    server_id: i64,
) -> Result<Vec<ChannelRow>, DbError> {
    let rows = sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {COLUMNS} FROM channels WHERE server_id = ?1 ORDER BY position ASC, id ASC"
    ))
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Walks the parent chain from `channel_id` up to its root ancestor,
/// returning ids ordered root-first (for the permission engine's channel
/// walk, §4.2 step 6).
pub async fn ancestor_chain(pool: &DbPool, channel_id: i64) -> Result<Vec<i64>, DbError> {
    let mut chain = Vec::new();
    let mut current = Some(channel_id);
    // Channels form a forest (cycles forbidden by invariant); bound the
    // walk defensively in case of corrupt data.
    for _ in 0..64 {
        let Some(id) = current else { break };
        chain.push(id);
        current = get_channel(pool, id).await?.and_then(|c| c.parent_id);
    }
    chain.reverse();
    Ok(chain)
}

/// Partial update (§6 "Server/channel/role CRUD endpoints whose write
/// effects feed the broadcasts"); `None` leaves the column unchanged.
#[allow(clippy::too_many_arguments)]
pub async fn update_channel(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
    position: Option<i32>,
    max_users: Option<i32>,
) -> Result<ChannelRow, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(&format!(
        "UPDATE channels SET name = COALESCE(?2, name), \
           description = COALESCE(?3, description), \
           position = COALESCE(?4, position), \
           max_users = COALESCE(?5, max_users) \
         WHERE id = ?1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(position)
    .bind(max_users)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn delete_channel(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM channels WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
