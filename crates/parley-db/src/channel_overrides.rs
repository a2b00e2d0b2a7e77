use crate::{DbError, DbPool};
use parley_models::permissions::PermissionMap;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelOverrideRow {
    pub channel_id: i64,
    pub role_id: i64,
    pub permissions: String,
}

impl ChannelOverrideRow {
    pub fn permissions(&self) -> PermissionMap {
        serde_json::from_str(&self.permissions).unwrap_or_default()
    }
}

pub async fn upsert_override(
    pool: &DbPool,
    channel_id: i64,
    role_id: i64,
    permissions: &PermissionMap,
) -> Result<(), DbError> {
    let perms_json = serde_json::to_string(permissions).map_err(|e| DbError::Decode(e.to_string()))?;
    sqlx::query(
        "INSERT INTO channel_permission_overrides (channel_id, role_id, permissions) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT (channel_id, role_id) DO UPDATE SET permissions = excluded.permissions",
    )
    .bind(channel_id)
    .bind(role_id)
    .bind(perms_json)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overrides for a single channel (§4.2 step 6: filtered to the caller's
/// roles and sorted by role priority at the call site, since that needs the
/// caller's role list which this repository doesn't have).
pub async fn overrides_for_channel(
    pool: &DbPool,
    channel_id: i64,
) -> Result<Vec<ChannelOverrideRow>, DbError> {
    let rows = sqlx::query_as::<_, ChannelOverrideRow>(
        "SELECT channel_id, role_id, permissions FROM channel_permission_overrides \
         WHERE channel_id = ?1",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
