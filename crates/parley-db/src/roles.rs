use crate::{DbError, DbPool};
use parley_models::permissions::PermissionMap;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleRow {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub priority: i64,
    pub color: Option<String>,
    pub permissions: String,
    pub is_default: bool,
}

impl RoleRow {
    pub fn permissions(&self) -> PermissionMap {
        serde_json::from_str(&self.permissions).unwrap_or_default()
    }
}

const COLUMNS: &str = "id, server_id, name, priority, color, permissions, is_default";

pub async fn create_role(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    name: &str,
    priority: i32,
    permissions: &PermissionMap,
    is_default: bool,
) -> Result<RoleRow, DbError> {
    let perms_json = serde_json::to_string(permissions).map_err(|e| DbError::Decode(e.to_string()))?;
    let row = sqlx::query_as::<_, RoleRow>(&format!(
        "INSERT INTO roles (id, server_id, name, priority, permissions, is_default) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(server_id)
    .bind(name)
    .bind(priority)
    .bind(perms_json)
    .bind(is_default)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_role(pool: &DbPool, id: i64) -> Result<Option<RoleRow>, DbError> {
    let row = sqlx::query_as::<_, RoleRow>(&format!("SELECT {COLUMNS} FROM roles WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_roles_for_server(pool: &DbPool, server_id: i64) -> Result<Vec<RoleRow>, DbError> {
    let rows = sqlx::query_as::<_, RoleRow>(&format!(
        "SELECT {COLUMNS} FROM roles WHERE server_id = ?1 ORDER BY priority DESC, id ASC"
    ))
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_default_role(pool: &DbPool, server_id: i64) -> Result<Option<RoleRow>, DbError> {
    let row = sqlx::query_as::<_, RoleRow>(&format!(
        "SELECT {COLUMNS} FROM roles WHERE server_id = ?1 AND is_default = 1 LIMIT 1"
    ))
    .bind(server_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Roles assigned to `user_id` in `server_id`, ordered by priority
/// descending then role-id ascending (§4.2 step 1 tie-break).
pub async fn roles_for_member(
    pool: &DbPool,
    user_id: i64,
    server_id: i64,
) -> Result<Vec<RoleRow>, DbError> {
    let rows = sqlx::query_as::<_, RoleRow>(&format!(
        "SELECT r.id, r.server_id, r.name, r.priority, r.color, r.permissions, r.is_default \
         FROM roles r \
         JOIN member_roles mr ON mr.role_id = r.id \
         WHERE mr.user_id = ?1 AND mr.server_id = ?2 \
         ORDER BY r.priority DESC, r.id ASC"
    ))
    .bind(user_id)
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Partial update; `None` leaves the column unchanged. A non-`None`
/// `permissions` replaces the whole map, matching the teacher's
/// whole-document PATCH semantics for role permission maps.
pub async fn update_role(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    priority: Option<i32>,
    color: Option<&str>,
    permissions: Option<&PermissionMap>,
) -> Result<RoleRow, DbError> {
    let perms_json = permissions
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DbError::Decode(e.to_string()))?;
    let row = sqlx::query_as::<_, RoleRow>(&format!(
        "UPDATE roles SET name = COALESCE(?2, name), \
           priority = COALESCE(?3, priority), \
           color = COALESCE(?4, color), \
           permissions = COALESCE(?5, permissions) \
         WHERE id = ?1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(priority)
    .bind(color)
    .bind(perms_json)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn delete_role(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM roles WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
