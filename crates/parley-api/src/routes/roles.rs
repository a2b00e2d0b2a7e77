//! Role CRUD REST routes (§6). Grounded on the teacher's
//! `paracord-api::routes::roles`, generalized from Discord-style bitflag
//! permissions to this system's per-key allow/deny/inherit map (§3, §4.2).

use crate::error::ApiError;
use crate::middleware::AdminGuard;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use parley_core::AppState;
use parley_models::permissions::PermissionMap;
use serde::Deserialize;
use serde_json::{json, Value};

fn role_json(r: &parley_db::roles::RoleRow) -> Value {
    json!({
        "id": r.id.to_string(),
        "server_id": r.server_id.to_string(),
        "name": r.name,
        "priority": r.priority,
        "color": r.color,
        "permissions": r.permissions(),
        "is_default": r.is_default,
    })
}

#[derive(Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub permissions: PermissionMap,
}

pub async fn list_roles(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let roles = parley_db::roles::list_roles_for_server(&state.db, server_id).await?;
    Ok(Json(json!(roles.iter().map(role_json).collect::<Vec<_>>())))
}

pub async fn create_role(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(server_id): Path<i64>,
    Json(body): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("role name must not be empty".into()));
    }
    parley_db::servers::get_server(&state.db, server_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let id = parley_util::snowflake::generate(1);
    let role = parley_db::roles::create_role(
        &state.db,
        id,
        server_id,
        &body.name,
        body.priority,
        &body.permissions,
        false,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(role_json(&role))))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub permissions: Option<PermissionMap>,
}

/// A role/override write can change what any currently-connected member of
/// this server is allowed to do, so every cached permission entry for the
/// server's members is invalidated rather than tracking which users were
/// actually affected (mirrors `AppState::invalidate_permissions_for`'s
/// whole-user granularity, just scoped out to "the whole server" here since
/// this REST path doesn't know the member list ahead of a role's priority
/// change rippling through overrides).
async fn invalidate_server_permissions(state: &AppState, server_id: i64) {
    if let Ok(members) = parley_db::members::list_members(&state.db, server_id).await {
        for member in members {
            state.invalidate_permissions_for(member.user_id);
        }
    }
}

pub async fn update_role(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(role_id): Path<i64>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    let role = parley_db::roles::update_role(
        &state.db,
        role_id,
        body.name.as_deref(),
        body.priority,
        body.color.as_deref(),
        body.permissions.as_ref(),
    )
    .await?;

    invalidate_server_permissions(&state, role.server_id).await;

    Ok(Json(role_json(&role)))
}

pub async fn delete_role(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(role_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let role = parley_db::roles::get_role(&state.db, role_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if role.is_default {
        return Err(ApiError::Conflict("the default role cannot be deleted".into()));
    }
    parley_db::roles::delete_role(&state.db, role_id).await?;
    invalidate_server_permissions(&state, role.server_id).await;
    Ok(StatusCode::NO_CONTENT)
}
