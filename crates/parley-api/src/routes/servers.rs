//! Server CRUD REST routes (§6: write effects feed `server-updated`).
//! Grounded on the teacher's `paracord-api::routes::guilds`, narrowed to
//! this system's single-default-server model (§3 invariant: exactly one
//! default server after bootstrap) — there is no create/delete route here,
//! only the update a deployment's single server supports.

use crate::error::ApiError;
use crate::middleware::AdminGuard;
use axum::extract::{Path, State};
use axum::Json;
use parley_core::AppState;
use parley_models::ws::ServerMessage;
use parley_util::validation::{is_nonempty_trimmed, MAX_SERVER_NAME_LEN};
use serde::Deserialize;
use serde_json::{json, Value};

fn server_json(s: &parley_db::servers::ServerRow) -> Value {
    json!({
        "id": s.id.to_string(),
        "name": s.name,
        "description": s.description,
        "icon_ref": s.icon_ref,
        "max_users": s.max_users,
        "max_webcam_producers": s.max_webcam_producers,
        "max_screen_producers": s.max_screen_producers,
        "created_at": s.created_at.to_rfc3339(),
    })
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let server = parley_db::servers::get_server(&state.db, server_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(server_json(&server)))
}

#[derive(Deserialize)]
pub struct UpdateServerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_users: Option<i64>,
    #[serde(default)]
    pub max_webcam_producers: Option<i64>,
    #[serde(default)]
    pub max_screen_producers: Option<i64>,
}

pub async fn update_server(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(server_id): Path<i64>,
    Json(body): Json<UpdateServerRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(name) = &body.name {
        if !is_nonempty_trimmed(name, MAX_SERVER_NAME_LEN) {
            return Err(ApiError::BadRequest("invalid server name".into()));
        }
    }
    let server = parley_db::servers::update_server(
        &state.db,
        server_id,
        body.name.as_deref(),
        body.description.as_deref(),
        body.max_users,
        body.max_webcam_producers,
        body.max_screen_producers,
    )
    .await?;

    state.event_bus.to_server(
        server.id,
        None,
        ServerMessage::ServerUpdated {
            server_id: server.id,
            name: server.name.clone(),
            description: server.description.clone(),
        },
    );

    Ok(Json(server_json(&server)))
}
