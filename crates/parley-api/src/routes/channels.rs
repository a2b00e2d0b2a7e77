//! Channel CRUD REST routes (§6: "Server/channel/role CRUD endpoints whose
//! write effects feed the broadcasts `server-updated`, `channel-created`,
//! `channel-deleted`"). Grounded on the teacher's
//! `paracord-api::routes::channels`, generalized from guild text/voice
//! channels to this system's single-tree voice channels.

use crate::error::ApiError;
use crate::middleware::AdminGuard;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use parley_core::AppState;
use parley_models::ws::ServerMessage;
use parley_util::validation::{is_nonempty_trimmed, MAX_CHANNEL_NAME_LEN};
use serde::Deserialize;
use serde_json::{json, Value};

fn channel_json(c: &parley_db::channels::ChannelRow) -> Value {
    json!({
        "id": c.id.to_string(),
        "server_id": c.server_id.to_string(),
        "parent_id": c.parent_id.map(|id| id.to_string()),
        "name": c.name,
        "description": c.description,
        "position": c.position,
        "max_users": c.max_users,
        "is_default": c.is_default,
    })
}

fn summary(c: &parley_db::channels::ChannelRow) -> parley_models::ws::ChannelSummary {
    parley_models::ws::ChannelSummary {
        id: c.id,
        server_id: c.server_id,
        parent_id: c.parent_id,
        name: c.name.clone(),
        description: c.description.clone(),
        position: c.position as i32,
        max_users: c.max_users as i32,
        is_default: c.is_default,
    }
}

#[derive(Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub position: i32,
}

pub async fn list_channels(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let channels = parley_db::channels::list_channels_for_server(&state.db, server_id).await?;
    Ok(Json(json!(channels.iter().map(channel_json).collect::<Vec<_>>())))
}

pub async fn create_channel(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(server_id): Path<i64>,
    Json(body): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !is_nonempty_trimmed(&body.name, MAX_CHANNEL_NAME_LEN) {
        return Err(ApiError::BadRequest("invalid channel name".into()));
    }
    parley_db::servers::get_server(&state.db, server_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if let Some(parent_id) = body.parent_id {
        let parent = parley_db::channels::get_channel(&state.db, parent_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest("parent channel not found".into()))?;
        if parent.server_id != server_id {
            return Err(ApiError::BadRequest("parent channel belongs to a different server".into()));
        }
    }

    let id = parley_util::snowflake::generate(1);
    let channel = parley_db::channels::create_channel(
        &state.db,
        id,
        server_id,
        body.parent_id,
        &body.name,
        body.position,
        false,
    )
    .await?;

    state
        .event_bus
        .to_server(server_id, None, ServerMessage::ChannelCreated { channel: summary(&channel) });

    Ok((StatusCode::CREATED, Json(channel_json(&channel))))
}

#[derive(Deserialize)]
pub struct UpdateChannelRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub max_users: Option<i32>,
}

pub async fn update_channel(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(channel_id): Path<i64>,
    Json(body): Json<UpdateChannelRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(name) = &body.name {
        if !is_nonempty_trimmed(name, MAX_CHANNEL_NAME_LEN) {
            return Err(ApiError::BadRequest("invalid channel name".into()));
        }
    }
    let channel = parley_db::channels::update_channel(
        &state.db,
        channel_id,
        body.name.as_deref(),
        body.description.as_deref(),
        body.position,
        body.max_users,
    )
    .await?;

    // No `channel-updated` wire type exists (§6's type list is closed);
    // clients observe the new values the next time they join the server.

    Ok(Json(channel_json(&channel)))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(channel_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let channel = parley_db::channels::get_channel(&state.db, channel_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if channel.is_default {
        return Err(ApiError::Conflict("default channels are undeletable".into()));
    }
    parley_db::channels::delete_channel(&state.db, channel_id).await?;

    state
        .event_bus
        .to_server(channel.server_id, None, ServerMessage::ChannelDeleted { channel_id });

    Ok(StatusCode::NO_CONTENT)
}
