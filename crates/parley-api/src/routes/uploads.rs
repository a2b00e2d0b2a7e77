//! Avatar/icon upload routes (§6: "≤2 MiB, mime in {png,jpeg,webp,gif};
//! store under `<dataDir>/avatars/<userId>.<ext>` /
//! `<dataDir>/icons/<serverId>.<ext>`"). Grounded on the teacher's
//! `paracord-api::routes::files::upload_file` multipart-extraction shape,
//! narrowed to the single-field avatar/icon case and backed by
//! `parley_media::LocalStorage` instead of the teacher's pluggable
//! attachment storage backend.

use crate::error::ApiError;
use crate::middleware::AdminGuard;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use parley_core::AppState;
use parley_media::{Storage, UploadKind};
use serde_json::{json, Value};

async fn take_single_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .ok_or_else(|| ApiError::BadRequest("no file provided".into()))?;
    let mime = field
        .content_type()
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("missing content-type".into()))?;
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((mime, data.to_vec()))
}

/// POST `/api/users/:userId/avatar` (admin).
pub async fn upload_avatar(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(user_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    parley_db::users::get_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let (mime, data) = take_single_field(&mut multipart).await?;
    let stored = state
        .storage
        .store_upload(UploadKind::Avatar, user_id, &mime, &data)
        .await?;
    parley_db::users::set_avatar_ref(&state.db, user_id, &stored.relative_path).await?;

    Ok(Json(json!({ "avatar_ref": stored.relative_path })))
}

/// POST `/api/servers/:serverId/icon` (admin).
pub async fn upload_icon(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(server_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    parley_db::servers::get_server(&state.db, server_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let (mime, data) = take_single_field(&mut multipart).await?;
    let stored = state
        .storage
        .store_upload(UploadKind::Icon, server_id, &mime, &data)
        .await?;
    let server = parley_db::servers::set_icon_ref(&state.db, server_id, &stored.relative_path).await?;

    state.event_bus.to_server(
        server_id,
        None,
        parley_models::ws::ServerMessage::ServerUpdated {
            server_id: server.id,
            name: server.name.clone(),
            description: server.description.clone(),
        },
    );

    Ok(Json(json!({ "icon_ref": stored.relative_path })))
}
