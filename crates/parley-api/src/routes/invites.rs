//! Invite mint/lookup/redeem REST routes (§6, §4.4). Grounded on the
//! teacher's `paracord-api::routes::invites`, swapped from guild/channel
//! invites with JWT-authenticated minting to server-wide invites minted
//! under the single shared admin token.

use crate::error::ApiError;
use crate::middleware::AdminGuard;
use crate::remote_key;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use parley_core::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

#[derive(Deserialize)]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub max_uses: Option<i32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST `/api/servers/:serverId/invites` (admin): mint invite.
pub async fn create_invite(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Path(server_id): Path<i64>,
    Json(body): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    parley_db::servers::get_server(&state.db, server_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let invite = parley_core::invites::mint_invite(
        &state.db,
        server_id,
        body.max_uses,
        body.expires_at,
        &state.public_address,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": invite.token,
            "server_id": invite.server_id.to_string(),
            "max_uses": invite.max_uses,
            "uses": invite.uses,
            "expires_at": invite.expires_at,
            "created_at": invite.created_at.to_rfc3339(),
        })),
    ))
}

/// GET `/api/invites/:token`: fetch invite metadata.
pub async fn get_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let invite = parley_core::invites::get_invite(&state.db, &token)
        .await?
        .ok_or(ApiError::NotFound)?;
    let server = parley_db::servers::get_server(&state.db, invite.server_id).await?;

    Ok(Json(json!({
        "token": invite.token,
        "server": server.map(|s| json!({
            "id": s.id.to_string(),
            "name": s.name,
        })),
        // re-emitted from the stored row, not recomputed from the request.
        "server_address": invite.server_address,
        "uses": invite.uses,
        "max_uses": invite.max_uses,
        "expires_at": invite.expires_at,
    })))
}

#[derive(Deserialize)]
pub struct RedeemInviteRequest {
    pub token: String,
}

/// POST `/api/invites/redeem`: redeem → opaque credential. Public, but
/// gated by `state.redeem_limiter`.
pub async fn redeem_invite(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<RedeemInviteRequest>,
) -> Result<Json<Value>, ApiError> {
    let key = remote_key(state.trust_proxy, &headers, addr);
    if !state.redeem_limiter.check(&key) {
        return Err(ApiError::RateLimited);
    }

    let redeemed = parley_core::invites::redeem_invite(&state.db, &body.token)
        .await?
        .ok_or_else(|| ApiError::BadRequest("invite exhausted, expired, or unknown".into()))?;

    Ok(Json(json!({
        "credential": redeemed.plaintext,
    })))
}
