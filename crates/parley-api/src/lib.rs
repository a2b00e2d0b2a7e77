use axum::{
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use parley_core::AppState;
use serde_json::json;
use std::net::SocketAddr;

pub mod error;
pub mod middleware;
pub mod routes;

/// Resolves the key a REST rate limiter uses for a request (§6 `trustProxy`).
/// Mirrors `parley-ws::connection::remote_key`'s header-vs-socket-address
/// choice; kept as its own copy here since `parley-api` has no dependency on
/// `parley-ws` (the two crates sit at the same layer, not one atop the
/// other).
pub(crate) fn remote_key(trust_proxy: bool, headers: &HeaderMap, addr: SocketAddr) -> String {
    if trust_proxy {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return forwarded.to_string();
        }
    }
    addr.ip().to_string()
}

/// The REST surface named in §6 ("effects documented; routing out of
/// scope" in the signaling hub spec, but the routes themselves still need
/// to exist somewhere to produce those effects). Grounded on the teacher's
/// `paracord-api::build_router` table shape, pared to the five endpoint
/// groups §6 actually names: invites, uploads, and server/channel/role CRUD.
pub fn build_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        .route("/health", get(health))
        .route("/api/servers/{server_id}/invites", post(routes::invites::create_invite))
        .route("/api/invites/{token}", get(routes::invites::get_invite))
        .route("/api/invites/redeem", post(routes::invites::redeem_invite))
        .route("/api/users/{user_id}/avatar", post(routes::uploads::upload_avatar))
        .route("/api/servers/{server_id}/icon", post(routes::uploads::upload_icon))
        .route(
            "/api/servers/{server_id}",
            get(routes::servers::get_server).patch(routes::servers::update_server),
        )
        .route(
            "/api/servers/{server_id}/channels",
            get(routes::channels::list_channels).post(routes::channels::create_channel),
        )
        .route(
            "/api/channels/{channel_id}",
            patch(routes::channels::update_channel).delete(routes::channels::delete_channel),
        )
        .route(
            "/api/servers/{server_id}/roles",
            get(routes::roles::list_roles).post(routes::roles::create_role),
        )
        .route(
            "/api/roles/{role_id}",
            patch(routes::roles::update_role).delete(routes::roles::delete_role),
        )
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    // Self-hosted, desktop/web clients of all origins; no cookie-based auth
    // exists for this surface to protect (admin auth is a bearer-style
    // shared token, not a cookie), matching the teacher's rationale for its
    // own wide-open CORS layer.
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok", "service": "parley" })))
}
