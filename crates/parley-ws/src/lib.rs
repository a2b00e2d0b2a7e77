//! The signaling hub (§4.1): the WebSocket connection's protocol state
//! machine lives in `connection`, per-message handling in `dispatch`.
//!
//! Grounded on the teacher's `paracord-ws::{gateway_router, ws_upgrade}`
//! shape, with the route renamed from `/gateway` to `/ws` and a trust-proxy
//! aware remote-address resolution added ahead of the upgrade (§6 `trustProxy`).

mod connection;
mod dispatch;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use parley_core::AppState;
use std::net::SocketAddr;

/// Maximum WebSocket frame payload (§6 "JSON frames on path `/ws`, maximum
/// payload 4 MiB").
const MAX_WS_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let remote_key = connection::remote_key(state.trust_proxy, &headers, addr);
    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| connection::handle_connection(socket, state, remote_key))
}
