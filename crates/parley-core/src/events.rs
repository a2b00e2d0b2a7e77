//! Thin broadcast-taxonomy façade (§4.6) over the session registry. Kept
//! separate from `registry` so both `parley-ws` (which drives the protocol
//! state machine) and `parley-api` (whose REST-effect handlers only ever
//! need to *announce* a change, never read connection internals) share one
//! vocabulary for "who gets told about this".

use crate::observability;
use crate::registry::SessionRegistry;
use parley_models::ws::ServerMessage;
use std::sync::Arc;

#[derive(Clone)]
pub struct EventBus {
    registry: Arc<SessionRegistry>,
}

impl EventBus {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Channel-scoped broadcast (§4.6), e.g. `user-joined-channel`,
    /// `new-producer`, `producer-closed`, `speaking`, `chat`.
    pub fn to_channel(&self, channel_id: i64, exclude: Option<i64>, message: ServerMessage) {
        self.trace("channel", channel_id, &message);
        self.registry.broadcast_channel(channel_id, exclude, &message);
    }

    /// Server-scoped broadcast (§4.6), e.g. `user-updated`, `role-assigned`,
    /// `channel-created`, `server-updated`.
    pub fn to_server(&self, server_id: i64, exclude: Option<i64>, message: ServerMessage) {
        self.trace("server", server_id, &message);
        self.registry.broadcast_server(server_id, exclude, &message);
    }

    /// Directed send (§4.6), e.g. `user-kicked`, `user-banned`,
    /// `permissions-updated`, unicast E2EE relay frames.
    pub fn to_user(&self, user_id: i64, message: ServerMessage) -> bool {
        self.trace("user", user_id, &message);
        self.registry.send_to(user_id, message)
    }

    fn trace(&self, scope: &str, scope_id: i64, message: &ServerMessage) {
        if observability::wire_trace_enabled() {
            let kind = serde_json::to_value(message)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_string)))
                .unwrap_or_else(|| "unknown".to_string());
            tracing::trace!(target: "wire", scope, scope_id, kind, "event_bus_dispatch");
        }
    }
}
