//! Session registry (C6, §3 "Live connection", §4.6 broadcast taxonomy).
//!
//! The signaling hub exclusively owns this table; `parley-core` only defines
//! the shape so it can be shared between `parley-ws` (the sole writer) and
//! `parley-api` (read-only, for REST-effect broadcasts such as
//! `channel-created`/`server-updated`). Outbound frames are delivered over an
//! `mpsc` channel so this crate never depends on the WebSocket transport.

use crate::ratelimit::ConnectionRateLimiter;
use dashmap::{DashMap, DashSet};
use parley_models::ws::ServerMessage;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// Per-connection live state (§3 "Live connection (in-memory only)").
pub struct LiveConnection {
    pub user_id: i64,
    pub nickname: RwLock<String>,
    pub server_id: i64,
    pub channel_id: RwLock<Option<i64>>,
    pub is_muted: AtomicBool,
    pub is_deafened: AtomicBool,
    /// Ephemeral admin (connection-scoped privilege bypass, §4.1/GLOSSARY);
    /// never persisted as a role.
    pub is_admin: AtomicBool,
    pub public_key: Option<String>,
    pub rtp_capabilities: RwLock<Option<Value>>,
    pub rate_limiter: ConnectionRateLimiter,
    /// Flipped false by the heartbeat sweep when a pong is missed; flipped
    /// true whenever a pong is observed (§4.1 "Heartbeat").
    pub alive: AtomicBool,
    sender: UnboundedSender<ServerMessage>,
    /// Signaled to force this connection's task to close its socket and run
    /// disconnect cleanup — used for kick/ban and single-session displacement
    /// (§4.1 "the prior session is disconnected first").
    close: Notify,
}

impl LiveConnection {
    pub fn new(
        user_id: i64,
        nickname: String,
        server_id: i64,
        public_key: Option<String>,
        is_admin: bool,
        sender: UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            user_id,
            nickname: RwLock::new(nickname),
            server_id,
            channel_id: RwLock::new(None),
            is_muted: AtomicBool::new(false),
            is_deafened: AtomicBool::new(false),
            is_admin: AtomicBool::new(is_admin),
            public_key,
            rtp_capabilities: RwLock::new(None),
            rate_limiter: ConnectionRateLimiter::new(),
            alive: AtomicBool::new(true),
            sender,
            close: Notify::new(),
        }
    }

    /// Wakes (or pre-arms, if called before the task is waiting) the
    /// connection's `wait_for_close()` loop.
    pub fn request_close(&self) {
        self.close.notify_one();
    }

    pub async fn wait_for_close(&self) {
        self.close.notified().await;
    }

    pub fn channel_id(&self) -> Option<i64> {
        *self.channel_id.read().unwrap()
    }

    pub fn set_channel_id(&self, channel_id: Option<i64>) {
        *self.channel_id.write().unwrap() = channel_id;
    }

    pub fn nickname(&self) -> String {
        self.nickname.read().unwrap().clone()
    }

    /// Best-effort send; a closed socket is silently skipped (§4.6 "A
    /// single send failure does not abort fan-out").
    pub fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message);
    }
}

/// In-memory table of live connections keyed by user id, with secondary
/// indices by server and channel for O(scope) broadcast (§3, §4.6).
#[derive(Default)]
pub struct SessionRegistry {
    by_user: DashMap<i64, Arc<LiveConnection>>,
    by_server: DashMap<i64, DashSet<i64>>,
    by_channel: DashMap<i64, DashSet<i64>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection, first removing any prior live connection for
    /// the same user (single-session-per-identity invariant, §4.1). Returns
    /// the displaced connection, if any, so the caller can disconnect it.
    pub fn insert(&self, conn: Arc<LiveConnection>) -> Option<Arc<LiveConnection>> {
        let previous = self.remove(conn.user_id);
        self.by_server
            .entry(conn.server_id)
            .or_default()
            .insert(conn.user_id);
        self.by_user.insert(conn.user_id, conn);
        previous
    }

    pub fn get(&self, user_id: i64) -> Option<Arc<LiveConnection>> {
        self.by_user.get(&user_id).map(|e| e.value().clone())
    }

    /// Moves a connection's channel membership in the secondary index. Must
    /// be called by the connection's owning task alongside
    /// `LiveConnection::set_channel_id` (§5 "only the owning connection's
    /// message-handling task mutates channelId").
    pub fn set_channel(&self, user_id: i64, channel_id: Option<i64>) {
        if let Some(conn) = self.get(user_id) {
            if let Some(previous) = conn.channel_id() {
                if let Some(set) = self.by_channel.get(&previous) {
                    set.remove(&user_id);
                }
            }
            conn.set_channel_id(channel_id);
            if let Some(new_channel) = channel_id {
                self.by_channel.entry(new_channel).or_default().insert(user_id);
            }
        }
    }

    pub fn remove(&self, user_id: i64) -> Option<Arc<LiveConnection>> {
        let removed = self.by_user.remove(&user_id).map(|(_, v)| v);
        if let Some(conn) = &removed {
            if let Some(set) = self.by_server.get(&conn.server_id) {
                set.remove(&user_id);
            }
            if let Some(channel_id) = conn.channel_id() {
                if let Some(set) = self.by_channel.get(&channel_id) {
                    set.remove(&user_id);
                }
            }
        }
        removed
    }

    /// Snapshot of the target set before emitting, so broadcasts never hold
    /// a lock across network I/O (§5 "Ordering guarantees").
    fn snapshot(ids: &DashSet<i64>) -> Vec<i64> {
        ids.iter().map(|id| *id).collect()
    }

    pub fn channel_members(&self, channel_id: i64) -> Vec<i64> {
        self.by_channel
            .get(&channel_id)
            .map(|s| Self::snapshot(&s))
            .unwrap_or_default()
    }

    pub fn server_members(&self, server_id: i64) -> Vec<i64> {
        self.by_server
            .get(&server_id)
            .map(|s| Self::snapshot(&s))
            .unwrap_or_default()
    }

    /// Channel-scoped broadcast (§4.6). `exclude` is typically the sender.
    pub fn broadcast_channel(&self, channel_id: i64, exclude: Option<i64>, message: &ServerMessage)
    where
        ServerMessage: Clone,
    {
        for user_id in self.channel_members(channel_id) {
            if Some(user_id) == exclude {
                continue;
            }
            if let Some(conn) = self.get(user_id) {
                conn.send(message.clone());
            }
        }
    }

    /// Server-scoped broadcast (§4.6).
    pub fn broadcast_server(&self, server_id: i64, exclude: Option<i64>, message: &ServerMessage)
    where
        ServerMessage: Clone,
    {
        for user_id in self.server_members(server_id) {
            if Some(user_id) == exclude {
                continue;
            }
            if let Some(conn) = self.get(user_id) {
                conn.send(message.clone());
            }
        }
    }

    /// Directed send by user id (§4.6). Returns `false` if the target is
    /// not currently connected.
    pub fn send_to(&self, user_id: i64, message: ServerMessage) -> bool {
        match self.get(user_id) {
            Some(conn) => {
                conn.send(message);
                true
            }
            None => false,
        }
    }

    /// Total number of live connections, irrespective of scope.
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn all_user_ids(&self) -> Vec<i64> {
        self.by_user.iter().map(|e| *e.key()).collect()
    }
}

impl Clone for ServerMessage {
    fn clone(&self) -> Self {
        // `ServerMessage` only derives `Serialize` upstream (it is never
        // deserialized); fan-out needs to clone it per recipient, so we
        // round-trip through its JSON form rather than hand-deriving Clone
        // for a 25-variant enum full of nested payload types.
        let value = serde_json::to_value(self).expect("ServerMessage always serializes");
        serde_json::from_value(value).expect("ServerMessage JSON round-trips to itself")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_models::ws::ErrorCode;
    use tokio::sync::mpsc;

    fn connection(user_id: i64, server_id: i64) -> (Arc<LiveConnection>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(LiveConnection::new(
            user_id,
            format!("user-{user_id}"),
            server_id,
            None,
            false,
            tx,
        ));
        (conn, rx)
    }

    #[test]
    fn insert_disconnects_prior_session_for_same_user() {
        let registry = SessionRegistry::new();
        let (c1, _rx1) = connection(1, 10);
        let (c2, _rx2) = connection(1, 10);
        assert!(registry.insert(c1).is_none());
        let displaced = registry.insert(c2);
        assert!(displaced.is_some());
        assert_eq!(registry.len(), 1, "only one live connection per user id");
    }

    #[test]
    fn channel_broadcast_excludes_sender_and_skips_other_channels() {
        let registry = SessionRegistry::new();
        let (c1, mut rx1) = connection(1, 10);
        let (c2, mut rx2) = connection(2, 10);
        let (c3, mut rx3) = connection(3, 10);
        registry.insert(c1);
        registry.insert(c2);
        registry.insert(c3);
        registry.set_channel(1, Some(100));
        registry.set_channel(2, Some(100));
        registry.set_channel(3, Some(200));

        registry.broadcast_channel(
            100,
            Some(1),
            &ServerMessage::Speaking {
                user_id: 1,
                speaking: true,
            },
        );

        assert!(rx1.try_recv().is_err(), "sender is excluded");
        assert!(rx2.try_recv().is_ok(), "other channel member receives it");
        assert!(rx3.try_recv().is_err(), "member of a different channel does not");
    }

    #[test]
    fn send_to_missing_user_returns_false() {
        let registry = SessionRegistry::new();
        let sent = registry.send_to(
            999,
            ServerMessage::Error {
                code: ErrorCode::InternalError,
                message: "x".into(),
            },
        );
        assert!(!sent);
    }
}
