use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel in a server's channel forest (§3 "Channel").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub server_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
    /// 0 = unlimited.
    pub max_users: i32,
    /// Reserved for future power-level gating; not consulted by the
    /// permission engine today (see DESIGN.md).
    pub join_power: i32,
    pub talk_power: i32,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_CHANNEL_NAMES: [&str; 3] = ["Lobby", "General", "AFK"];
