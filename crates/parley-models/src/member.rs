use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// (userId, serverId) enrollment (§3 "Server-member"). Created on first join,
/// removed only via admin action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMember {
    pub user_id: i64,
    pub server_id: i64,
    pub joined_nickname: String,
    pub joined_at: DateTime<Utc>,
}

/// (userId, serverId, roleId) assignment (§3 "Member-role").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemberRole {
    pub user_id: i64,
    pub server_id: i64,
    pub role_id: i64,
}
