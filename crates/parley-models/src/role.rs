use crate::permissions::PermissionMap;
use serde::{Deserialize, Serialize};

/// Server-scoped role (§3 "Role").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub priority: i32,
    pub color: Option<String>,
    pub permissions: PermissionMap,
    pub is_default: bool,
}

/// (channelId, roleId, partial permissions) override applied during
/// resolution (§4.2 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPermissionOverride {
    pub channel_id: i64,
    pub role_id: i64,
    pub permissions: PermissionMap,
}

pub const DEFAULT_ROLE_NAMES: [&str; 3] = ["Admin", "Member", "Guest"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSummary {
    #[serde(with = "parley_util::wire_id")]
    pub id: i64,
    pub name: String,
    pub priority: i32,
    pub color: Option<String>,
    pub is_default: bool,
}

impl From<&Role> for RoleSummary {
    fn from(r: &Role) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            priority: r.priority,
            color: r.color.clone(),
            is_default: r.is_default,
        }
    }
}
