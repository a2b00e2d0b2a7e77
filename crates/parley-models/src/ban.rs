use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// (§3 "Ban"). Expired bans are lazily purged on check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ban {
    pub id: i64,
    pub server_id: i64,
    pub user_id: i64,
    pub banned_by: i64,
    pub reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ban {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}
