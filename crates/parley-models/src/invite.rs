use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// (§3 "Invite token")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteToken {
    pub id: i64,
    pub server_id: i64,
    pub token: String,
    pub max_uses: Option<i32>,
    pub uses: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub server_address: String,
    pub created_at: DateTime<Utc>,
}

/// (§3 "Session credential", §4.4) issued by invite redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredential {
    pub id: i64,
    pub server_id: i64,
    pub user_public_key: Option<String>,
    pub credential_hash: String,
    pub invite_token_id: i64,
    pub created_at: DateTime<Utc>,
    pub bound_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    pub fn is_bound(&self) -> bool {
        self.user_public_key.is_some()
    }
}
