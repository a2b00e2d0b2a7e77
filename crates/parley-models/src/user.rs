use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stable identity (§3 "User"). Created on first auth, never deleted by
/// core logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nickname: String,
    /// Globally unique when present (unique index at the DB layer).
    pub public_key: Option<String>,
    pub avatar_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}
