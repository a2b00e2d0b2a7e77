use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level tenant (§3 "Server").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub icon_ref: Option<String>,
    pub max_users: i32,
    pub max_webcam_producers: i32,
    pub max_screen_producers: i32,
    /// Argon2 hash of the shared password, if one is configured. The
    /// plaintext is never persisted (§4.1 auth protocol verifies against
    /// this hash).
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_SERVER_NAME: &str = "Default Server";
pub const DEFAULT_MAX_WEBCAM_PRODUCERS: i32 = 0;
pub const DEFAULT_MAX_SCREEN_PRODUCERS: i32 = 0;
