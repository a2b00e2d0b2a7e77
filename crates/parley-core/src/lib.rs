pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod invites;
pub mod observability;
pub mod permissions;
pub mod ratelimit;
pub mod registry;

use events::EventBus;
use parley_db::DbPool;
use parley_media::{LocalStorage, MediaBroker};
use parley_models::permissions::EffectivePermissions;
use ratelimit::PreAuthLimiter;
use registry::SessionRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Cache key for computed effective permissions: `(user_id, scope_channel_id)`.
/// `scope_channel_id` is the channel the caller is currently attached to, or
/// the server id itself when no channel is in scope (§4.2).
pub type PermissionCacheKey = (i64, i64);

/// Mirrors the teacher's `paracord_core::build_permission_cache`: a short-TTL
/// cache in front of the (database-backed) permission engine, invalidated by
/// wall-clock expiry rather than explicit bust-on-write, since role/override
/// edits are rare relative to reads.
pub fn build_permission_cache() -> moka::future::Cache<PermissionCacheKey, EffectivePermissions> {
    moka::future::Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(30))
        .build()
}

/// Everything a connection handler (`parley-ws`) or REST effect handler
/// (`parley-api`) needs to serve a request. One instance is shared (via
/// `Arc`, itself already cheap to clone since every field is) across both
/// crates and the heartbeat/admin-bootstrap background tasks, the same shape
/// as the teacher's `paracord_core::AppState`.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: EventBus,
    pub media: Arc<MediaBroker>,
    pub storage: Arc<LocalStorage>,
    pub permission_cache: moka::future::Cache<PermissionCacheKey, EffectivePermissions>,
    pub pre_auth_limiter: Arc<PreAuthLimiter>,
    pub redeem_limiter: Arc<PreAuthLimiter>,
    pub admin_token: Option<String>,
    pub open_admin: bool,
    /// §6 `trustProxy`: use `X-Forwarded-For` instead of the socket address
    /// for pre-auth rate-limiter keying.
    pub trust_proxy: bool,
    pub data_dir: PathBuf,
    /// Hint handed back as `serverAddress` when minting an invite (§4.4);
    /// clients re-fetch the canonical value from `GET /api/invites/:token`
    /// rather than trusting this past the first mint.
    pub public_address: String,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        data_dir: PathBuf,
        admin_token: Option<String>,
        open_admin: bool,
        trust_proxy: bool,
        public_address: String,
    ) -> Self {
        Self {
            db,
            event_bus: EventBus::new(Arc::new(SessionRegistry::new())),
            media: Arc::new(MediaBroker::new()),
            storage: Arc::new(LocalStorage::new(data_dir.clone())),
            permission_cache: build_permission_cache(),
            pre_auth_limiter: Arc::new(PreAuthLimiter::for_auth()),
            redeem_limiter: Arc::new(ratelimit::redeem_limiter()),
            admin_token,
            open_admin,
            trust_proxy,
            data_dir,
            public_address,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Resolves cached effective permissions, falling back to the engine and
    /// populating the cache on miss (§4.2). `scope_id` is the channel id when
    /// scoped, else the server id.
    pub async fn effective_permissions(
        &self,
        user_id: i64,
        server_id: i64,
        channel_id: Option<i64>,
    ) -> Result<EffectivePermissions, error::CoreError> {
        let scope_id = channel_id.unwrap_or(server_id);
        let key = (user_id, scope_id);
        if let Some(cached) = self.permission_cache.get(&key).await {
            return Ok(cached);
        }
        let computed =
            permissions::compute_effective_permissions(&self.db, user_id, server_id, channel_id)
                .await?;
        self.permission_cache.insert(key, computed.clone()).await;
        Ok(computed)
    }

    /// Invalidate every cached permission entry for a user (role/override
    /// change); cheap relative to scanning which scopes were affected.
    pub fn invalidate_permissions_for(&self, user_id: i64) {
        self.permission_cache
            .invalidate_entries_if(move |(uid, _), _| *uid == user_id)
            .ok();
    }
}
