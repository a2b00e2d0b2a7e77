use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InviteTokenRow {
    pub id: i64,
    pub server_id: i64,
    pub token: String,
    pub max_uses: Option<i64>,
    pub uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub server_address: String,
    pub created_at: DateTime<Utc>,
}

const INVITE_COLUMNS: &str =
    "id, server_id, token, max_uses, uses, expires_at, server_address, created_at";

pub async fn create_invite(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    token: &str,
    max_uses: Option<i32>,
    expires_at: Option<DateTime<Utc>>,
    server_address: &str,
) -> Result<InviteTokenRow, DbError> {
    let row = sqlx::query_as::<_, InviteTokenRow>(&format!(
        "INSERT INTO invite_tokens (id, server_id, token, max_uses, expires_at, server_address) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {INVITE_COLUMNS}"
    ))
    .bind(id)
    .bind(server_id)
    .bind(token)
    .bind(max_uses)
    .bind(expires_at)
    .bind(server_address)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_invite_by_token(
    pool: &DbPool,
    token: &str,
) -> Result<Option<InviteTokenRow>, DbError> {
    let row = sqlx::query_as::<_, InviteTokenRow>(&format!(
        "SELECT {INVITE_COLUMNS} FROM invite_tokens WHERE token = ?1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Atomically increments `uses` iff the invite is still within its use
/// count and not expired (§4.4 "Redeem invite"). Returns `None` if the
/// `UPDATE` affected zero rows — the caller must treat that as redemption
/// failure, never retry-as-success.
pub async fn redeem_invite_atomic(
    pool: &DbPool,
    token: &str,
) -> Result<Option<InviteTokenRow>, DbError> {
    let row = sqlx::query_as::<_, InviteTokenRow>(&format!(
        "UPDATE invite_tokens SET uses = uses + 1 \
         WHERE token = ?1 \
           AND (max_uses IS NULL OR uses < max_uses) \
           AND (expires_at IS NULL OR expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')) \
         RETURNING {INVITE_COLUMNS}"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionCredentialRow {
    pub id: i64,
    pub server_id: i64,
    pub user_public_key: Option<String>,
    pub credential_hash: String,
    pub invite_token_id: i64,
    pub created_at: DateTime<Utc>,
    pub bound_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

const CREDENTIAL_COLUMNS: &str = "id, server_id, user_public_key, credential_hash, \
     invite_token_id, created_at, bound_at, revoked_at";

pub async fn create_credential(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    credential_hash: &str,
    invite_token_id: i64,
) -> Result<SessionCredentialRow, DbError> {
    let row = sqlx::query_as::<_, SessionCredentialRow>(&format!(
        "INSERT INTO session_credentials (id, server_id, credential_hash, invite_token_id) \
         VALUES (?1, ?2, ?3, ?4) RETURNING {CREDENTIAL_COLUMNS}"
    ))
    .bind(id)
    .bind(server_id)
    .bind(credential_hash)
    .bind(invite_token_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Active (non-revoked) credential row for (hash, server), if any.
pub async fn find_active_credential(
    pool: &DbPool,
    server_id: i64,
    credential_hash: &str,
) -> Result<Option<SessionCredentialRow>, DbError> {
    let row = sqlx::query_as::<_, SessionCredentialRow>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM session_credentials \
         WHERE server_id = ?1 AND credential_hash = ?2 AND revoked_at IS NULL"
    ))
    .bind(server_id)
    .bind(credential_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_credential(
    pool: &DbPool,
    id: i64,
) -> Result<Option<SessionCredentialRow>, DbError> {
    let row = sqlx::query_as::<_, SessionCredentialRow>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM session_credentials WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Atomically binds an unbound credential to `public_key` (§4.4 "Bind on
/// first WS auth"). Returns `true` iff this call performed the bind; `false`
/// means zero rows changed (already bound, or lost the race — the caller
/// re-reads the row to decide same-identity vs. theft).
pub async fn bind_credential_atomic(
    pool: &DbPool,
    id: i64,
    public_key: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE session_credentials \
         SET user_public_key = ?2, bound_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE id = ?1 AND user_public_key IS NULL",
    )
    .bind(id)
    .bind(public_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn revoke_credential(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE session_credentials SET revoked_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE id = ?1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
