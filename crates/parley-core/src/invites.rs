//! Invite & credential service (C4, §4.4): mint invite tokens, atomically
//! redeem them into unbound credentials, and bind a credential to an
//! identity on first WS auth.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use parley_db::invites::{self, InviteTokenRow, SessionCredentialRow};
use parley_db::DbPool;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn hash_credential(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    digest.iter().fold(String::with_capacity(digest.len() * 2), |mut out, b| {
        out.push_str(&format!("{:02x}", b));
        out
    })
}

pub async fn mint_invite(
    pool: &DbPool,
    server_id: i64,
    max_uses: Option<i32>,
    expires_at: Option<DateTime<Utc>>,
    server_address: &str,
) -> Result<InviteTokenRow, CoreError> {
    let id = parley_util::snowflake::generate(1);
    let token = random_token(24);
    let row = invites::create_invite(pool, id, server_id, &token, max_uses, expires_at, server_address)
        .await?;
    Ok(row)
}

pub async fn get_invite(pool: &DbPool, token: &str) -> Result<Option<InviteTokenRow>, CoreError> {
    Ok(invites::get_invite_by_token(pool, token).await?)
}

/// Redemption result: the plaintext credential is handed back to the caller
/// exactly once and never persisted (§4.4).
pub struct RedeemedCredential {
    pub credential_id: i64,
    pub plaintext: String,
}

/// §4.4 "Redeem invite": atomically increments `uses`; on success mints an
/// unbound session credential and returns the one-time plaintext secret.
pub async fn redeem_invite(
    pool: &DbPool,
    token: &str,
) -> Result<Option<RedeemedCredential>, CoreError> {
    let Some(invite) = invites::redeem_invite_atomic(pool, token).await? else {
        return Ok(None);
    };

    let plaintext = random_token(32);
    let hash = hash_credential(&plaintext);
    let credential_id = parley_util::snowflake::generate(1);
    invites::create_credential(pool, credential_id, invite.server_id, &hash, invite.id).await?;

    Ok(Some(RedeemedCredential {
        credential_id,
        plaintext,
    }))
}

#[derive(Debug, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    Rejected,
}

/// §4.4 "Bind on first WS auth": the atomic bind, with the lost-race
/// re-read and the already-bound same/different-identity checks.
pub async fn bind_credential(
    pool: &DbPool,
    server_id: i64,
    credential: &str,
    public_key: &str,
) -> Result<BindOutcome, CoreError> {
    let hash = hash_credential(credential);
    let Some(row) = invites::find_active_credential(pool, server_id, &hash).await? else {
        return Ok(BindOutcome::Rejected);
    };

    if row.user_public_key.is_none() {
        if invites::bind_credential_atomic(pool, row.id, public_key).await? {
            return Ok(BindOutcome::Bound);
        }
        // Lost the race to a concurrent bind; re-read and accept only if
        // the winner bound the same identity we presented.
        let reread = invites::get_credential(pool, row.id).await?;
        return Ok(match reread.and_then(|r| r.user_public_key) {
            Some(bound_key) if bound_key == public_key => BindOutcome::Bound,
            _ => BindOutcome::Rejected,
        });
    }

    match row.user_public_key.as_deref() {
        Some(existing) if existing == public_key => Ok(BindOutcome::Bound),
        _ => Ok(BindOutcome::Rejected),
    }
}

pub async fn revoke_credential(pool: &DbPool, id: i64) -> Result<(), CoreError> {
    Ok(invites::revoke_credential(pool, id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> DbPool {
        let pool = parley_db::create_pool(":memory:").await.unwrap();
        parley_db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn redeem_respects_max_uses() {
        let pool = memory_pool().await;
        parley_db::servers::create_server(&pool, 1, "S", None).await.unwrap();
        let invite = mint_invite(&pool, 1, Some(1), None, "ws://localhost").await.unwrap();

        let first = redeem_invite(&pool, &invite.token).await.unwrap();
        assert!(first.is_some());
        let second = redeem_invite(&pool, &invite.token).await.unwrap();
        assert!(second.is_none(), "a second redemption past max_uses must fail");
    }

    #[tokio::test]
    async fn bind_then_reject_other_identity_then_accept_same() {
        let pool = memory_pool().await;
        parley_db::servers::create_server(&pool, 1, "S", None).await.unwrap();
        let invite = mint_invite(&pool, 1, Some(1), None, "ws://localhost").await.unwrap();
        let redeemed = redeem_invite(&pool, &invite.token).await.unwrap().unwrap();

        let first_bind = bind_credential(&pool, 1, &redeemed.plaintext, "0xB").await.unwrap();
        assert_eq!(first_bind, BindOutcome::Bound);

        let other_identity = bind_credential(&pool, 1, &redeemed.plaintext, "0xC").await.unwrap();
        assert_eq!(other_identity, BindOutcome::Rejected);

        let same_identity = bind_credential(&pool, 1, &redeemed.plaintext, "0xB").await.unwrap();
        assert_eq!(same_identity, BindOutcome::Bound);
    }

    #[tokio::test]
    async fn unknown_credential_is_rejected() {
        let pool = memory_pool().await;
        parley_db::servers::create_server(&pool, 1, "S", None).await.unwrap();
        let outcome = bind_credential(&pool, 1, "not-a-real-credential", "0xZ").await.unwrap();
        assert_eq!(outcome, BindOutcome::Rejected);
    }

    /// §8 scenario S5: 10 genuinely parallel redemptions against one
    /// `max_uses=1` invite must leave exactly one winner. The atomic
    /// `UPDATE ... WHERE uses < max_uses` in `redeem_invite_atomic` is what
    /// makes this hold; a non-atomic read-then-write would let more than one
    /// task observe `uses < max_uses` before either commits.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ten_parallel_redemptions_against_max_uses_one_yield_exactly_one_winner() {
        let pool = memory_pool().await;
        parley_db::servers::create_server(&pool, 1, "S", None).await.unwrap();
        let invite = mint_invite(&pool, 1, Some(1), None, "ws://localhost").await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pool = pool.clone();
                let token = invite.token.clone();
                tokio::spawn(async move { redeem_invite(&pool, &token).await.unwrap() })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1, "exactly one of 10 parallel redemptions must win a max_uses=1 invite");
    }
}
