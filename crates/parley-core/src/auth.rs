//! Password hashing and admin-token comparison helpers used by the auth
//! protocol (§4.1) and the admin auth gate (C8, §4.1 "ephemeral-admin").
//!
//! Grounded on the teacher's argon2-based `hash_password`/`verify_password`
//! pair; `constant_time_eq` mirrors the admin-token comparison so a timing
//! side-channel never leaks how much of the token matched.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("internal error: {0}")]
    Internal(String),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Constant-time string comparison for the configured admin token (§4.1
/// "ephemeral-admin flag ... iff a valid admin token was presented", C8).
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Whether a presented admin token grants ephemeral admin / REST admin
/// access (C8, §6 `adminToken` config key).
pub fn admin_token_matches(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (Some(configured), Some(presented)) if !configured.is_empty() => {
            constant_time_eq(configured, presented)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips_through_hash_and_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn admin_token_requires_exact_match_and_nonempty_config() {
        assert!(admin_token_matches(Some("secret"), Some("secret")));
        assert!(!admin_token_matches(Some("secret"), Some("nope")));
        assert!(!admin_token_matches(Some(""), Some("")));
        assert!(!admin_token_matches(None, Some("secret")));
        assert!(!admin_token_matches(Some("secret"), None));
    }
}
