//! Admin auth gate (C8, §6 `adminToken`/`openAdmin`). Grounded on the
//! teacher's `AdminUser` `FromRequestParts` extractor, swapped from bearer
//! JWT claims to the single shared admin token this system uses.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use parley_core::{auth, AppState};

/// Extractor that requires a valid `X-Admin-Token` header, unless the
/// server has no admin token configured and `openAdmin` opts the REST
/// surface open.
pub struct AdminGuard;

impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.admin_token.is_none() && state.open_admin {
            return Ok(AdminGuard);
        }

        let presented = parts
            .headers
            .get("x-admin-token")
            .and_then(|v| v.to_str().ok());

        if auth::admin_token_matches(state.admin_token.as_deref(), presented) {
            Ok(AdminGuard)
        } else {
            Err((StatusCode::UNAUTHORIZED, "missing or invalid admin token"))
        }
    }
}
