//! Startup bootstrap (§3 "exactly one default server exists after
//! bootstrap", §4.1 "default channels and default roles are ensured").
//! Grounded on the teacher's migration-then-seed ordering in
//! `paracord-server::main` (`ensure_data_dirs` run once at startup).

use crate::error::CoreError;
use parley_db::{channels, member_roles, roles, servers, DbPool};
use parley_models::channel::DEFAULT_CHANNEL_NAMES;
use parley_models::permissions::{PermState, PermissionKey, PermissionMap};
use parley_models::role::DEFAULT_ROLE_NAMES;
use parley_models::server::DEFAULT_SERVER_NAME;

fn allow(keys: &[PermissionKey]) -> PermissionMap {
    keys.iter().map(|k| (*k, PermState::Allow)).collect()
}

/// Idempotent: runs once at process startup (and is safe to re-run) to
/// guarantee the "exactly one default server" invariant (§3).
pub async fn ensure_default_server(pool: &DbPool) -> Result<i64, CoreError> {
    let server = match servers::get_any_server(pool).await? {
        Some(row) => row,
        None => {
            let id = parley_util::snowflake::generate(1);
            servers::create_server(pool, id, DEFAULT_SERVER_NAME, None).await?
        }
    };
    ensure_default_roles(pool, server.id).await?;
    ensure_default_channels(pool, server.id).await?;
    Ok(server.id)
}

/// Admin/Member/Guest (§3 "Role", `DEFAULT_ROLE_NAMES`). Member is the
/// server's `isDefault` role, assigned to every member on join (§4.1).
async fn ensure_default_roles(pool: &DbPool, server_id: i64) -> Result<(), CoreError> {
    if !roles::list_roles_for_server(pool, server_id).await?.is_empty() {
        return Ok(());
    }
    let [admin_name, member_name, guest_name] = DEFAULT_ROLE_NAMES;

    roles::create_role(
        pool,
        parley_util::snowflake::generate(1),
        server_id,
        admin_name,
        100,
        &allow(&[PermissionKey::Admin]),
        false,
    )
    .await?;

    roles::create_role(
        pool,
        parley_util::snowflake::generate(1),
        server_id,
        member_name,
        10,
        &allow(&[
            PermissionKey::Join,
            PermissionKey::Speak,
            PermissionKey::Video,
            PermissionKey::ScreenShare,
        ]),
        true,
    )
    .await?;

    roles::create_role(
        pool,
        parley_util::snowflake::generate(1),
        server_id,
        guest_name,
        0,
        &allow(&[PermissionKey::Join]),
        false,
    )
    .await?;

    Ok(())
}

/// Lobby/General/AFK (§3 "Channel", `DEFAULT_CHANNEL_NAMES`). Lobby is the
/// `isDefault` (undeletable) channel.
async fn ensure_default_channels(pool: &DbPool, server_id: i64) -> Result<(), CoreError> {
    if !channels::list_channels_for_server(pool, server_id).await?.is_empty() {
        return Ok(());
    }
    for (position, name) in DEFAULT_CHANNEL_NAMES.iter().enumerate() {
        channels::create_channel(
            pool,
            parley_util::snowflake::generate(1),
            server_id,
            None,
            name,
            position as i32,
            position == 0,
        )
        .await?;
    }
    Ok(())
}

/// §4.1 "the server's default role is assigned if unassigned": called after
/// `ensure_member` on every auth.
pub async fn ensure_member_has_default_role(pool: &DbPool, user_id: i64, server_id: i64) -> Result<(), CoreError> {
    if member_roles::has_any_role(pool, user_id, server_id).await? {
        return Ok(());
    }
    if let Some(default_role) = roles::get_default_role(pool, server_id).await? {
        member_roles::assign_role(pool, user_id, server_id, default_role.id).await?;
    }
    Ok(())
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
    async fn bootstrap_is_idempotent_and_creates_exactly_one_server() {
        let pool = memory_pool().await;
        let first = ensure_default_server(&pool).await.unwrap();
        let second = ensure_default_server(&pool).await.unwrap();
        assert_eq!(first, second);

        let roles = roles::list_roles_for_server(&pool, first).await.unwrap();
        assert_eq!(roles.len(), 3);
        let channels = channels::list_channels_for_server(&pool, first).await.unwrap();
        assert_eq!(channels.len(), 3);
        assert!(channels.iter().any(|c| c.is_default));
    }

    #[tokio::test]
    async fn new_member_is_assigned_the_default_role_once() {
        let pool = memory_pool().await;
        let server_id = ensure_default_server(&pool).await.unwrap();
        parley_db::users::create_user(&pool, 1, "alice", Some("0xA")).await.unwrap();

        ensure_member_has_default_role(&pool, 1, server_id).await.unwrap();
        let assigned = roles::roles_for_member(&pool, 1, server_id).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].name, "Member");

        // Re-running must not duplicate or override an explicit reassignment.
        member_roles::unassign_role(&pool, 1, server_id, assigned[0].id).await.unwrap();
        let other_role_id = roles::list_roles_for_server(&pool, server_id)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.name == "Guest")
            .unwrap()
            .id;
        member_roles::assign_role(&pool, 1, server_id, other_role_id).await.unwrap();
        ensure_member_has_default_role(&pool, 1, server_id).await.unwrap();
        let final_roles = roles::roles_for_member(&pool, 1, server_id).await.unwrap();
        assert_eq!(final_roles.len(), 1);
        assert_eq!(final_roles[0].name, "Guest");
    }
}
