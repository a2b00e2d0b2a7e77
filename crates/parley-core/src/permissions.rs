//! The permission engine (§4.2): a pure, read-only function from
//! (user, server[, channel]) to a fully resolved allow/deny map.

use crate::error::CoreError;
use parley_db::{channel_overrides, channels, roles, DbPool};
use parley_models::permissions::{EffectivePermissions, PermState, PermissionKey, PermissionMap};
use std::collections::HashMap;

/// Intermediate tri-state map threaded through the merge/override pipeline;
/// only resolved to bool allow/deny at the very end (step 7).
type PartialState = HashMap<PermissionKey, PermState>;

fn merge_non_inherit(base: &mut PartialState, overlay: &PermissionMap) {
    for (key, state) in overlay {
        if !matches!(state, PermState::Inherit) {
            base.insert(*key, *state);
        }
    }
}

fn resolve(partial: &PartialState) -> EffectivePermissions {
    let mut out = EffectivePermissions::all_deny();
    for key in PermissionKey::ALL {
        let allow = matches!(partial.get(&key), Some(PermState::Allow));
        out.set(key, allow);
    }
    out
}

/// Computes effective permissions for `user_id` in `server_id`, optionally
/// scoped to `channel_id`. Ephemeral admin bypasses this function entirely
/// at the call site (§4.2 "Ephemeral admin ... bypasses this engine").
pub async fn compute_effective_permissions(
    pool: &DbPool,
    user_id: i64,
    server_id: i64,
    channel_id: Option<i64>,
) -> Result<EffectivePermissions, CoreError> {
    // Step 1: roles assigned to the user, priority desc, role-id asc tie-break.
    let member_roles = roles::roles_for_member(pool, user_id, server_id).await?;

    // Step 2: no roles => all-deny.
    if member_roles.is_empty() {
        return Ok(EffectivePermissions::all_deny());
    }

    // Step 3: merge server-level permissions; first non-inherit wins per key.
    let mut merged: PartialState = HashMap::new();
    for role in &member_roles {
        let role_perms = role.permissions();
        for key in PermissionKey::ALL {
            if merged.contains_key(&key) {
                continue;
            }
            if let Some(state) = role_perms.get(&key) {
                if !matches!(state, PermState::Inherit) {
                    merged.insert(key, *state);
                }
            }
        }
    }

    // Step 4: admin short-circuit.
    if matches!(merged.get(&PermissionKey::Admin), Some(PermState::Allow)) {
        return Ok(EffectivePermissions::all_allow());
    }

    // Step 5: no channel scope => resolve inherit -> deny now.
    let Some(channel_id) = channel_id else {
        return Ok(resolve(&merged));
    };

    // Step 6: walk the channel chain root-first, applying overrides.
    let chain = channels::ancestor_chain(pool, channel_id).await?;
    let role_priority: HashMap<i64, i64> =
        member_roles.iter().map(|r| (r.id, r.priority)).collect();
    let member_role_ids: std::collections::HashSet<i64> =
        member_roles.iter().map(|r| r.id).collect();

    for ancestor_id in chain {
        let mut overrides = channel_overrides::overrides_for_channel(pool, ancestor_id)
            .await?
            .into_iter()
            .filter(|o| member_role_ids.contains(&o.role_id))
            .collect::<Vec<_>>();
        // Higher-priority role's override wins within a single channel;
        // role-id ascending breaks ties, matching the role-ordering rule.
        overrides.sort_by(|a, b| {
            let pa = role_priority.get(&a.role_id).copied().unwrap_or(i64::MIN);
            let pb = role_priority.get(&b.role_id).copied().unwrap_or(i64::MIN);
            pa.cmp(&pb).then(a.role_id.cmp(&b.role_id))
        });
        // Apply lowest-priority first so the highest-priority override is
        // the last write and therefore wins.
        for ov in &overrides {
            merge_non_inherit(&mut merged, &ov.permissions());
        }
    }

    // Step 7: resolve remaining inherit -> deny.
    Ok(resolve(&merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_db::{channel_overrides, channels, member_roles as member_roles_db, roles, servers, users};

    async fn memory_pool() -> DbPool {
        let pool = parley_db::create_pool(":memory:").await.unwrap();
        parley_db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn allow_map(keys: &[PermissionKey]) -> PermissionMap {
        keys.iter().map(|k| (*k, PermState::Allow)).collect()
    }

    fn deny_map(keys: &[PermissionKey]) -> PermissionMap {
        keys.iter().map(|k| (*k, PermState::Deny)).collect()
    }

    #[tokio::test]
    async fn no_roles_means_all_deny() {
        let pool = memory_pool().await;
        servers::create_server(&pool, 1, "Test", None).await.unwrap();
        users::create_user(&pool, 1, "alice", Some("0xA")).await.unwrap();
        let perms = compute_effective_permissions(&pool, 1, 1, None).await.unwrap();
        assert_eq!(perms, EffectivePermissions::all_deny());
    }

    #[tokio::test]
    async fn admin_allow_short_circuits_to_all_allow() {
        let pool = memory_pool().await;
        servers::create_server(&pool, 1, "Test", None).await.unwrap();
        users::create_user(&pool, 1, "alice", Some("0xA")).await.unwrap();
        roles::create_role(
            &pool,
            10,
            1,
            "Admin",
            100,
            &allow_map(&[PermissionKey::Admin]),
            true,
        )
        .await
        .unwrap();
        member_roles_db::assign_role(&pool, 1, 1, 10).await.unwrap();

        let perms = compute_effective_permissions(&pool, 1, 1, None).await.unwrap();
        assert_eq!(perms, EffectivePermissions::all_allow());
    }

    #[tokio::test]
    async fn channel_override_can_deny_what_server_role_allows() {
        // S3: Member has speak=allow server-wide; Announcements channel
        // overrides Member to speak=deny; General has no override.
        let pool = memory_pool().await;
        servers::create_server(&pool, 1, "Test", None).await.unwrap();
        users::create_user(&pool, 1, "bob", Some("0xB")).await.unwrap();
        roles::create_role(
            &pool,
            20,
            1,
            "Member",
            10,
            &allow_map(&[PermissionKey::Speak, PermissionKey::Join]),
            false,
        )
        .await
        .unwrap();
        member_roles_db::assign_role(&pool, 1, 1, 20).await.unwrap();

        let announcements = channels::create_channel(&pool, 100, 1, None, "Announcements", 0, false)
            .await
            .unwrap();
        let general = channels::create_channel(&pool, 101, 1, None, "General", 1, false)
            .await
            .unwrap();

        channel_overrides::upsert_override(
            &pool,
            announcements.id,
            20,
            &deny_map(&[PermissionKey::Speak]),
        )
        .await
        .unwrap();

        let in_announcements =
            compute_effective_permissions(&pool, 1, 1, Some(announcements.id))
                .await
                .unwrap();
        assert!(!in_announcements.allows(PermissionKey::Speak));

        let in_general = compute_effective_permissions(&pool, 1, 1, Some(general.id))
            .await
            .unwrap();
        assert!(in_general.allows(PermissionKey::Speak));
    }

    #[tokio::test]
    async fn higher_priority_role_override_wins_within_a_channel() {
        let pool = memory_pool().await;
        servers::create_server(&pool, 1, "Test", None).await.unwrap();
        users::create_user(&pool, 1, "carol", Some("0xC")).await.unwrap();

        roles::create_role(&pool, 30, 1, "Low", 1, &allow_map(&[PermissionKey::Speak]), false)
            .await
            .unwrap();
        roles::create_role(&pool, 31, 1, "High", 50, &deny_map(&[PermissionKey::Speak]), false)
            .await
            .unwrap();
        member_roles_db::assign_role(&pool, 1, 1, 30).await.unwrap();
        member_roles_db::assign_role(&pool, 1, 1, 31).await.unwrap();

        let channel = channels::create_channel(&pool, 200, 1, None, "General", 0, false)
            .await
            .unwrap();
        channel_overrides::upsert_override(&pool, channel.id, 30, &allow_map(&[PermissionKey::Speak]))
            .await
            .unwrap();
        channel_overrides::upsert_override(&pool, channel.id, 31, &deny_map(&[PermissionKey::Speak]))
            .await
            .unwrap();

        let perms = compute_effective_permissions(&pool, 1, 1, Some(channel.id))
            .await
            .unwrap();
        assert!(!perms.allows(PermissionKey::Speak));
    }

    #[tokio::test]
    async fn idempotent_across_two_calls() {
        let pool = memory_pool().await;
        servers::create_server(&pool, 1, "Test", None).await.unwrap();
        users::create_user(&pool, 1, "dan", Some("0xD")).await.unwrap();
        roles::create_role(&pool, 40, 1, "Member", 1, &allow_map(&[PermissionKey::Join]), false)
            .await
            .unwrap();
        member_roles_db::assign_role(&pool, 1, 1, 40).await.unwrap();

        let first = compute_effective_permissions(&pool, 1, 1, None).await.unwrap();
        let second = compute_effective_permissions(&pool, 1, 1, None).await.unwrap();
        assert_eq!(first, second);
    }
}
