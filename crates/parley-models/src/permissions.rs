use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single resolvable permission in the effective-permissions map (§4.2).
///
/// Keep this list in sync with the `*_permission` checks in `parley-ws`'s
/// message handlers — each variant here must correspond to a point where the
/// signaling hub gates a message on `effective[key] == allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionKey {
    Join,
    Speak,
    Video,
    ScreenShare,
    Kick,
    Ban,
    MoveUsers,
    ManageRoles,
    ManageChannels,
    ManageServer,
    Admin,
}

impl PermissionKey {
    pub const ALL: [PermissionKey; 11] = [
        PermissionKey::Join,
        PermissionKey::Speak,
        PermissionKey::Video,
        PermissionKey::ScreenShare,
        PermissionKey::Kick,
        PermissionKey::Ban,
        PermissionKey::MoveUsers,
        PermissionKey::ManageRoles,
        PermissionKey::ManageChannels,
        PermissionKey::ManageServer,
        PermissionKey::Admin,
    ];
}

/// One entry in a role's or channel-override's permission map (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermState {
    Allow,
    Deny,
    Inherit,
}

/// A role's (or channel override's) partial permission map. Keys absent
/// from the map are implicitly `Inherit`.
pub type PermissionMap = HashMap<PermissionKey, PermState>;

/// The fully resolved allow/deny set returned by the permission engine.
/// Every `PermissionKey` is present — resolution never leaves an `inherit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions(pub HashMap<PermissionKey, bool>);

impl EffectivePermissions {
    pub fn all_deny() -> Self {
        Self(PermissionKey::ALL.iter().map(|k| (*k, false)).collect())
    }

    pub fn all_allow() -> Self {
        Self(PermissionKey::ALL.iter().map(|k| (*k, true)).collect())
    }

    pub fn allows(&self, key: PermissionKey) -> bool {
        self.0.get(&key).copied().unwrap_or(false)
    }

    pub fn set(&mut self, key: PermissionKey, allow: bool) {
        self.0.insert(key, allow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_deny_has_every_key_false() {
        let perms = EffectivePermissions::all_deny();
        for key in PermissionKey::ALL {
            assert!(!perms.allows(key));
        }
    }

    #[test]
    fn all_allow_has_every_key_true() {
        let perms = EffectivePermissions::all_allow();
        for key in PermissionKey::ALL {
            assert!(perms.allows(key));
        }
    }
}
