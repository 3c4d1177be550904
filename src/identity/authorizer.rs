use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use crate::security::SharedCredentials;

use super::principal::{Principal, UserAccount};

pub const ANONYMOUS: &str = "anonymous";
pub const AUTHENTICATED: &str = "authenticated";

/// Group name to granted permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::empty()
            .grant(ANONYMOUS, &["view"])
            .grant(AUTHENTICATED, &["view", "upload"])
            .grant("editors", &["view", "upload", "edit"])
            .grant("admins", &["view", "upload", "edit", "admin"])
    }
}

impl PermissionPolicy {
    pub fn empty() -> Self { Self { grants: BTreeMap::new() } }

    pub fn grant(mut self, group: &str, permissions: &[&str]) -> Self {
        self.grants.entry(group.to_string()).or_default().extend(permissions.iter().map(|p| p.to_string()));
        self
    }

    pub fn permissions_of<'a>(&self, groups: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        groups.into_iter().filter_map(|g| self.grants.get(g)).flatten().cloned().collect()
    }
}

/// Groups and permissions in effect for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    pub user: Option<UserAccount>,
    pub groups: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl PermissionSet {
    pub fn anonymous(policy: &PermissionPolicy) -> Self {
        let groups: BTreeSet<String> = [ANONYMOUS.to_string()].into_iter().collect();
        let permissions = policy.permissions_of(&groups);
        Self { user: None, groups, permissions }
    }

    pub fn for_account(account: UserAccount, policy: &PermissionPolicy) -> Self {
        let mut groups: BTreeSet<String> = [ANONYMOUS.to_string(), AUTHENTICATED.to_string()].into_iter().collect();
        groups.extend(account.groups.iter().cloned());
        let permissions = policy.permissions_of(&groups);
        Self { user: Some(account), groups, permissions }
    }

    pub fn contains_permission(&self, permission: &str) -> bool { self.permissions.contains(permission) }

    pub fn is_authenticated(&self) -> bool { self.user.is_some() }
}

/// Resolves the verified principal to an account and its permissions.
#[derive(Clone)]
pub struct PermissionResolver {
    store: SharedCredentials,
    policy: PermissionPolicy,
}

impl PermissionResolver {
    pub fn new(store: SharedCredentials, policy: PermissionPolicy) -> Self { Self { store, policy } }

    pub fn policy(&self) -> &PermissionPolicy { &self.policy }

    /// Missing accounts and store failures resolve to the anonymous set.
    pub fn permissions_for_request(&self, principal: Option<Principal>) -> PermissionSet {
        let Some(principal) = principal else { return PermissionSet::anonymous(&self.policy); };
        match self.store.user_by_id(principal.id()) {
            Ok(Some(account)) => PermissionSet::for_account(account, &self.policy),
            Ok(None) => PermissionSet::anonymous(&self.policy),
            Err(e) => {
                warn!(target: "auth", user_id = principal.id(), error = %e, "account lookup failed; treating request as anonymous");
                PermissionSet::anonymous(&self.policy)
            }
        }
    }
}
