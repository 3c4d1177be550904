//! Credential store: user accounts, Argon2 password hashes and lookups by
//! login attribute. Accounts are keyed by their numeric id; user names and
//! e-mail addresses are mutable lookup keys only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::identity::UserAccount;

/// Which account attribute a submitted login is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginAttribute {
    #[default]
    UserName,
    Email,
}

pub trait CredentialStore: Send + Sync {
    fn find_user(&self, attr: LoginAttribute, value: &str) -> Result<Option<UserAccount>>;

    fn user_by_id(&self, id: u64) -> Result<Option<UserAccount>>;

    /// The account when `password` matches; `Ok(None)` for unknown users and
    /// wrong passwords alike.
    fn verify_password(&self, attr: LoginAttribute, login: &str, password: &str) -> Result<Option<UserAccount>>;
}

pub type SharedCredentials = Arc<dyn CredentialStore>;

pub fn hash_password(argon2: &Argon2<'_>, password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

/// Parameters are read back from the PHC string, so hashes made with any cost
/// verify here.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

struct StoredUser {
    account: UserAccount,
    password_hash: String,
}

#[derive(Default)]
struct Users {
    next_id: u64,
    by_id: BTreeMap<u64, StoredUser>,
}

impl Users {
    fn find(&self, attr: LoginAttribute, value: &str) -> Option<&StoredUser> {
        self.by_id.values().find(|u| match attr {
            LoginAttribute::UserName => u.account.user_name == value,
            LoginAttribute::Email => u.account.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(value)),
        })
    }
}

/// In-process store for development and tests.
pub struct MemoryCredentialStore {
    users: RwLock<Users>,
    argon2: Argon2<'static>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self { Self::new() }
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self { users: RwLock::new(Users { next_id: 1, ..Default::default() }), argon2: Argon2::default() }
    }

    /// Store hashing with explicit Argon2id memory (KiB) and iteration costs.
    pub fn with_cost(m_cost: u32, t_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, 1, None).map_err(|e| anyhow!(e.to_string()))?;
        Ok(Self {
            users: RwLock::new(Users { next_id: 1, ..Default::default() }),
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn add_user(&self, user_name: &str, email: Option<&str>, password: &str, groups: &[&str]) -> Result<UserAccount> {
        if user_name.is_empty() { bail!("user name must not be empty"); }
        let password_hash = hash_password(&self.argon2, password)?;
        let mut users = self.users.write();
        if users.find(LoginAttribute::UserName, user_name).is_some() {
            bail!("user '{}' already exists", user_name);
        }
        let id = users.next_id;
        users.next_id += 1;
        let account = UserAccount {
            id,
            user_name: user_name.to_string(),
            email: email.map(str::to_string),
            display_name: None,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        };
        users.by_id.insert(id, StoredUser { account: account.clone(), password_hash });
        Ok(account)
    }

    /// Change the login name. Sessions are bound to the id and survive this.
    pub fn rename_user(&self, id: u64, new_name: &str) -> Result<()> {
        let mut users = self.users.write();
        if users.find(LoginAttribute::UserName, new_name).is_some_and(|u| u.account.id != id) {
            bail!("user '{}' already exists", new_name);
        }
        let u = users.by_id.get_mut(&id).ok_or_else(|| anyhow!("user {} not found", id))?;
        u.account.user_name = new_name.to_string();
        Ok(())
    }

    pub fn set_groups(&self, id: u64, groups: &[&str]) -> Result<()> {
        let mut users = self.users.write();
        let u = users.by_id.get_mut(&id).ok_or_else(|| anyhow!("user {} not found", id))?;
        u.account.groups = groups.iter().map(|g| g.to_string()).collect::<BTreeSet<_>>();
        Ok(())
    }

    pub fn set_password(&self, id: u64, password: &str) -> Result<()> {
        let hash = hash_password(&self.argon2, password)?;
        let mut users = self.users.write();
        let u = users.by_id.get_mut(&id).ok_or_else(|| anyhow!("user {} not found", id))?;
        u.password_hash = hash;
        Ok(())
    }

    pub fn remove_user(&self, id: u64) -> bool { self.users.write().by_id.remove(&id).is_some() }

    pub fn len(&self) -> usize { self.users.read().by_id.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl CredentialStore for MemoryCredentialStore {
    fn find_user(&self, attr: LoginAttribute, value: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.read().find(attr, value).map(|u| u.account.clone()))
    }

    fn user_by_id(&self, id: u64) -> Result<Option<UserAccount>> {
        Ok(self.users.read().by_id.get(&id).map(|u| u.account.clone()))
    }

    fn verify_password(&self, attr: LoginAttribute, login: &str, password: &str) -> Result<Option<UserAccount>> {
        let (account, hash) = {
            let users = self.users.read();
            match users.find(attr, login) {
                Some(u) => (u.account.clone(), u.password_hash.clone()),
                None => return Ok(None),
            }
        };
        Ok(verify_password(&hash, password).then_some(account))
    }
}

pub const DEFAULT_ADMIN: &str = "admin";

/// Create the `admin` account (group `admins`) when the store has none.
pub fn ensure_default_admin(store: &MemoryCredentialStore, password: Option<&str>) -> Result<Option<UserAccount>> {
    if store.find_user(LoginAttribute::UserName, DEFAULT_ADMIN)?.is_some() {
        return Ok(None);
    }
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => {
            warn!(target: "auth", "MEDIAGATE_ADMIN_PASSWORD not set; seeding '{}' with the default password", DEFAULT_ADMIN);
            DEFAULT_ADMIN
        }
    };
    let account = store.add_user(DEFAULT_ADMIN, None, password, &["admins"])?;
    info!(target: "auth", user_id = account.id, "seeded default admin account");
    Ok(Some(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryCredentialStore { MemoryCredentialStore::with_cost(8, 1).unwrap() }

    #[test]
    fn hashes_verify_only_with_the_right_password() {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::new(8, 1, 1, None).unwrap());
        let phc = hash_password(&argon2, "s3cret").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password(&phc, "s3cret"));
        assert!(!verify_password(&phc, "S3cret"));
        assert!(!verify_password("not-a-phc", "s3cret"));
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let s = store();
        let a = s.add_user("ann", None, "pw", &[]).unwrap();
        let b = s.add_user("bob", Some("bob@example.org"), "pw", &["editors"]).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(s.add_user("ann", None, "pw", &[]).is_err());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn verify_by_user_name_or_email() {
        let s = store();
        let b = s.add_user("bob", Some("Bob@Example.org"), "pw", &[]).unwrap();
        assert_eq!(s.verify_password(LoginAttribute::UserName, "bob", "pw").unwrap(), Some(b.clone()));
        assert_eq!(s.verify_password(LoginAttribute::Email, "bob@example.org", "pw").unwrap(), Some(b));
        assert_eq!(s.verify_password(LoginAttribute::UserName, "bob", "nope").unwrap(), None);
        assert_eq!(s.verify_password(LoginAttribute::UserName, "nobody", "pw").unwrap(), None);
    }

    #[test]
    fn rename_keeps_the_id() {
        let s = store();
        let a = s.add_user("ann", None, "pw", &[]).unwrap();
        s.rename_user(a.id, "anna").unwrap();
        assert_eq!(s.user_by_id(a.id).unwrap().unwrap().user_name, "anna");
        assert!(s.find_user(LoginAttribute::UserName, "ann").unwrap().is_none());
        assert!(s.rename_user(99, "x").is_err());
    }

    #[test]
    fn default_admin_is_seeded_once() {
        let s = store();
        let admin = ensure_default_admin(&s, Some("pw")).unwrap().unwrap();
        assert!(admin.groups.contains("admins"));
        assert!(ensure_default_admin(&s, Some("pw")).unwrap().is_none());
        assert_eq!(s.len(), 1);
    }
}
