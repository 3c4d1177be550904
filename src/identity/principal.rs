use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Verified identity of a user account. Always the numeric account id, never
/// the (mutable) user name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(u64);

impl Principal {
    pub fn new(id: u64) -> Self { Self(id) }

    pub fn id(&self) -> u64 { self.0 }

    /// Parse a user id carried in a ticket. Only plain decimal digits are
    /// accepted; older tickets carried user names and are refused outright.
    pub fn from_userid(userid: &str) -> Option<Self> {
        if !is_numeric_userid(userid) {
            return None;
        }
        userid.parse::<u64>().ok().map(Principal)
    }

    pub fn as_userid(&self) -> String { self.0.to_string() }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

pub fn is_numeric_userid(userid: &str) -> bool {
    !userid.is_empty() && userid.bytes().all(|b| b.is_ascii_digit())
}

/// Snapshot of an account as held by the credential store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    pub id: u64,
    pub user_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl UserAccount {
    pub fn principal(&self) -> Principal { Principal(self.id) }
}
