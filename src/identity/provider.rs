use tracing::{info, warn};

use crate::security::{LoginAttribute, SharedCredentials};

use super::plugins::{Authenticator, Claim, Identity};
use super::principal::Principal;

/// Checks submitted credentials against the credential store and resolves
/// them to the account's numeric id.
pub struct CredentialAuthenticator {
    store: SharedCredentials,
    attr: LoginAttribute,
}

impl CredentialAuthenticator {
    pub const NAME: &'static str = "auth_by_username";

    pub fn new(store: SharedCredentials) -> Self { Self { store, attr: LoginAttribute::UserName } }

    pub fn with_login_attribute(mut self, attr: LoginAttribute) -> Self { self.attr = attr; self }
}

impl Authenticator for CredentialAuthenticator {
    fn name(&self) -> &'static str { Self::NAME }

    fn authenticate(&self, identity: &Identity) -> Option<Principal> {
        let Claim::Credentials { login, password } = &identity.claim else { return None; };
        match self.store.verify_password(self.attr, login, password) {
            Ok(Some(account)) => {
                info!(target: "auth", user_id = account.id, "login succeeded");
                Some(account.principal())
            }
            Ok(None) => {
                info!(target: "auth", login = %login, "login rejected");
                None
            }
            Err(e) => {
                warn!(target: "auth", login = %login, error = %e, "credential store failed during login");
                None
            }
        }
    }
}

/// Accepts claims already verified by the session cookie identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketAuthenticator;

impl TicketAuthenticator {
    pub const NAME: &'static str = "auth_tkt";
}

impl Authenticator for TicketAuthenticator {
    fn name(&self) -> &'static str { Self::NAME }

    fn authenticate(&self, identity: &Identity) -> Option<Principal> {
        match &identity.claim {
            Claim::Ticket(t) => Principal::from_userid(&t.userid),
            Claim::Credentials { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ticket::Ticket;
    use crate::security::MemoryCredentialStore;
    use std::sync::Arc;

    fn creds(login: &str, password: &str) -> Identity {
        Identity {
            claim: Claim::Credentials { login: login.into(), password: password.into() },
            identifier: "form",
            rememberer: "cookie",
            max_age: None,
        }
    }

    fn ticket(userid: &str) -> Identity {
        Identity {
            claim: Claim::Ticket(Ticket { userid: userid.into(), issued_at: 0 }),
            identifier: "cookie",
            rememberer: "cookie",
            max_age: None,
        }
    }

    #[test]
    fn credentials_resolve_to_the_numeric_id() {
        let store = Arc::new(MemoryCredentialStore::with_cost(8, 1).unwrap());
        store.add_user("first", None, "x", &[]).unwrap();
        let bob = store.add_user("bob", Some("bob@example.org"), "pw", &[]).unwrap();
        let auth = CredentialAuthenticator::new(store.clone());
        assert_eq!(auth.authenticate(&creds("bob", "pw")), Some(Principal::new(bob.id)));
        assert_eq!(auth.authenticate(&creds("bob", "bad")), None);
        assert_eq!(auth.authenticate(&creds("carol", "pw")), None);
        assert_eq!(auth.authenticate(&ticket("2")), None);

        let by_email = CredentialAuthenticator::new(store).with_login_attribute(LoginAttribute::Email);
        assert_eq!(by_email.authenticate(&creds("bob@example.org", "pw")), Some(Principal::new(2)));
        assert_eq!(by_email.authenticate(&creds("bob", "pw")), None);
    }

    #[test]
    fn tickets_must_carry_numeric_ids() {
        let auth = TicketAuthenticator;
        assert_eq!(auth.authenticate(&ticket("42")), Some(Principal::new(42)));
        assert_eq!(auth.authenticate(&ticket("admin")), None);
        assert_eq!(auth.authenticate(&creds("42", "pw")), None);
    }
}
