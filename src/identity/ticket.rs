//! Signed, time-stamped tickets.
//!
//! A ticket binds a user id to its issuance time under an HMAC-SHA256 keyed by
//! the server secret:
//!
//! ```text
//! {issued_at}.{base64url(userid)}.{hex(hmac(secret, "{issued_at}.{base64url(userid)}"))}
//! ```
//!
//! The codec knows nothing about what a valid user id looks like; callers
//! compose it with a checker predicate (see `SessionCookie`).

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Predicate applied to the decoded user id; `false` invalidates the ticket.
pub type UserIdChecker = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub userid: String,
    pub issued_at: i64,
}

impl Ticket {
    pub fn age(&self, now: i64) -> i64 { now - self.issued_at }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    #[error("malformed ticket")]
    Malformed,
    #[error("ticket signature mismatch")]
    BadSignature,
    #[error("ticket issued in the future")]
    FromFuture,
    #[error("ticket expired")]
    Expired,
    #[error("ticket user id rejected")]
    RejectedUserId,
}

#[derive(Clone)]
pub struct TicketCodec {
    mac: HmacSha256,
    timeout: Option<u64>,
    checker: Option<UserIdChecker>,
}

impl fmt::Debug for TicketCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketCodec")
            .field("timeout", &self.timeout)
            .field("checker", &self.checker.is_some())
            .finish_non_exhaustive()
    }
}

impl TicketCodec {
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| ConfigError::MissingSecret)?;
        Ok(Self { mac, timeout: None, checker: None })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_userid_checker(mut self, checker: UserIdChecker) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn timeout(&self) -> Option<u64> { self.timeout }

    pub fn encode(&self, userid: &str, issued_at: i64) -> String {
        let payload = format!("{}.{}", issued_at, base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(userid));
        let sig = self.sign(&payload);
        format!("{payload}.{sig}")
    }

    pub fn decode(&self, token: &str, now: i64) -> Result<Ticket, TicketError> {
        let mut parts = token.splitn(3, '.');
        let (Some(ts), Some(uid), Some(sig)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TicketError::Malformed);
        };
        if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TicketError::Malformed);
        }
        let issued_at: i64 = ts.parse().map_err(|_| TicketError::Malformed)?;
        let sig = hex::decode(sig).map_err(|_| TicketError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(ts.as_bytes());
        mac.update(b".");
        mac.update(uid.as_bytes());
        mac.verify_slice(&sig).map_err(|_| TicketError::BadSignature)?;

        if issued_at > now {
            return Err(TicketError::FromFuture);
        }
        if let Some(timeout) = self.timeout {
            if now - issued_at > timeout as i64 {
                return Err(TicketError::Expired);
            }
        }

        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(uid).map_err(|_| TicketError::Malformed)?;
        let userid = String::from_utf8(raw).map_err(|_| TicketError::Malformed)?;
        if let Some(check) = &self.checker {
            if !check(&userid) {
                return Err(TicketError::RejectedUserId);
            }
        }
        Ok(Ticket { userid, issued_at })
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000;

    fn codec() -> TicketCodec { TicketCodec::new(b"s3cret").unwrap().with_timeout(100) }

    #[test]
    fn encode_then_decode() {
        let c = codec();
        let tok = c.encode("17", T0);
        let t = c.decode(&tok, T0 + 5).unwrap();
        assert_eq!(t, Ticket { userid: "17".into(), issued_at: T0 });
        assert_eq!(t.age(T0 + 5), 5);
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        assert_eq!(TicketCodec::new(b"").unwrap_err(), ConfigError::MissingSecret);
    }

    #[test]
    fn expiry_is_inclusive_of_the_timeout() {
        let c = codec();
        let tok = c.encode("17", T0);
        assert!(c.decode(&tok, T0 + 100).is_ok());
        assert_eq!(c.decode(&tok, T0 + 101), Err(TicketError::Expired));
    }

    #[test]
    fn tampering_breaks_the_signature() {
        let c = codec();
        let tok = c.encode("17", T0);
        // shift the timestamp forward while keeping the old signature
        let forged = tok.replacen(&T0.to_string(), &(T0 + 50).to_string(), 1);
        assert_eq!(c.decode(&forged, T0 + 60), Err(TicketError::BadSignature));

        let other = TicketCodec::new(b"other").unwrap();
        assert_eq!(other.decode(&tok, T0), Err(TicketError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let c = codec();
        for bad in ["", "abc", "1.2", "x.MTc.00", "1.MTc.zz"] {
            assert_eq!(c.decode(bad, T0), Err(TicketError::Malformed), "{bad:?}");
        }
    }

    #[test]
    fn future_tickets_are_refused() {
        let c = codec();
        let tok = c.encode("17", T0 + 10);
        assert_eq!(c.decode(&tok, T0), Err(TicketError::FromFuture));
    }

    #[test]
    fn checker_runs_after_signature() {
        let c = codec().with_userid_checker(Arc::new(|u: &str| u != "root"));
        let tok = c.encode("root", T0);
        assert_eq!(c.decode(&tok, T0), Err(TicketError::RejectedUserId));
        assert!(c.decode(&c.encode("5", T0), T0).is_ok());
    }
}
