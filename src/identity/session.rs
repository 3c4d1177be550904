//! Session cookie: the ticket codec bound to the server secret and to the
//! numeric user-id rule, plus the cookie lifecycle (issue, sliding reissue,
//! forget).

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};
use tracing::{debug, info};

use crate::config::SessionSettings;
use crate::error::ConfigError;

use super::plugins::{AuthRequest, Claim, Identification, Identifier, Identity};
use super::principal::{is_numeric_userid, Principal};
use super::ticket::{Ticket, TicketCodec, UserIdChecker};

/// Construction options. `userid_checker` exists so that callers porting
/// settings wholesale fail loudly: the checker is owned by `SessionCookie`.
#[derive(Clone)]
pub struct SessionCookieOptions {
    pub cookie_name: String,
    pub timeout: u64,
    pub reissue_time: Option<u64>,
    pub secure: bool,
    pub userid_checker: Option<UserIdChecker>,
}

impl SessionCookieOptions {
    pub fn from_settings(s: &SessionSettings) -> Self {
        Self {
            cookie_name: s.cookie_name.clone(),
            timeout: s.validity,
            reissue_time: Some(s.reissue_time),
            secure: s.secure,
            userid_checker: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionCookie {
    codec: TicketCodec,
    cookie_name: String,
    timeout: u64,
    reissue_time: Option<u64>,
    secure: bool,
}

impl SessionCookie {
    pub const NAME: &'static str = "cookie";

    pub fn new(secret: &str, options: SessionCookieOptions) -> Result<Self, ConfigError> {
        if options.userid_checker.is_some() {
            return Err(ConfigError::ManagedOption("userid_checker"));
        }
        if let Some(reissue) = options.reissue_time {
            if reissue > options.timeout {
                return Err(ConfigError::InvalidReissue { reissue, validity: options.timeout });
            }
        }
        let codec = TicketCodec::new(secret.as_bytes())?
            .with_timeout(options.timeout)
            .with_userid_checker(Arc::new(is_numeric_userid));
        Ok(Self {
            codec,
            cookie_name: options.cookie_name,
            timeout: options.timeout,
            reissue_time: options.reissue_time,
            secure: options.secure,
        })
    }

    pub fn from_settings(settings: &SessionSettings) -> Result<Self, ConfigError> {
        Self::new(&settings.cookie_secret, SessionCookieOptions::from_settings(settings))
    }

    pub fn cookie_name(&self) -> &str { &self.cookie_name }

    pub fn timeout(&self) -> u64 { self.timeout }

    pub fn issue(&self, principal: Principal, now: i64) -> String {
        self.codec.encode(&principal.as_userid(), now)
    }

    /// Verify a raw token. Any failure is treated as "no session".
    pub fn verify(&self, token: &str, now: i64) -> Option<Principal> {
        self.decode(token, now).and_then(|t| Principal::from_userid(&t.userid))
    }

    fn decode(&self, token: &str, now: i64) -> Option<Ticket> {
        match self.codec.decode(token, now) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(target: "auth", cookie = %self.cookie_name, error = %e, "session ticket ignored");
                None
            }
        }
    }

    /// More than `reissue_time` seconds since issuance.
    pub fn needs_reissue(&self, ticket: &Ticket, now: i64) -> bool {
        self.reissue_time.is_some_and(|r| ticket.age(now) > r as i64)
    }

    pub fn set_cookie_header(&self, token: &str, max_age: u64, now: i64) -> Option<HeaderValue> {
        let expires = chrono::DateTime::from_timestamp(now + max_age as i64, 0)
            .map(|d| format!("; Expires={}", d.format("%a, %d %b %Y %H:%M:%S GMT")))
            .unwrap_or_default();
        let secure = if self.secure { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; Max-Age={}{}; HttpOnly; SameSite=Lax{}",
            self.cookie_name, token, max_age, expires, secure
        )).ok()
    }

    pub fn clear_cookie_header(&self) -> Option<HeaderValue> {
        let secure = if self.secure { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{}=INVALID; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax{}",
            self.cookie_name, secure
        )).ok()
    }
}

impl Identifier for SessionCookie {
    fn name(&self) -> &'static str { Self::NAME }

    fn identify(&self, req: &AuthRequest<'_>, now: i64) -> Identification {
        let Some(token) = parse_cookie(&req.parts.headers, &self.cookie_name) else { return Identification::absent(); };
        let Some(ticket) = self.decode(&token, now) else { return Identification::absent(); };
        Identification::found(Identity {
            claim: Claim::Ticket(ticket),
            identifier: Self::NAME,
            rememberer: Self::NAME,
            max_age: Some(self.timeout),
        })
    }

    fn remember(&self, identity: &Identity, principal: Principal, now: i64) -> Vec<HeaderValue> {
        if let Claim::Ticket(t) = &identity.claim {
            if t.userid == principal.as_userid() && !self.needs_reissue(t, now) {
                return Vec::new();
            }
            info!(target: "auth", user_id = principal.id(), age_secs = t.age(now), "reissuing session ticket");
        }
        let max_age = identity.max_age.unwrap_or(self.timeout);
        let token = self.issue(principal, now);
        self.set_cookie_header(&token, max_age, now).into_iter().collect()
    }

    fn forget(&self) -> Vec<HeaderValue> {
        self.clear_cookie_header().into_iter().collect()
    }
}

/// Find `name` in the request's `Cookie` header(s).
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(s) = value.to_str() else { continue; };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name { return Some(v.trim_matches('"').to_string()); }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{days_as_seconds, SessionSettings};
    use crate::identity::classifier::Channel;
    use axum::http::Request;

    const T0: i64 = 1_700_000_000;

    fn cookie() -> SessionCookie { SessionCookie::from_settings(&SessionSettings::new("secret")).unwrap() }

    fn request_with_cookie(value: &str) -> axum::http::request::Parts {
        let (parts, _) = Request::builder()
            .uri("/")
            .header(header::COOKIE, format!("theme=dark; authtkt={value}"))
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn overriding_the_userid_checker_is_a_config_error() {
        let mut opts = SessionCookieOptions::from_settings(&SessionSettings::new("secret"));
        opts.userid_checker = Some(Arc::new(|_: &str| true));
        assert_eq!(SessionCookie::new("secret", opts).unwrap_err(), ConfigError::ManagedOption("userid_checker"));
    }

    #[test]
    fn issued_tokens_verify_to_the_principal() {
        let c = cookie();
        let tok = c.issue(Principal::new(12), T0);
        assert_eq!(c.verify(&tok, T0 + 60), Some(Principal::new(12)));
    }

    #[test]
    fn tokens_past_the_window_are_invalid() {
        let c = cookie();
        let tok = c.issue(Principal::new(12), T0);
        assert!(c.verify(&tok, T0 + days_as_seconds(30) as i64).is_some());
        assert_eq!(c.verify(&tok, T0 + days_as_seconds(30) as i64 + 1), None);
    }

    #[test]
    fn user_name_tickets_are_invalid_even_when_signed() {
        let c = cookie();
        let codec = TicketCodec::new(b"secret").unwrap();
        for legacy in ["admin", "12 ", "1e3", "user42"] {
            let tok = codec.encode(legacy, T0);
            assert_eq!(c.verify(&tok, T0), None, "{legacy:?}");
        }
    }

    #[test]
    fn set_cookie_reports_the_session_window() {
        let c = cookie();
        let v = c.set_cookie_header("tok", c.timeout(), T0).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("authtkt=tok; Path=/; Max-Age=2592000"), "{s}");
        assert!(s.contains("Expires="));
        assert!(s.contains("HttpOnly"));
    }

    #[test]
    fn identify_reads_the_named_cookie() {
        let c = cookie();
        let tok = c.issue(Principal::new(3), T0);
        let parts = request_with_cookie(&tok);
        let req = AuthRequest { parts: &parts, post: None, channel: Channel::Browser };
        let id = c.identify(&req, T0 + 1).identity.unwrap();
        assert_eq!(id.max_age, Some(2_592_000));
        assert!(matches!(id.claim, Claim::Ticket(ref t) if t.userid == "3"));

        let parts = request_with_cookie("garbage");
        let req = AuthRequest { parts: &parts, post: None, channel: Channel::Browser };
        assert!(c.identify(&req, T0).identity.is_none());
    }

    #[test]
    fn remember_reissues_only_after_half_the_window() {
        let c = cookie();
        let ticket = Ticket { userid: "3".into(), issued_at: T0 };
        let identity = Identity {
            claim: Claim::Ticket(ticket),
            identifier: SessionCookie::NAME,
            rememberer: SessionCookie::NAME,
            max_age: Some(c.timeout()),
        };
        let ten_days = T0 + days_as_seconds(10) as i64;
        assert!(c.remember(&identity, Principal::new(3), ten_days).is_empty());

        let sixteen_days = T0 + days_as_seconds(16) as i64;
        let headers = c.remember(&identity, Principal::new(3), sixteen_days);
        assert_eq!(headers.len(), 1);
        let fresh = headers[0].to_str().unwrap().trim_start_matches("authtkt=").split(';').next().unwrap().to_string();
        let parts = request_with_cookie(&fresh);
        let req = AuthRequest { parts: &parts, post: None, channel: Channel::Browser };
        let Claim::Ticket(t) = c.identify(&req, sixteen_days).identity.unwrap().claim else { panic!("ticket claim expected") };
        assert_eq!(t.issued_at, sixteen_days);
    }

    #[test]
    fn forget_expires_the_cookie() {
        let h = cookie().forget();
        assert!(h[0].to_str().unwrap().contains("Max-Age=0"));
    }
}
