//! Login form plugin: identifies credentials posted to the login handler,
//! turns the logout handler into a forget-and-redirect, and challenges
//! browsers by redirecting to the login form.

use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::config::LoginPaths;

use super::classifier::Channel;
use super::plugins::{AuthRequest, Challenger, Claim, Identification, Identifier, Identity, Replacement};
use super::session::SessionCookie;

pub const LOGIN_FIELD: &str = "login";
pub const PASSWORD_FIELD: &str = "password";
pub const CAME_FROM: &str = "came_from";
pub const LOGIN_COUNTER: &str = "__logins";

/// `base?k=v&...` with form-encoded values.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    match serde_urlencoded::to_string(params) {
        Ok(q) if !q.is_empty() => format!("{base}?{q}"),
        _ => base.to_string(),
    }
}

/// 302 Found with optional `Set-Cookie` headers.
pub fn redirect(location: &str, set_cookies: Vec<HeaderValue>) -> Response {
    let Ok(loc) = HeaderValue::from_str(location) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let mut resp = StatusCode::FOUND.into_response();
    resp.headers_mut().insert(header::LOCATION, loc);
    for c in set_cookies {
        resp.headers_mut().append(header::SET_COOKIE, c);
    }
    resp
}

fn browser_like(channel: Channel) -> bool { matches!(channel, Channel::Browser | Channel::Upload) }

#[derive(Debug, Clone)]
pub struct LoginForm {
    paths: LoginPaths,
    max_age: u64,
}

impl LoginForm {
    pub const NAME: &'static str = "form";

    pub fn new(paths: LoginPaths, max_age: u64) -> Self { Self { paths, max_age } }
}

impl Identifier for LoginForm {
    fn name(&self) -> &'static str { Self::NAME }

    fn serves(&self, channel: Channel) -> bool { browser_like(channel) }

    fn wants_post_data(&self, parts: &Parts) -> bool {
        parts.method == Method::POST && parts.uri.path() == self.paths.login_handler
    }

    fn identify(&self, req: &AuthRequest<'_>, _now: i64) -> Identification {
        let path = req.path();
        if path == self.paths.login_handler {
            let query = req.query();
            let came_from = query.get(CAME_FROM).map(String::as_str).unwrap_or("/");
            let logins = query.get(LOGIN_COUNTER).and_then(|n| n.parse::<u32>().ok()).unwrap_or(0).to_string();
            let identity = req.post
                .and_then(|p| Some((p.text(LOGIN_FIELD)?, p.text(PASSWORD_FIELD)?)))
                .map(|(login, password)| Identity {
                    claim: Claim::Credentials { login: login.to_string(), password: password.to_string() },
                    identifier: Self::NAME,
                    rememberer: SessionCookie::NAME,
                    max_age: Some(self.max_age),
                });
            let location = with_query(&self.paths.post_login, &[(CAME_FROM, came_from), (LOGIN_COUNTER, logins.as_str())]);
            return Identification { identity, replacement: Some(Replacement { location, forget: false }) };
        }
        if path == self.paths.logout_handler {
            let query = req.query();
            let came_from = query.get(CAME_FROM).map(String::as_str).unwrap_or("/");
            let location = with_query(&self.paths.post_logout, &[(CAME_FROM, came_from)]);
            return Identification { identity: None, replacement: Some(Replacement { location, forget: true }) };
        }
        Identification::absent()
    }
}

#[derive(Debug, Clone)]
pub struct FormChallenger {
    login_form: String,
}

impl FormChallenger {
    pub const NAME: &'static str = "form";

    pub fn new(login_form: impl Into<String>) -> Self { Self { login_form: login_form.into() } }
}

impl Challenger for FormChallenger {
    fn name(&self) -> &'static str { Self::NAME }

    fn serves(&self, channel: Channel) -> bool { browser_like(channel) }

    fn challenge(&self, uri: &Uri, forget: Vec<HeaderValue>) -> Response {
        let came_from = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        redirect(&with_query(&self.login_form, &[(CAME_FROM, came_from)]), forget)
    }
}
