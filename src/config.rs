//!
//! mediagate configuration
//! -----------------------
//! Immutable configuration assembled once at startup. CLI flags override
//! environment variables, which override the defaults below. Everything here is
//! passed by value (or behind `Arc`) into the components that need it; nothing
//! is read from globals after startup.

use std::env;

use crate::error::ConfigError;
use crate::identity::PermissionPolicy;

pub const fn days_as_seconds(days: u64) -> u64 { days * 24 * 60 * 60 }

/// Sessions expire 30 days after the cookie was (re)issued.
pub const SESSION_VALIDITY: u64 = days_as_seconds(30);
pub const DEFAULT_COOKIE_NAME: &str = "authtkt";
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_secret: String,
    /// Seconds a ticket stays valid after issuance.
    pub validity: u64,
    /// Seconds after issuance when a still-valid ticket is replaced.
    pub reissue_time: u64,
    pub secure: bool,
}

impl SessionSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_secret: secret.into(),
            validity: SESSION_VALIDITY,
            reissue_time: SESSION_VALIDITY / 2,
            secure: false,
        }
    }
}

/// Well-known URLs of the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPaths {
    pub login_form: String,
    pub login_handler: String,
    pub logout_handler: String,
    pub post_login: String,
    pub post_logout: String,
}

impl Default for LoginPaths {
    fn default() -> Self {
        Self {
            login_form: "/login".into(),
            login_handler: "/login/submit".into(),
            logout_handler: "/logout".into(),
            post_login: "/login/continue".into(),
            post_logout: "/logout/continue".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub max_results: usize,
    /// When set, API callers must pass `api_key` matching this value.
    pub secret_key: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self { Self { max_results: 50, secret_key: None } }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub base_url: String,
    pub session: SessionSettings,
    pub paths: LoginPaths,
    pub api: ApiSettings,
    pub policy: PermissionPolicy,
    pub body_limit: usize,
    pub admin_password: Option<String>,
    pub podcasts_file: Option<String>,
}

impl ServerConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            http_port: 8080,
            base_url: "http://localhost:8080".into(),
            session: SessionSettings::new(secret),
            paths: LoginPaths::default(),
            api: ApiSettings::default(),
            policy: PermissionPolicy::default(),
            body_limit: DEFAULT_BODY_LIMIT,
            admin_password: None,
            podcasts_file: None,
        }
    }

    /// Build from process arguments and `MEDIAGATE_*` environment variables.
    pub fn from_env_and_args(args: &[String]) -> Result<Self, ConfigError> {
        Self::from_sources(args, |name| env::var(name).ok())
    }

    pub fn from_sources<F>(args: &[String], lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = arg_value(args, "--cookie-secret")
            .or_else(|| lookup("MEDIAGATE_COOKIE_SECRET"))
            .unwrap_or_default();
        let mut cfg = ServerConfig::new(secret);

        if let Some(v) = arg_value(args, "--http-port").or_else(|| lookup("MEDIAGATE_HTTP_PORT")) {
            cfg.http_port = v.parse().map_err(|_| ConfigError::InvalidValue { name: "http_port", value: v.clone() })?;
        }
        if let Some(v) = arg_value(args, "--base-url").or_else(|| lookup("MEDIAGATE_BASE_URL")) {
            cfg.base_url = v.trim_end_matches('/').to_string();
        }
        if has_flag(args, "--secure-cookies") {
            cfg.session.secure = true;
        } else if let Some(v) = lookup("MEDIAGATE_SECURE_COOKIES") {
            cfg.session.secure = parse_bool(&v).ok_or(ConfigError::InvalidValue { name: "secure_cookies", value: v.clone() })?;
        }
        if let Some(v) = arg_value(args, "--api-max-results").or_else(|| lookup("MEDIAGATE_API_MAX_RESULTS")) {
            cfg.api.max_results = v.parse().map_err(|_| ConfigError::InvalidValue { name: "api_max_results", value: v.clone() })?;
        }
        cfg.api.secret_key = lookup("MEDIAGATE_API_KEY").filter(|k| !k.is_empty());
        cfg.admin_password = lookup("MEDIAGATE_ADMIN_PASSWORD");
        cfg.podcasts_file = lookup("MEDIAGATE_PODCASTS_FILE");

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.cookie_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.session.reissue_time > self.session.validity {
            return Err(ConfigError::InvalidReissue { reissue: self.session.reissue_time, validity: self.session.validity });
        }
        if self.session.cookie_name.is_empty() || !self.session.cookie_name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err(ConfigError::InvalidValue { name: "cookie_name", value: self.session.cookie_name.clone() });
        }
        for p in [&self.paths.login_form, &self.paths.login_handler, &self.paths.logout_handler, &self.paths.post_login, &self.paths.post_logout] {
            if !p.starts_with('/') {
                return Err(ConfigError::InvalidValue { name: "login_paths", value: p.clone() });
            }
        }
        Ok(())
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn session_defaults_match_thirty_day_window() {
        let s = SessionSettings::new("k");
        assert_eq!(s.validity, 2_592_000);
        assert_eq!(s.reissue_time, 1_296_000);
        assert_eq!(s.cookie_name, "authtkt");
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = ServerConfig::from_sources(&[], |_| None).unwrap_err();
        assert_eq!(err, ConfigError::MissingSecret);
    }

    #[test]
    fn flags_override_environment() {
        let env: HashMap<&str, &str> = [
            ("MEDIAGATE_COOKIE_SECRET", "from-env"),
            ("MEDIAGATE_HTTP_PORT", "9000"),
            ("MEDIAGATE_API_MAX_RESULTS", "25"),
        ].into_iter().collect();
        let cfg = ServerConfig::from_sources(
            &args(&["mediagate", "--http-port", "9100", "--secure-cookies"]),
            |k| env.get(k).map(|v| v.to_string()),
        ).unwrap();
        assert_eq!(cfg.http_port, 9100);
        assert_eq!(cfg.session.cookie_secret, "from-env");
        assert_eq!(cfg.api.max_results, 25);
        assert!(cfg.session.secure);
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = ServerConfig::from_sources(&args(&["x", "--cookie-secret", "s", "--http-port", "nope"]), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "http_port", .. }));
    }

    #[test]
    fn reissue_beyond_validity_is_rejected() {
        let mut cfg = ServerConfig::new("s");
        cfg.session.reissue_time = cfg.session.validity + 1;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidReissue { .. })));
    }
}
