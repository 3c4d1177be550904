//!
//! mediagate JSON API
//! ------------------
//! Read-only listing endpoints. Every endpoint honours the optional API key
//! and the caller's `view` permission.

use axum::routing::get;
use axum::Router;

use crate::config::ApiSettings;
use crate::error::{AppError, AppResult};
use crate::storage::SharedCatalog;

pub mod podcasts;

#[derive(Clone)]
pub struct ApiState {
    pub catalog: SharedCatalog,
    pub settings: ApiSettings,
    /// Absolute base for generated feed and thumbnail URLs.
    pub base_url: String,
}

/// When a key is configured the caller must present it as `api_key`. The
/// failure is a 403 so it never turns into a login challenge.
pub fn require_api_key_if_necessary(settings: &ApiSettings, supplied: Option<&str>) -> AppResult<()> {
    match settings.secret_key.as_deref() {
        None => Ok(()),
        Some(expected) if supplied == Some(expected) => Ok(()),
        Some(_) => Err(AppError::forbidden("api_key", "Authentication Error")),
    }
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/podcasts", get(podcasts::index))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_only_checked_when_configured() {
        let open = ApiSettings::default();
        assert!(require_api_key_if_necessary(&open, None).is_ok());
        let locked = ApiSettings { secret_key: Some("k".into()), ..Default::default() };
        assert!(require_api_key_if_necessary(&locked, Some("k")).is_ok());
        let err = require_api_key_if_necessary(&locked, Some("nope")).unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.message(), "Authentication Error");
        assert!(require_api_key_if_necessary(&locked, None).is_err());
    }
}
