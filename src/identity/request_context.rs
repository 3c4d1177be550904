use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::authorizer::PermissionSet;
use super::classifier::Channel;
use super::Principal;

/// Per-request view of who is calling and what they may do. Inserted by the
/// authorization middleware and extracted by handlers.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: String,
    pub channel: Channel,
    pub principal: Option<Principal>,
    pub permissions: PermissionSet,
}

impl RequestContext {
    pub fn new(channel: Channel, principal: Option<Principal>, permissions: PermissionSet) -> Self {
        Self { request_id: Uuid::new_v4().to_string(), channel, principal, permissions }
    }

    pub fn is_authenticated(&self) -> bool { self.permissions.is_authenticated() }

    /// 401 for anonymous callers (which the challenger turns into a login
    /// prompt), 403 for authenticated callers lacking `permission`.
    pub fn require(&self, permission: &str) -> AppResult<()> {
        if self.permissions.contains_permission(permission) {
            return Ok(());
        }
        if self.is_authenticated() {
            Err(AppError::forbidden("forbidden".to_string(), format!("missing permission '{permission}'")))
        } else {
            Err(AppError::auth("unauthorized".to_string(), format!("login required for '{permission}'")))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned()
            .ok_or_else(|| AppError::internal("auth_missing", "authorization middleware not installed"))
    }
}
