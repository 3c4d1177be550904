//! Capabilities of the authentication pipeline.
//!
//! The pipeline is a fixed, ordered list of values assembled at startup:
//! identifiers extract a claim from the request, authenticators turn a claim
//! into a `Principal`, and challengers answer an unauthorized response for a
//! given channel.

use std::collections::HashMap;

use axum::http::request::Parts;
use axum::http::{HeaderValue, Uri};
use axum::response::Response;

use super::classifier::Channel;
use super::post_data::PostFields;
use super::principal::Principal;
use super::ticket::Ticket;

/// Read-only view of the inbound request while identifying it.
pub struct AuthRequest<'a> {
    pub parts: &'a Parts,
    pub post: Option<&'a PostFields>,
    pub channel: Channel,
}

impl<'a> AuthRequest<'a> {
    pub fn path(&self) -> &str { self.parts.uri.path() }

    pub fn query(&self) -> HashMap<String, String> { query_map(&self.parts.uri) }
}

pub fn query_map(uri: &Uri) -> HashMap<String, String> {
    uri.query()
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

#[derive(Clone, PartialEq, Eq)]
pub enum Claim {
    Credentials { login: String, password: String },
    Ticket(Ticket),
}

impl std::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Claim::Credentials { login, .. } => f.debug_struct("Credentials").field("login", login).finish_non_exhaustive(),
            Claim::Ticket(t) => f.debug_tuple("Ticket").field(t).finish(),
        }
    }
}

/// Claimed identity produced by an identifier. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub claim: Claim,
    /// Name of the identifier that produced the claim.
    pub identifier: &'static str,
    /// Name of the identifier that should remember the authenticated principal.
    pub rememberer: &'static str,
    pub max_age: Option<u64>,
}

/// Response that replaces the downstream application (login/logout handlers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub location: String,
    /// Attach the rememberer's forget headers instead of remember headers.
    pub forget: bool,
}

#[derive(Debug, Default)]
pub struct Identification {
    pub identity: Option<Identity>,
    pub replacement: Option<Replacement>,
}

impl Identification {
    pub fn absent() -> Self { Self::default() }

    pub fn found(identity: Identity) -> Self { Self { identity: Some(identity), replacement: None } }
}

pub trait Identifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn serves(&self, _channel: Channel) -> bool { true }

    /// Whether the POST body must be buffered so `identify` can read fields.
    fn wants_post_data(&self, _parts: &Parts) -> bool { false }

    fn identify(&self, req: &AuthRequest<'_>, now: i64) -> Identification;

    /// Headers to set once `identity` authenticated as `principal`.
    fn remember(&self, _identity: &Identity, _principal: Principal, _now: i64) -> Vec<HeaderValue> { Vec::new() }

    fn forget(&self) -> Vec<HeaderValue> { Vec::new() }
}

pub trait Authenticator: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` means "not mine or not valid"; it is never an error.
    fn authenticate(&self, identity: &Identity) -> Option<Principal>;
}

pub trait Challenger: Send + Sync {
    fn name(&self) -> &'static str;

    fn serves(&self, _channel: Channel) -> bool { true }

    fn challenge(&self, uri: &Uri, forget: Vec<HeaderValue>) -> Response;
}
