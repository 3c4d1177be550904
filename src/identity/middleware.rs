//!
//! Authentication pipeline
//! -----------------------
//! A fixed, ordered set of plugins assembled once from `ServerConfig`:
//!
//! - classify the request into a channel (Flash uploads may rewrite `Cookie`)
//! - run every identifier serving the channel, collecting identity claims
//! - authenticate claims in identifier order; the first principal wins
//! - login/logout handlers are answered here with a redirect
//! - otherwise the downstream app runs; 401s are turned into challenges for
//!   channels that have a challenger, and successful identities get their
//!   cookie (re)issued on the way out
//!
//! `authorize` then resolves the principal to permissions and stores a
//! `RequestContext` for handlers.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{AppError, ConfigError};
use crate::security::SharedCredentials;
use crate::tprintln;

use super::authorizer::PermissionResolver;
use super::challenge::should_challenge;
use super::classifier::{Channel, FlashUploadClassifier};
use super::clock::Clock;
use super::form::{redirect, FormChallenger, LoginForm};
use super::plugins::{AuthRequest, Authenticator, Challenger, Identifier, Identity, Replacement};
use super::post_data::PostFields;
use super::principal::Principal;
use super::provider::{CredentialAuthenticator, TicketAuthenticator};
use super::request_context::RequestContext;
use super::session::SessionCookie;

/// Upper bound on how much of a Flash upload is read before the handler runs.
const UPLOAD_PEEK_LIMIT: usize = 256 * 1024;

pub type ChallengeDecider = fn(&HeaderMap, StatusCode, &HeaderMap) -> bool;

/// Request extension set when a claim authenticated.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub identity: Identity,
}

struct PipelineInner {
    classifier: FlashUploadClassifier,
    identifiers: Vec<Arc<dyn Identifier>>,
    authenticators: Vec<Arc<dyn Authenticator>>,
    challengers: Vec<Arc<dyn Challenger>>,
    decider: ChallengeDecider,
    clock: Arc<dyn Clock>,
    body_limit: usize,
}

#[derive(Clone)]
pub struct AuthPipeline {
    inner: Arc<PipelineInner>,
}

/// Outcome of the identification and authentication stages.
#[derive(Debug, Default)]
pub struct Resolution {
    pub authenticated: Option<Authenticated>,
    pub replacement: Option<Replacement>,
}

impl AuthPipeline {
    /// Form login, then session cookie; credential authenticator, then ticket
    /// authenticator; form challenger for browser and upload channels.
    pub fn build(config: &ServerConfig, store: SharedCredentials, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = SessionCookie::from_settings(&config.session)?;
        let identifiers: Vec<Arc<dyn Identifier>> = vec![
            Arc::new(LoginForm::new(config.paths.clone(), config.session.validity)),
            Arc::new(session),
        ];
        let authenticators: Vec<Arc<dyn Authenticator>> = vec![
            Arc::new(CredentialAuthenticator::new(store)),
            Arc::new(TicketAuthenticator),
        ];
        let challengers: Vec<Arc<dyn Challenger>> = vec![Arc::new(FormChallenger::new(config.paths.login_form.clone()))];
        Ok(Self {
            inner: Arc::new(PipelineInner {
                classifier: FlashUploadClassifier::new(config.session.cookie_name.clone()),
                identifiers,
                authenticators,
                challengers,
                decider: should_challenge,
                clock,
                body_limit: config.body_limit,
            }),
        })
    }

    pub fn now(&self) -> i64 { self.inner.clock.now() }

    /// A login handler needs the whole body; over-limit posts are refused.
    fn buffers_post_data(&self, parts: &Parts) -> bool {
        parts.method == Method::POST && self.inner.identifiers.iter().any(|i| i.wants_post_data(parts))
    }

    /// The upload quirk only needs the session field, read from a body prefix.
    fn peeks_post_data(&self, parts: &Parts) -> bool {
        parts.method == Method::POST && self.inner.classifier.wants_post_data(parts)
    }

    fn peek_limit(&self) -> usize { self.inner.body_limit.min(UPLOAD_PEEK_LIMIT) }

    fn identifier(&self, name: &str) -> Option<&Arc<dyn Identifier>> {
        self.inner.identifiers.iter().find(|i| i.name() == name)
    }

    /// Identify and authenticate. Never fails: anything unusable is anonymous.
    pub fn resolve(&self, parts: &Parts, post: Option<&PostFields>, channel: Channel, now: i64) -> Resolution {
        let req = AuthRequest { parts, post, channel };
        let mut identities = Vec::new();
        let mut replacement = None;
        for identifier in self.inner.identifiers.iter().filter(|i| i.serves(channel)) {
            let found = identifier.identify(&req, now);
            if let Some(identity) = found.identity {
                identities.push(identity);
            }
            if replacement.is_none() {
                replacement = found.replacement;
            }
        }
        let authenticated = identities.into_iter().find_map(|identity| {
            self.inner.authenticators.iter().find_map(|a| {
                let principal = a.authenticate(&identity)?;
                debug!(target: "auth", authenticator = a.name(), identifier = identity.identifier, user_id = principal.id(), "authenticated");
                Some(Authenticated { principal, identity: identity.clone() })
            })
        });
        Resolution { authenticated, replacement }
    }

    fn remember_headers(&self, auth: &Authenticated, now: i64) -> Vec<HeaderValue> {
        self.identifier(auth.identity.rememberer)
            .map(|r| r.remember(&auth.identity, auth.principal, now))
            .unwrap_or_default()
    }

    fn forget_headers(&self) -> Vec<HeaderValue> {
        self.inner.identifiers.iter().flat_map(|i| i.forget()).collect()
    }

    fn challenge(&self, uri: &Uri, channel: Channel) -> Option<Response> {
        let challenger = self.inner.challengers.iter().find(|c| c.serves(channel))?;
        debug!(target: "auth", challenger = challenger.name(), path = %uri.path(), "challenging");
        Some(challenger.challenge(uri, self.forget_headers()))
    }
}

/// Authentication middleware. See the module docs for the stages.
pub async fn authenticate(State(pipeline): State<AuthPipeline>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let now = pipeline.now();

    let (post, body) = if pipeline.buffers_post_data(&parts) {
        let bytes = match to_bytes(body, pipeline.inner.body_limit).await {
            Ok(b) => b,
            Err(e) => {
                debug!(target: "auth", error = %e, "request body not buffered");
                return AppError::too_large("body_too_large", "request body exceeds the configured limit").into_response();
            }
        };
        let fields = PostFields::parse(&parts.headers, bytes.clone()).await;
        (Some(fields), Body::from(bytes))
    } else if pipeline.peeks_post_data(&parts) {
        let cookie_name = pipeline.inner.classifier.cookie_name();
        let (fields, body) = PostFields::peek(&parts.headers, body, pipeline.peek_limit(), cookie_name).await;
        (Some(fields), body)
    } else {
        (None, body)
    };

    let channel = pipeline.inner.classifier.classify(&mut parts, post.as_ref());
    let resolution = pipeline.resolve(&parts, post.as_ref(), channel, now);
    tprintln!("auth.resolve path={} channel={:?} user={:?}", parts.uri.path(), channel, resolution.authenticated.as_ref().map(|a| a.principal.id()));

    if let Some(replacement) = resolution.replacement {
        let headers = if replacement.forget {
            info!(target: "auth", "logout");
            pipeline.forget_headers()
        } else {
            resolution.authenticated.as_ref().map(|a| pipeline.remember_headers(a, now)).unwrap_or_default()
        };
        return redirect(&replacement.location, headers);
    }

    let request_headers = parts.headers.clone();
    let uri = parts.uri.clone();
    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(channel);
    if let Some(a) = resolution.authenticated.clone() {
        req.extensions_mut().insert(a);
    }

    let mut resp = next.run(req).await;

    if (pipeline.inner.decider)(&request_headers, resp.status(), resp.headers()) {
        if let Some(challenge) = pipeline.challenge(&uri, channel) {
            return challenge;
        }
        return resp;
    }
    if let Some(a) = resolution.authenticated.as_ref() {
        for v in pipeline.remember_headers(a, now) {
            resp.headers_mut().append(header::SET_COOKIE, v);
        }
    }
    resp
}

/// Authorization middleware: resolves permissions and inserts `RequestContext`.
pub async fn authorize(State(resolver): State<PermissionResolver>, mut req: Request, next: Next) -> Response {
    let channel = req.extensions().get::<Channel>().copied().unwrap_or(Channel::Browser);
    let principal = req.extensions().get::<Authenticated>().map(|a| a.principal);
    let permissions = resolver.permissions_for_request(principal);
    let principal = permissions.user.as_ref().map(|u| u.principal());
    req.extensions_mut().insert(RequestContext::new(channel, principal, permissions));
    next.run(req).await
}

/// Wrap `router` so every route sees an authenticated, authorized request.
pub fn add_auth(router: Router, pipeline: AuthPipeline, resolver: PermissionResolver) -> Router {
    router
        .layer(from_fn_with_state(resolver, authorize))
        .layer(from_fn_with_state(pipeline, authenticate))
}
