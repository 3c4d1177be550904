//!
//! mediagate HTTP server
//! ---------------------
//! Axum router for the media front end. Identification, authentication and
//! challenges happen in the `identity` middleware; handlers here only read
//! the `RequestContext` it leaves behind.
//!
//! Responsibilities:
//! - Login form page and the post-login / post-logout landing redirects.
//! - Sample permission-gated endpoints (`/upload`, `/admin`).
//! - The JSON listing API.
//! - Seeding the in-memory stores and serving on the configured port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::api::{self, ApiState};
use crate::config::{LoginPaths, ServerConfig};
use crate::error::{AppError, AppResult, ConfigError};
use crate::identity::{
    add_auth, redirect, with_query, AuthPipeline, Clock, PermissionResolver, RequestContext, SystemClock,
    CAME_FROM, LOGIN_COUNTER, LOGIN_FIELD, PASSWORD_FIELD,
};
use crate::security::{ensure_default_admin, MemoryCredentialStore, SharedCredentials};
use crate::storage::{MemoryCatalog, SharedCatalog};

/// Shared server state injected into the login flow handlers.
#[derive(Clone)]
pub struct AppState {
    pub paths: LoginPaths,
}

/// Local redirect targets only: a single leading `/`, never `//host`.
pub fn safe_came_from(came_from: Option<&str>) -> String {
    match came_from {
        Some(c) if c.starts_with('/') && !c.starts_with("//") && !c.starts_with("/\\") => c.to_string(),
        _ => "/".to_string(),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Assemble the full application: routes, API and the auth layers.
pub fn build_router(
    config: &ServerConfig,
    store: SharedCredentials,
    catalog: SharedCatalog,
    clock: Arc<dyn Clock>,
) -> Result<Router, ConfigError> {
    let pipeline = AuthPipeline::build(config, store.clone(), clock)?;
    let resolver = PermissionResolver::new(store, config.policy.clone());
    let paths = config.paths.clone();
    let api_state = ApiState { catalog, settings: config.api.clone(), base_url: config.base_url.clone() };

    let app = Router::new()
        .route("/", get(|| async { "mediagate ok" }))
        .route(&paths.login_form, get(login_page))
        .route(&paths.login_handler, any(answered_by_middleware))
        .route(&paths.logout_handler, any(answered_by_middleware))
        .route(&paths.post_login, get(post_login))
        .route(&paths.post_logout, get(post_logout))
        .route("/whoami", get(whoami))
        .route("/upload", post(upload))
        .route("/admin", get(admin))
        .with_state(AppState { paths })
        .merge(api::routes(api_state))
        .fallback(not_found);

    Ok(add_auth(app, pipeline, resolver))
}

async fn login_page(State(state): State<AppState>, Query(q): Query<HashMap<String, String>>) -> Html<String> {
    let came_from = safe_came_from(q.get(CAME_FROM).map(String::as_str));
    let logins = q.get(LOGIN_COUNTER).and_then(|n| n.parse::<u32>().ok()).unwrap_or(0);
    let counter = logins.to_string();
    let action = with_query(&state.paths.login_handler, &[(CAME_FROM, came_from.as_str()), (LOGIN_COUNTER, counter.as_str())]);
    let notice = if logins > 0 { "<p class=\"error\">Incorrect username or password.</p>" } else { "" };
    Html(format!(
        "<!DOCTYPE html><html><head><title>Login</title></head><body>{notice}\
         <form method=\"post\" action=\"{action}\">\
         <label>Username <input type=\"text\" name=\"{LOGIN_FIELD}\"></label>\
         <label>Password <input type=\"password\" name=\"{PASSWORD_FIELD}\"></label>\
         <button type=\"submit\">Log in</button></form></body></html>",
        action = html_escape(&action),
    ))
}

async fn answered_by_middleware() -> AppError {
    AppError::not_found("not_found", "handled by the authentication layer")
}

/// Landing page after the login handler: forward on success, otherwise back
/// to the form with the attempt counter bumped.
async fn post_login(State(state): State<AppState>, ctx: RequestContext, Query(q): Query<HashMap<String, String>>) -> Response {
    let came_from = safe_came_from(q.get(CAME_FROM).map(String::as_str));
    if ctx.is_authenticated() {
        return redirect(&came_from, Vec::new());
    }
    let logins = q.get(LOGIN_COUNTER).and_then(|n| n.parse::<u32>().ok()).unwrap_or(0).saturating_add(1).to_string();
    let location = with_query(&state.paths.login_form, &[(CAME_FROM, came_from.as_str()), (LOGIN_COUNTER, logins.as_str())]);
    redirect(&location, Vec::new())
}

async fn post_logout(Query(q): Query<HashMap<String, String>>) -> Response {
    redirect(&safe_came_from(q.get(CAME_FROM).map(String::as_str)), Vec::new())
}

async fn whoami(ctx: RequestContext) -> Json<RequestContext> { Json(ctx) }

async fn upload(ctx: RequestContext) -> AppResult<impl IntoResponse> {
    ctx.require("upload")?;
    Ok(Json(json!({"status": "ok", "user_id": ctx.principal.map(|p| p.id()), "channel": ctx.channel})))
}

async fn admin(ctx: RequestContext) -> AppResult<impl IntoResponse> {
    ctx.require("admin")?;
    Ok(Json(json!({"status": "ok", "user": ctx.permissions.user.as_ref().map(|u| u.user_name.clone())})))
}

async fn not_found() -> AppError {
    AppError::not_found("not_found", "no such route")
}

fn log_startup(config: &ServerConfig) {
    info!(
        target: "startup",
        "mediagate starting: http_port={}, base_url={}, cookie={}, secure_cookies={}, api_max_results={}, api_key_required={}",
        config.http_port,
        config.base_url,
        config.session.cookie_name,
        config.session.secure,
        config.api.max_results,
        config.api.secret_key.is_some(),
    );
}

/// Seed the in-memory stores and serve until the listener fails.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    log_startup(&config);

    let store = MemoryCredentialStore::new();
    ensure_default_admin(&store, config.admin_password.as_deref()).context("seeding default admin")?;
    let catalog = match config.podcasts_file.as_deref() {
        Some(path) => MemoryCatalog::load_json_file(path)?,
        None => MemoryCatalog::new(),
    };

    let app = build_router(&config, Arc::new(store), Arc::new(catalog), Arc::new(SystemClock))
        .context("building the auth pipeline")?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
