//! Listing API tests through the full router (auth layers included).

use std::sync::Arc;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::DateTime;
use serde_json::Value;
use tower::ServiceExt;

use mediagate::config::ServerConfig;
use mediagate::identity::{ManualClock, PermissionPolicy};
use mediagate::security::MemoryCredentialStore;
use mediagate::server::build_router;
use mediagate::storage::{MemoryCatalog, Podcast};

fn catalog(n: u64) -> MemoryCatalog {
    let t = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
    MemoryCatalog::from_podcasts((1..=n).map(|id| Podcast {
        id,
        slug: format!("episode-{id:03}"),
        created_on: t,
        modified_on: t,
        title: Some(format!("Episode {id}")),
        subtitle: Some("weekly".into()),
        description: Some("<p>Show <em>notes</em></p>".into()),
        category: Some("Technology".into()),
        media_count: 3,
    }).collect())
}

fn app(config: ServerConfig, podcasts: u64) -> Router {
    let store = Arc::new(MemoryCredentialStore::with_cost(8, 1).unwrap());
    build_router(&config, store, Arc::new(catalog(podcasts)), Arc::new(ManualClock::new(1_700_000_000))).unwrap()
}

async fn get(app: &Router, uri: &str, xhr: bool) -> Result<Response> {
    let mut b = Request::get(uri);
    if xhr {
        b = b.header("x-requested-with", "XMLHttpRequest");
    }
    Ok(app.clone().oneshot(b.body(Body::empty())?).await?)
}

async fn json(resp: Response) -> Result<Value> {
    Ok(serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await?)?)
}

#[tokio::test]
async fn limit_is_capped_at_max_results() -> Result<()> {
    let app = app(ServerConfig::new("s"), 60);
    let resp = get(&app, "/api/podcasts?limit=1000", false).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await?;
    assert_eq!(body["count"], 60);
    assert_eq!(body["podcasts"].as_array().map(Vec::len), Some(50));
    Ok(())
}

#[tokio::test]
async fn order_offset_and_info_fields() -> Result<()> {
    let mut config = ServerConfig::new("s");
    config.base_url = "https://media.example".into();
    let app = app(config, 5);
    let body = json(get(&app, "/api/podcasts?order=slug%20desc&offset=1&limit=2", false).await?).await?;
    let items = body["podcasts"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["slug"], "episode-004");
    assert_eq!(items[0]["description"], "Show notes");
    assert_eq!(items[0]["feed_url"], "https://media.example/podcasts/episode-004/feed");
    assert_eq!(items[0]["thumb_url"], "https://media.example/images/podcasts/4l.jpg");
    assert_eq!(items[1]["id"], 3);
    Ok(())
}

#[tokio::test]
async fn invalid_parameters_are_bad_requests() -> Result<()> {
    let app = app(ServerConfig::new("s"), 3);
    for uri in ["/api/podcasts?order=title%20asc", "/api/podcasts?offset=-4", "/api/podcasts?limit=lots"] {
        let resp = get(&app, uri, false).await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json(resp).await?["status"], "error");
    }
    Ok(())
}

#[tokio::test]
async fn api_key_is_enforced_when_configured() -> Result<()> {
    let mut config = ServerConfig::new("s");
    config.api.secret_key = Some("k3y".into());
    let app = app(config, 2);

    let resp = get(&app, "/api/podcasts", false).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(resp).await?["error"], "Authentication Error");

    let resp = get(&app, "/api/podcasts?api_key=k3y", false).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn listing_needs_view_permission() -> Result<()> {
    let mut config = ServerConfig::new("s");
    config.policy = PermissionPolicy::empty().grant("authenticated", &["view"]);
    let app = app(config, 2);
    assert_eq!(get(&app, "/api/podcasts", true).await?.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(get(&app, "/api/podcasts", false).await?.status(), StatusCode::FOUND);
    Ok(())
}
