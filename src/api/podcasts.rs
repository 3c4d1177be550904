use axum::extract::{Query, State};
use axum::Json;
use chrono::SecondsFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::identity::RequestContext;
use crate::storage::{OrderBy, Podcast};

use super::{require_api_key_if_necessary, ApiState};

/// Raw query parameters; numbers are parsed by hand so bad input is a JSON 400.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub order: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodcastInfo {
    pub id: u64,
    pub slug: String,
    pub created_on: String,
    pub modified_on: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: Option<String>,
    pub media_count: u64,
    pub feed_url: String,
    pub thumb_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodcastList {
    pub count: usize,
    pub podcasts: Vec<PodcastInfo>,
}

static TAGS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<[^>]*>").ok());
static SPACES: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s+").ok());

/// Drop markup and collapse whitespace. Entities are left encoded.
pub fn strip_xhtml(html: &str) -> String {
    let text = match TAGS.as_ref() {
        Some(re) => re.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    };
    match SPACES.as_ref() {
        Some(re) => re.replace_all(&text, " ").trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn parse_count(name: &str, value: Option<&str>, default: usize) -> AppResult<usize> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse::<usize>()
            .map_err(|_| AppError::user("invalid_parameter".to_string(), format!("{name} must be a non-negative integer, got '{v}'"))),
    }
}

pub fn info(podcast: &Podcast, base_url: &str) -> PodcastInfo {
    PodcastInfo {
        id: podcast.id,
        slug: podcast.slug.clone(),
        created_on: podcast.created_on.to_rfc3339_opts(SecondsFormat::Secs, true),
        modified_on: podcast.modified_on.to_rfc3339_opts(SecondsFormat::Secs, true),
        title: podcast.title.clone().unwrap_or_default(),
        subtitle: podcast.subtitle.clone().unwrap_or_default(),
        description: podcast.description.as_deref().map(strip_xhtml).unwrap_or_default(),
        category: podcast.category.clone(),
        media_count: podcast.media_count,
        feed_url: format!("{}/podcasts/{}/feed", base_url, urlencoding::encode(&podcast.slug)),
        thumb_url: format!("{}/images/podcasts/{}l.jpg", base_url, podcast.id),
    }
}

/// Page through the catalog. `limit` is silently capped at the configured
/// maximum; `count` always reports the full result set.
pub fn list(api: &ApiState, params: &ListParams) -> AppResult<PodcastList> {
    let order = match params.order.as_deref().map(str::trim) {
        None | Some("") => OrderBy::default(),
        Some(o) => o.parse::<OrderBy>().map_err(|e| AppError::user("invalid_order".to_string(), e))?,
    };
    let offset = parse_count("offset", params.offset.as_deref(), 0)?;
    let limit = parse_count("limit", params.limit.as_deref(), 10)?.min(api.settings.max_results);

    let count = api.catalog.count()?;
    let podcasts = api.catalog.list(order, offset, limit)?
        .iter()
        .map(|p| info(p, &api.base_url))
        .collect();
    Ok(PodcastList { count, podcasts })
}

/// `GET /api/podcasts`
pub async fn index(State(api): State<ApiState>, ctx: RequestContext, Query(params): Query<ListParams>) -> AppResult<Json<PodcastList>> {
    require_api_key_if_necessary(&api.settings, params.api_key.as_deref())?;
    ctx.require("view")?;
    Ok(Json(list(&api, &params)?))
}
