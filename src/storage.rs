//!
//! mediagate storage module
//! ------------------------
//! The podcast catalog read by the listing API. `PodcastCatalog` is the seam
//! for a real database; `MemoryCatalog` keeps everything in a
//! `parking_lot::RwLock` and can be seeded from a JSON array on disk.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podcast {
    pub id: u64,
    pub slug: String,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    /// XHTML.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Published media items in this podcast.
    #[serde(default)]
    pub media_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderColumn { Id, Slug }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction { Asc, Desc }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: OrderColumn,
    pub direction: Direction,
}

impl Default for OrderBy {
    fn default() -> Self { Self { column: OrderColumn::Id, direction: Direction::Asc } }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let col = match self.column { OrderColumn::Id => "id", OrderColumn::Slug => "slug" };
        let dir = match self.direction { Direction::Asc => "asc", Direction::Desc => "desc" };
        write!(f, "{col} {dir}")
    }
}

/// `"<column> <asc|desc>"`, separated by whitespace. The direction is required.
impl FromStr for OrderBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut it = s.split_whitespace();
        let (Some(col), Some(dir), None) = (it.next(), it.next(), it.next()) else {
            return Err(format!("order must be '<column> <asc|desc>', got '{s}'"));
        };
        let column = match col.to_ascii_lowercase().as_str() {
            "id" => OrderColumn::Id,
            "slug" => OrderColumn::Slug,
            other => return Err(format!("unknown order column '{other}'")),
        };
        let direction = match dir.to_ascii_lowercase().as_str() {
            "asc" => Direction::Asc,
            "desc" => Direction::Desc,
            other => return Err(format!("unknown order direction '{other}'")),
        };
        Ok(Self { column, direction })
    }
}

pub trait PodcastCatalog: Send + Sync {
    /// Size of the full result set, ignoring paging.
    fn count(&self) -> Result<usize>;

    fn list(&self, order: OrderBy, offset: usize, limit: usize) -> Result<Vec<Podcast>>;
}

pub type SharedCatalog = Arc<dyn PodcastCatalog>;

#[derive(Default)]
pub struct MemoryCatalog {
    podcasts: RwLock<Vec<Podcast>>,
}

impl MemoryCatalog {
    pub fn new() -> Self { Self::default() }

    pub fn from_podcasts(podcasts: Vec<Podcast>) -> Self { Self { podcasts: RwLock::new(podcasts) } }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let podcasts: Vec<Podcast> = serde_json::from_str(json).context("podcast seed is not a JSON array of podcasts")?;
        Ok(Self::from_podcasts(podcasts))
    }

    pub fn load_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading podcast seed {}", path.display()))?;
        let catalog = Self::from_json_str(&text).with_context(|| format!("parsing podcast seed {}", path.display()))?;
        debug!(target: "storage", path = %path.display(), count = catalog.podcasts.read().len(), "podcast catalog loaded");
        Ok(catalog)
    }

    /// Insert or replace by id.
    pub fn upsert(&self, podcast: Podcast) {
        let mut all = self.podcasts.write();
        match all.iter_mut().find(|p| p.id == podcast.id) {
            Some(existing) => *existing = podcast,
            None => all.push(podcast),
        }
    }
}

impl PodcastCatalog for MemoryCatalog {
    fn count(&self) -> Result<usize> { Ok(self.podcasts.read().len()) }

    fn list(&self, order: OrderBy, offset: usize, limit: usize) -> Result<Vec<Podcast>> {
        let mut all = self.podcasts.read().clone();
        match order.column {
            OrderColumn::Id => all.sort_by_key(|p| p.id),
            OrderColumn::Slug => all.sort_by(|a, b| a.slug.cmp(&b.slug).then(a.id.cmp(&b.id))),
        }
        if order.direction == Direction::Desc {
            all.reverse();
        }
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }
}
