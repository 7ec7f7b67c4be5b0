use std::fmt;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::http_client::http_client;

/// Status filter understood by the fixture feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureCategory {
    Upcoming,
    Live,
    Completed,
}

impl FixtureCategory {
    pub fn code(self) -> &'static str {
        match self {
            FixtureCategory::Upcoming => "U",
            FixtureCategory::Live => "L",
            FixtureCategory::Completed => "C",
        }
    }
}

impl fmt::Display for FixtureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FixtureCategory::Upcoming => "upcoming",
            FixtureCategory::Live => "live",
            FixtureCategory::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// One page of raw fixtures. `num_pages` is the provider's total for the
/// query, so callers know when pagination is drained.
#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    pub fixtures: Vec<Value>,
    pub num_pages: u32,
}

/// Upstream source of fixture data. Implementations are shared across the
/// scheduler's worker threads.
pub trait FixtureFeed: Send + Sync {
    fn current_season(&self) -> Result<u64>;

    fn fetch_page(&self, season: u64, category: FixtureCategory, page: u32) -> Result<FixturePage>;
}

/// Drains every page for one category. Any page failure fails the whole
/// category so a half-read listing is never written.
pub fn fetch_all(feed: &dyn FixtureFeed, season: u64, category: FixtureCategory) -> Result<Vec<Value>> {
    let mut page = 0u32;
    let mut out = Vec::new();
    loop {
        let data = feed
            .fetch_page(season, category, page)
            .with_context(|| format!("fetch {category} fixtures page {page}"))?;
        out.extend(data.fixtures);
        if page + 1 >= data.num_pages.max(1) {
            break;
        }
        page += 1;
    }
    Ok(out)
}

/// The Premier League's public fixture API.
pub struct PulseFeed {
    client: &'static Client,
    base_url: String,
    competition_id: u32,
    page_size: u32,
}

impl PulseFeed {
    pub fn new(cfg: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(cfg.timeout_secs)?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            competition_id: cfg.competition_id,
            page_size: cfg.page_size,
        })
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .context("request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status}: {}", truncate(&body, 200)));
        }
        Ok(body)
    }
}

impl FixtureFeed for PulseFeed {
    fn current_season(&self) -> Result<u64> {
        let url = format!(
            "{}/competitions/{}/compseasons",
            self.base_url, self.competition_id
        );
        let body = self.get_json(
            &url,
            &[
                ("page", "0".to_string()),
                ("pageSize", "1".to_string()),
                ("sort", "desc".to_string()),
            ],
        )?;
        parse_season_json(&body)
    }

    fn fetch_page(&self, season: u64, category: FixtureCategory, page: u32) -> Result<FixturePage> {
        let url = format!("{}/fixtures", self.base_url);
        let body = self.get_json(
            &url,
            &[
                ("compSeasons", season.to_string()),
                ("comps", self.competition_id.to_string()),
                ("page", page.to_string()),
                ("pageSize", self.page_size.to_string()),
                ("sort", "asc".to_string()),
                ("statuses", category.code().to_string()),
            ],
        )?;
        parse_fixture_page_json(&body)
    }
}

#[derive(Debug, Deserialize)]
struct SeasonList {
    #[serde(default)]
    content: Vec<SeasonEntry>,
}

#[derive(Debug, Deserialize)]
struct SeasonEntry {
    id: f64,
}

#[derive(Debug, Deserialize)]
struct RawFixturePage {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(rename = "pageInfo", default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "numPages", default)]
    num_pages: Option<f64>,
}

pub fn parse_season_json(raw: &str) -> Result<u64> {
    let list: SeasonList = serde_json::from_str(raw.trim()).context("invalid seasons json")?;
    let first = list
        .content
        .first()
        .ok_or_else(|| anyhow!("no seasons returned by provider"))?;
    if !first.id.is_finite() || first.id < 0.0 {
        return Err(anyhow!("invalid season id {}", first.id));
    }
    Ok(first.id as u64)
}

pub fn parse_fixture_page_json(raw: &str) -> Result<FixturePage> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(FixturePage::default());
    }
    let page: RawFixturePage = serde_json::from_str(trimmed).context("invalid fixtures json")?;
    let num_pages = page
        .page_info
        .and_then(|info| info.num_pages)
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n as u32)
        .unwrap_or(1);
    Ok(FixturePage {
        fixtures: page.content,
        num_pages,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
