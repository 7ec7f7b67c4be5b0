//! In-memory [`FixtureFeed`] for tests, benches and `matchday demo`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

use crate::model::FixtureStatus;
use crate::provider::{FixtureCategory, FixtureFeed, FixturePage};

const TEAMS: &[&str] = &[
    "Arsenal",
    "Aston Villa",
    "Bournemouth",
    "Brentford",
    "Brighton",
    "Chelsea",
    "Crystal Palace",
    "Everton",
    "Fulham",
    "Liverpool",
    "Man City",
    "Man Utd",
    "Newcastle",
    "Nottm Forest",
    "Spurs",
    "West Ham",
    "Wolves",
    "Leeds",
    "Burnley",
    "Sunderland",
];

/// Scripted feed: each category holds a list of pages, and any category
/// (or the season lookup) can be switched into failure.
pub struct FakeFeed {
    season: Mutex<Option<u64>>,
    pages: Mutex<HashMap<FixtureCategory, Vec<Vec<Value>>>>,
    failing: Mutex<HashSet<FixtureCategory>>,
    page_requests: AtomicUsize,
}

impl FakeFeed {
    pub fn new(season: u64) -> Self {
        Self {
            season: Mutex::new(Some(season)),
            pages: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            page_requests: AtomicUsize::new(0),
        }
    }

    pub fn set_pages(&self, category: FixtureCategory, pages: Vec<Vec<Value>>) {
        if let Ok(mut guard) = self.pages.lock() {
            guard.insert(category, pages);
        }
    }

    /// Splits `fixtures` into pages of `page_size`.
    pub fn set_fixtures(&self, category: FixtureCategory, fixtures: Vec<Value>, page_size: usize) {
        let pages = fixtures
            .chunks(page_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        self.set_pages(category, pages);
    }

    pub fn set_failing(&self, category: FixtureCategory, failing: bool) {
        if let Ok(mut guard) = self.failing.lock() {
            if failing {
                guard.insert(category);
            } else {
                guard.remove(&category);
            }
        }
    }

    pub fn set_season_available(&self, season: Option<u64>) {
        if let Ok(mut guard) = self.season.lock() {
            *guard = season;
        }
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }
}

impl FixtureFeed for FakeFeed {
    fn current_season(&self) -> Result<u64> {
        let guard = self
            .season
            .lock()
            .map_err(|_| anyhow!("fake feed lock poisoned"))?;
        guard.ok_or_else(|| anyhow!("provider unreachable"))
    }

    fn fetch_page(&self, _season: u64, category: FixtureCategory, page: u32) -> Result<FixturePage> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .lock()
            .map_err(|_| anyhow!("fake feed lock poisoned"))?
            .contains(&category);
        if failing {
            return Err(anyhow!("provider unreachable for {category} fixtures"));
        }

        let guard = self
            .pages
            .lock()
            .map_err(|_| anyhow!("fake feed lock poisoned"))?;
        let pages = guard.get(&category).map(Vec::as_slice).unwrap_or_default();
        let num_pages = pages.len().max(1) as u32;
        let fixtures = pages.get(page as usize).cloned().unwrap_or_default();
        Ok(FixturePage {
            fixtures,
            num_pages,
        })
    }
}

/// Builds one fixture payload in the provider's wire shape.
pub fn raw_fixture(
    id: u64,
    gameweek: u32,
    kickoff: DateTime<Utc>,
    home: &str,
    away: &str,
    status: FixtureStatus,
    score: Option<(i64, i64)>,
) -> Value {
    let mut home_side = json!({ "teamRole": "home", "team": { "name": home } });
    let mut away_side = json!({ "teamRole": "away", "team": { "name": away } });
    if let Some((h, a)) = score {
        home_side["score"] = json!(h as f64);
        away_side["score"] = json!(a as f64);
    }
    json!({
        "id": id as f64,
        "gameweek": { "gameweek": gameweek },
        "kickoff": { "millis": kickoff.timestamp_millis() },
        "status": status.code(),
        "teams": [home_side, away_side],
    })
}

/// A generated season: every fixture as first announced, plus final
/// scores for the ones already played.
#[derive(Debug, Clone, Default)]
pub struct DemoSeason {
    pub schedule: Vec<Value>,
    pub completed: Vec<Value>,
}

/// Random season of `gameweeks` rounds of ten fixtures, one week apart,
/// starting at `first_kickoff`. Fixtures that kicked off more than two hours
/// before `now` get a random final score.
pub fn random_season(
    rng: &mut impl Rng,
    gameweeks: u32,
    first_kickoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DemoSeason {
    let mut season = DemoSeason::default();
    let mut next_id = 100_000u64;
    for gw in 1..=gameweeks {
        let mut teams = TEAMS.to_vec();
        teams.shuffle(rng);
        let round_start = first_kickoff + ChronoDuration::weeks(i64::from(gw - 1));
        for (slot, pair) in teams.chunks(2).enumerate() {
            let [home, away] = pair else {
                continue;
            };
            // Spread kickoffs over Saturday to Monday.
            let slot = slot as i64;
            let kickoff = round_start + ChronoDuration::hours((slot % 5) * 3 + (slot / 5) * 24);
            next_id += 1;
            season.schedule.push(raw_fixture(
                next_id,
                gw,
                kickoff,
                home,
                away,
                FixtureStatus::Unplayed,
                None,
            ));
            if kickoff + ChronoDuration::hours(2) < now {
                let score = (rng.gen_range(0..4), rng.gen_range(0..4));
                season.completed.push(raw_fixture(
                    next_id,
                    gw,
                    kickoff,
                    home,
                    away,
                    FixtureStatus::Completed,
                    Some(score),
                ));
            }
        }
    }
    season
}
