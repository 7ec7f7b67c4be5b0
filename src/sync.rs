use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::model::FixtureRecord;
use crate::normalize::normalize_fixture;
use crate::provider::{FixtureCategory, FixtureFeed, fetch_all};
use crate::scoring::{ScoreOutcome, score_fixture};
use crate::store::{FixtureStore, FixtureUpsert, queries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Fixtures,
    Results,
    Sweep,
}

impl SyncKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncKind::Fixtures => "fixtures",
            SyncKind::Results => "results",
            SyncKind::Sweep => "sweep",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one sync pass. Problems are collected here rather than
/// returned as errors so one bad page or record never fails the pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub kind: SyncKind,
    /// Fixtures inserted for the first time.
    pub created: usize,
    /// Fixtures pass: existing fixtures refreshed. Results pass: fixtures
    /// whose stored result changed.
    pub updated: usize,
    /// Completed fixtures whose stored result already matched.
    pub unchanged: usize,
    /// Malformed or incomplete records.
    pub skipped: usize,
    /// Completed records for fixtures never synced here.
    pub unknown: usize,
    /// Fixtures the scoring engine marked done during this pass.
    pub scored: usize,
    pub failed_categories: Vec<FixtureCategory>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            unknown: 0,
            scored: 0,
            failed_categories: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Reconciles the provider's fixture listings with the store.
pub struct SyncEngine {
    feed: Arc<dyn FixtureFeed>,
    store: Arc<FixtureStore>,
}

impl SyncEngine {
    pub fn new(feed: Arc<dyn FixtureFeed>, store: Arc<FixtureStore>) -> Self {
        Self { feed, store }
    }

    pub fn store(&self) -> &Arc<FixtureStore> {
        &self.store
    }

    /// Upserts upcoming and live fixtures and refreshes gameweek lock times.
    /// Never touches results or scores.
    pub fn sync_fixtures(&self) -> SyncReport {
        let mut report = SyncReport::new(SyncKind::Fixtures);
        let run_id = self.begin_run(SyncKind::Fixtures);

        let Some(season) = self.resolve_season(&mut report) else {
            self.finish_run(run_id, &report);
            return report;
        };

        for category in [FixtureCategory::Upcoming, FixtureCategory::Live] {
            let Some(raw) = self.fetch_category(season, category, &mut report) else {
                continue;
            };

            let mut touched = BTreeSet::new();
            for item in &raw {
                let record = match normalize_fixture(item) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(%category, error = %err, "skipping malformed fixture");
                        report.skipped += 1;
                        continue;
                    }
                };
                match self.upsert_record(&record) {
                    Ok((gameweek_id, upsert)) => {
                        touched.insert(gameweek_id);
                        if upsert.is_new {
                            report.created += 1;
                        } else {
                            report.updated += 1;
                        }
                    }
                    Err(err) => {
                        warn!(external_id = %record.external_id, error = %format!("{err:#}"), "fixture upsert failed");
                        report
                            .errors
                            .push(format!("fixture {}: {err:#}", record.external_id));
                    }
                }
            }

            for gameweek_id in touched {
                if let Err(err) = self.store.recompute_lock_time(gameweek_id) {
                    warn!(gameweek_id, error = %format!("{err:#}"), "lock time refresh failed");
                    report
                        .errors
                        .push(format!("gameweek {gameweek_id} lock time: {err:#}"));
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "fixture sync finished"
        );
        self.finish_run(run_id, &report);
        report
    }

    /// Applies completed results and scores each fixture whose result
    /// changed, before moving on to the next record.
    pub fn sync_results(&self) -> SyncReport {
        let mut report = SyncReport::new(SyncKind::Results);
        let run_id = self.begin_run(SyncKind::Results);

        let raw = self
            .resolve_season(&mut report)
            .and_then(|season| self.fetch_category(season, FixtureCategory::Completed, &mut report));
        let Some(raw) = raw else {
            self.finish_run(run_id, &report);
            return report;
        };

        for item in &raw {
            let record = match normalize_fixture(item) {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "skipping malformed completed fixture");
                    report.skipped += 1;
                    continue;
                }
            };
            self.apply_result(&record, &mut report);
        }

        info!(
            updated = report.updated,
            scored = report.scored,
            unchanged = report.unchanged,
            unknown = report.unknown,
            skipped = report.skipped,
            errors = report.errors.len(),
            "results sync finished"
        );
        self.finish_run(run_id, &report);
        report
    }

    /// Scores every fixture that has a result but was never marked scored,
    /// e.g. after a crash between writing a result and scoring it.
    pub fn sweep_unscored(&self) -> SyncReport {
        let mut report = SyncReport::new(SyncKind::Sweep);
        let pending = match self.store.unscored_fixtures() {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "listing unscored fixtures failed");
                report.errors.push(format!("list unscored: {err:#}"));
                return report;
            }
        };
        for fixture_id in pending {
            self.score(fixture_id, &mut report);
        }
        if report.scored > 0 {
            info!(scored = report.scored, "recovered unscored fixtures");
        }
        report
    }

    /// Manual trigger: fixtures first so new results find their rows.
    pub fn sync_all(&self) -> (SyncReport, SyncReport) {
        let fixtures = self.sync_fixtures();
        let results = self.sync_results();
        (fixtures, results)
    }

    fn apply_result(&self, record: &FixtureRecord, report: &mut SyncReport) {
        let (Some(result), Some(home), Some(away)) =
            (record.result, record.home_score, record.away_score)
        else {
            debug!(external_id = %record.external_id, "completed fixture without a score");
            report.skipped += 1;
            return;
        };

        let fixture = match self.store.fixture_by_external_id(&record.external_id) {
            Ok(Some(fixture)) => fixture,
            Ok(None) => {
                debug!(external_id = %record.external_id, "result for unknown fixture");
                report.unknown += 1;
                return;
            }
            Err(err) => {
                warn!(external_id = %record.external_id, error = %format!("{err:#}"), "fixture lookup failed");
                report
                    .errors
                    .push(format!("fixture {}: {err:#}", record.external_id));
                return;
            }
        };

        if fixture.result == Some(result) {
            report.unchanged += 1;
            return;
        }
        if fixture.points_calculated {
            warn!(
                fixture_id = fixture.id,
                external_id = %record.external_id,
                %result,
                "result corrected after scoring; existing awards stand"
            );
        }

        match self.store.record_result(fixture.id, home, away, result) {
            Ok(true) => report.updated += 1,
            Ok(false) => {
                // Another pass wrote the same result first and owns scoring.
                report.unchanged += 1;
                return;
            }
            Err(err) => {
                warn!(fixture_id = fixture.id, error = %format!("{err:#}"), "recording result failed");
                report.errors.push(format!("fixture {}: {err:#}", fixture.id));
                return;
            }
        }

        self.score(fixture.id, report);
    }

    fn score(&self, fixture_id: i64, report: &mut SyncReport) {
        match score_fixture(&self.store, fixture_id) {
            Ok(ScoreOutcome::Scored { .. } | ScoreOutcome::NoCorrectPredictions { .. }) => {
                report.scored += 1;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(fixture_id, error = %format!("{err:#}"), "scoring failed");
                report.errors.push(format!("score fixture {fixture_id}: {err:#}"));
            }
        }
    }

    fn upsert_record(&self, record: &FixtureRecord) -> Result<(i64, FixtureUpsert)> {
        self.store.write(|tx| {
            let gameweek_id = queries::ensure_gameweek(tx, record.gameweek_number)?;
            let upsert = queries::upsert_fixture(tx, gameweek_id, record)?;
            Ok((gameweek_id, upsert))
        })
    }

    fn resolve_season(&self, report: &mut SyncReport) -> Option<u64> {
        match self.feed.current_season() {
            Ok(season) => Some(season),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not determine current season");
                report.errors.push(format!("season lookup: {err:#}"));
                None
            }
        }
    }

    fn fetch_category(
        &self,
        season: u64,
        category: FixtureCategory,
        report: &mut SyncReport,
    ) -> Option<Vec<serde_json::Value>> {
        match fetch_all(self.feed.as_ref(), season, category) {
            Ok(raw) => {
                debug!(%category, count = raw.len(), "fetched fixtures");
                Some(raw)
            }
            Err(err) => {
                warn!(%category, error = %format!("{err:#}"), "fixture fetch failed");
                report.failed_categories.push(category);
                report.errors.push(format!("{category}: {err:#}"));
                None
            }
        }
    }

    fn begin_run(&self, kind: SyncKind) -> Option<i64> {
        match self.store.begin_sync_run(kind.as_str()) {
            Ok(run_id) => Some(run_id),
            Err(err) => {
                warn!(%kind, error = %format!("{err:#}"), "could not record sync run");
                None
            }
        }
    }

    fn finish_run(&self, run_id: Option<i64>, report: &SyncReport) {
        let Some(run_id) = run_id else {
            return;
        };
        if let Err(err) = self.store.finish_sync_run(run_id, report) {
            warn!(run_id, error = %format!("{err:#}"), "could not finalise sync run");
        }
    }
}
