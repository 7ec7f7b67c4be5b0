//! SQLite-backed persistence for gameweeks, fixtures, predictions and point
//! awards.
//!
//! In-process callers share one connection behind a mutex. Writes run in
//! `BEGIN IMMEDIATE` transactions so several processes pointed at the same
//! database file (say the scheduler and a manual `matchday sync`) serialise
//! on SQLite's write lock instead of interleaving.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::model::{
    Fixture, FixtureRecord, FixtureStatus, Gameweek, Outcome, PointAward, Prediction,
    PredictionTally,
};
use crate::sync::SyncReport;

pub mod queries;
mod schema;

pub use queries::LOCK_BUFFER_HOURS;
pub use schema::init_schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureUpsert {
    pub fixture_id: i64,
    pub is_new: bool,
    /// Status actually stored after transition validation.
    pub status: FixtureStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLock {
    pub fixture_id: i64,
    pub gameweek_number: u32,
    pub lock_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRunRow {
    pub run_id: i64,
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub unknown: u64,
    pub errors: Vec<String>,
}

pub struct FixtureStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl FixtureStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("set sqlite busy timeout")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("fixture store connection lock poisoned"))
    }

    /// Runs `f` against the connection without opening a transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&*conn)
    }

    /// Runs `f` inside an immediate transaction; commits on `Ok`, rolls back
    /// on `Err`.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin immediate transaction")?;
        let out = f(&tx)?;
        tx.commit().context("commit transaction")?;
        Ok(out)
    }

    pub fn ensure_gameweek(&self, number: u32) -> Result<i64> {
        self.write(|tx| queries::ensure_gameweek(tx, number))
    }

    pub fn upsert_fixture(&self, gameweek_id: i64, record: &FixtureRecord) -> Result<FixtureUpsert> {
        self.write(|tx| queries::upsert_fixture(tx, gameweek_id, record))
    }

    pub fn recompute_lock_time(&self, gameweek_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.write(|tx| queries::recompute_lock_time(tx, gameweek_id))
    }

    pub fn get_fixture(&self, fixture_id: i64) -> Result<Option<Fixture>> {
        self.read(|conn| queries::get_fixture(conn, fixture_id))
    }

    pub fn fixture_by_external_id(&self, external_id: &str) -> Result<Option<Fixture>> {
        self.read(|conn| queries::fixture_by_external_id(conn, external_id))
    }

    pub fn list_fixtures(&self, gameweek_id: i64) -> Result<Vec<Fixture>> {
        self.read(|conn| queries::list_fixtures(conn, gameweek_id))
    }

    pub fn record_result(
        &self,
        fixture_id: i64,
        home_score: i64,
        away_score: i64,
        result: Outcome,
    ) -> Result<bool> {
        self.write(|tx| queries::record_result(tx, fixture_id, home_score, away_score, result))
    }

    pub fn list_predictions(&self, fixture_id: i64) -> Result<Vec<Prediction>> {
        self.read(|conn| queries::list_predictions(conn, fixture_id))
    }

    pub fn upsert_prediction(&self, user_id: i64, fixture_id: i64, value: Outcome) -> Result<()> {
        let now = Utc::now();
        self.write(|tx| queries::upsert_prediction(tx, user_id, fixture_id, value, now))
    }

    pub fn prediction_tally(&self, fixture_id: i64) -> Result<PredictionTally> {
        self.read(|conn| queries::prediction_tally(conn, fixture_id))
    }

    pub fn insert_point_award_if_absent(
        &self,
        user_id: i64,
        fixture_id: i64,
        points: f64,
    ) -> Result<bool> {
        let now = Utc::now();
        self.write(|tx| queries::insert_point_award_if_absent(tx, user_id, fixture_id, points, now))
    }

    pub fn mark_scored(&self, fixture_id: i64) -> Result<bool> {
        self.write(|tx| queries::mark_scored(tx, fixture_id))
    }

    pub fn point_awards(&self, fixture_id: i64) -> Result<Vec<PointAward>> {
        self.read(|conn| queries::point_awards(conn, fixture_id))
    }

    pub fn unscored_fixtures(&self) -> Result<Vec<i64>> {
        self.read(queries::unscored_fixtures)
    }

    pub fn fixture_lock(&self, fixture_id: i64) -> Result<Option<FixtureLock>> {
        self.read(|conn| queries::fixture_lock(conn, fixture_id))
    }

    pub fn get_gameweek(&self, gameweek_id: i64) -> Result<Option<Gameweek>> {
        self.read(|conn| queries::get_gameweek(conn, gameweek_id))
    }

    pub fn gameweek_by_number(&self, number: u32) -> Result<Option<Gameweek>> {
        self.read(|conn| queries::gameweek_by_number(conn, number))
    }

    pub fn list_gameweeks(&self) -> Result<Vec<Gameweek>> {
        self.read(queries::list_gameweeks)
    }

    pub fn active_gameweek_number(&self) -> Result<Option<u32>> {
        self.read(queries::active_gameweek_number)
    }

    pub fn begin_sync_run(&self, kind: &str) -> Result<i64> {
        let now = Utc::now();
        self.write(|tx| queries::begin_sync_run(tx, kind, now))
    }

    pub fn finish_sync_run(&self, run_id: i64, report: &SyncReport) -> Result<()> {
        let now = Utc::now();
        self.write(|tx| queries::finish_sync_run(tx, run_id, report, now))
    }

    pub fn recent_sync_runs(&self, limit: usize) -> Result<Vec<SyncRunRow>> {
        self.read(|conn| queries::recent_sync_runs(conn, limit))
    }
}
