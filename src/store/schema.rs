use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS gameweeks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            number INTEGER UNIQUE NOT NULL,
            lock_time TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS fixtures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            gameweek_id INTEGER NOT NULL REFERENCES gameweeks(id),
            external_id TEXT UNIQUE NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            kickoff TEXT NOT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            status TEXT NOT NULL DEFAULT 'U' CHECK (status IN ('U', 'L', 'C')),
            result TEXT NULL CHECK (result IN ('H', 'A', 'D')),
            points_calculated INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            fixture_id INTEGER NOT NULL REFERENCES fixtures(id),
            prediction TEXT NOT NULL CHECK (prediction IN ('H', 'A', 'D')),
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, fixture_id)
        );

        CREATE TABLE IF NOT EXISTS point_awards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            fixture_id INTEGER NOT NULL REFERENCES fixtures(id),
            points REAL NOT NULL,
            awarded_at TEXT NOT NULL,
            UNIQUE (user_id, fixture_id)
        );

        CREATE TABLE IF NOT EXISTS sync_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            created INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            unknown INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_fixtures_gameweek ON fixtures(gameweek_id);
        CREATE INDEX IF NOT EXISTS idx_fixtures_unscored ON fixtures(points_calculated, result);
        CREATE INDEX IF NOT EXISTS idx_predictions_fixture ON predictions(fixture_id);
        CREATE INDEX IF NOT EXISTS idx_predictions_user ON predictions(user_id);
        CREATE INDEX IF NOT EXISTS idx_point_awards_user ON point_awards(user_id);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}
