//! Statement layer for the fixture store. Every function takes a plain
//! `&Connection` so it can run either on its own or inside a caller-owned
//! transaction (`Transaction` derefs to `Connection`).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::model::{
    Fixture, FixtureRecord, FixtureStatus, Gameweek, Outcome, PointAward, Prediction,
    PredictionTally, format_ts, parse_ts,
};
use crate::sync::SyncReport;

use super::{FixtureLock, FixtureUpsert, SyncRunRow};

/// Predictions close this long before a gameweek's first kickoff.
pub const LOCK_BUFFER_HOURS: i64 = 2;

const FIXTURE_COLUMNS: &str = "id, gameweek_id, external_id, home_team, away_team, kickoff, \
     home_score, away_score, status, result, points_calculated";

#[derive(Debug, Error)]
#[error("invalid {column} value {value:?}")]
struct BadColumn {
    column: &'static str,
    value: String,
}

fn bad_column(idx: usize, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(BadColumn { column, value }))
}

fn ts_column(row: &Row<'_>, idx: usize, column: &'static str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| bad_column(idx, column, raw))
}

fn opt_ts_column(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let Some(raw) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    parse_ts(&raw)
        .map(Some)
        .ok_or_else(|| bad_column(idx, column, raw))
}

fn outcome_column(row: &Row<'_>, idx: usize, column: &'static str) -> rusqlite::Result<Outcome> {
    let raw: String = row.get(idx)?;
    Outcome::from_code(&raw).ok_or_else(|| bad_column(idx, column, raw))
}

fn fixture_from_row(row: &Row<'_>) -> rusqlite::Result<Fixture> {
    let status_raw: String = row.get(8)?;
    let status =
        FixtureStatus::from_code(&status_raw).ok_or_else(|| bad_column(8, "status", status_raw))?;
    let result = match row.get::<_, Option<String>>(9)? {
        Some(raw) => Some(Outcome::from_code(&raw).ok_or_else(|| bad_column(9, "result", raw))?),
        None => None,
    };
    Ok(Fixture {
        id: row.get(0)?,
        gameweek_id: row.get(1)?,
        external_id: row.get(2)?,
        home_team: row.get(3)?,
        away_team: row.get(4)?,
        kickoff: ts_column(row, 5, "kickoff")?,
        home_score: row.get(6)?,
        away_score: row.get(7)?,
        status,
        result,
        points_calculated: row.get::<_, i64>(10)? != 0,
    })
}

fn gameweek_from_row(row: &Row<'_>) -> rusqlite::Result<Gameweek> {
    Ok(Gameweek {
        id: row.get(0)?,
        number: row.get(1)?,
        lock_time: opt_ts_column(row, 2, "lock_time")?,
    })
}

pub fn ensure_gameweek(conn: &Connection, number: u32) -> Result<i64> {
    conn.execute(
        "INSERT INTO gameweeks (number) VALUES (?1) ON CONFLICT(number) DO NOTHING",
        params![number],
    )
    .context("insert gameweek")?;
    conn.query_row(
        "SELECT id FROM gameweeks WHERE number = ?1",
        params![number],
        |row| row.get(0),
    )
    .context("load gameweek id")
}

/// Insert-or-update keyed on `external_id`. Must run inside a write
/// transaction so the conflict check and the update are one unit.
pub fn upsert_fixture(
    conn: &Connection,
    gameweek_id: i64,
    rec: &FixtureRecord,
) -> Result<FixtureUpsert> {
    let kickoff = format_ts(rec.kickoff);
    let inserted = conn
        .execute(
            r#"
            INSERT INTO fixtures (gameweek_id, external_id, home_team, away_team, kickoff, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(external_id) DO NOTHING
            "#,
            params![
                gameweek_id,
                rec.external_id,
                rec.home_team,
                rec.away_team,
                kickoff,
                rec.status.code()
            ],
        )
        .context("insert fixture")?;

    if inserted == 1 {
        let fixture_id = conn.last_insert_rowid();
        recompute_lock_time(conn, gameweek_id)?;
        return Ok(FixtureUpsert {
            fixture_id,
            is_new: true,
            status: rec.status,
        });
    }

    let (fixture_id, previous_gameweek, stored_status) = conn
        .query_row(
            "SELECT id, gameweek_id, status FROM fixtures WHERE external_id = ?1",
            params![rec.external_id],
            |row| {
                let raw: String = row.get(2)?;
                let status =
                    FixtureStatus::from_code(&raw).ok_or_else(|| bad_column(2, "status", raw))?;
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, status))
            },
        )
        .context("load existing fixture")?;

    let status = if stored_status.can_transition_to(rec.status) {
        rec.status
    } else {
        tracing::debug!(
            external_id = %rec.external_id,
            stored = %stored_status,
            reported = %rec.status,
            "ignoring backwards status transition"
        );
        stored_status
    };

    conn.execute(
        r#"
        UPDATE fixtures
        SET status = ?1, home_team = ?2, away_team = ?3, kickoff = ?4, gameweek_id = ?5
        WHERE id = ?6
        "#,
        params![
            status.code(),
            rec.home_team,
            rec.away_team,
            kickoff,
            gameweek_id,
            fixture_id
        ],
    )
    .context("update fixture")?;

    recompute_lock_time(conn, gameweek_id)?;
    if previous_gameweek != gameweek_id {
        recompute_lock_time(conn, previous_gameweek)?;
    }

    Ok(FixtureUpsert {
        fixture_id,
        is_new: false,
        status,
    })
}

/// Sets `lock_time` to the earliest kickoff of the gameweek minus the
/// buffer, or clears it when the gameweek has no fixtures.
pub fn recompute_lock_time(conn: &Connection, gameweek_id: i64) -> Result<Option<DateTime<Utc>>> {
    let earliest: Option<String> = conn
        .query_row(
            "SELECT MIN(kickoff) FROM fixtures WHERE gameweek_id = ?1",
            params![gameweek_id],
            |row| row.get(0),
        )
        .context("query earliest kickoff")?;
    let lock_time = earliest
        .as_deref()
        .and_then(parse_ts)
        .map(|kickoff| kickoff - ChronoDuration::hours(LOCK_BUFFER_HOURS));

    conn.execute(
        "UPDATE gameweeks SET lock_time = ?1 WHERE id = ?2",
        params![lock_time.map(format_ts), gameweek_id],
    )
    .context("update gameweek lock_time")?;
    Ok(lock_time)
}

pub fn get_fixture(conn: &Connection, fixture_id: i64) -> Result<Option<Fixture>> {
    conn.query_row(
        &format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE id = ?1"),
        params![fixture_id],
        fixture_from_row,
    )
    .optional()
    .context("load fixture")
}

pub fn fixture_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<Fixture>> {
    conn.query_row(
        &format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE external_id = ?1"),
        params![external_id],
        fixture_from_row,
    )
    .optional()
    .context("load fixture by external id")
}

pub fn list_fixtures(conn: &Connection, gameweek_id: i64) -> Result<Vec<Fixture>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE gameweek_id = ?1 ORDER BY kickoff ASC, id ASC"
        ))
        .context("prepare list fixtures query")?;
    let rows = stmt
        .query_map(params![gameweek_id], fixture_from_row)
        .context("query fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture row")?);
    }
    Ok(out)
}

/// Writes a final result. Returns false when the stored result already
/// matches, which keeps repeated polling free of writes.
pub fn record_result(
    conn: &Connection,
    fixture_id: i64,
    home_score: i64,
    away_score: i64,
    result: Outcome,
) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            UPDATE fixtures
            SET status = 'C', home_score = ?2, away_score = ?3, result = ?4
            WHERE id = ?1 AND result IS NOT ?4
            "#,
            params![fixture_id, home_score, away_score, result.code()],
        )
        .context("record fixture result")?;
    Ok(changed == 1)
}

pub fn list_predictions(conn: &Connection, fixture_id: i64) -> Result<Vec<Prediction>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, fixture_id, prediction FROM predictions WHERE fixture_id = ?1 ORDER BY user_id ASC",
        )
        .context("prepare list predictions query")?;
    let rows = stmt
        .query_map(params![fixture_id], |row| {
            Ok(Prediction {
                user_id: row.get(0)?,
                fixture_id: row.get(1)?,
                value: outcome_column(row, 2, "prediction")?,
            })
        })
        .context("query predictions")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode prediction row")?);
    }
    Ok(out)
}

pub fn upsert_prediction(
    conn: &Connection,
    user_id: i64,
    fixture_id: i64,
    value: Outcome,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO predictions (user_id, fixture_id, prediction, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(user_id, fixture_id) DO UPDATE SET
            prediction = excluded.prediction,
            updated_at = excluded.updated_at
        "#,
        params![user_id, fixture_id, value.code(), format_ts(now)],
    )
    .context("upsert prediction")?;
    Ok(())
}

pub fn prediction_tally(conn: &Connection, fixture_id: i64) -> Result<PredictionTally> {
    let mut tally = PredictionTally::default();
    for prediction in list_predictions(conn, fixture_id)? {
        tally.add(prediction.value);
    }
    Ok(tally)
}

/// Returns false when an award already exists for the pair.
pub fn insert_point_award_if_absent(
    conn: &Connection,
    user_id: i64,
    fixture_id: i64,
    points: f64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let inserted = conn
        .execute(
            r#"
            INSERT INTO point_awards (user_id, fixture_id, points, awarded_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, fixture_id) DO NOTHING
            "#,
            params![user_id, fixture_id, points, format_ts(now)],
        )
        .context("insert point award")?;
    Ok(inserted == 1)
}

/// Compare-and-set on the scoring flag; true only for the caller that
/// flipped it.
pub fn mark_scored(conn: &Connection, fixture_id: i64) -> Result<bool> {
    let claimed = conn
        .execute(
            r#"
            UPDATE fixtures SET points_calculated = 1
            WHERE id = ?1 AND points_calculated = 0 AND result IS NOT NULL
            "#,
            params![fixture_id],
        )
        .context("mark fixture scored")?;
    Ok(claimed == 1)
}

pub fn point_awards(conn: &Connection, fixture_id: i64) -> Result<Vec<PointAward>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, fixture_id, points FROM point_awards WHERE fixture_id = ?1 ORDER BY user_id ASC",
        )
        .context("prepare point awards query")?;
    let rows = stmt
        .query_map(params![fixture_id], |row| {
            Ok(PointAward {
                user_id: row.get(0)?,
                fixture_id: row.get(1)?,
                points: row.get(2)?,
            })
        })
        .context("query point awards")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode point award row")?);
    }
    Ok(out)
}

pub fn unscored_fixtures(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM fixtures WHERE result IS NOT NULL AND points_calculated = 0 ORDER BY kickoff ASC, id ASC",
        )
        .context("prepare unscored fixtures query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .context("query unscored fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture id")?);
    }
    Ok(out)
}

pub fn fixture_lock(conn: &Connection, fixture_id: i64) -> Result<Option<FixtureLock>> {
    conn.query_row(
        r#"
        SELECT gw.number, gw.lock_time
        FROM fixtures f
        JOIN gameweeks gw ON gw.id = f.gameweek_id
        WHERE f.id = ?1
        "#,
        params![fixture_id],
        |row| {
            Ok(FixtureLock {
                fixture_id,
                gameweek_number: row.get(0)?,
                lock_time: opt_ts_column(row, 1, "lock_time")?,
            })
        },
    )
    .optional()
    .context("load fixture lock")
}

pub fn get_gameweek(conn: &Connection, gameweek_id: i64) -> Result<Option<Gameweek>> {
    conn.query_row(
        "SELECT id, number, lock_time FROM gameweeks WHERE id = ?1",
        params![gameweek_id],
        gameweek_from_row,
    )
    .optional()
    .context("load gameweek")
}

pub fn gameweek_by_number(conn: &Connection, number: u32) -> Result<Option<Gameweek>> {
    conn.query_row(
        "SELECT id, number, lock_time FROM gameweeks WHERE number = ?1",
        params![number],
        gameweek_from_row,
    )
    .optional()
    .context("load gameweek by number")
}

pub fn list_gameweeks(conn: &Connection) -> Result<Vec<Gameweek>> {
    let mut stmt = conn
        .prepare("SELECT id, number, lock_time FROM gameweeks ORDER BY number ASC")
        .context("prepare list gameweeks query")?;
    let rows = stmt
        .query_map([], gameweek_from_row)
        .context("query gameweeks")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode gameweek row")?);
    }
    Ok(out)
}

/// The gameweek of the earliest fixture that is not yet completed.
pub fn active_gameweek_number(conn: &Connection) -> Result<Option<u32>> {
    conn.query_row(
        r#"
        SELECT gw.number
        FROM gameweeks gw
        JOIN fixtures f ON f.gameweek_id = gw.id
        WHERE f.status IN ('U', 'L')
        ORDER BY f.kickoff ASC
        LIMIT 1
        "#,
        [],
        |row| row.get(0),
    )
    .optional()
    .context("query active gameweek")
}

pub fn begin_sync_run(conn: &Connection, kind: &str, started_at: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_runs (kind, started_at) VALUES (?1, ?2)",
        params![kind, format_ts(started_at)],
    )
    .context("insert sync run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_sync_run(
    conn: &Connection,
    run_id: i64,
    report: &SyncReport,
    finished_at: DateTime<Utc>,
) -> Result<()> {
    let errors_json = serde_json::to_string(&report.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        r#"
        UPDATE sync_runs
        SET finished_at = ?1, created = ?2, updated = ?3, skipped = ?4, unknown = ?5, errors_json = ?6
        WHERE run_id = ?7
        "#,
        params![
            format_ts(finished_at),
            report.created as i64,
            report.updated as i64,
            report.skipped as i64,
            report.unknown as i64,
            errors_json,
            run_id
        ],
    )
    .context("update sync run")?;
    Ok(())
}

pub fn recent_sync_runs(conn: &Connection, limit: usize) -> Result<Vec<SyncRunRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT run_id, kind, started_at, finished_at, created, updated, skipped, unknown, errors_json
            FROM sync_runs
            ORDER BY run_id DESC
            LIMIT ?1
            "#,
        )
        .context("prepare sync runs query")?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let errors_json: String = row.get(8)?;
            Ok(SyncRunRow {
                run_id: row.get(0)?,
                kind: row.get(1)?,
                started_at: ts_column(row, 2, "started_at")?,
                finished_at: opt_ts_column(row, 3, "finished_at")?,
                created: row.get::<_, i64>(4)? as u64,
                updated: row.get::<_, i64>(5)? as u64,
                skipped: row.get::<_, i64>(6)? as u64,
                unknown: row.get::<_, i64>(7)? as u64,
                errors: serde_json::from_str(&errors_json).unwrap_or_default(),
            })
        })
        .context("query sync runs")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode sync run row")?);
    }
    Ok(out)
}
