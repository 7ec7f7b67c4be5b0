use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::model::{FixtureRecord, FixtureStatus, Outcome};

const UNKNOWN_TEAM: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("fixture has no id")]
    MissingId,
    #[error("fixture {0} has fewer than two teams")]
    MissingTeams(String),
    #[error("fixture {0} has no valid kickoff timestamp")]
    MissingKickoff(String),
    #[error("fixture {0} has no gameweek number")]
    MissingGameweek(String),
    #[error("fixture {id} has unknown status {status:?}")]
    UnknownStatus { id: String, status: String },
}

/// Converts one raw provider fixture into a [`FixtureRecord`].
pub fn normalize_fixture(raw: &Value) -> Result<FixtureRecord, NormalizeError> {
    let external_id = raw
        .get("id")
        .and_then(as_u64_any)
        .map(|id| id.to_string())
        .or_else(|| {
            raw.get("id")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .ok_or(NormalizeError::MissingId)?;

    let teams = raw
        .get("teams")
        .and_then(|v| v.as_array())
        .filter(|teams| teams.len() >= 2)
        .ok_or_else(|| NormalizeError::MissingTeams(external_id.clone()))?;
    let home = pick_side(teams, "home").unwrap_or(&teams[0]);
    let away = pick_side(teams, "away").unwrap_or(&teams[1]);

    let kickoff = raw
        .get("kickoff")
        .and_then(|k| k.get("millis"))
        .and_then(as_i64_any)
        .filter(|millis| *millis > 0)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| NormalizeError::MissingKickoff(external_id.clone()))?;
    // Stored at second precision.
    let kickoff = DateTime::<Utc>::from_timestamp(kickoff.timestamp(), 0)
        .ok_or_else(|| NormalizeError::MissingKickoff(external_id.clone()))?;

    let gameweek_number = raw
        .get("gameweek")
        .and_then(|g| g.get("gameweek"))
        .and_then(as_u64_any)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| NormalizeError::MissingGameweek(external_id.clone()))?;

    let status = match raw.get("status").and_then(|v| v.as_str()) {
        None => FixtureStatus::Unplayed,
        Some(code) => FixtureStatus::from_code(code).ok_or_else(|| {
            NormalizeError::UnknownStatus {
                id: external_id.clone(),
                status: code.to_string(),
            }
        })?,
    };

    let home_score = home.get("score").and_then(as_i64_any);
    let away_score = away.get("score").and_then(as_i64_any);

    Ok(FixtureRecord {
        external_id,
        home_team: team_name(home),
        away_team: team_name(away),
        kickoff,
        gameweek_number,
        status,
        result: Outcome::from_scores(home_score, away_score),
        home_score,
        away_score,
    })
}

fn pick_side<'a>(teams: &'a [Value], role: &str) -> Option<&'a Value> {
    teams
        .iter()
        .find(|t| t.get("teamRole").and_then(|r| r.as_str()) == Some(role))
}

fn team_name(side: &Value) -> String {
    side.get("team")
        .and_then(|t| t.get("name"))
        .and_then(|n| n.as_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_TEAM)
        .to_string()
}

// The feed emits ids and scores as integers, floats ("115827.0") or strings.
fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        if f.is_finite() && f.fract() == 0.0 {
            return Some(f as i64);
        }
        return None;
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_u64_any(v: &Value) -> Option<u64> {
    as_i64_any(v).and_then(|n| u64::try_from(n).ok())
}
