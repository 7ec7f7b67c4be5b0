use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixture lifecycle as reported by the provider (`U`, `L`, `C`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureStatus {
    Unplayed,
    Live,
    Completed,
}

impl FixtureStatus {
    pub fn code(self) -> &'static str {
        match self {
            FixtureStatus::Unplayed => "U",
            FixtureStatus::Live => "L",
            FixtureStatus::Completed => "C",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "U" => Some(FixtureStatus::Unplayed),
            "L" => Some(FixtureStatus::Live),
            "C" => Some(FixtureStatus::Completed),
            _ => None,
        }
    }

    /// Forward-only: Unplayed -> Live -> Completed, with Unplayed -> Completed
    /// for fixtures whose live window was never observed.
    pub fn can_transition_to(self, next: FixtureStatus) -> bool {
        use FixtureStatus::*;
        matches!(
            (self, next),
            (Unplayed, _) | (Live, Live) | (Live, Completed) | (Completed, Completed)
        )
    }
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FixtureStatus::Unplayed => "unplayed",
            FixtureStatus::Live => "live",
            FixtureStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Full-time outcome; also the value a user predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Home,
    Away,
    Draw,
}

impl Outcome {
    pub fn code(self) -> &'static str {
        match self {
            Outcome::Home => "H",
            Outcome::Away => "A",
            Outcome::Draw => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "H" => Some(Outcome::Home),
            "A" => Some(Outcome::Away),
            "D" => Some(Outcome::Draw),
            _ => None,
        }
    }

    pub fn from_scores(home: Option<i64>, away: Option<i64>) -> Option<Self> {
        let (Some(home), Some(away)) = (home, away) else {
            return None;
        };
        if home > away {
            Some(Outcome::Home)
        } else if home < away {
            Some(Outcome::Away)
        } else {
            Some(Outcome::Draw)
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Provider-independent view of one fixture, produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureRecord {
    pub external_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub gameweek_number: u32,
    pub status: FixtureStatus,
    pub result: Option<Outcome>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gameweek {
    pub id: i64,
    pub number: u32,
    pub lock_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub id: i64,
    pub gameweek_id: i64,
    pub external_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub status: FixtureStatus,
    pub result: Option<Outcome>,
    pub points_calculated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub user_id: i64,
    pub fixture_id: i64,
    pub value: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointAward {
    pub user_id: i64,
    pub fixture_id: i64,
    pub points: f64,
}

/// Per-outcome prediction counts for one fixture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionTally {
    pub home: u32,
    pub away: u32,
    pub draw: u32,
}

impl PredictionTally {
    pub fn total(&self) -> u32 {
        self.home + self.away + self.draw
    }

    pub fn add(&mut self, value: Outcome) {
        match value {
            Outcome::Home => self.home += 1,
            Outcome::Away => self.away += 1,
            Outcome::Draw => self.draw += 1,
        }
    }
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_only_move_forward() {
        use FixtureStatus::*;
        assert!(Unplayed.can_transition_to(Live));
        assert!(Unplayed.can_transition_to(Completed));
        assert!(Live.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Unplayed));
        assert!(!Completed.can_transition_to(Live));
        assert!(!Live.can_transition_to(Unplayed));
    }

    #[test]
    fn outcome_from_scores() {
        assert_eq!(Outcome::from_scores(Some(2), Some(1)), Some(Outcome::Home));
        assert_eq!(Outcome::from_scores(Some(0), Some(3)), Some(Outcome::Away));
        assert_eq!(Outcome::from_scores(Some(1), Some(1)), Some(Outcome::Draw));
        assert_eq!(Outcome::from_scores(None, Some(1)), None);
    }

    #[test]
    fn timestamps_round_trip_at_second_precision() {
        let raw = "2025-08-16T14:00:00Z";
        let ts = parse_ts(raw).unwrap();
        assert_eq!(format_ts(ts), raw);
        assert_eq!(parse_ts("not a time"), None);
    }
}
