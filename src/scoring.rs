use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::model::Outcome;
use crate::store::{FixtureStore, queries};

/// Points shared among the correct predictors of one fixture.
pub const POINTS_POOL: f64 = 10.0;
/// Floor on the divisor while fewer than this many users predicted.
pub const MIN_PREDICTORS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    FixtureNotFound,
    NoResult,
    AlreadyScored,
    NoCorrectPredictions { total: usize },
    Scored {
        result: Outcome,
        total: usize,
        correct: usize,
        points_each: f64,
        awards_written: usize,
    },
}

/// Rarity weighting: the pool split across the correct predictors, with the
/// divisor floored at [`MIN_PREDICTORS`] when fewer users took part.
/// `None` when nobody was right.
pub fn rarity_points(total: usize, correct: usize) -> Option<f64> {
    if correct == 0 {
        return None;
    }
    let effective_k = if total >= MIN_PREDICTORS {
        correct
    } else {
        MIN_PREDICTORS
    };
    Some(POINTS_POOL / effective_k as f64)
}

/// Awards points for a fixture with a known result, once.
///
/// The whole pass runs in one immediate transaction whose first write is the
/// `points_calculated` compare-and-set, so concurrent or repeated calls for
/// the same fixture see `AlreadyScored` and never write awards twice.
pub fn score_fixture(store: &FixtureStore, fixture_id: i64) -> Result<ScoreOutcome> {
    let now = Utc::now();
    let outcome = store.write(|tx| {
        let Some(fixture) = queries::get_fixture(tx, fixture_id)? else {
            return Ok(ScoreOutcome::FixtureNotFound);
        };
        let Some(result) = fixture.result else {
            return Ok(ScoreOutcome::NoResult);
        };
        if fixture.points_calculated || !queries::mark_scored(tx, fixture_id)? {
            return Ok(ScoreOutcome::AlreadyScored);
        }

        let predictions = queries::list_predictions(tx, fixture_id)?;
        let total = predictions.len();
        let correct_users: Vec<i64> = predictions
            .iter()
            .filter(|p| p.value == result)
            .map(|p| p.user_id)
            .collect();

        let Some(points_each) = rarity_points(total, correct_users.len()) else {
            return Ok(ScoreOutcome::NoCorrectPredictions { total });
        };

        let mut awards_written = 0usize;
        for user_id in &correct_users {
            if queries::insert_point_award_if_absent(tx, *user_id, fixture_id, points_each, now)? {
                awards_written += 1;
            } else {
                debug!(fixture_id, user_id, "point award already present");
            }
        }

        Ok(ScoreOutcome::Scored {
            result,
            total,
            correct: correct_users.len(),
            points_each,
            awards_written,
        })
    })?;

    match &outcome {
        ScoreOutcome::Scored {
            result,
            total,
            correct,
            points_each,
            ..
        } => info!(
            fixture_id,
            %result,
            total,
            correct,
            points_each,
            "fixture scored"
        ),
        ScoreOutcome::NoCorrectPredictions { total } => {
            info!(fixture_id, total, "fixture scored with no correct predictions")
        }
        other => debug!(fixture_id, outcome = ?other, "scoring skipped"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_correct_predictor_is_capped() {
        let pts = rarity_points(1, 1).unwrap();
        assert!((pts - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn divisor_is_correct_count_with_enough_predictors() {
        assert_eq!(rarity_points(5, 2), Some(5.0));
        assert_eq!(rarity_points(3, 1), Some(10.0));
        assert_eq!(rarity_points(10, 10), Some(1.0));
    }

    #[test]
    fn two_predictors_share_the_floored_pool() {
        let pts = rarity_points(2, 2).unwrap();
        assert!((pts - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn nobody_correct_awards_nothing() {
        assert_eq!(rarity_points(4, 0), None);
        assert_eq!(rarity_points(0, 0), None);
    }
}
