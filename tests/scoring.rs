use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};

use matchday::model::{FixtureRecord, FixtureStatus, Outcome};
use matchday::scoring::{POINTS_POOL, ScoreOutcome, score_fixture};
use matchday::store::FixtureStore;

fn completed_fixture(store: &FixtureStore, result: Outcome) -> i64 {
    let rec = FixtureRecord {
        external_id: "5001".to_string(),
        home_team: "Brighton".to_string(),
        away_team: "Fulham".to_string(),
        kickoff: Utc.with_ymd_and_hms(2025, 8, 16, 14, 0, 0).unwrap(),
        gameweek_number: 1,
        status: FixtureStatus::Unplayed,
        result: None,
        home_score: None,
        away_score: None,
    };
    let gw = store.ensure_gameweek(1).unwrap();
    let id = store.upsert_fixture(gw, &rec).unwrap().fixture_id;
    let (home, away) = match result {
        Outcome::Home => (2, 0),
        Outcome::Away => (0, 2),
        Outcome::Draw => (1, 1),
    };
    store.record_result(id, home, away, result).unwrap();
    id
}

fn predict(store: &FixtureStore, fixture_id: i64, picks: &[Outcome]) {
    for (idx, pick) in picks.iter().enumerate() {
        store
            .upsert_prediction(idx as i64 + 1, fixture_id, *pick)
            .unwrap();
    }
}

fn total_points(store: &FixtureStore, fixture_id: i64) -> f64 {
    store
        .point_awards(fixture_id)
        .unwrap()
        .iter()
        .map(|a| a.points)
        .sum()
}

#[test]
fn correct_predictors_share_the_pool() {
    let store = FixtureStore::open_in_memory().unwrap();
    let id = completed_fixture(&store, Outcome::Home);
    use Outcome::*;
    predict(&store, id, &[Home, Home, Away, Draw, Draw]);

    let outcome = score_fixture(&store, id).unwrap();
    match outcome {
        ScoreOutcome::Scored {
            total,
            correct,
            points_each,
            awards_written,
            ..
        } => {
            assert_eq!((total, correct, awards_written), (5, 2, 2));
            assert!((points_each - 5.0).abs() < 1e-9);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!((total_points(&store, id) - POINTS_POOL).abs() < 1e-9);
    assert!(store.get_fixture(id).unwrap().unwrap().points_calculated);
}

#[test]
fn thin_fixtures_are_capped() {
    let store = FixtureStore::open_in_memory().unwrap();
    let id = completed_fixture(&store, Outcome::Draw);
    predict(&store, id, &[Outcome::Draw]);

    score_fixture(&store, id).unwrap();
    let awards = store.point_awards(id).unwrap();
    assert_eq!(awards.len(), 1);
    assert!((awards[0].points - POINTS_POOL / 3.0).abs() < 1e-9);
}

#[test]
fn no_correct_predictions_still_marks_scored() {
    let store = FixtureStore::open_in_memory().unwrap();
    let id = completed_fixture(&store, Outcome::Away);
    use Outcome::*;
    predict(&store, id, &[Home, Home, Draw, Home]);

    assert_eq!(
        score_fixture(&store, id).unwrap(),
        ScoreOutcome::NoCorrectPredictions { total: 4 }
    );
    assert!(store.point_awards(id).unwrap().is_empty());
    assert!(store.get_fixture(id).unwrap().unwrap().points_calculated);
    assert!(store.unscored_fixtures().unwrap().is_empty());
}

#[test]
fn scoring_twice_awards_once() {
    let store = FixtureStore::open_in_memory().unwrap();
    let id = completed_fixture(&store, Outcome::Home);
    use Outcome::*;
    predict(&store, id, &[Home, Away, Home, Home]);

    assert!(matches!(
        score_fixture(&store, id).unwrap(),
        ScoreOutcome::Scored { .. }
    ));
    let before = store.point_awards(id).unwrap();
    assert_eq!(
        score_fixture(&store, id).unwrap(),
        ScoreOutcome::AlreadyScored
    );
    assert_eq!(store.point_awards(id).unwrap(), before);
}

#[test]
fn missing_fixture_or_result_is_not_scored() {
    let store = FixtureStore::open_in_memory().unwrap();
    assert_eq!(
        score_fixture(&store, 404).unwrap(),
        ScoreOutcome::FixtureNotFound
    );

    let rec = FixtureRecord {
        external_id: "6001".to_string(),
        home_team: "Everton".to_string(),
        away_team: "Leeds".to_string(),
        kickoff: Utc.with_ymd_and_hms(2025, 8, 18, 19, 0, 0).unwrap(),
        gameweek_number: 1,
        status: FixtureStatus::Unplayed,
        result: None,
        home_score: None,
        away_score: None,
    };
    let gw = store.ensure_gameweek(1).unwrap();
    let id = store.upsert_fixture(gw, &rec).unwrap().fixture_id;
    assert_eq!(score_fixture(&store, id).unwrap(), ScoreOutcome::NoResult);
    assert!(!store.get_fixture(id).unwrap().unwrap().points_calculated);
}

#[test]
fn concurrent_scoring_writes_awards_once() {
    let store = Arc::new(FixtureStore::open_in_memory().unwrap());
    let id = completed_fixture(&store, Outcome::Away);
    use Outcome::*;
    predict(&store, id, &[Away, Away, Away, Home, Draw, Away]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || score_fixture(&store, id).unwrap())
        })
        .collect();
    let scored = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|outcome| matches!(outcome, ScoreOutcome::Scored { .. }))
        .count();

    assert_eq!(scored, 1);
    assert_eq!(store.point_awards(id).unwrap().len(), 4);
    assert!((total_points(&store, id) - POINTS_POOL).abs() < 1e-9);
}
