use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};

use matchday::model::{FixtureStatus, Outcome};
use matchday::normalize::{NormalizeError, normalize_fixture};
use matchday::provider::{parse_fixture_page_json, parse_season_json};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_current_season() {
    let raw = read_fixture("seasons.json");
    assert_eq!(parse_season_json(&raw).expect("valid seasons json"), 777);
}

#[test]
fn parses_fixture_page() {
    let raw = read_fixture("fixtures_page.json");
    let page = parse_fixture_page_json(&raw).expect("valid fixtures json");
    assert_eq!(page.num_pages, 1);
    assert_eq!(page.fixtures.len(), 4);
}

#[test]
fn normalizes_completed_fixture_with_float_ids_and_scores() {
    let page = parse_fixture_page_json(&read_fixture("fixtures_page.json")).unwrap();
    let record = normalize_fixture(&page.fixtures[0]).expect("first fixture is well formed");

    assert_eq!(record.external_id, "115827");
    assert_eq!(record.home_team, "Liverpool");
    assert_eq!(record.away_team, "AFC Bournemouth");
    assert_eq!(record.gameweek_number, 1);
    assert_eq!(
        record.kickoff,
        Utc.with_ymd_and_hms(2025, 8, 15, 19, 0, 0).unwrap()
    );
    assert_eq!(record.status, FixtureStatus::Completed);
    assert_eq!(record.home_score, Some(4));
    assert_eq!(record.away_score, Some(2));
    assert_eq!(record.result, Some(Outcome::Home));
}

#[test]
fn team_role_beats_list_order() {
    let page = parse_fixture_page_json(&read_fixture("fixtures_page.json")).unwrap();
    let record = normalize_fixture(&page.fixtures[1]).unwrap();

    assert_eq!(record.home_team, "Aston Villa");
    assert_eq!(record.away_team, "Newcastle United");
    assert_eq!(record.status, FixtureStatus::Unplayed);
    assert_eq!(record.result, None);
}

#[test]
fn string_fields_and_missing_status_are_tolerated() {
    let page = parse_fixture_page_json(&read_fixture("fixtures_page.json")).unwrap();
    let record = normalize_fixture(&page.fixtures[2]).unwrap();

    assert_eq!(record.external_id, "115829");
    assert_eq!(record.gameweek_number, 2);
    assert_eq!(record.status, FixtureStatus::Unplayed);
    assert_eq!(record.home_team, "Chelsea");
    assert_eq!(record.away_team, "Unknown");
    assert_eq!(
        record.kickoff,
        Utc.with_ymd_and_hms(2025, 8, 22, 16, 0, 0).unwrap()
    );
}

#[test]
fn fixture_without_kickoff_is_rejected() {
    let page = parse_fixture_page_json(&read_fixture("fixtures_page.json")).unwrap();
    let err = normalize_fixture(&page.fixtures[3]).unwrap_err();
    assert_eq!(err, NormalizeError::MissingKickoff("115830".to_string()));
}
