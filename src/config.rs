use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::http_client::DEFAULT_TIMEOUT_SECS;

const APP_DIR: &str = "matchday";
const DB_FILE: &str = "matchday.sqlite";
const DEFAULT_PROVIDER_URL: &str = "https://footballapi.pulselive.com/football";
const MAX_RESULTS_POLL_MINS: u64 = 24 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub competition_id: u32,
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// UTC wall-clock time of the daily fixture sync.
    pub daily_sync_at: NaiveTime,
    pub results_poll: Duration,
    pub workers: usize,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub provider: ProviderConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Loads `.env.local` then `.env` (first value wins) and reads the
    /// process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("MATCHDAY_DB_PATH")
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from)
            .or_else(default_db_path);

        let provider = ProviderConfig {
            base_url: lookup("MATCHDAY_PROVIDER_URL")
                .filter(|val| !val.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            competition_id: lookup("MATCHDAY_COMPETITION_ID")
                .and_then(|val| val.trim().parse::<u32>().ok())
                .unwrap_or(1),
            page_size: lookup("MATCHDAY_PAGE_SIZE")
                .and_then(|val| val.trim().parse::<u32>().ok())
                .unwrap_or(50)
                .clamp(10, 100),
            timeout_secs: lookup("MATCHDAY_HTTP_TIMEOUT_SECS")
                .and_then(|val| val.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .clamp(1, 120),
        };

        let schedule = ScheduleConfig {
            daily_sync_at: lookup("MATCHDAY_DAILY_SYNC_AT")
                .and_then(|val| NaiveTime::parse_from_str(val.trim(), "%H:%M").ok())
                .or_else(|| NaiveTime::from_hms_opt(7, 0, 0))
                .unwrap_or(NaiveTime::MIN),
            results_poll: Duration::from_secs(
                lookup("MATCHDAY_RESULTS_POLL_MINS")
                    .and_then(|val| val.trim().parse::<u64>().ok())
                    .unwrap_or(30)
                    .clamp(1, MAX_RESULTS_POLL_MINS)
                    * 60,
            ),
            workers: lookup("MATCHDAY_WORKERS")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(2)
                .clamp(1, 8),
            run_on_start: lookup("MATCHDAY_SYNC_ON_START")
                .map(|val| !matches!(val.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
        };

        Self {
            db_path,
            provider,
            schedule,
        }
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

fn app_data_dir() -> Option<PathBuf> {
    // Prefer XDG data.
    if let Ok(base) = std::env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    // Fallback to ~/.local/share on linux-like systems.
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".local").join("share").join(APP_DIR))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup(&[("MATCHDAY_DB_PATH", "/tmp/x.sqlite")]));
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(cfg.provider.base_url, DEFAULT_PROVIDER_URL);
        assert_eq!(cfg.provider.page_size, 50);
        assert_eq!(cfg.provider.timeout_secs, 20);
        assert_eq!(cfg.schedule.daily_sync_at, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(cfg.schedule.results_poll, Duration::from_secs(30 * 60));
        assert!(cfg.schedule.run_on_start);
    }

    #[test]
    fn values_are_parsed_and_clamped() {
        let cfg = Config::from_lookup(lookup(&[
            ("MATCHDAY_PAGE_SIZE", "500"),
            ("MATCHDAY_HTTP_TIMEOUT_SECS", "0"),
            ("MATCHDAY_DAILY_SYNC_AT", "06:30"),
            ("MATCHDAY_RESULTS_POLL_MINS", "0"),
            ("MATCHDAY_WORKERS", "99"),
            ("MATCHDAY_SYNC_ON_START", "false"),
        ]));
        assert_eq!(cfg.provider.page_size, 100);
        assert_eq!(cfg.provider.timeout_secs, 1);
        assert_eq!(cfg.schedule.daily_sync_at, NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(cfg.schedule.results_poll, Duration::from_secs(60));
        assert_eq!(cfg.schedule.workers, 8);
        assert!(!cfg.schedule.run_on_start);
    }

    #[test]
    fn huge_results_poll_is_capped_at_a_day() {
        for mins in ["100000000000", "18446744073709551615"] {
            let cfg = Config::from_lookup(lookup(&[("MATCHDAY_RESULTS_POLL_MINS", mins)]));
            assert_eq!(cfg.schedule.results_poll, Duration::from_secs(24 * 60 * 60));
        }
    }

    #[test]
    fn malformed_sync_time_falls_back() {
        let cfg = Config::from_lookup(lookup(&[("MATCHDAY_DAILY_SYNC_AT", "7am")]));
        assert_eq!(cfg.schedule.daily_sync_at, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
    }
}
