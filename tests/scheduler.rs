use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};

use matchday::config::ScheduleConfig;
use matchday::fake_feed::FakeFeed;
use matchday::provider::{FixtureCategory, FixtureFeed, FixturePage};
use matchday::scheduler::{JobKind, spawn_scheduler};
use matchday::store::{FixtureStore, SyncRunRow};
use matchday::sync::SyncEngine;

/// Holds every completed-fixtures fetch for `delay`.
struct SlowFeed {
    inner: FakeFeed,
    delay: Duration,
}

impl FixtureFeed for SlowFeed {
    fn current_season(&self) -> Result<u64> {
        self.inner.current_season()
    }

    fn fetch_page(&self, season: u64, category: FixtureCategory, page: u32) -> Result<FixturePage> {
        if category == FixtureCategory::Completed {
            thread::sleep(self.delay);
        }
        self.inner.fetch_page(season, category, page)
    }
}

fn quiet_schedule() -> ScheduleConfig {
    ScheduleConfig {
        daily_sync_at: (Utc::now() + ChronoDuration::hours(12)).time(),
        results_poll: Duration::from_secs(60 * 60),
        workers: 3,
        run_on_start: false,
    }
}

fn slow_engine(delay: Duration) -> (Arc<FixtureStore>, Arc<SyncEngine>) {
    let feed = Arc::new(SlowFeed {
        inner: FakeFeed::new(777),
        delay,
    });
    let store = Arc::new(FixtureStore::open_in_memory().unwrap());
    let engine = Arc::new(SyncEngine::new(feed, store.clone()));
    (store, engine)
}

fn count(runs: &[SyncRunRow], kind: &str) -> usize {
    runs.iter().filter(|run| run.kind == kind).count()
}

#[test]
fn manual_runs_wait_for_a_busy_job_instead_of_vanishing() {
    let (store, engine) = slow_engine(Duration::from_millis(300));
    let handle = spawn_scheduler(engine, quiet_schedule());

    assert!(handle.run_now(JobKind::Results));
    thread::sleep(Duration::from_millis(100));
    // A full pass overlaps the running results job; a second results run
    // queues behind the first.
    assert!(handle.run_now(JobKind::All));
    assert!(handle.run_now(JobKind::Results));

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let runs = store.recent_sync_runs(20).unwrap();
        let settled = count(&runs, "fixtures") >= 1
            && count(&runs, "results") >= 3
            && runs.iter().all(|run| run.finished_at.is_some());
        if settled || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    handle.shutdown().unwrap();

    let runs = store.recent_sync_runs(20).unwrap();
    assert_eq!(count(&runs, "fixtures"), 1);
    assert_eq!(count(&runs, "results"), 3);
    assert!(runs.iter().all(|run| run.finished_at.is_some()));
}

#[test]
fn shutdown_lets_running_jobs_finish() {
    let (store, engine) = slow_engine(Duration::from_millis(300));
    let handle = spawn_scheduler(engine, quiet_schedule());

    assert!(handle.run_now(JobKind::Results));
    handle.shutdown().unwrap();

    let runs = store.recent_sync_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].kind, "results");
    assert!(runs[0].finished_at.is_some());
}
