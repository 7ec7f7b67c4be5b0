use std::collections::HashSet;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::sync::SyncEngine;

/// Longest the loop sleeps before re-reading the wall clock.
const MAX_WAIT: Duration = Duration::from_secs(60);
/// Retry cadence for queued manual runs.
const PENDING_RETRY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Fixtures,
    Results,
    Sweep,
    /// Fixtures, then results, then a sweep.
    All,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobKind::Fixtures => "fixtures",
            JobKind::Results => "results",
            JobKind::Sweep => "sweep",
            JobKind::All => "all",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    RunNow(JobKind),
    Shutdown,
}

pub struct SchedulerHandle {
    cmd_tx: Sender<SchedulerCommand>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queues a job outside its schedule. Returns false once the scheduler
    /// has stopped.
    pub fn run_now(&self, kind: JobKind) -> bool {
        self.cmd_tx.send(SchedulerCommand::RunNow(kind)).is_ok()
    }

    pub fn shutdown(self) -> Result<()> {
        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown);
        self.wait()
    }

    /// Blocks until the scheduler loop exits.
    pub fn wait(self) -> Result<()> {
        self.join
            .join()
            .map_err(|_| anyhow!("scheduler thread panicked"))
    }
}

/// Next occurrence of `at` (UTC) strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Tracks which job kinds are running so a slow pass is never overlapped by
/// the next pass of the same kind. Different kinds may overlap.
#[derive(Debug, Default)]
struct InFlight {
    running: Mutex<HashSet<JobKind>>,
    idle: Condvar,
}

impl InFlight {
    fn try_claim(&self, kind: JobKind) -> bool {
        let Ok(mut running) = self.running.lock() else {
            return false;
        };
        running.insert(kind)
    }

    fn release(&self, kind: JobKind) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&kind);
            if running.is_empty() {
                self.idle.notify_all();
            }
        }
    }

    /// Blocks until every claimed job has released.
    fn wait_idle(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        while !running.is_empty() {
            running = match self.idle.wait(running) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}

/// Starts the background loop: a daily fixture sync at
/// `cfg.daily_sync_at`, a results poll every `cfg.results_poll`, and an
/// immediate full pass when `cfg.run_on_start` is set.
pub fn spawn_scheduler(engine: Arc<SyncEngine>, cfg: ScheduleConfig) -> SchedulerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let join = thread::spawn(move || run_loop(engine, cfg, cmd_rx));
    SchedulerHandle { cmd_tx, join }
}

fn run_loop(engine: Arc<SyncEngine>, cfg: ScheduleConfig, cmd_rx: Receiver<SchedulerCommand>) {
    let pool = build_job_pool(cfg.workers);
    let in_flight = Arc::new(InFlight::default());
    let dispatch = |kind: JobKind| -> bool {
        if !in_flight.try_claim(kind) {
            return false;
        }
        let engine = engine.clone();
        let in_flight = in_flight.clone();
        let job = move || {
            run_job(&engine, kind);
            in_flight.release(kind);
        };
        if let Some(pool) = pool.as_ref() {
            pool.spawn(job);
        } else {
            thread::spawn(job);
        }
        true
    };
    // Manual runs that arrived while the same kind was busy.
    let mut pending: HashSet<JobKind> = HashSet::new();

    let mut next_daily = next_daily_run(Utc::now(), cfg.daily_sync_at);
    let mut next_results = Instant::now() + cfg.results_poll;
    info!(
        daily_sync_at = %cfg.daily_sync_at,
        results_poll_secs = cfg.results_poll.as_secs(),
        workers = cfg.workers,
        "scheduler started"
    );
    if cfg.run_on_start {
        dispatch(JobKind::All);
    }

    loop {
        let until_daily = (next_daily - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let until_results = next_results.saturating_duration_since(Instant::now());
        let mut wait = until_daily.min(until_results).min(MAX_WAIT);
        if !pending.is_empty() {
            wait = wait.min(PENDING_RETRY);
        }

        match cmd_rx.recv_timeout(wait) {
            Ok(SchedulerCommand::RunNow(kind)) => {
                if dispatch(kind) {
                    info!(%kind, "manual run started");
                } else if pending.insert(kind) {
                    info!(%kind, "job already running, manual run queued");
                } else {
                    info!(%kind, "manual run already queued");
                }
            }
            Ok(SchedulerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        pending.retain(|kind| {
            let started = dispatch(*kind);
            if started {
                info!(%kind, "queued manual run started");
            }
            !started
        });

        let now = Utc::now();
        if now >= next_daily {
            if !dispatch(JobKind::Fixtures) {
                warn!("daily fixture sync skipped, previous pass still running");
            }
            next_daily = next_daily_run(now, cfg.daily_sync_at);
            debug!(next = %next_daily, "daily fixture sync scheduled");
        }
        if Instant::now() >= next_results {
            for kind in [JobKind::Results, JobKind::Sweep] {
                if !dispatch(kind) {
                    debug!(%kind, "previous pass still running, skipping tick");
                }
            }
            next_results = Instant::now() + cfg.results_poll;
        }
    }

    if !pending.is_empty() {
        info!(count = pending.len(), "dropping queued manual runs");
    }
    info!("scheduler stopping, waiting for running jobs");
    in_flight.wait_idle();
    info!("scheduler stopped");
}

fn run_job(engine: &SyncEngine, kind: JobKind) {
    let started = Instant::now();
    let errors = match kind {
        JobKind::Fixtures => engine.sync_fixtures().errors.len(),
        JobKind::Results => engine.sync_results().errors.len(),
        JobKind::Sweep => engine.sweep_unscored().errors.len(),
        JobKind::All => {
            let (fixtures, results) = engine.sync_all();
            let sweep = engine.sweep_unscored();
            fixtures.errors.len() + results.errors.len() + sweep.errors.len()
        }
    };
    if errors > 0 {
        warn!(%kind, errors, "job finished with errors");
    } else {
        debug!(%kind, elapsed_ms = started.elapsed().as_millis() as u64, "job finished");
    }
}

fn build_job_pool(workers: usize) -> Option<rayon::ThreadPool> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|idx| format!("matchday-job-{idx}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!(error = %err, "job pool unavailable, using plain threads");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_daily_run_is_today_when_still_ahead() {
        let now = Utc.with_ymd_and_hms(2025, 8, 16, 5, 0, 0).unwrap();
        let next = next_daily_run(now, at(7, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 8, 16, 7, 0, 0).unwrap());
    }

    #[test]
    fn next_daily_run_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 8, 16, 7, 0, 0).unwrap();
        let next = next_daily_run(now, at(7, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 8, 17, 7, 0, 0).unwrap());

        let late = Utc.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(
            next_daily_run(late, at(7, 0)),
            Utc.with_ymd_and_hms(2026, 1, 1, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn in_flight_blocks_only_the_same_kind() {
        let in_flight = InFlight::default();
        assert!(in_flight.try_claim(JobKind::Results));
        assert!(!in_flight.try_claim(JobKind::Results));
        assert!(in_flight.try_claim(JobKind::All));
        assert!(in_flight.try_claim(JobKind::Fixtures));
        in_flight.release(JobKind::Results);
        assert!(in_flight.try_claim(JobKind::Results));
    }

    #[test]
    fn wait_idle_returns_once_jobs_release() {
        let in_flight = Arc::new(InFlight::default());
        assert!(in_flight.try_claim(JobKind::Sweep));
        let worker = {
            let in_flight = in_flight.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                in_flight.release(JobKind::Sweep);
            })
        };
        in_flight.wait_idle();
        assert!(in_flight.try_claim(JobKind::Sweep));
        worker.join().unwrap();
    }
}
