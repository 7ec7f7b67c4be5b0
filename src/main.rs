use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchday::admission::submit_prediction;
use matchday::config::{Config, ScheduleConfig};
use matchday::fake_feed::{FakeFeed, random_season};
use matchday::model::{Outcome, format_ts};
use matchday::provider::{FixtureCategory, FixtureFeed, PulseFeed};
use matchday::scheduler::{JobKind, spawn_scheduler};
use matchday::scoring::{ScoreOutcome, score_fixture};
use matchday::store::FixtureStore;
use matchday::sync::{SyncEngine, SyncReport};

const DEMO_SEASON: u64 = 777;
const DEMO_GAMEWEEKS: u32 = 6;
const DEMO_USERS: i64 = 8;
const DEMO_PAGE_SIZE: usize = 15;

#[derive(Parser)]
#[command(name = "matchday")]
#[command(about = "Fixture sync and rarity scoring for a football prediction game", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (overrides MATCHDAY_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until stdin says `quit`.
    Serve,
    /// Sync fixtures then results.
    Sync,
    SyncFixtures,
    SyncResults,
    /// Score fixtures that have a result but were never scored.
    Sweep,
    Score {
        fixture_id: i64,
    },
    Predict {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        fixture: i64,
        /// H, A or D.
        #[arg(long, value_parser = parse_pick)]
        pick: Outcome,
    },
    Gameweeks,
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Sync a randomly generated season into the database.
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::from_env();
    let db_path = cli
        .db
        .clone()
        .or_else(|| config.db_path.clone())
        .ok_or_else(|| anyhow!("no database path; set MATCHDAY_DB_PATH or pass --db"))?;
    let store = Arc::new(FixtureStore::open(&db_path)?);
    info!(path = %db_path.display(), "fixture store opened");

    match cli.command {
        Commands::Demo => run_demo(store),
        Commands::Score { fixture_id } => {
            print_score(fixture_id, &score_fixture(&store, fixture_id)?);
            Ok(())
        }
        Commands::Predict {
            user,
            fixture,
            pick,
        } => {
            submit_prediction(&store, user, fixture, pick, Utc::now())?;
            println!("Prediction {pick} saved for user {user} on fixture {fixture}.");
            Ok(())
        }
        Commands::Gameweeks => print_gameweeks(&store),
        Commands::Runs { limit } => print_runs(&store, limit),
        command => {
            let feed: Arc<dyn FixtureFeed> = Arc::new(PulseFeed::new(&config.provider)?);
            let engine = Arc::new(SyncEngine::new(feed, store));
            match command {
                Commands::Serve => serve(engine, config.schedule),
                Commands::Sync => {
                    let (fixtures, results) = engine.sync_all();
                    print_sync_summary(&fixtures, &results);
                    Ok(())
                }
                Commands::SyncFixtures => {
                    print_report(&engine.sync_fixtures());
                    Ok(())
                }
                Commands::SyncResults => {
                    print_report(&engine.sync_results());
                    Ok(())
                }
                Commands::Sweep => {
                    print_report(&engine.sweep_unscored());
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("matchday={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn parse_pick(raw: &str) -> Result<Outcome, String> {
    Outcome::from_code(&raw.trim().to_ascii_uppercase())
        .ok_or_else(|| format!("expected H, A or D, got {raw:?}"))
}

fn serve(engine: Arc<SyncEngine>, schedule: ScheduleConfig) -> Result<()> {
    let handle = spawn_scheduler(engine, schedule);
    info!("commands: sync, fixtures, results, sweep, quit");
    for line in io::stdin().lock().lines() {
        let line = line.context("read stdin")?;
        let kind = match line.trim() {
            "" => continue,
            "sync" => JobKind::All,
            "fixtures" => JobKind::Fixtures,
            "results" => JobKind::Results,
            "sweep" => JobKind::Sweep,
            "quit" | "exit" => return handle.shutdown(),
            other => {
                warn!(command = other, "unknown command");
                continue;
            }
        };
        if !handle.run_now(kind) {
            break;
        }
    }
    // Detached from a terminal: keep serving.
    handle.wait()
}

fn run_demo(store: Arc<FixtureStore>) -> Result<()> {
    let mut rng = rand::thread_rng();
    let now = Utc::now();
    let first_kickoff = now - ChronoDuration::weeks(2);
    let season = random_season(&mut rng, DEMO_GAMEWEEKS, first_kickoff, now);

    let feed = Arc::new(FakeFeed::new(DEMO_SEASON));
    feed.set_fixtures(FixtureCategory::Upcoming, season.schedule, DEMO_PAGE_SIZE);
    let engine = SyncEngine::new(feed.clone(), store.clone());
    let fixtures = engine.sync_fixtures();

    let picks = [Outcome::Home, Outcome::Away, Outcome::Draw];
    let mut submitted = 0usize;
    for gameweek in store.list_gameweeks()? {
        // Submit just inside the window so finished gameweeks get entries too.
        let at = gameweek
            .lock_time
            .map(|lock| lock - ChronoDuration::hours(1))
            .unwrap_or(now);
        for fixture in store.list_fixtures(gameweek.id)? {
            for user_id in 1..=DEMO_USERS {
                if rng.gen_bool(0.25) {
                    continue;
                }
                let Some(pick) = picks.choose(&mut rng) else {
                    continue;
                };
                submit_prediction(&store, user_id, fixture.id, *pick, at)?;
                submitted += 1;
            }
        }
    }

    feed.set_fixtures(FixtureCategory::Completed, season.completed, DEMO_PAGE_SIZE);
    let results = engine.sync_results();

    print_sync_summary(&fixtures, &results);
    println!("Submitted {submitted} predictions for {DEMO_USERS} users.");
    print_gameweeks(&store)
}

fn print_sync_summary(fixtures: &SyncReport, results: &SyncReport) {
    println!(
        "Synced {} new fixtures, updated {} results.",
        fixtures.created, results.updated
    );
    for err in fixtures.errors.iter().chain(&results.errors) {
        println!("  error: {err}");
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "{}: created {}, updated {}, unchanged {}, skipped {}, unknown {}, scored {}",
        report.kind,
        report.created,
        report.updated,
        report.unchanged,
        report.skipped,
        report.unknown,
        report.scored
    );
    for err in &report.errors {
        println!("  error: {err}");
    }
}

fn print_score(fixture_id: i64, outcome: &ScoreOutcome) {
    match outcome {
        ScoreOutcome::FixtureNotFound => println!("Fixture {fixture_id} not found."),
        ScoreOutcome::NoResult => println!("Fixture {fixture_id} has no result yet."),
        ScoreOutcome::AlreadyScored => println!("Fixture {fixture_id} was already scored."),
        ScoreOutcome::NoCorrectPredictions { total } => {
            println!("Fixture {fixture_id}: none of {total} predictions were correct.")
        }
        ScoreOutcome::Scored {
            result,
            total,
            correct,
            points_each,
            awards_written,
        } => println!(
            "Fixture {fixture_id} ({result}): {correct}/{total} correct, {points_each:.2} points each, {awards_written} awards written."
        ),
    }
}

fn print_gameweeks(store: &FixtureStore) -> Result<()> {
    let active = store.active_gameweek_number()?;
    for gameweek in store.list_gameweeks()? {
        let fixtures = store.list_fixtures(gameweek.id)?;
        let done = fixtures.iter().filter(|f| f.points_calculated).count();
        let lock = gameweek
            .lock_time
            .map(format_ts)
            .unwrap_or_else(|| "-".to_string());
        let marker = if active == Some(gameweek.number) { "*" } else { " " };
        println!(
            "{marker} GW{:<3} lock {lock}  fixtures {:>2}  scored {:>2}",
            gameweek.number,
            fixtures.len(),
            done
        );
    }
    Ok(())
}

fn print_runs(store: &FixtureStore, limit: usize) -> Result<()> {
    for run in store.recent_sync_runs(limit)? {
        let finished = run
            .finished_at
            .map(format_ts)
            .unwrap_or_else(|| "running".to_string());
        println!(
            "#{:<4} {:<8} {} -> {}  created {} updated {} skipped {} unknown {} errors {}",
            run.run_id,
            run.kind,
            format_ts(run.started_at),
            finished,
            run.created,
            run.updated,
            run.skipped,
            run.unknown,
            run.errors.len()
        );
    }
    Ok(())
}
