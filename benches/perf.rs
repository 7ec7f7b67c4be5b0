use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use matchday::fake_feed::random_season;
use matchday::normalize::normalize_fixture;
use matchday::provider::parse_fixture_page_json;
use matchday::scoring::rarity_points;
use matchday::store::FixtureStore;

fn bench_fixture_page_parse(c: &mut Criterion) {
    c.bench_function("fixture_page_parse", |b| {
        b.iter(|| {
            let page = parse_fixture_page_json(black_box(FIXTURES_PAGE_JSON)).unwrap();
            black_box(page.fixtures.len());
        })
    });
}

fn bench_normalize(c: &mut Criterion) {
    let page = parse_fixture_page_json(FIXTURES_PAGE_JSON).expect("valid fixture json");
    c.bench_function("normalize_fixtures", |b| {
        b.iter(|| {
            let ok = page
                .fixtures
                .iter()
                .filter(|raw| normalize_fixture(black_box(raw)).is_ok())
                .count();
            black_box(ok);
        })
    });
}

fn bench_rarity_points(c: &mut Criterion) {
    c.bench_function("rarity_points", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for total in 0..64usize {
                for correct in 0..=total {
                    sum += rarity_points(black_box(total), black_box(correct)).unwrap_or(0.0);
                }
            }
            black_box(sum);
        })
    });
}

fn bench_store_upsert(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let start = Utc.with_ymd_and_hms(2025, 8, 16, 11, 30, 0).unwrap();
    let season = random_season(&mut rng, 38, start, start);
    let records: Vec<_> = season
        .schedule
        .iter()
        .filter_map(|raw| normalize_fixture(raw).ok())
        .collect();

    c.bench_function("store_upsert_season", |b| {
        b.iter_batched(
            || FixtureStore::open_in_memory().expect("in-memory store"),
            |store| {
                for rec in &records {
                    let gw = store.ensure_gameweek(rec.gameweek_number).unwrap();
                    store.upsert_fixture(gw, rec).unwrap();
                }
                black_box(store.list_gameweeks().unwrap().len());
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    perf,
    bench_fixture_page_parse,
    bench_normalize,
    bench_rarity_points,
    bench_store_upsert
);
criterion_main!(perf);

static FIXTURES_PAGE_JSON: &str = include_str!("../tests/fixtures/fixtures_page.json");
