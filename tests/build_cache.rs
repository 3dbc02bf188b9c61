mod common;

use std::io;
use std::path::PathBuf;

use hoops_trivia::builder::CacheBuilder;
use hoops_trivia::cache_store::{CacheStore, EligibilityCache, JsonFileStore, MemoryStore};
use hoops_trivia::eligibility::Thresholds;
use hoops_trivia::error::{CacheLoadError, CachePersistError};

use common::{FakeSource, entities, executor};

/// Accepts `allowed` saves, then fails like a full disk.
struct FailAfterStore {
    inner: MemoryStore,
    allowed: usize,
}

impl CacheStore for FailAfterStore {
    fn load(&self) -> Result<EligibilityCache, CacheLoadError> {
        self.inner.load()
    }

    fn save(&self, cache: &EligibilityCache) -> Result<(), CachePersistError> {
        if self.inner.save_count() >= self.allowed {
            return Err(CachePersistError::Io {
                path: PathBuf::from("/full/disk.json"),
                source: io::Error::other("no space left on device"),
            });
        }
        self.inner.save(cache)
    }

    fn exists(&self) -> bool {
        self.inner.exists()
    }
}

fn all_eligible_source() -> FakeSource {
    FakeSource::with_lines(&[
        (1, 800, 12000),
        (2, 150, 1800),
        (3, 90, 3000),
        (4, 400, 900),
        (5, 1000, 25000),
        (6, 220, 4100),
    ])
}

#[test]
fn second_run_over_complete_cache_makes_no_upstream_calls() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("valid_players.json");
    let roster = entities(1..=6);

    let first_source = all_eligible_source();
    let first = CacheBuilder::with_executor(&first_source, JsonFileStore::new(&path), executor(3))
        .seed(42)
        .build(&roster, Thresholds::default().predicate(), EligibilityCache::new())
        .expect("first build");
    assert_eq!(first.cache.len(), 4);
    assert_eq!(first_source.calls().len(), 6);

    let persisted = JsonFileStore::new(&path).load().expect("persisted");
    assert_eq!(persisted, first.cache);

    // Ineligible players are not cached, so only they get re-checked.
    let second_source = all_eligible_source();
    let memory = MemoryStore::new();
    let second = CacheBuilder::with_executor(&second_source, &memory, executor(3))
        .seed(7)
        .build(&roster, Thresholds::default().predicate(), persisted.clone())
        .expect("second build");
    let mut rechecked = second_source.calls();
    rechecked.sort_unstable();
    assert_eq!(rechecked, vec![3, 4]);
    assert_eq!(second.cache, persisted);
    assert_eq!(memory.save_count(), 0);
    assert_eq!(second.summary.already_cached, 4);

    // With every roster entry cached there is nothing left to fetch.
    let cached_only = entities(persisted.records().iter().map(|r| r.id()));
    let third_source = all_eligible_source();
    let third = CacheBuilder::with_executor(&third_source, &memory, executor(3))
        .build(&cached_only, Thresholds::default().predicate(), persisted.clone())
        .expect("third build");
    assert!(third_source.calls().is_empty());
    assert_eq!(third.cache, persisted);
}

#[test]
fn interrupted_build_resumes_without_refetching() {
    let roster = entities(1..=6);
    let source = all_eligible_source();
    let store = FailAfterStore {
        inner: MemoryStore::new(),
        allowed: 2,
    };

    let err = CacheBuilder::with_executor(&source, &store, executor(3))
        .seed(3)
        .build(&roster, Thresholds::default().predicate(), EligibilityCache::new())
        .expect_err("third save must abort the build");
    assert!(matches!(err, CachePersistError::Io { .. }));

    let partial = store.inner.latest().expect("two snapshots persisted");
    assert_eq!(partial.len(), 2);

    let resumed_source = all_eligible_source();
    let resumed = CacheBuilder::with_executor(&resumed_source, MemoryStore::new(), executor(3))
        .seed(4)
        .build(&roster, Thresholds::default().predicate(), partial.clone())
        .expect("resumed build");

    for record in partial.records() {
        assert!(!resumed_source.calls().contains(&record.id()));
        assert!(resumed.cache.contains(record.id()));
    }
    assert_eq!(&resumed.cache.records()[..2], partial.records());
    assert_eq!(resumed.cache.len(), 4);
}

#[test]
fn every_call_failing_yields_empty_cache_and_one_failure_per_player() {
    let roster = entities(10..15);
    let source = FakeSource::always_failing();
    let store = MemoryStore::new();

    let out = CacheBuilder::with_executor(&source, &store, executor(3))
        .shuffle(false)
        .build(&roster, |_| true, EligibilityCache::new())
        .expect("failures are not fatal");

    assert!(out.cache.is_empty());
    assert_eq!(out.summary.exhausted.len(), 5);
    assert_eq!(out.summary.added, 0);
    assert_eq!(source.calls().len(), 15);
    assert_eq!(store.save_count(), 0);
    assert!(out.summary.exhausted[0].contains("Player 10"));
}

#[test]
fn every_cached_record_satisfies_the_predicate() {
    let roster = entities(1..=6);
    let source = all_eligible_source();
    let thresholds = Thresholds {
        min_games: 200,
        min_points: 0,
        min_minutes: 6000,
    };
    let out = CacheBuilder::with_executor(&source, MemoryStore::new(), executor(1))
        .build(&roster, thresholds.predicate(), EligibilityCache::new())
        .expect("build");

    let mut ids = out.cache.records().iter().map(|r| r.id()).collect::<Vec<_>>();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 4, 5, 6]);
    assert!(out.cache.records().iter().all(|r| thresholds.is_eligible(&r.stats)));
}
