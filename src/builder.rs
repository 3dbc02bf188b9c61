use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::cache_store::{CacheStore, EligibilityCache, EligibleEntityRecord};
use crate::error::{CachePersistError, NormalizeError};
use crate::normalize::{CanonicalStats, normalize};
use crate::retry::{RetryExecutor, RetryPolicy, Sleeper, ThreadSleeper};
use crate::roster::EntityRef;
use crate::upstream::StatsSource;

/// Cooperative cancellation, checked between players.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub roster_total: usize,
    pub already_cached: usize,
    pub fetched: usize,
    pub added: usize,
    pub ineligible: usize,
    pub empty: usize,
    pub fallback_sums: usize,
    pub exhausted: Vec<String>,
    pub cancelled: bool,
}

impl BuildSummary {
    fn start(roster_total: usize) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            roster_total,
            already_cached: 0,
            fetched: 0,
            added: 0,
            ineligible: 0,
            empty: 0,
            fallback_sums: 0,
            exhausted: Vec::new(),
            cancelled: false,
        }
    }

    pub fn elapsed_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub cache: EligibilityCache,
    pub summary: BuildSummary,
}

/// Single worker that fetches each unseen player through the retry executor and
/// persists every newly eligible one immediately.
pub struct CacheBuilder<S, C, Sl: Sleeper = ThreadSleeper> {
    source: S,
    store: C,
    executor: RetryExecutor<Sl>,
    shuffle: bool,
    rng: StdRng,
    stop: StopFlag,
}

impl<S: StatsSource, C: CacheStore> CacheBuilder<S, C, ThreadSleeper> {
    pub fn new(source: S, store: C, policy: RetryPolicy) -> Self {
        Self::with_executor(source, store, RetryExecutor::new(policy))
    }
}

impl<S: StatsSource, C: CacheStore, Sl: Sleeper> CacheBuilder<S, C, Sl> {
    pub fn with_executor(source: S, store: C, executor: RetryExecutor<Sl>) -> Self {
        Self {
            source,
            store,
            executor,
            shuffle: true,
            rng: StdRng::from_entropy(),
            stop: StopFlag::new(),
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Walks `roster`, adding every unseen player that passes `predicate`.
    ///
    /// Per-player upstream failures are logged and skipped. A failed save aborts
    /// the run; the artifact on disk still holds the last good snapshot.
    pub fn build<P>(
        &mut self,
        roster: &[EntityRef],
        predicate: P,
        existing: EligibilityCache,
    ) -> Result<BuildOutcome, CachePersistError>
    where
        P: Fn(&CanonicalStats) -> bool,
    {
        let mut cache = existing;
        let mut summary = BuildSummary::start(roster.len());
        let mut attempted: HashSet<u32> = HashSet::new();

        let mut order: Vec<&EntityRef> = roster.iter().collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let total = order.len();
        info!(
            "build starting: {} players in roster, {} already cached",
            total,
            cache.len()
        );

        for (idx, entity) in order.into_iter().enumerate() {
            if self.stop.is_stopped() {
                warn!("build stopped by operator after {idx}/{total} players");
                summary.cancelled = true;
                break;
            }
            if cache.contains(entity.id) {
                summary.already_cached += 1;
                continue;
            }
            if !attempted.insert(entity.id) {
                continue;
            }

            summary.fetched += 1;
            debug!(
                "[{}/{}] checking {} ({})",
                idx + 1,
                total,
                entity.display_name,
                entity.id
            );

            let source = &self.source;
            let rows = match self
                .executor
                .run(entity.id, || source.fetch_career_rows(entity.id))
            {
                Ok(rows) => rows,
                Err(err) => {
                    error!("skipping {}: {err}", entity.display_name);
                    summary.exhausted.push(format!("{} ({}): {err}", entity.display_name, entity.id));
                    continue;
                }
            };

            let normalized = match normalize(&rows) {
                Ok(n) => n,
                Err(NormalizeError::EmptyAggregateRow) => {
                    debug!("{} has no stats rows; treating as ineligible", entity.display_name);
                    summary.empty += 1;
                    continue;
                }
            };
            if normalized.used_fallback() {
                summary.fallback_sums += 1;
                info!(
                    "{} ({}): no career row, stats summed from {} season rows",
                    entity.display_name,
                    entity.id,
                    rows.len()
                );
            }

            if !predicate(&normalized.stats) {
                summary.ineligible += 1;
                continue;
            }

            cache.insert(EligibleEntityRecord {
                entity: entity.clone(),
                stats: normalized.stats,
                teams: normalized.teams,
            });
            self.store.save(&cache)?;
            summary.added += 1;
            info!(
                "added {} ({} games, {} pts); cache now {}",
                entity.display_name,
                normalized.stats.games,
                normalized.stats.points,
                cache.len()
            );
        }

        summary.finished_at = Utc::now();
        info!(
            "build finished: added {}, ineligible {}, failed {}, cache size {}",
            summary.added,
            summary.ineligible,
            summary.exhausted.len(),
            cache.len()
        );
        Ok(BuildOutcome { cache, summary })
    }
}
