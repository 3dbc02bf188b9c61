use std::sync::{Arc, Mutex};

use log::{error, warn};
use once_cell::sync::OnceCell;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::cache_store::{CacheStore, EligibilityCache, EligibleEntityRecord};
use crate::error::{CacheLoadError, NormalizeError, QueryError};
use crate::normalize::{CanonicalStats, normalize};
use crate::retry::{RetryExecutor, RetryPolicy, Sleeper, ThreadSleeper};
use crate::roster::{PlayerSummary, RosterDirectory, RosterEntry, find_exact, search_entries};
use crate::upstream::StatsSource;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Whether a round serves cached stats or re-fetches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsMode {
    Frozen,
    Refresh,
}

impl StatsMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "frozen" | "cached" => Some(StatsMode::Frozen),
            "refresh" | "fresh" => Some(StatsMode::Refresh),
            _ => None,
        }
    }
}

/// Process-scoped, lazily loaded view of the cache artifact. Queries never trigger a
/// build; a missing or unreadable artifact loads as an empty cache.
pub struct CacheHandle<C: CacheStore> {
    store: C,
    loaded: OnceCell<Arc<EligibilityCache>>,
}

impl<C: CacheStore> CacheHandle<C> {
    pub fn new(store: C) -> Self {
        Self {
            store,
            loaded: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Loads on first call; later calls return the same snapshot.
    pub fn load_once(&self) -> Arc<EligibilityCache> {
        self.loaded
            .get_or_init(|| {
                let cache = match self.store.load() {
                    Ok(cache) => cache,
                    Err(CacheLoadError::NotFound(path)) => {
                        warn!("no eligibility cache at {}", path.display());
                        EligibilityCache::new()
                    }
                    Err(err) => {
                        error!("eligibility cache unreadable: {err}");
                        EligibilityCache::new()
                    }
                };
                Arc::new(cache)
            })
            .clone()
    }

    /// Drops the loaded snapshot and reads the artifact again.
    pub fn reload(&mut self) -> Arc<EligibilityCache> {
        self.loaded = OnceCell::new();
        self.load_once()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
    pub player_id: u32,
    pub stats: CanonicalStats,
    pub teams: Vec<String>,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatsView {
    pub id: u32,
    pub name: String,
    pub stats: CanonicalStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealView {
    pub id: u32,
    pub name: String,
}

pub struct QueryService<C, R, S, Sl = ThreadSleeper>
where
    C: CacheStore,
    Sl: Sleeper,
{
    cache: CacheHandle<C>,
    roster: R,
    roster_loaded: OnceCell<Vec<RosterEntry>>,
    source: S,
    executor: Mutex<RetryExecutor<Sl>>,
    rng: Mutex<StdRng>,
    mode: StatsMode,
}

impl<C, R, S> QueryService<C, R, S, ThreadSleeper>
where
    C: CacheStore,
    R: RosterDirectory,
    S: StatsSource,
{
    pub fn new(cache: CacheHandle<C>, roster: R, source: S, policy: RetryPolicy) -> Self {
        Self::with_executor(cache, roster, source, RetryExecutor::new(policy))
    }
}

impl<C, R, S, Sl> QueryService<C, R, S, Sl>
where
    C: CacheStore,
    R: RosterDirectory,
    S: StatsSource,
    Sl: Sleeper,
{
    pub fn with_executor(
        cache: CacheHandle<C>,
        roster: R,
        source: S,
        executor: RetryExecutor<Sl>,
    ) -> Self {
        Self {
            cache,
            roster,
            roster_loaded: OnceCell::new(),
            source,
            executor: Mutex::new(executor),
            rng: Mutex::new(StdRng::from_entropy()),
            mode: StatsMode::Frozen,
        }
    }

    /// Fixed seed for the random pick.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn stats_mode(mut self, mode: StatsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Uniform pick over the cached eligible players.
    pub fn random_eligible(&self) -> Result<EligibleEntityRecord, QueryError> {
        let cache = self.cache.load_once();
        let mut record = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            cache.records().choose(&mut *rng).cloned()
        }
        .ok_or(QueryError::NoPlayersAvailable)?;

        if self.mode == StatsMode::Refresh {
            match self.fetch_stats(record.id()) {
                Ok(stats) => record.stats = stats,
                Err(err) => warn!(
                    "stats refresh for {} failed, serving cached line: {err}",
                    record.id()
                ),
            }
        }
        Ok(record)
    }

    /// A new round: stats and teams, name withheld.
    pub fn new_round(&self) -> Result<RoundView, QueryError> {
        let record = self.random_eligible()?;
        let hint = format!(
            "This player has played {} games for {} teams",
            record.stats.games,
            record.teams.len()
        );
        Ok(RoundView {
            player_id: record.id(),
            stats: record.stats,
            teams: record.teams.into_iter().collect(),
            hint,
        })
    }

    /// Exact, case-insensitive lookup over the full roster, stats fetched on demand.
    pub fn find_by_name(&self, name: &str) -> Result<PlayerStatsView, QueryError> {
        let roster = self.roster()?;
        let entry = find_exact(roster, name).ok_or(QueryError::NotFound)?;
        let stats = self.fetch_stats(entry.id)?;
        Ok(PlayerStatsView {
            id: entry.id,
            name: entry.full_name.clone(),
            stats,
        })
    }

    pub fn search_by_name(&self, term: &str, limit: usize) -> Result<Vec<PlayerSummary>, QueryError> {
        Ok(search_entries(self.roster()?, term, limit))
    }

    pub fn reveal(&self, id: u32) -> Result<RevealView, QueryError> {
        let cache = self.cache.load_once();
        if let Some(record) = cache.get(id) {
            return Ok(RevealView {
                id,
                name: record.name().to_string(),
            });
        }
        self.roster()?
            .iter()
            .find(|e| e.id == id)
            .map(|e| RevealView {
                id,
                name: e.full_name.clone(),
            })
            .ok_or(QueryError::NotFound)
    }

    fn roster(&self) -> Result<&[RosterEntry], QueryError> {
        self.roster_loaded
            .get_or_try_init(|| self.roster.list_roster())
            .map(Vec::as_slice)
            .map_err(|e| QueryError::Roster(format!("{e:#}")))
    }

    fn fetch_stats(&self, id: u32) -> Result<CanonicalStats, QueryError> {
        let rows = {
            let mut executor = self
                .executor
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            executor.run(id, || self.source.fetch_career_rows(id))?
        };
        match normalize(&rows) {
            Ok(n) => Ok(n.stats),
            Err(NormalizeError::EmptyAggregateRow) => Ok(CanonicalStats::default()),
        }
    }
}
