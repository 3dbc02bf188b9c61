use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::TransportError;
use crate::retry::{RetryExecutor, RetryPolicy, Sleeper, ThreadSleeper};
use crate::upstream::{NbaStatsClient, ResultSet, parse_result_sets};

const COMMON_ALL_PLAYERS_URL: &str = "https://stats.nba.com/stats/commonallplayers";
const NBA_LEAGUE_ID: &str = "00";
/// Reported as the entity id when the roster request itself runs out of retries.
const ROSTER_REQUEST_ID: u32 = 0;

/// Stable id plus display name. Only `id` is a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: u32,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: u32,
    pub full_name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, deserialize_with = "de_year", skip_serializing_if = "Option::is_none")]
    pub from_year: Option<String>,
    #[serde(default, deserialize_with = "de_year", skip_serializing_if = "Option::is_none")]
    pub to_year: Option<String>,
}

/// Years show up as `2003` or `"2003"` depending on who wrote the file.
fn de_year<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        other => Err(D::Error::custom(format!("invalid year {other}"))),
    }
}

impl RosterEntry {
    pub fn entity(&self) -> EntityRef {
        EntityRef {
            id: self.id,
            display_name: self.full_name.clone(),
        }
    }

    pub fn years_active(&self) -> String {
        format!(
            "{}-{}",
            self.from_year.as_deref().unwrap_or("N/A"),
            self.to_year.as_deref().unwrap_or("N/A")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterScope {
    Active,
    AllTime,
}

impl RosterScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "current" => Some(RosterScope::Active),
            "all" | "all-time" | "alltime" | "historical" => Some(RosterScope::AllTime),
            _ => None,
        }
    }
}

/// Lightweight search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSummary {
    pub id: u32,
    pub name: String,
    pub years_active: String,
}

pub trait RosterDirectory {
    fn list_roster(&self) -> Result<Vec<RosterEntry>>;
}

impl RosterDirectory for Vec<RosterEntry> {
    fn list_roster(&self) -> Result<Vec<RosterEntry>> {
        Ok(self.clone())
    }
}

impl<T: RosterDirectory + ?Sized> RosterDirectory for Box<T> {
    fn list_roster(&self) -> Result<Vec<RosterEntry>> {
        (**self).list_roster()
    }
}

/// Static file when `roster_path` is configured, the live endpoint otherwise.
pub fn open_roster(config: &Config, client: NbaStatsClient) -> Box<dyn RosterDirectory> {
    match &config.roster_path {
        Some(path) => Box::new(FileRoster::new(path.clone(), config.roster_scope)),
        None => Box::new(NbaRoster::new(client, config.roster_scope, config.retry)),
    }
}

/// Static roster stored as a JSON array on disk.
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
    scope: RosterScope,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>, scope: RosterScope) -> Self {
        Self {
            path: path.into(),
            scope,
        }
    }
}

impl RosterDirectory for FileRoster {
    fn list_roster(&self) -> Result<Vec<RosterEntry>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read roster {}", self.path.display()))?;
        let entries = parse_roster_json(&raw)
            .with_context(|| format!("parse roster {}", self.path.display()))?;
        Ok(filter_scope(entries, self.scope))
    }
}

pub fn parse_roster_json(raw: &str) -> Result<Vec<RosterEntry>> {
    let entries: Vec<RosterEntry> = serde_json::from_str(raw.trim()).context("invalid roster json")?;
    Ok(entries
        .into_iter()
        .filter(|e| e.id != 0 && !e.full_name.trim().is_empty())
        .collect())
}

fn filter_scope(entries: Vec<RosterEntry>, scope: RosterScope) -> Vec<RosterEntry> {
    match scope {
        RosterScope::Active => entries.into_iter().filter(|e| e.is_active).collect(),
        RosterScope::AllTime => entries,
    }
}

/// Raw `commonallplayers` payload for a scope.
pub trait RosterFeed {
    fn fetch_roster_page(&self, scope: RosterScope) -> Result<String, TransportError>;
}

impl RosterFeed for NbaStatsClient {
    fn fetch_roster_page(&self, scope: RosterScope) -> Result<String, TransportError> {
        let only_current = match scope {
            RosterScope::Active => "1",
            RosterScope::AllTime => "0",
        };
        let season = current_season_label(Utc::now().year(), Utc::now().month());
        let url = format!(
            "{COMMON_ALL_PLAYERS_URL}?LeagueID={NBA_LEAGUE_ID}&Season={season}&IsOnlyCurrentSeason={only_current}"
        );
        self.get_text(&url)
    }
}

/// Roster pulled from the `commonallplayers` endpoint, paced and retried like
/// the per-player calls.
pub struct NbaRoster<F = NbaStatsClient, Sl: Sleeper = ThreadSleeper> {
    feed: F,
    scope: RosterScope,
    executor: Mutex<RetryExecutor<Sl>>,
}

impl<F: RosterFeed> NbaRoster<F, ThreadSleeper> {
    pub fn new(feed: F, scope: RosterScope, policy: RetryPolicy) -> Self {
        Self::with_executor(feed, scope, RetryExecutor::new(policy))
    }
}

impl<F: RosterFeed, Sl: Sleeper> NbaRoster<F, Sl> {
    pub fn with_executor(feed: F, scope: RosterScope, executor: RetryExecutor<Sl>) -> Self {
        Self {
            feed,
            scope,
            executor: Mutex::new(executor),
        }
    }
}

impl<F: RosterFeed, Sl: Sleeper> RosterDirectory for NbaRoster<F, Sl> {
    fn list_roster(&self) -> Result<Vec<RosterEntry>> {
        let body = {
            let mut executor = self
                .executor
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            executor
                .run(ROSTER_REQUEST_ID, || self.feed.fetch_roster_page(self.scope))
                .context("fetch roster")?
        };
        let entries = parse_common_all_players_json(&body)?;
        Ok(filter_scope(entries, self.scope))
    }
}

/// Season label such as `2024-25`; seasons roll over in October.
pub fn current_season_label(year: i32, month: u32) -> String {
    let start = if month >= 10 { year } else { year - 1 };
    format!("{start}-{:02}", (start + 1).rem_euclid(100))
}

pub fn parse_common_all_players_json(raw: &str) -> Result<Vec<RosterEntry>> {
    let sets = parse_result_sets(raw).context("invalid roster payload")?;
    let set = sets
        .iter()
        .find(|s| s.name == "CommonAllPlayers")
        .or_else(|| sets.first())
        .context("roster payload has no result sets")?;
    Ok(roster_rows(set))
}

fn roster_rows(set: &ResultSet) -> Vec<RosterEntry> {
    let mut out = Vec::with_capacity(set.rows.len());
    for row in &set.rows {
        let Some(id) = set
            .number(row, "PERSON_ID")
            .and_then(|v| u32::try_from(v as i64).ok())
            .filter(|id| *id != 0)
        else {
            continue;
        };
        let Some(name) = set
            .text(row, "DISPLAY_FIRST_LAST")
            .filter(|s| !s.trim().is_empty())
        else {
            continue;
        };
        let is_active = match set.cell(row, "ROSTERSTATUS") {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => matches!(s.trim(), "1" | "Active"),
            _ => false,
        };
        out.push(RosterEntry {
            id,
            full_name: name.trim().to_string(),
            is_active,
            from_year: set.text(row, "FROM_YEAR"),
            to_year: set.text(row, "TO_YEAR"),
        });
    }
    out
}

/// Exact, case-insensitive name match. Whitespace is significant.
pub fn find_exact<'a>(entries: &'a [RosterEntry], name: &str) -> Option<&'a RosterEntry> {
    let wanted = name.to_lowercase();
    entries
        .iter()
        .find(|e| e.full_name.to_lowercase() == wanted)
}

/// Case-insensitive substring search. Stops pulling entries once `limit` hits are found;
/// an empty term matches everyone.
pub fn search_entries<'a, I>(entries: I, term: &str, limit: usize) -> Vec<PlayerSummary>
where
    I: IntoIterator<Item = &'a RosterEntry>,
{
    let needle = term.to_lowercase();
    entries
        .into_iter()
        .filter(|e| e.full_name.to_lowercase().contains(&needle))
        .take(limit)
        .map(|e| PlayerSummary {
            id: e.id,
            name: e.full_name.clone(),
            years_active: e.years_active(),
        })
        .collect()
}
