use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{CacheLoadError, CachePersistError};
use crate::normalize::CanonicalStats;
use crate::roster::EntityRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordWire", into = "RecordWire")]
pub struct EligibleEntityRecord {
    pub entity: EntityRef,
    pub stats: CanonicalStats,
    pub teams: BTreeSet<String>,
}

impl EligibleEntityRecord {
    pub fn id(&self) -> u32 {
        self.entity.id
    }

    pub fn name(&self) -> &str {
        &self.entity.display_name
    }
}

/// On-disk shape. Also reads the older flat layout (`{name, id, minutes}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordWire {
    #[serde(deserialize_with = "de_id")]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stats: Option<CanonicalStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    games: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    points: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rebounds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assists: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minutes: Option<u64>,
    #[serde(default)]
    teams: Vec<String>,
}

impl From<RecordWire> for EligibleEntityRecord {
    fn from(wire: RecordWire) -> Self {
        let mut stats = wire.stats.unwrap_or_default();
        if let Some(v) = wire.games {
            stats.games = v;
        }
        if let Some(v) = wire.points {
            stats.points = v;
        }
        if let Some(v) = wire.rebounds {
            stats.rebounds = v;
        }
        if let Some(v) = wire.assists {
            stats.assists = v;
        }
        if let Some(v) = wire.minutes {
            stats.minutes = v;
        }
        EligibleEntityRecord {
            entity: EntityRef {
                id: wire.id,
                display_name: wire.name,
            },
            stats,
            teams: wire
                .teams
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .collect(),
        }
    }
}

impl From<EligibleEntityRecord> for RecordWire {
    fn from(record: EligibleEntityRecord) -> Self {
        RecordWire {
            id: record.entity.id,
            name: record.entity.display_name,
            stats: Some(record.stats),
            teams: record.teams.into_iter().collect(),
            ..RecordWire::default()
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid id {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| D::Error::custom(format!("invalid id {s:?}"))),
        other => Err(D::Error::custom(format!("invalid id {other}"))),
    }
}

/// Ordered records with at most one entry per player id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibilityCache {
    records: Vec<EligibleEntityRecord>,
    seen: HashSet<u32>,
}

impl EligibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first record for each id.
    pub fn from_records(records: impl IntoIterator<Item = EligibleEntityRecord>) -> Self {
        let mut cache = Self::new();
        for record in records {
            cache.insert(record);
        }
        cache
    }

    /// Returns `false` when the id is already present.
    pub fn insert(&mut self, record: EligibleEntityRecord) -> bool {
        if !self.seen.insert(record.id()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains(&self, id: u32) -> bool {
        self.seen.contains(&id)
    }

    pub fn get(&self, id: u32) -> Option<&EligibleEntityRecord> {
        if !self.contains(id) {
            return None;
        }
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn records(&self) -> &[EligibleEntityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub trait CacheStore {
    fn load(&self) -> Result<EligibilityCache, CacheLoadError>;
    fn save(&self, cache: &EligibilityCache) -> Result<(), CachePersistError>;
    fn exists(&self) -> bool;

    /// Missing artifact reads as an empty cache; any other failure is returned.
    fn load_or_empty(&self) -> Result<EligibilityCache, CacheLoadError> {
        match self.load() {
            Err(CacheLoadError::NotFound(_)) => Ok(EligibilityCache::new()),
            other => other,
        }
    }
}

impl<T: CacheStore + ?Sized> CacheStore for &T {
    fn load(&self) -> Result<EligibilityCache, CacheLoadError> {
        (**self).load()
    }

    fn save(&self, cache: &EligibilityCache) -> Result<(), CachePersistError> {
        (**self).save(cache)
    }

    fn exists(&self) -> bool {
        (**self).exists()
    }
}

/// JSON array on disk. Saves write a sibling temp file and rename it over the target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn io_err(&self, source: std::io::Error) -> CachePersistError {
        CachePersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<EligibilityCache, CacheLoadError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CacheLoadError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(CacheLoadError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(EligibilityCache::new());
        }
        let records: Vec<EligibleEntityRecord> =
            serde_json::from_str(&raw).map_err(|source| CacheLoadError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(EligibilityCache::from_records(records))
    }

    fn save(&self, cache: &EligibilityCache) -> Result<(), CachePersistError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec(cache.records())?;
        let tmp = self.tmp_path();
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|_| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_err(err));
        }
        debug!(
            "saved {} records to {}",
            cache.len(),
            self.path.display()
        );
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// In-memory store that keeps every saved snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshots: Arc<Mutex<Vec<EligibilityCache>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: EligibilityCache) -> Self {
        let store = Self::new();
        if let Ok(mut snapshots) = store.snapshots.lock() {
            snapshots.push(cache);
        }
        store
    }

    pub fn save_count(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn latest(&self) -> Option<EligibilityCache> {
        self.snapshots.lock().ok().and_then(|s| s.last().cloned())
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<EligibilityCache, CacheLoadError> {
        self.latest()
            .ok_or_else(|| CacheLoadError::NotFound(PathBuf::from(":memory:")))
    }

    fn save(&self, cache: &EligibilityCache) -> Result<(), CachePersistError> {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(cache.clone());
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        self.save_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, name: &str, games: u64) -> EligibleEntityRecord {
        EligibleEntityRecord {
            entity: EntityRef {
                id,
                display_name: name.to_string(),
            },
            stats: CanonicalStats {
                games,
                points: games * 10,
                ..CanonicalStats::default()
            },
            teams: BTreeSet::new(),
        }
    }

    #[test]
    fn insert_keeps_first_record_per_id() {
        let mut cache = EligibilityCache::new();
        assert!(cache.insert(record(1, "A", 100)));
        assert!(!cache.insert(record(1, "A again", 999)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).map(|r| r.stats.games), Some(100));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn reads_legacy_flat_records() {
        let raw = r#"[{"name":"Stephen Curry","id":201939,"minutes":34012},
                      {"name":"Old Format","id":"77","games":120,"points":2000}]"#;
        let records: Vec<EligibleEntityRecord> = serde_json::from_str(raw).expect("parses");
        assert_eq!(records[0].stats.minutes, 34012);
        assert_eq!(records[0].stats.games, 0);
        assert_eq!(records[1].id(), 77);
        assert_eq!(records[1].stats.points, 2000);
        assert!(records[1].teams.is_empty());
    }

    #[test]
    fn writes_nested_stats_and_teams() {
        let mut r = record(5, "E", 300);
        r.teams.insert("LAL".to_string());
        let json = serde_json::to_value(&r).expect("serializes");
        assert_eq!(json["id"], 5);
        assert_eq!(json["name"], "E");
        assert_eq!(json["stats"]["games"], 300);
        assert_eq!(json["teams"][0], "LAL");
        assert!(json.get("games").is_none());
        assert!(json["stats"].get("fg_pct").is_none());
    }

    #[test]
    fn file_store_missing_then_saved() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("nested").join("players.json"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(CacheLoadError::NotFound(_))));
        assert!(store.load_or_empty().expect("empty").is_empty());

        let cache = EligibilityCache::from_records(vec![record(1, "A", 100), record(2, "B", 200)]);
        store.save(&cache).expect("saves");
        assert!(store.exists());
        assert!(!store.tmp_path().exists());
        assert_eq!(store.load().expect("loads"), cache);
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("players.json");
        fs::write(&path, "[{\"id\": ").expect("write");
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(CacheLoadError::Parse { .. })));
        assert!(matches!(
            store.load_or_empty(),
            Err(CacheLoadError::Parse { .. })
        ));
    }

    #[test]
    fn failed_save_leaves_previous_snapshot() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("players.json");
        let store = JsonFileStore::new(&path);
        let first = EligibilityCache::from_records(vec![record(1, "A", 100)]);
        store.save(&first).expect("saves");

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir_all(store.tmp_path()).expect("mkdir");
        let second = EligibilityCache::from_records(vec![record(1, "A", 100), record(2, "B", 150)]);
        assert!(matches!(
            store.save(&second),
            Err(CachePersistError::Io { .. })
        ));
        assert_eq!(store.load().expect("loads"), first);
    }
}
