use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::warn;

use hoops_trivia::builder::{CacheBuilder, StopFlag};
use hoops_trivia::cache_store::{CacheStore, JsonFileStore};
use hoops_trivia::config::{self, Config, arg_value};
use hoops_trivia::roster::{EntityRef, RosterEntry, RosterScope, open_roster};
use hoops_trivia::upstream::NbaStatsClient;

fn main() -> Result<()> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = apply_args(Config::from_env())?;
    let client = NbaStatsClient::new(cfg.upstream_timeout)?;
    let roster = open_roster(&cfg, client.clone())
        .list_roster()
        .context("load roster")?;
    if roster.is_empty() {
        return Err(anyhow!("roster is empty; nothing to build"));
    }
    let entities = roster.iter().map(RosterEntry::entity).collect::<Vec<EntityRef>>();

    let store = JsonFileStore::new(&cfg.cache_path);
    let existing = store
        .load_or_empty()
        .with_context(|| format!("read existing cache {}", cfg.cache_path.display()))?;

    let mut builder = CacheBuilder::new(client, store, cfg.retry).shuffle(cfg.shuffle);
    if let Some(path) = cfg.stop_file.clone() {
        watch_stop_file(path, builder.stop_flag());
    }

    let outcome = builder
        .build(&entities, cfg.thresholds.predicate(), existing)
        .context("cache build aborted")?;
    let summary = &outcome.summary;

    println!("Eligibility cache build {}", if summary.cancelled { "stopped" } else { "complete" });
    println!("Cache: {}", cfg.cache_path.display());
    println!(
        "Thresholds: games>={} points>={} minutes>={}",
        cfg.thresholds.min_games, cfg.thresholds.min_points, cfg.thresholds.min_minutes
    );
    println!(
        "Roster: {} (already cached {}, fetched {})",
        summary.roster_total, summary.already_cached, summary.fetched
    );
    println!(
        "Added: {}  Ineligible: {}  No stats: {}  Season-sum fallbacks: {}",
        summary.added, summary.ineligible, summary.empty, summary.fallback_sums
    );
    println!("Eligible players cached: {}", outcome.cache.len());
    println!("Elapsed: {}s", summary.elapsed_secs());
    if !summary.exhausted.is_empty() {
        println!("Failed: {}", summary.exhausted.len());
        for err in summary.exhausted.iter().take(8) {
            println!(" - {err}");
        }
    }

    Ok(())
}

fn apply_args(mut cfg: Config) -> Result<Config> {
    if let Some(path) = arg_value("cache") {
        cfg.cache_path = PathBuf::from(path);
    }
    if let Some(path) = arg_value("roster") {
        cfg.roster_path = Some(PathBuf::from(path));
    }
    if let Some(raw) = arg_value("scope") {
        cfg.roster_scope =
            RosterScope::parse(&raw).ok_or_else(|| anyhow!("unknown roster scope {raw:?}"))?;
    }
    if let Some(v) = parse_u64_arg("min-games")? {
        cfg.thresholds.min_games = v;
    }
    if let Some(v) = parse_u64_arg("min-points")? {
        cfg.thresholds.min_points = v;
    }
    if let Some(v) = parse_u64_arg("min-minutes")? {
        cfg.thresholds.min_minutes = v;
    }
    if std::env::args().any(|a| a == "--no-shuffle") {
        cfg.shuffle = false;
    }
    Ok(cfg)
}

fn parse_u64_arg(name: &str) -> Result<Option<u64>> {
    arg_value(name)
        .map(|raw| {
            raw.parse::<u64>()
                .with_context(|| format!("--{name} expects a whole number, got {raw:?}"))
        })
        .transpose()
}

fn watch_stop_file(path: PathBuf, stop: StopFlag) {
    if path.exists() {
        warn!("removing stale stop file {}", path.display());
        let _ = fs::remove_file(&path);
    }
    thread::spawn(move || {
        loop {
            if path.exists() {
                warn!("stop file {} found; finishing current player", path.display());
                stop.stop();
                break;
            }
            thread::sleep(Duration::from_secs(1));
        }
    });
}
