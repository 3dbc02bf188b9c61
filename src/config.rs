use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::eligibility::Thresholds;
use crate::query::StatsMode;
use crate::retry::RetryPolicy;
use crate::roster::RosterScope;

const CACHE_DIR: &str = "hoops_trivia";
const CACHE_FILE: &str = "valid_players.json";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Every tunable of the builder and the query service.
#[derive(Debug, Clone)]
pub struct Config {
    pub thresholds: Thresholds,
    pub retry: RetryPolicy,
    pub upstream_timeout: Duration,
    pub cache_path: PathBuf,
    pub roster_scope: RosterScope,
    pub roster_path: Option<PathBuf>,
    pub stats_mode: StatsMode,
    pub shuffle: bool,
    pub stop_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            retry: RetryPolicy::default(),
            upstream_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_path: default_cache_path(),
            roster_scope: RosterScope::Active,
            roster_path: None,
            stats_mode: StatsMode::Frozen,
            shuffle: true,
            stop_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset, blank or unparsable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            number(key).map(Duration::from_millis).unwrap_or(default)
        };
        let path = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        };

        let thresholds = Thresholds {
            min_games: number("HOOPS_MIN_GAMES").unwrap_or(defaults.thresholds.min_games),
            min_points: number("HOOPS_MIN_POINTS").unwrap_or(defaults.thresholds.min_points),
            min_minutes: number("HOOPS_MIN_MINUTES").unwrap_or(defaults.thresholds.min_minutes),
        };
        let retry = RetryPolicy {
            max_retries: number("HOOPS_MAX_RETRIES")
                .unwrap_or(u64::from(defaults.retry.max_retries))
                .clamp(1, 20) as u32,
            base_delay: millis("HOOPS_BASE_DELAY_MS", defaults.retry.base_delay),
            jitter_max: millis("HOOPS_JITTER_MAX_MS", defaults.retry.jitter_max),
            backoff_unit: millis("HOOPS_BACKOFF_UNIT_MS", defaults.retry.backoff_unit),
        };
        let upstream_timeout = Duration::from_secs(
            number("HOOPS_UPSTREAM_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .clamp(1, 120),
        );
        let roster_scope = lookup("HOOPS_ROSTER_SCOPE")
            .and_then(|v| RosterScope::parse(&v))
            .unwrap_or(defaults.roster_scope);
        let stats_mode = lookup("HOOPS_STATS_MODE")
            .and_then(|v| StatsMode::parse(&v))
            .unwrap_or(defaults.stats_mode);
        let shuffle = lookup("HOOPS_SHUFFLE")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.shuffle);

        Self {
            thresholds,
            retry,
            upstream_timeout,
            cache_path: path("HOOPS_CACHE_PATH").unwrap_or(defaults.cache_path),
            roster_scope,
            roster_path: path("HOOPS_ROSTER_PATH"),
            stats_mode,
            shuffle,
            stop_file: path("HOOPS_STOP_FILE"),
        }
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_cache_path() -> PathBuf {
    app_cache_dir()
        .map(|dir| dir.join(CACHE_FILE))
        .unwrap_or_else(|| PathBuf::from(CACHE_FILE))
}

/// Loads `.env.local` then `.env`; missing files are fine.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

fn parse_flag(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

/// Value of `--name value` or `--name=value` from the process arguments.
pub fn arg_value(name: &str) -> Option<String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    find_arg_value(&args, name)
}

pub fn find_arg_value(args: &[String], name: &str) -> Option<String> {
    let flag = format!("--{name}");
    let prefix = format!("--{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix) {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if *arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{Config, find_arg_value};
    use crate::eligibility::Thresholds;
    use crate::query::StatsMode;
    use crate::retry::RetryPolicy;
    use crate::roster::RosterScope;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(10));
        assert_eq!(cfg.roster_scope, RosterScope::Active);
        assert_eq!(cfg.roster_path, None);
        assert_eq!(cfg.stats_mode, StatsMode::Frozen);
        assert!(cfg.shuffle);
        assert_eq!(cfg.stop_file, None);
        assert_eq!(cfg.cache_path, Config::default().cache_path);
    }

    #[test]
    fn overrides_are_read_and_trimmed() {
        let cfg = config_from(&[
            ("HOOPS_MIN_GAMES", " 250 "),
            ("HOOPS_MIN_POINTS", "0"),
            ("HOOPS_MIN_MINUTES", "4000"),
            ("HOOPS_BASE_DELAY_MS", "200"),
            ("HOOPS_JITTER_MAX_MS", "0"),
            ("HOOPS_BACKOFF_UNIT_MS", "750"),
            ("HOOPS_CACHE_PATH", " /tmp/players.json "),
            ("HOOPS_ROSTER_PATH", "roster.json"),
            ("HOOPS_ROSTER_SCOPE", "all"),
            ("HOOPS_STATS_MODE", "refresh"),
            ("HOOPS_SHUFFLE", "off"),
            ("HOOPS_STOP_FILE", "/tmp/stop"),
        ]);
        assert_eq!(cfg.thresholds.min_games, 250);
        assert_eq!(cfg.thresholds.min_points, 0);
        assert_eq!(cfg.thresholds.min_minutes, 4000);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(200));
        assert_eq!(cfg.retry.jitter_max, Duration::ZERO);
        assert_eq!(cfg.retry.backoff_unit, Duration::from_millis(750));
        assert_eq!(cfg.cache_path, PathBuf::from("/tmp/players.json"));
        assert_eq!(cfg.roster_path, Some(PathBuf::from("roster.json")));
        assert_eq!(cfg.roster_scope, RosterScope::AllTime);
        assert_eq!(cfg.stats_mode, StatsMode::Refresh);
        assert!(!cfg.shuffle);
        assert_eq!(cfg.stop_file, Some(PathBuf::from("/tmp/stop")));
    }

    #[test]
    fn retries_and_timeout_are_clamped() {
        let low = config_from(&[("HOOPS_MAX_RETRIES", "0"), ("HOOPS_UPSTREAM_TIMEOUT_SECS", "0")]);
        assert_eq!(low.retry.max_retries, 1);
        assert_eq!(low.upstream_timeout, Duration::from_secs(1));

        let high = config_from(&[
            ("HOOPS_MAX_RETRIES", "500"),
            ("HOOPS_UPSTREAM_TIMEOUT_SECS", "3600"),
        ]);
        assert_eq!(high.retry.max_retries, 20);
        assert_eq!(high.upstream_timeout, Duration::from_secs(120));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config_from(&[
            ("HOOPS_MIN_GAMES", "lots"),
            ("HOOPS_MAX_RETRIES", "-3"),
            ("HOOPS_UPSTREAM_TIMEOUT_SECS", "1.5"),
            ("HOOPS_ROSTER_SCOPE", "retired"),
            ("HOOPS_STATS_MODE", "live"),
            ("HOOPS_CACHE_PATH", "   "),
            ("HOOPS_STOP_FILE", ""),
        ]);
        assert_eq!(cfg.thresholds.min_games, 100);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(10));
        assert_eq!(cfg.roster_scope, RosterScope::Active);
        assert_eq!(cfg.stats_mode, StatsMode::Frozen);
        assert_eq!(cfg.cache_path, Config::default().cache_path);
        assert_eq!(cfg.stop_file, None);
    }

    #[test]
    fn shuffle_flag_spellings() {
        for off in ["0", "false", "No", " off ", ""] {
            assert!(!config_from(&[("HOOPS_SHUFFLE", off)]).shuffle, "{off:?}");
        }
        for on in ["1", "true", "yes"] {
            assert!(config_from(&[("HOOPS_SHUFFLE", on)]).shuffle, "{on:?}");
        }
    }

    #[test]
    fn find_arg_value_supports_both_forms() {
        let a = args(&["--cache=/tmp/a.json", "--min-games", "250"]);
        assert_eq!(find_arg_value(&a, "cache").as_deref(), Some("/tmp/a.json"));
        assert_eq!(find_arg_value(&a, "min-games").as_deref(), Some("250"));
        assert_eq!(find_arg_value(&a, "min-points"), None);
    }

    #[test]
    fn find_arg_value_skips_blank_values() {
        let a = args(&["--cache=", "--cache", " "]);
        assert_eq!(find_arg_value(&a, "cache"), None);
    }
}
