use std::process::ExitCode;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::json;

use hoops_trivia::cache_store::JsonFileStore;
use hoops_trivia::config::{self, Config, find_arg_value};
use hoops_trivia::error::QueryError;
use hoops_trivia::query::{CacheHandle, DEFAULT_SEARCH_LIMIT, QueryService};
use hoops_trivia::roster::open_roster;
use hoops_trivia::upstream::NbaStatsClient;

const USAGE: &str = "usage: hoops_trivia <round | reveal <id> | player <name> | search <term> [--limit n]>";

fn main() -> ExitCode {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (command, rest) = args.split_first().ok_or_else(|| anyhow!(USAGE))?;
    let positional = positional_args(rest);

    let mut cfg = Config::from_env();
    if let Some(path) = find_arg_value(rest, "cache") {
        cfg.cache_path = path.into();
    }
    let client = NbaStatsClient::new(cfg.upstream_timeout)?;
    let service = QueryService::new(
        CacheHandle::new(JsonFileStore::new(&cfg.cache_path)),
        open_roster(&cfg, client.clone()),
        client,
        cfg.retry,
    )
    .stats_mode(cfg.stats_mode);

    match command.as_str() {
        "round" => render(service.new_round()),
        "reveal" => {
            let raw = positional.first().ok_or_else(|| anyhow!(USAGE))?;
            let id = raw
                .parse::<u32>()
                .map_err(|_| anyhow!("player id must be numeric, got {raw:?}"))?;
            render(service.reveal(id))
        }
        "player" => {
            let name = positional.join(" ");
            if name.trim().is_empty() {
                return Err(anyhow!(USAGE));
            }
            render(service.find_by_name(&name))
        }
        "search" => {
            let term = positional.join(" ");
            let limit = find_arg_value(rest, "limit")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_SEARCH_LIMIT);
            render(service.search_by_name(&term, limit))
        }
        _ => Err(anyhow!(USAGE)),
    }
}

/// Prints the response as JSON; negative results become `{"error": ...}`.
fn render<T: Serialize>(result: Result<T, QueryError>) -> Result<ExitCode> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let kind = match err {
                QueryError::NoPlayersAvailable => "no_players_available",
                QueryError::NotFound => "not_found",
                QueryError::Upstream(_) => "upstream_unavailable",
                QueryError::Roster(_) => "roster_unavailable",
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "error": err.to_string(), "kind": kind }))?
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn positional_args(rest: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in rest {
        if skip_next {
            skip_next = false;
            continue;
        }
        if let Some(flag) = arg.strip_prefix("--") {
            skip_next = !flag.contains('=');
            continue;
        }
        out.push(arg.clone());
    }
    out
}
