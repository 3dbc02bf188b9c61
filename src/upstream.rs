use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::error::TransportError;
use crate::http_client::http_client;
use crate::normalize::{CAREER_MARKER, RawStatsRow};

const PLAYER_CAREER_URL: &str = "https://stats.nba.com/stats/playercareerstats";
const SEASON_TOTALS_SET: &str = "SeasonTotalsRegularSeason";
const CAREER_TOTALS_SET: &str = "CareerTotalsRegularSeason";

/// Upstream source of per-player career rows.
pub trait StatsSource {
    fn fetch_career_rows(&self, entity_id: u32) -> Result<Vec<RawStatsRow>, TransportError>;
}

impl<T: StatsSource + ?Sized> StatsSource for &T {
    fn fetch_career_rows(&self, entity_id: u32) -> Result<Vec<RawStatsRow>, TransportError> {
        (**self).fetch_career_rows(entity_id)
    }
}

#[derive(Clone)]
pub struct NbaStatsClient {
    client: Client,
}

impl NbaStatsClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?.clone(),
        })
    }

    pub fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::Throttled);
        }
        let body = resp.text()?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }
        Ok(body)
    }
}

impl StatsSource for NbaStatsClient {
    fn fetch_career_rows(&self, entity_id: u32) -> Result<Vec<RawStatsRow>, TransportError> {
        let url = format!("{PLAYER_CAREER_URL}?PlayerID={entity_id}&PerMode=Totals&LeagueID=00");
        let body = self.get_text(&url)?;
        parse_player_career_json(&body)
    }
}

/// One `resultSets` table: named columns over untyped cells.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(header))
    }

    pub fn cell<'a>(&self, row: &'a [Value], header: &str) -> Option<&'a Value> {
        self.column(header)
            .and_then(|idx| row.get(idx))
            .filter(|v| !v.is_null())
    }

    pub fn number(&self, row: &[Value], header: &str) -> Option<f64> {
        match self.cell(row, header)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn text(&self, row: &[Value], header: &str) -> Option<String> {
        match self.cell(row, header)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub fn parse_result_sets(raw: &str) -> Result<Vec<ResultSet>, TransportError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(TransportError::Decode("empty response".to_string()));
    }
    let parsed: Value =
        serde_json::from_str(trimmed).map_err(|e| TransportError::Decode(e.to_string()))?;

    let sets = match (parsed.get("resultSets"), parsed.get("resultSet")) {
        (Some(Value::Array(items)), _) => items.iter().collect::<Vec<_>>(),
        (_, Some(single @ Value::Object(_))) => vec![single],
        _ => return Err(TransportError::Decode("missing resultSets".to_string())),
    };

    Ok(sets.into_iter().filter_map(result_set_from_value).collect())
}

fn result_set_from_value(value: &Value) -> Option<ResultSet> {
    let name = value.get("name")?.as_str()?.to_string();
    let headers = value
        .get("headers")?
        .as_array()?
        .iter()
        .filter_map(|h| h.as_str().map(str::to_string))
        .collect();
    let rows = value
        .get("rowSet")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.as_array().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Some(ResultSet {
        name,
        headers,
        rows,
    })
}

pub fn parse_player_career_json(raw: &str) -> Result<Vec<RawStatsRow>, TransportError> {
    let sets = parse_result_sets(raw)?;
    let mut out = Vec::new();

    if let Some(seasons) = sets.iter().find(|s| s.name == SEASON_TOTALS_SET) {
        for row in &seasons.rows {
            let season_id = seasons.text(row, "SEASON_ID").unwrap_or_default();
            out.push(raw_row(seasons, row, season_id));
        }
    }
    if let Some(career) = sets.iter().find(|s| s.name == CAREER_TOTALS_SET)
        && let Some(row) = career.rows.first()
    {
        out.push(raw_row(career, row, CAREER_MARKER.to_string()));
    }

    Ok(out)
}

fn raw_row(set: &ResultSet, row: &[Value], season_id: String) -> RawStatsRow {
    RawStatsRow {
        season_id,
        team_abbreviation: set.text(row, "TEAM_ABBREVIATION"),
        gp: set.number(row, "GP"),
        min: set.number(row, "MIN"),
        pts: set.number(row, "PTS"),
        reb: set.number(row, "REB"),
        ast: set.number(row, "AST"),
        fgm: set.number(row, "FGM"),
        fga: set.number(row, "FGA"),
        fg_pct: set.number(row, "FG_PCT"),
        fg3m: set.number(row, "FG3M"),
        fg3a: set.number(row, "FG3A"),
        fg3_pct: set.number(row, "FG3_PCT"),
        ftm: set.number(row, "FTM"),
        fta: set.number(row, "FTA"),
        ft_pct: set.number(row, "FT_PCT"),
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
