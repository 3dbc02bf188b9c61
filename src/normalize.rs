use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

pub const CAREER_MARKER: &str = "Career";
/// Season rows aggregating several teams for a traded player.
pub const MULTI_TEAM_MARKER: &str = "TOT";

/// One upstream row, either a season or the career aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatsRow {
    pub season_id: String,
    pub team_abbreviation: Option<String>,
    pub gp: Option<f64>,
    pub min: Option<f64>,
    pub pts: Option<f64>,
    pub reb: Option<f64>,
    pub ast: Option<f64>,
    pub fgm: Option<f64>,
    pub fga: Option<f64>,
    pub fg_pct: Option<f64>,
    pub fg3m: Option<f64>,
    pub fg3a: Option<f64>,
    pub fg3_pct: Option<f64>,
    pub ftm: Option<f64>,
    pub fta: Option<f64>,
    pub ft_pct: Option<f64>,
}

impl RawStatsRow {
    pub fn is_aggregate(&self) -> bool {
        self.season_id == CAREER_MARKER
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalStats {
    #[serde(default)]
    pub games: u64,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub rebounds: u64,
    #[serde(default)]
    pub assists: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fg_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub three_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ft_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsOrigin {
    /// Taken from the career aggregate row.
    Aggregate,
    /// Summed from per-season rows; may undercount if seasons are missing.
    SeasonSum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub stats: CanonicalStats,
    pub teams: BTreeSet<String>,
    pub origin: StatsOrigin,
}

impl Normalized {
    pub fn used_fallback(&self) -> bool {
        self.origin == StatsOrigin::SeasonSum
    }
}

/// A `Career` row is authoritative. Without one, season rows are summed field by
/// field; null cells count as 0 and counts are truncated to whole numbers.
pub fn normalize(rows: &[RawStatsRow]) -> Result<Normalized, NormalizeError> {
    if rows.is_empty() {
        return Err(NormalizeError::EmptyAggregateRow);
    }
    let teams = collect_teams(rows);

    if let Some(career) = rows.iter().find(|r| r.is_aggregate()) {
        return Ok(Normalized {
            stats: stats_from_aggregate(career),
            teams,
            origin: StatsOrigin::Aggregate,
        });
    }

    Ok(Normalized {
        stats: stats_from_season_sum(rows),
        teams,
        origin: StatsOrigin::SeasonSum,
    })
}

fn stats_from_aggregate(row: &RawStatsRow) -> CanonicalStats {
    CanonicalStats {
        games: count(row.gp),
        points: count(row.pts),
        rebounds: count(row.reb),
        assists: count(row.ast),
        minutes: count(row.min),
        fg_pct: pct(row.fg_pct),
        three_pct: pct(row.fg3_pct),
        ft_pct: pct(row.ft_pct),
    }
}

fn stats_from_season_sum(rows: &[RawStatsRow]) -> CanonicalStats {
    let sum = |field: fn(&RawStatsRow) -> Option<f64>| -> f64 {
        rows.iter()
            .map(|r| field(r).filter(|v| v.is_finite()).unwrap_or(0.0))
            .sum()
    };

    // Percentages do not add up; rebuild them from makes and attempts.
    CanonicalStats {
        games: count(Some(sum(|r| r.gp))),
        points: count(Some(sum(|r| r.pts))),
        rebounds: count(Some(sum(|r| r.reb))),
        assists: count(Some(sum(|r| r.ast))),
        minutes: count(Some(sum(|r| r.min))),
        fg_pct: ratio(sum(|r| r.fgm), sum(|r| r.fga)),
        three_pct: ratio(sum(|r| r.fg3m), sum(|r| r.fg3a)),
        ft_pct: ratio(sum(|r| r.ftm), sum(|r| r.fta)),
    }
}

fn collect_teams(rows: &[RawStatsRow]) -> BTreeSet<String> {
    rows.iter()
        .filter(|r| !r.is_aggregate())
        .filter_map(|r| r.team_abbreviation.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != MULTI_TEAM_MARKER)
        .map(str::to_string)
        .collect()
}

fn count(value: Option<f64>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

fn pct(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn ratio(made: f64, attempted: f64) -> Option<f64> {
    if attempted > 0.0 {
        Some(made / attempted)
    } else {
        None
    }
}
