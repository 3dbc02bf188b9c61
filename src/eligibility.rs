use crate::normalize::CanonicalStats;

pub const DEFAULT_MIN_GAMES: u64 = 100;
pub const DEFAULT_MIN_POINTS: u64 = 1000;

/// Inclusive minimums; a zero threshold ignores that field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min_games: u64,
    pub min_points: u64,
    pub min_minutes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_games: DEFAULT_MIN_GAMES,
            min_points: DEFAULT_MIN_POINTS,
            min_minutes: 0,
        }
    }
}

impl Thresholds {
    pub fn is_eligible(&self, stats: &CanonicalStats) -> bool {
        stats.games >= self.min_games
            && stats.points >= self.min_points
            && stats.minutes >= self.min_minutes
    }

    pub fn predicate(self) -> impl Fn(&CanonicalStats) -> bool {
        move |stats: &CanonicalStats| self.is_eligible(stats)
    }
}
