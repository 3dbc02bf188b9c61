#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use rand::SeedableRng;
use rand::rngs::StdRng;

use hoops_trivia::error::TransportError;
use hoops_trivia::normalize::{CAREER_MARKER, RawStatsRow};
use hoops_trivia::retry::{RecordingSleeper, RetryExecutor, RetryPolicy};
use hoops_trivia::roster::{EntityRef, RosterEntry};
use hoops_trivia::upstream::StatsSource;

/// Upstream stand-in: career line per id, every call recorded.
#[derive(Default)]
pub struct FakeSource {
    lines: HashMap<u32, (u32, u32)>,
    failing: bool,
    calls: Mutex<Vec<u32>>,
}

impl FakeSource {
    pub fn with_lines(lines: &[(u32, u32, u32)]) -> Self {
        Self {
            lines: lines.iter().map(|(id, gp, pts)| (*id, (*gp, *pts))).collect(),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl StatsSource for FakeSource {
    fn fetch_career_rows(&self, entity_id: u32) -> Result<Vec<RawStatsRow>, TransportError> {
        self.calls.lock().expect("calls lock").push(entity_id);
        if self.failing {
            return Err(TransportError::Http("connection reset".to_string()));
        }
        let Some((gp, pts)) = self.lines.get(&entity_id).copied() else {
            return Ok(Vec::new());
        };
        Ok(vec![RawStatsRow {
            season_id: CAREER_MARKER.to_string(),
            gp: Some(f64::from(gp)),
            pts: Some(f64::from(pts)),
            min: Some(f64::from(gp) * 30.0),
            ..RawStatsRow::default()
        }])
    }
}

pub fn executor(max_retries: u32) -> RetryExecutor<RecordingSleeper> {
    RetryExecutor::with_sleeper(
        RetryPolicy::immediate(max_retries),
        RecordingSleeper::new(),
        StdRng::seed_from_u64(11),
    )
}

pub fn entities(ids: impl IntoIterator<Item = u32>) -> Vec<EntityRef> {
    ids.into_iter()
        .map(|id| EntityRef {
            id,
            display_name: format!("Player {id}"),
        })
        .collect()
}

pub fn roster_entry(id: u32, name: &str) -> RosterEntry {
    RosterEntry {
        id,
        full_name: name.to_string(),
        is_active: true,
        from_year: Some("2010".to_string()),
        to_year: Some("2020".to_string()),
    }
}
