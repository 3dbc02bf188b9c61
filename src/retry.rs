use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{TransportError, UpstreamExhausted};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1500;
const DEFAULT_JITTER_MAX_MS: u64 = 1000;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 5000;

/// Pacing and backoff for upstream calls.
///
/// `max_retries` is the total number of attempts made for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub jitter_max: Duration,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            jitter_max: Duration::from_millis(DEFAULT_JITTER_MAX_MS),
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
        }
    }
}

impl RetryPolicy {
    /// No delays at all; used by tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            jitter_max: Duration::ZERO,
            backoff_unit: Duration::ZERO,
        }
    }

    /// Delay slept before every attempt: `base_delay + uniform(0, jitter_max)`.
    pub fn pacing_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = u64::try_from(self.jitter_max.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=jitter_ms)
        };
        self.base_delay.saturating_add(Duration::from_millis(extra))
    }

    /// Delay slept after failed attempt `attempt_index` (zero-based).
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt_index.saturating_add(1))
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Records requested delays instead of blocking. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Runs one upstream call at a time under a [`RetryPolicy`].
pub struct RetryExecutor<S: Sleeper = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
    rng: StdRng,
}

impl RetryExecutor<ThreadSleeper> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, ThreadSleeper, StdRng::from_entropy())
    }
}

impl<S: Sleeper> RetryExecutor<S> {
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S, rng: StdRng) -> Self {
        Self {
            policy,
            sleeper,
            rng,
        }
    }

    pub fn run<T, F>(&mut self, entity_id: u32, mut call: F) -> Result<T, UpstreamExhausted>
    where
        F: FnMut() -> Result<T, TransportError>,
    {
        let attempts = self.policy.max_retries.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            let pause = self.policy.pacing_delay(&mut self.rng);
            self.sleeper.sleep(pause);

            match call() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt + 1 < attempts {
                        let backoff = self.policy.backoff_delay(attempt);
                        warn!(
                            "entity {entity_id}: attempt {}/{} failed ({err}); retrying in {:.1}s",
                            attempt + 1,
                            attempts,
                            backoff.as_secs_f64()
                        );
                        self.sleeper.sleep(backoff);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(UpstreamExhausted {
            entity_id,
            attempts,
            last_error: last_error
                .unwrap_or_else(|| TransportError::Http("no attempt made".to_string())),
        })
    }
}
