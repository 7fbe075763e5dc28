//! Backoff policies for transaction retries
//!
//! A [`Backoff`] is a stateful schedule: each call to `next_backoff`
//! advances it and yields the next wait, or `None` once the schedule is
//! spent. A [`BackoffPolicy`] is the shareable prototype a run uses to
//! obtain a fresh, reset schedule, so concurrent runs never share mutable
//! backoff state.
//!
//! # Default Policy
//!
//! [`ExponentialBackoff`] grows the interval geometrically from
//! `initial_interval`, capped at `max_interval`, with proportional random
//! jitter. Once the elapsed time plus the next interval would exceed
//! `max_elapsed_time` it stops and stays stopped until `reset()`.
//!
//! | Parameter | Default |
//! |-----------|---------|
//! | initial_interval | 1ms |
//! | randomization_factor | 0.5 |
//! | multiplier | 1.5 |
//! | max_interval | 60s |
//! | max_elapsed_time | 5s |

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

// ============================================================================
// Defaults
// ============================================================================

/// Default first retry interval
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(1);
/// Default jitter factor (interval is drawn from `cur ± cur * factor`)
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
/// Default growth factor between attempts
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Default upper bound for a single interval
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
/// Default overall time budget for retries of one run
pub const DEFAULT_MAX_ELAPSED_TIME: Duration = Duration::from_secs(5);

// ============================================================================
// Traits
// ============================================================================

/// Stateful retry schedule
pub trait Backoff: Send + Debug {
    /// Re-arm the schedule: clear attempt state and restart the clock
    fn reset(&mut self);

    /// The next wait, or `None` when retrying should stop
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// Prototype that produces a fresh schedule for every run
pub trait BackoffPolicy: Send + Sync + Debug {
    /// Create a new schedule, already reset
    fn new_backoff(&self) -> Box<dyn Backoff>;
}

impl<B> BackoffPolicy for B
where
    B: Backoff + Clone + Sync + 'static,
{
    fn new_backoff(&self) -> Box<dyn Backoff> {
        let mut backoff = self.clone();
        backoff.reset();
        Box::new(backoff)
    }
}

/// Source of the current time for elapsed-time accounting
pub trait Clock: Send + Sync + Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ============================================================================
// Exponential Backoff
// ============================================================================

/// Exponential backoff with jitter and an elapsed-time ceiling
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    randomization_factor: f64,
    multiplier: f64,
    max_interval: Duration,
    /// `None` means never stop on elapsed time
    max_elapsed_time: Option<Duration>,
    clock: Arc<dyn Clock>,

    current_interval: Duration,
    start_time: Instant,
    stopped: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ExponentialBackoff {
    /// Create a policy with the default parameters
    pub fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let start_time = clock.now();
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_elapsed_time: Some(DEFAULT_MAX_ELAPSED_TIME),
            clock,
            current_interval: DEFAULT_INITIAL_INTERVAL,
            start_time,
            stopped: false,
        }
    }

    /// Set the first interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self.reset();
        self
    }

    /// Set the jitter factor, clamped to `[0, 1]`
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Set the growth factor, at least 1
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            DEFAULT_MULTIPLIER
        };
        self
    }

    /// Set the cap for a single interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the elapsed-time ceiling; `None` disables it
    pub fn with_max_elapsed_time(mut self, max: Option<Duration>) -> Self {
        self.max_elapsed_time = max;
        self
    }

    /// Use a different clock for elapsed-time accounting
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.reset();
        self
    }

    /// First interval
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Jitter factor
    pub fn randomization_factor(&self) -> f64 {
        self.randomization_factor
    }

    /// Growth factor
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Cap for a single interval
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Elapsed-time ceiling
    pub fn max_elapsed_time(&self) -> Option<Duration> {
        self.max_elapsed_time
    }

    /// Time since the last reset
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start_time)
    }

    /// Interval that the next call will randomize around
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    fn increment_current_interval(&mut self) {
        // Cap before multiplying to avoid overflow
        if self.current_interval.as_secs_f64() >= self.max_interval.as_secs_f64() / self.multiplier
        {
            self.current_interval = self.max_interval;
        } else {
            self.current_interval = self.current_interval.mul_f64(self.multiplier);
        }
    }
}

/// Draw an interval uniformly from `current ± current * factor`
fn randomized_interval(factor: f64, random: f64, current: Duration) -> Duration {
    if factor == 0.0 {
        return current;
    }
    let current = current.as_secs_f64();
    let delta = factor * current;
    let min = current - delta;
    let max = current + delta;
    Duration::from_secs_f64((min + random * (max - min)).max(0.0))
}

impl Backoff for ExponentialBackoff {
    fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = self.clock.now();
        self.stopped = false;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.stopped {
            return None;
        }

        let elapsed = self.elapsed();
        let next = randomized_interval(
            self.randomization_factor,
            rand::thread_rng().gen::<f64>(),
            self.current_interval,
        );
        self.increment_current_interval();

        if let Some(max_elapsed) = self.max_elapsed_time {
            if elapsed.saturating_add(next) > max_elapsed {
                self.stopped = true;
                return None;
            }
        }
        Some(next)
    }
}

// ============================================================================
// Fixed Schedules
// ============================================================================

/// Waits the same interval before every retry and never stops
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    /// Create a constant schedule
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Backoff for ConstantBackoff {
    fn reset(&mut self) {}

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// Retries immediately and never stops
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBackoff;

impl Backoff for ZeroBackoff {
    fn reset(&mut self) {}

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(Duration::ZERO)
    }
}
