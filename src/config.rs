//! Configuration types for the translation job pipeline.
//!
//! All job-manager behaviour is controlled through [`JobManagerConfig`],
//! built via its [`JobManagerConfigBuilder`]. Every knob is a plain value so
//! a config can be cloned into each job task, logged, and compared between
//! runs.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// Configuration for a [`crate::JobManager`].
///
/// Built via [`JobManagerConfig::builder()`] or using
/// [`JobManagerConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdftrans::JobManagerConfig;
///
/// let config = JobManagerConfig::builder()
///     .max_retries(5)
///     .retry_backoff_ms(250)
///     .max_concurrent_jobs(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManagerConfig {
    /// Retries after the first attempt on a transient engine failure. Default: 3.
    ///
    /// A job whose engine keeps failing transiently is marked Failed after
    /// exactly `max_retries + 1` engine calls. Permanent failures are never
    /// retried.
    pub max_retries: u32,

    /// Base retry delay in milliseconds. Default: 500.
    ///
    /// The delay before retry `n` (1-based) is `retry_backoff_ms * 2^(n-1)`,
    /// capped at `max_backoff_ms`, then jittered: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds. Default: 30 000.
    pub max_backoff_ms: u64,

    /// Relative jitter applied to each backoff delay, 0.0–1.0. Default: 0.2.
    ///
    /// 0.2 spreads a 1 s delay uniformly over 0.8–1.2 s, so jobs that failed
    /// together against the same engine do not retry in lock-step.
    pub backoff_jitter: f64,

    /// Maximum number of jobs calling the engine at the same time. Default: 4.
    ///
    /// Jobs beyond this limit stay Pending until a permit frees up.
    pub max_concurrent_jobs: usize,

    /// Per-engine-call timeout in seconds. Default: 120.
    ///
    /// An attempt that exceeds it counts as a transient failure.
    pub attempt_timeout_secs: u64,

    /// Capacity of the job event broadcast channel. Default: 256.
    ///
    /// Slow subscribers that fall further behind than this lose the oldest
    /// events (they observe a `Lagged` error), never the job itself.
    pub event_capacity: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_jitter: 0.2,
            max_concurrent_jobs: 4,
            attempt_timeout_secs: 120,
            event_capacity: 256,
        }
    }
}

impl JobManagerConfig {
    /// Create a new builder for `JobManagerConfig`.
    pub fn builder() -> JobManagerConfigBuilder {
        JobManagerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Total engine calls a job may make: the first attempt plus retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(32);
        let ms = self
            .retry_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.base_backoff(retry);
        // NaN disables jitter; out-of-range values are clamped.
        let jitter = if self.backoff_jitter.is_nan() {
            0.0
        } else {
            self.backoff_jitter.clamp(0.0, 1.0)
        };
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(-jitter..=jitter);
        let ms = (base.as_millis() as f64 * (1.0 + factor)).max(0.0);
        Duration::from_millis(ms.round() as u64)
    }
}

/// Builder for [`JobManagerConfig`].
#[derive(Debug)]
pub struct JobManagerConfigBuilder {
    config: JobManagerConfig,
}

impl JobManagerConfigBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn backoff_jitter(mut self, ratio: f64) -> Self {
        self.config.backoff_jitter = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn attempt_timeout_secs(mut self, secs: u64) -> Self {
        self.config.attempt_timeout_secs = secs;
        self
    }

    pub fn event_capacity(mut self, n: usize) -> Self {
        self.config.event_capacity = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobManagerConfig, TranslateError> {
        let c = &self.config;
        if c.max_concurrent_jobs == 0 {
            return Err(TranslateError::InvalidConfig(
                "max_concurrent_jobs must be ≥ 1".into(),
            ));
        }
        if c.attempt_timeout_secs == 0 {
            return Err(TranslateError::InvalidConfig(
                "attempt_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(TranslateError::InvalidConfig(format!(
                "max_backoff_ms ({}) must be ≥ retry_backoff_ms ({})",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        if !(0.0..=1.0).contains(&c.backoff_jitter) {
            return Err(TranslateError::InvalidConfig(format!(
                "backoff_jitter must be 0.0–1.0, got {}",
                c.backoff_jitter
            )));
        }
        if c.event_capacity == 0 {
            return Err(TranslateError::InvalidConfig(
                "event_capacity must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
