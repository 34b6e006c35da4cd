//! Randomised waits before item reads and page navigation.
//!
//! The policy only computes durations; the session controller performs the
//! wait. Page transitions are drawn from a range whose minimum is strictly
//! above the largest item delay the policy can ever produce, including
//! after backoff, because navigation is the step most likely to get a
//! session blocked.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use harvest_core::pacing::{DelayRange, PacingConfig, PacingPolicy, Transition};
//!
//! let config = PacingConfig::new(
//!     DelayRange::new(Duration::from_millis(200), Duration::from_millis(500)),
//!     DelayRange::new(Duration::from_secs(2), Duration::from_secs(4)),
//! );
//! let policy = PacingPolicy::new(config).unwrap();
//! let wait = policy.delay_for(Transition::Page, 2);
//! assert!(wait >= Duration::from_secs(2));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::error::AppError;

/// Which kind of step is about to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Reading the next item on the current page.
    Item,
    /// Navigating to the next page.
    Page,
}

/// Inclusive range a delay is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Uniform sample from `[min, max]` at millisecond resolution.
    fn sample(&self) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if max_ms <= min_ms {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }

    /// Same minimum, maximum doubled `steps` times and capped at `ceiling`.
    fn widened(&self, steps: u32, ceiling: Duration) -> Self {
        let factor = 1u32 << steps.min(16);
        let max = self
            .max
            .checked_mul(factor)
            .unwrap_or(ceiling)
            .min(ceiling)
            .max(self.min);
        Self { min: self.min, max }
    }
}

/// Configuration for the pacing policy.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Delay before each item extraction.
    pub item: DelayRange,
    /// Delay before each page navigation.
    pub page: DelayRange,
    /// Largest item delay backoff may widen to.
    pub item_ceiling: Duration,
    /// Largest page delay backoff may widen to.
    pub page_ceiling: Duration,
}

impl PacingConfig {
    /// Config with the given ranges and no room for backoff.
    pub fn new(item: DelayRange, page: DelayRange) -> Self {
        Self {
            item,
            page,
            item_ceiling: item.max,
            page_ceiling: page.max,
        }
    }

    pub fn with_ceilings(mut self, item_ceiling: Duration, page_ceiling: Duration) -> Self {
        self.item_ceiling = item_ceiling;
        self.page_ceiling = page_ceiling;
        self
    }

    /// Read overrides from environment variables, falling back to defaults.
    ///
    /// - `HARVEST_ITEM_DELAY_MIN_MS` / `HARVEST_ITEM_DELAY_MAX_MS`
    /// - `HARVEST_PAGE_DELAY_MIN_MS` / `HARVEST_PAGE_DELAY_MAX_MS`
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let item = DelayRange::new(
            env_millis("HARVEST_ITEM_DELAY_MIN_MS", defaults.item.min)?,
            env_millis("HARVEST_ITEM_DELAY_MAX_MS", defaults.item.max)?,
        );
        let page = DelayRange::new(
            env_millis("HARVEST_PAGE_DELAY_MIN_MS", defaults.page.min)?,
            env_millis("HARVEST_PAGE_DELAY_MAX_MS", defaults.page.max)?,
        );
        let config = Self {
            item,
            page,
            item_ceiling: defaults.item_ceiling.max(item.max),
            page_ceiling: defaults.page_ceiling.max(page.max),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the ordering guarantees the controller relies on.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, range, ceiling) in [
            ("item", self.item, self.item_ceiling),
            ("page", self.page, self.page_ceiling),
        ] {
            if range.min.is_zero() {
                return Err(AppError::ConfigError(format!(
                    "{name} delay minimum must be above zero"
                )));
            }
            if range.min > range.max {
                return Err(AppError::ConfigError(format!(
                    "{name} delay minimum {:?} exceeds maximum {:?}",
                    range.min, range.max
                )));
            }
            if range.max > ceiling {
                return Err(AppError::ConfigError(format!(
                    "{name} delay maximum {:?} exceeds ceiling {ceiling:?}",
                    range.max
                )));
            }
        }
        if self.page.min <= self.item_ceiling {
            return Err(AppError::ConfigError(format!(
                "page delay minimum {:?} must exceed the largest item delay {:?}",
                self.page.min, self.item_ceiling
            )));
        }
        Ok(())
    }
}

impl Default for PacingConfig {
    /// 2–5 s between items, 35–45 s before a page change.
    fn default() -> Self {
        Self {
            item: DelayRange::new(Duration::from_secs(2), Duration::from_secs(5)),
            page: DelayRange::new(Duration::from_secs(35), Duration::from_secs(45)),
            item_ceiling: Duration::from_secs(20),
            page_ceiling: Duration::from_secs(120),
        }
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration, AppError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {key} '{raw}': must be a whole number of milliseconds"
            ))
        }),
    }
}

/// Decides how long to wait before the next item or page step.
#[derive(Debug, Clone)]
pub struct PacingPolicy {
    config: PacingConfig,
    consecutive_failures: u32,
}

impl PacingPolicy {
    pub fn new(config: PacingConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            config,
            consecutive_failures: 0,
        })
    }

    /// Sample a wait for the given step. `ordinal` is the 1-based item
    /// position or the number of the page being navigated to.
    pub fn delay_for(&self, kind: Transition, ordinal: u32) -> Duration {
        let steps = self.consecutive_failures;
        let range = match kind {
            Transition::Item => self.config.item.widened(steps, self.config.item_ceiling),
            Transition::Page => self.config.page.widened(steps, self.config.page_ceiling),
        };
        let delay = range.sample();
        tracing::debug!(?kind, ordinal, backoff = steps, delay_ms = %delay.as_millis(), "Pacing");
        delay
    }

    /// Widen subsequent delays after a failed step.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Return to the base ranges.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Largest item delay this policy can ever return.
    pub fn max_item_delay(&self) -> Duration {
        self.config.item_ceiling
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            config: PacingConfig::default(),
            consecutive_failures: 0,
        }
    }
}
