//! Configuration for the state machine and its reapers.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Default idle time before a user's state is evicted.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(30 * 60);

/// Default interval between state sweeps.
pub const DEFAULT_STATE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for an [`Fsm`](crate::Fsm).
///
/// A `None` duration disables the corresponding reaper. Zero durations passed
/// to the builder methods are normalised to `None`, so "non-positive" always
/// means "no eviction" rather than a construction failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsmConfig {
    /// Idle time after which a user's state record is evicted.
    pub state_ttl: Option<Duration>,

    /// How often the state reaper scans the state table.
    pub state_sweep_interval: Option<Duration>,

    /// Idle time after which a user's cached data is evicted.
    /// Tracked independently of the state TTL.
    pub cache_ttl: Option<Duration>,

    /// How often the cache reaper scans the store.
    pub cache_sweep_interval: Option<Duration>,

    /// Whether evicting a state record also purges that user's cache.
    pub cascade_eviction: bool,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            state_ttl: Some(DEFAULT_STATE_TTL),
            state_sweep_interval: Some(DEFAULT_STATE_SWEEP_INTERVAL),
            cache_ttl: None,
            cache_sweep_interval: None,
            cascade_eviction: true,
        }
    }
}

impl FsmConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state TTL. A zero duration disables state eviction.
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = positive(ttl);
        self
    }

    /// Set the state sweep interval. A zero duration disables the state reaper.
    pub fn with_state_sweep_interval(mut self, interval: Duration) -> Self {
        self.state_sweep_interval = positive(interval);
        self
    }

    /// Disable state eviction entirely.
    pub fn without_state_eviction(mut self) -> Self {
        self.state_ttl = None;
        self
    }

    /// Set the cache TTL. A zero duration disables cache eviction.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = positive(ttl);
        self
    }

    /// Set the cache sweep interval. A zero duration disables the cache reaper.
    pub fn with_cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache_sweep_interval = positive(interval);
        self
    }

    /// Disable cache eviction entirely.
    pub fn without_cache_eviction(mut self) -> Self {
        self.cache_ttl = None;
        self
    }

    /// Enable or disable purging the cache when a state record is evicted.
    pub fn with_cascade_eviction(mut self, enabled: bool) -> Self {
        self.cascade_eviction = enabled;
        self
    }

    /// Effective state TTL. Zero counts as disabled, even when set directly
    /// on the field.
    pub fn effective_state_ttl(&self) -> Option<Duration> {
        self.state_ttl.and_then(positive)
    }

    /// Effective cache TTL. Zero counts as disabled.
    pub fn effective_cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl.and_then(positive)
    }

    /// TTL and interval for the state reaper, if it should run.
    pub fn state_reaper(&self) -> Option<(Duration, Duration)> {
        self.effective_state_ttl()
            .zip(self.state_sweep_interval.and_then(positive))
    }

    /// TTL and interval for the cache reaper, if it should run.
    pub fn cache_reaper(&self) -> Option<(Duration, Duration)> {
        self.effective_cache_ttl()
            .zip(self.cache_sweep_interval.and_then(positive))
    }

    /// Parse a configuration from TOML.
    ///
    /// Missing keys keep their defaults. Durations are whole seconds; zero or
    /// negative values disable the corresponding reaper.
    ///
    /// ```toml
    /// state_ttl_secs = 1800
    /// state_sweep_secs = 30
    /// cache_ttl_secs = 600
    /// cache_sweep_secs = 60
    /// cascade_eviction = true
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;
        Ok(raw.apply(Self::default()))
    }
}

/// On-disk shape of [`FsmConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    state_ttl_secs: Option<i64>,
    state_sweep_secs: Option<i64>,
    cache_ttl_secs: Option<i64>,
    cache_sweep_secs: Option<i64>,
    cascade_eviction: Option<bool>,
}

impl RawConfig {
    fn apply(self, mut config: FsmConfig) -> FsmConfig {
        if let Some(secs) = self.state_ttl_secs {
            config.state_ttl = seconds(secs);
        }
        if let Some(secs) = self.state_sweep_secs {
            config.state_sweep_interval = seconds(secs);
        }
        if let Some(secs) = self.cache_ttl_secs {
            config.cache_ttl = seconds(secs);
        }
        if let Some(secs) = self.cache_sweep_secs {
            config.cache_sweep_interval = seconds(secs);
        }
        if let Some(cascade) = self.cascade_eviction {
            config.cascade_eviction = cascade;
        }
        config
    }
}

fn positive(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

fn seconds(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .and_then(|secs| positive(Duration::from_secs(secs)))
}
