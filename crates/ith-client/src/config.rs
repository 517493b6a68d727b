//! Client timing and behavior configuration.
//!
//! Defaults match the production client. Override via `ITH_*` environment
//! variables or explicit construction for tests.

use std::time::Duration;

use ith_core::MAX_TIMER_DELAY;

/// Configuration of a holder session and its background tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Refresh interval when no other signal applies. Default: 5 s.
    pub refresh_interval: Duration,
    /// Added after a scheduled processing instant before re-fetching.
    /// Default: 3 s.
    pub settle_delay: Duration,
    /// Minimum wait between `retry_prepare_delegation` attempts.
    /// Default: 15 s.
    pub prepare_delegation_cooldown: Duration,
    /// Wait before retrying a transient delegation failure. Default: 1 s.
    pub transient_retry_delay: Duration,
    /// Observer interval while waiting for capture to start. Default: 30 s.
    pub observe_waiting_start_capture: Duration,
    /// Observer interval during capture. Default: 3 s.
    pub observe_capture: Duration,
    /// Observer interval while assets are prepared. Default: 2 s.
    pub observe_preparing_assets: Duration,
    /// Upper bound of every timer. Default: 24 h.
    pub max_timer_delay: Duration,
    /// Attach raw error payloads to user messages.
    pub debug: bool,
    /// Treat anonymous callers as guests for buyer actions.
    pub allow_anonymous_buyers: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(3),
            prepare_delegation_cooldown: Duration::from_secs(15),
            transient_retry_delay: Duration::from_secs(1),
            observe_waiting_start_capture: Duration::from_secs(30),
            observe_capture: Duration::from_secs(3),
            observe_preparing_assets: Duration::from_secs(2),
            max_timer_delay: MAX_TIMER_DELAY,
            debug: false,
            allow_anonymous_buyers: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Durations are in milliseconds:
    /// - `ITH_REFRESH_INTERVAL_MS`
    /// - `ITH_SETTLE_DELAY_MS`
    /// - `ITH_PREPARE_DELEGATION_COOLDOWN_MS`
    /// - `ITH_TRANSIENT_RETRY_MS`
    /// - `ITH_OBSERVE_WAITING_START_CAPTURE_MS`
    /// - `ITH_OBSERVE_CAPTURE_MS`
    /// - `ITH_OBSERVE_PREPARING_ASSETS_MS`
    /// - `ITH_MAX_TIMER_DELAY_MS`
    ///
    /// Flags (`true`/`false`/`1`/`0`): `ITH_DEBUG`, `ITH_ALLOW_ANONYMOUS_BUYERS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
            }
        };
        let flag = |var: &'static str, default: bool| -> Result<bool, ConfigError> {
            match lookup(var).as_deref().map(str::trim) {
                None => Ok(default),
                Some("1") | Some("true") => Ok(true),
                Some("0") | Some("false") => Ok(false),
                Some(other) => Err(ConfigError::InvalidValue {
                    var,
                    value: other.to_string(),
                }),
            }
        };

        let config = Self {
            refresh_interval: millis("ITH_REFRESH_INTERVAL_MS", d.refresh_interval)?,
            settle_delay: millis("ITH_SETTLE_DELAY_MS", d.settle_delay)?,
            prepare_delegation_cooldown: millis(
                "ITH_PREPARE_DELEGATION_COOLDOWN_MS",
                d.prepare_delegation_cooldown,
            )?,
            transient_retry_delay: millis("ITH_TRANSIENT_RETRY_MS", d.transient_retry_delay)?,
            observe_waiting_start_capture: millis(
                "ITH_OBSERVE_WAITING_START_CAPTURE_MS",
                d.observe_waiting_start_capture,
            )?,
            observe_capture: millis("ITH_OBSERVE_CAPTURE_MS", d.observe_capture)?,
            observe_preparing_assets: millis(
                "ITH_OBSERVE_PREPARING_ASSETS_MS",
                d.observe_preparing_assets,
            )?,
            max_timer_delay: millis("ITH_MAX_TIMER_DELAY_MS", d.max_timer_delay)?,
            debug: flag("ITH_DEBUG", d.debug)?,
            allow_anonymous_buyers: flag("ITH_ALLOW_ANONYMOUS_BUYERS", d.allow_anonymous_buyers)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "refresh interval must be positive".to_string(),
            ));
        }
        if self.max_timer_delay > MAX_TIMER_DELAY {
            return Err(ConfigError::Invalid(format!(
                "max timer delay exceeds {} ms",
                MAX_TIMER_DELAY.as_millis()
            )));
        }
        if self.max_timer_delay < self.refresh_interval {
            return Err(ConfigError::Invalid(
                "max timer delay is shorter than the refresh interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.prepare_delegation_cooldown, Duration::from_secs(15));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("ITH_REFRESH_INTERVAL_MS", "2500"),
            ("ITH_DEBUG", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.refresh_interval, Duration::from_millis(2500));
        assert!(cfg.debug);
    }

    #[test]
    fn rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup(&[("ITH_SETTLE_DELAY_MS", "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "ITH_SETTLE_DELAY_MS",
                ..
            }
        ));
        assert!(ClientConfig::from_lookup(lookup(&[("ITH_DEBUG", "yes")])).is_err());
    }

    #[test]
    fn rejects_inconsistent_bounds() {
        assert!(ClientConfig::from_lookup(lookup(&[("ITH_REFRESH_INTERVAL_MS", "0")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("ITH_MAX_TIMER_DELAY_MS", "1000")])).is_err());
    }
}
