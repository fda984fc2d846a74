use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::channel::{Channel, ChannelSet};

pub const DEFAULT_UART_DEVICE: &str = "/dev/serial0";
pub const DEFAULT_POLL_INTERVAL: &str = "60s";
pub const DEFAULT_RESPONSE_TIMEOUT: &str = "300ms";
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Raw configuration file contents. Turned into an immutable
/// [`SensorConfig`] by [`Config::validate`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_uart_device")]
    pub uart_device: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_response_timeout")]
    pub response_timeout: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
}

fn default_uart_device() -> String {
    DEFAULT_UART_DEVICE.to_string()
}

fn default_poll_interval() -> String {
    DEFAULT_POLL_INTERVAL.to_string()
}

fn default_response_timeout() -> String {
    DEFAULT_RESPONSE_TIMEOUT.to_string()
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_channels() -> Vec<Channel> {
    ChannelSet::all().iter().collect()
}

impl Default for Config {
    fn default() -> Config {
        Config {
            uart_device: default_uart_device(),
            poll_interval: default_poll_interval(),
            response_timeout: default_response_timeout(),
            failure_threshold: default_failure_threshold(),
            channels: default_channels(),
        }
    }
}

/// Validated, immutable sensor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub uart_device: String,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub failure_threshold: u32,
    pub channels: ChannelSet,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration {value:?} for {field}: expected e.g. \"60s\", \"300ms\", \"2m\"")]
    InvalidDuration { field: &'static str, value: String },
    #[error("poll interval {0:?} is shorter than the 1s minimum")]
    PollIntervalTooShort(Duration),
    #[error("response timeout must be non-zero")]
    ZeroResponseTimeout,
    #[error("response timeout {timeout:?} must be shorter than the poll interval {interval:?}")]
    ResponseTimeoutTooLong { timeout: Duration, interval: Duration },
    #[error("failure threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("uart device path is empty")]
    EmptyUartDevice,
}

/// Every constraint the configuration violated, not just the first.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidConfig(pub Vec<ConfigError>);

impl std::error::Error for InvalidConfig {}

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration:")?;
        for error in &self.0 {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<SensorConfig, InvalidConfig> {
        let mut errors = Vec::new();

        let poll_interval = match parse_duration(&self.poll_interval) {
            Some(interval) if interval < MIN_POLL_INTERVAL => {
                errors.push(ConfigError::PollIntervalTooShort(interval));
                interval
            }
            Some(interval) => interval,
            None => {
                errors.push(ConfigError::InvalidDuration {
                    field: "poll_interval",
                    value: self.poll_interval.clone(),
                });
                Duration::ZERO
            }
        };

        let response_timeout = match parse_duration(&self.response_timeout) {
            Some(timeout) => {
                if timeout.is_zero() {
                    errors.push(ConfigError::ZeroResponseTimeout);
                } else if !poll_interval.is_zero() && timeout >= poll_interval {
                    errors.push(ConfigError::ResponseTimeoutTooLong {
                        timeout,
                        interval: poll_interval,
                    });
                }
                timeout
            }
            None => {
                errors.push(ConfigError::InvalidDuration {
                    field: "response_timeout",
                    value: self.response_timeout.clone(),
                });
                Duration::ZERO
            }
        };

        if self.failure_threshold == 0 {
            errors.push(ConfigError::ZeroFailureThreshold);
        }

        if self.uart_device.is_empty() {
            errors.push(ConfigError::EmptyUartDevice);
        }

        if !errors.is_empty() {
            return Err(InvalidConfig(errors));
        }

        Ok(SensorConfig {
            uart_device: self.uart_device.clone(),
            poll_interval,
            response_timeout,
            failure_threshold: self.failure_threshold,
            channels: self.channels.iter().copied().collect(),
        })
    }
}

/// Parses duration strings of the form `<integer><unit>` with unit `ms`,
/// `s`, or `m`.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, unit) = if let Some(number) = value.strip_suffix("ms") {
        (number, Duration::from_millis(1))
    } else if let Some(number) = value.strip_suffix('s') {
        (number, Duration::from_secs(1))
    } else if let Some(number) = value.strip_suffix('m') {
        (number, Duration::from_secs(60))
    } else {
        return None;
    };

    let count: u64 = number.trim().parse().ok()?;
    unit.checked_mul(count.try_into().ok()?)
}
