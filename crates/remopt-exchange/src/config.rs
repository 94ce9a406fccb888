use std::time::Duration;

use remopt_protocol::{Limits, RECORD_HEADER_LEN};
use thiserror::Error;

pub const ENV_MAX_FRAME_BYTES: &str = "REMOPT_MAX_FRAME_BYTES";
pub const ENV_EXCHANGE_TIMEOUT_MS: &str = "REMOPT_EXCHANGE_TIMEOUT_MS";
pub const ENV_IDLE_BACKOFF_US: &str = "REMOPT_IDLE_BACKOFF_US";

const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_micros(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub limits: Limits,
    /// Bound on each blocking read once a block exchange has started. `None` waits forever.
    pub exchange_timeout: Option<Duration>,
    /// Sleep between reactor sweeps that found nothing to do.
    pub idle_backoff: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            exchange_timeout: Some(DEFAULT_EXCHANGE_TIMEOUT),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

impl ExchangeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`ExchangeConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_FRAME_BYTES) {
            let max_frame_bytes = parse::<usize>(ENV_MAX_FRAME_BYTES, &raw)?;
            // Smaller than a bare record header could never carry an instruction.
            if max_frame_bytes < RECORD_HEADER_LEN {
                return Err(ConfigError::InvalidEnv {
                    var: ENV_MAX_FRAME_BYTES,
                    value: raw,
                });
            }
            config.limits = Limits { max_frame_bytes };
        }

        if let Some(raw) = lookup(ENV_EXCHANGE_TIMEOUT_MS) {
            config.exchange_timeout = match parse::<u64>(ENV_EXCHANGE_TIMEOUT_MS, &raw)? {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            };
        }

        if let Some(raw) = lookup(ENV_IDLE_BACKOFF_US) {
            config.idle_backoff = Duration::from_micros(parse(ENV_IDLE_BACKOFF_US, &raw)?);
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_owned(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for env var {var}")]
    InvalidEnv { var: &'static str, value: String },
}
