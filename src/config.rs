//! Server configuration and command-line parsing.

use crate::storage::DEFAULT_SWEEP_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Bad command-line input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Run(Config),
    Help,
    Version,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Period of the background expiry sweep
    pub cleanup_interval: Duration,
    /// Location of the durability log
    pub aof_path: PathBuf,
    /// Key limit before LRU eviction kicks in (0 = unbounded)
    pub max_keys: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            cleanup_interval: DEFAULT_SWEEP_INTERVAL,
            aof_path: PathBuf::from("data/appendonly.aof"),
            max_keys: 10_000,
        }
    }
}

impl Config {
    /// Parses command-line arguments (without the program name).
    pub fn parse_args<I, S>(args: I) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = next_value(&mut args, &arg)?;
                }
                "--port" | "-p" => {
                    let value = next_value(&mut args, &arg)?;
                    config.port = value.parse().map_err(|_| invalid(&arg, &value))?;
                }
                "--cleanup-interval" => {
                    let value = next_value(&mut args, &arg)?;
                    config.cleanup_interval = value
                        .parse::<f64>()
                        .ok()
                        .filter(|secs| secs.is_finite() && *secs > 0.0)
                        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                        .ok_or_else(|| invalid(&arg, &value))?;
                }
                "--aof" => {
                    config.aof_path = PathBuf::from(next_value(&mut args, &arg)?);
                }
                "--max-keys" => {
                    let value = next_value(&mut args, &arg)?;
                    let n: i64 = value.parse().map_err(|_| invalid(&arg, &value))?;
                    config.max_keys = usize::try_from(n).unwrap_or(0);
                }
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(Invocation::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ConfigError> {
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn invalid(flag: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}
