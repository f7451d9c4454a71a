//! Runtime configuration from environment variables.
//!
//! # Invariants
//! - Every key has a default; only malformed values are errors.
//! - Lookup is injectable so tests never touch the process environment.

use crate::logging::default_log_level;
use crate::robot::link::{
    RobotEndpoint, DEFAULT_DASHBOARD_PORT, DEFAULT_ROBOT_HOST, DEFAULT_SCRIPT_PORT,
};
use crate::service::fulfillment::FulfillmentOptions;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "STOCKBOT_DB_PATH";
pub const ENV_ROBOT_HOST: &str = "STOCKBOT_ROBOT_HOST";
pub const ENV_SCRIPT_PORT: &str = "STOCKBOT_SCRIPT_PORT";
pub const ENV_DASHBOARD_PORT: &str = "STOCKBOT_DASHBOARD_PORT";
pub const ENV_ROBOT_SIM: &str = "STOCKBOT_ROBOT_SIM";
pub const ENV_DISPATCH_DELAY_MS: &str = "STOCKBOT_DISPATCH_DELAY_MS";
pub const ENV_OUTPUT_TRANSFER: &str = "STOCKBOT_OUTPUT_TRANSFER";
pub const ENV_LOG_LEVEL: &str = "STOCKBOT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "STOCKBOT_LOG_DIR";

const DEFAULT_DB_FILE: &str = "stockbot.sqlite3";
const DEFAULT_DISPATCH_DELAY_MS: u64 = 150;

/// Malformed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value `{}` for {}; expected {}",
            self.value, self.key, self.expected
        )
    }
}

impl Error for ConfigError {}

/// Resolved process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub robot_host: String,
    pub script_port: u16,
    pub dashboard_port: u16,
    pub simulated: bool,
    pub dispatch_delay_ms: u64,
    pub output_transfer: bool,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE),
            robot_host: DEFAULT_ROBOT_HOST.to_string(),
            script_port: DEFAULT_SCRIPT_PORT,
            dashboard_port: DEFAULT_DASHBOARD_PORT,
            simulated: true,
            dispatch_delay_ms: DEFAULT_DISPATCH_DELAY_MS,
            output_transfer: false,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves config through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            db_path: get(ENV_DB_PATH).map(PathBuf::from).unwrap_or(defaults.db_path),
            robot_host: get(ENV_ROBOT_HOST).unwrap_or(defaults.robot_host),
            script_port: parse_or(
                ENV_SCRIPT_PORT,
                get(ENV_SCRIPT_PORT),
                defaults.script_port,
                "a TCP port",
            )?,
            dashboard_port: parse_or(
                ENV_DASHBOARD_PORT,
                get(ENV_DASHBOARD_PORT),
                defaults.dashboard_port,
                "a TCP port",
            )?,
            simulated: flag_or(ENV_ROBOT_SIM, get(ENV_ROBOT_SIM), defaults.simulated)?,
            dispatch_delay_ms: parse_or(
                ENV_DISPATCH_DELAY_MS,
                get(ENV_DISPATCH_DELAY_MS),
                defaults.dispatch_delay_ms,
                "milliseconds",
            )?,
            output_transfer: flag_or(
                ENV_OUTPUT_TRANSFER,
                get(ENV_OUTPUT_TRANSFER),
                defaults.output_transfer,
            )?,
            log_level: get(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
        })
    }

    pub fn endpoint(&self) -> RobotEndpoint {
        RobotEndpoint {
            host: self.robot_host.clone(),
            script_port: self.script_port,
            dashboard_port: self.dashboard_port,
        }
    }

    pub fn fulfillment_options(&self) -> FulfillmentOptions {
        FulfillmentOptions {
            simulated: self.simulated,
            dispatch_delay: Duration::from_millis(self.dispatch_delay_ms),
            output_transfer: self.output_transfer,
        }
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    fallback: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(fallback),
        Some(value) => value.parse().map_err(|_| ConfigError {
            key,
            value,
            expected,
        }),
    }
}

fn flag_or(key: &'static str, raw: Option<String>, fallback: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(fallback);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            key,
            value,
            expected: "true|false",
        }),
    }
}
