//! Configuration management for the Musicbox MCP Server
//!
//! Handles paths, environment variables, and configuration loading.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, MusicboxError, Result};

/// Configuration for the Musicbox MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Sonic Pi application bundle, launched when Sonic Pi is not running
    pub app_path: PathBuf,

    /// Process name used to detect a running Sonic Pi
    pub process_name: String,

    /// Sonic Pi log carrying the connection tokens
    pub log_path: PathBuf,

    /// JSON file holding the current live-mix parameters
    pub state_path: PathBuf,

    /// Host Sonic Pi listens on
    pub host: IpAddr,

    /// How long to wait for a freshly launched Sonic Pi to appear
    pub startup_timeout: Duration,

    /// Extra wait after the process appears, so it can write its log
    pub settle_delay: Duration,
}

impl Config {
    /// Create a new configuration from the environment
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().ok_or(MusicboxError::Config(ConfigError::HomeNotFound))?;
        Self::from_lookup(&home, |key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(home: &std::path::Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_path = lookup(env::APP_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(sonic_pi::DEFAULT_APP_PATH));

        let process_name =
            lookup(env::PROCESS_NAME).unwrap_or_else(|| sonic_pi::DEFAULT_PROCESS_NAME.to_string());

        let log_path = lookup(env::LOG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".sonic-pi").join("log").join("gui.log"));

        let state_path = lookup(env::STATE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".musicbox").join("shared_state.json"));

        let host = parse_var(&lookup, env::HOST)?.unwrap_or(sonic_pi::DEFAULT_HOST);

        let startup_timeout = parse_var(&lookup, env::STARTUP_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(sonic_pi::DEFAULT_STARTUP_TIMEOUT);

        let settle_delay = parse_var(&lookup, env::SETTLE_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(sonic_pi::DEFAULT_SETTLE_DELAY);

        Ok(Self {
            app_path,
            process_name,
            log_path,
            state_path,
            host,
            startup_timeout,
            settle_delay,
        })
    }

    /// Check if the shared state file exists
    pub fn state_file_exists(&self) -> bool {
        self.state_path.exists()
    }

    /// Check if the Sonic Pi log exists
    pub fn log_file_exists(&self) -> bool {
        self.log_path.exists()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            MusicboxError::Config(ConfigError::InvalidConfig {
                message: format!("{} has invalid value '{}'", key, raw),
            })
        }),
        None => Ok(None),
    }
}

/// Environment variable names
pub mod env {
    pub const APP_PATH: &str = "SONIC_PI_APP_PATH";
    pub const PROCESS_NAME: &str = "SONIC_PI_PROCESS_NAME";
    pub const LOG_PATH: &str = "SONIC_PI_LOG_PATH";
    pub const HOST: &str = "SONIC_PI_HOST";
    pub const STATE_PATH: &str = "MUSICBOX_STATE_PATH";
    pub const STARTUP_TIMEOUT_SECS: &str = "SONIC_PI_STARTUP_TIMEOUT_SECS";
    pub const SETTLE_SECS: &str = "SONIC_PI_SETTLE_SECS";
}

/// Sonic Pi constants
pub mod sonic_pi {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    pub const DEFAULT_APP_PATH: &str = "/Applications/Sonic Pi.app";

    pub const DEFAULT_PROCESS_NAME: &str = "Sonic Pi";

    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(9);

    /// Interval between "is it up yet" checks after a launch
    pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// OSC addresses understood by the Spider server
    pub mod osc {
        pub const RUN_CODE: &str = "/run-code";
        pub const STOP_ALL_JOBS: &str = "/stop-all-jobs";
    }
}
