//! Connection discovery
//!
//! Sonic Pi picks fresh ports and a fresh auth token on every boot and only
//! announces them in its GUI log. This module scans that log (which contains
//! binary noise, so it is matched as bytes) for the latest announcement of
//! each value.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::bytes::Regex;
use serde::Serialize;

use crate::error::{DiscoveryError, MusicboxError, Result};

/// Port Spider (the language server) receives GUI commands on
static SPIDER_PORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Setting up OSC sender to Spider on port (\d+)").expect("Invalid regex pattern")
});

/// Port Tau (the IO server) receives OSC cues on
static TAU_PORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Setting up OSC sender to Tau on port (\d+)").expect("Invalid regex pattern")
});

/// Daemon output lines; the token is the one long number among them
static DAEMON_STDOUT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"daemon_stdout: (-?\d+)").expect("Invalid regex pattern"));

/// Daemon lines also echo ports, which never exceed this many digits
const MIN_TOKEN_DIGITS: usize = 7;

/// Values needed to talk to a running Sonic Pi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionParams {
    /// Auth token sent as the first argument of every GUI command
    pub token: i32,

    /// Port for `/run-code` and `/stop-all-jobs`
    pub gui_port: u16,

    /// Port for OSC cues
    pub osc_port: u16,
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "token={} gui_port={} osc_port={}",
            self.token, self.gui_port, self.osc_port
        )
    }
}

/// Read the log at `path` and extract connection parameters
pub async fn discover(path: &Path) -> Result<ConnectionParams> {
    let content = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MusicboxError::Discovery(DiscoveryError::LogNotFound {
                path: path.display().to_string(),
            }));
        }
        Err(e) => return Err(e.into()),
    };

    let params = parse_connection_params(&content)?;
    tracing::debug!("Discovered Sonic Pi connection from {}: {}", path.display(), params);
    Ok(params)
}

/// Extract connection parameters from raw log content
///
/// Every value is taken from its most recent occurrence, so a log that spans
/// several Sonic Pi restarts yields the values of the latest boot.
pub fn parse_connection_params(content: &[u8]) -> Result<ConnectionParams> {
    let gui_port = last_capture(&SPIDER_PORT_REGEX, content);
    let osc_port = last_capture(&TAU_PORT_REGEX, content);
    let token = DAEMON_STDOUT_REGEX
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_bytes())
        .filter(|digits| digits.iter().filter(|b| b.is_ascii_digit()).count() >= MIN_TOKEN_DIGITS)
        .last();

    let mut missing = Vec::new();
    if token.is_none() {
        missing.push("token");
    }
    if gui_port.is_none() {
        missing.push("gui port");
    }
    if osc_port.is_none() {
        missing.push("osc port");
    }

    match (token, gui_port, osc_port) {
        (Some(token), Some(gui_port), Some(osc_port)) => Ok(ConnectionParams {
            token: parse_number("token", token)?,
            gui_port: parse_number("gui port", gui_port)?,
            osc_port: parse_number("osc port", osc_port)?,
        }),
        _ => Err(MusicboxError::Discovery(DiscoveryError::TokensNotFound {
            missing,
        })),
    }
}

fn last_capture<'a>(regex: &Regex, content: &'a [u8]) -> Option<&'a [u8]> {
    regex
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .last()
        .map(|m| m.as_bytes())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &[u8]) -> Result<T> {
    // Captures only ever hold ASCII digits and an optional sign
    let text = String::from_utf8_lossy(raw);
    text.parse().map_err(|_| {
        MusicboxError::Discovery(DiscoveryError::InvalidToken {
            name,
            value: text.into_owned(),
        })
    })
}
