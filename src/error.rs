//! Error types for the Musicbox MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the Musicbox MCP Server
#[derive(Error, Debug)]
pub enum MusicboxError {
    /// Connection discovery errors
    #[error("Connection discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Sonic Pi application and OSC errors
    #[error("Sonic Pi error: {0}")]
    SonicPi(#[from] SonicPiError),

    /// Shared state file errors
    #[error("Shared state error: {0}")]
    State(#[from] StateError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OSC encoding errors
    #[error("OSC error: {0}")]
    Osc(#[from] rosc::OscError),
}

/// Errors raised while reading connection tokens from the Sonic Pi log
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Sonic Pi log file not found: {path}")]
    LogNotFound { path: String },

    #[error("Connection tokens not found in log (missing: {})", .missing.join(", "))]
    TokensNotFound { missing: Vec<&'static str> },

    #[error("Invalid {name} in log: {value}")]
    InvalidToken { name: &'static str, value: String },
}

/// Sonic Pi application and messaging errors
#[derive(Error, Debug)]
pub enum SonicPiError {
    #[error("Sonic Pi is not running")]
    NotRunning,

    #[error("Could not start Sonic Pi from {path}: {message}")]
    LaunchFailed { path: String, message: String },

    #[error("Sonic Pi started but did not become ready within {timeout_secs} seconds")]
    StartupTimeout { timeout_secs: u64 },

    #[error("Not connected to Sonic Pi")]
    NotConnected,

    #[error("Failed to send OSC message to {target}: {message}")]
    SendFailed { target: String, message: String },

    #[error("Applied {applied} of {total} parameters before failure: {message}")]
    PartialUpdate {
        applied: usize,
        total: usize,
        message: String,
    },
}

/// Shared parameter store errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read shared state {path}: {message}")]
    ReadFailed { path: String, message: String },

    #[error("Failed to write shared state {path}: {message}")]
    WriteFailed { path: String, message: String },

    #[error("Shared state {path} is not a flat JSON object")]
    Malformed { path: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown prompt: {name}")]
    UnknownPrompt { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for Musicbox operations
pub type Result<T> = std::result::Result<T, MusicboxError>;
