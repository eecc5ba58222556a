//! Musicbox MCP Server Library
//!
//! A Model Context Protocol (MCP) server for Sonic Pi.
//! Provides tools for starting Sonic Pi, playing and stopping code, and
//! tuning live-mix parameters over Sonic Pi's OSC control protocol.

pub mod config;
pub mod error;
pub mod mcp;
pub mod sonic_pi;

pub use config::Config;
pub use error::{MusicboxError, Result};
