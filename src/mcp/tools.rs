//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::McpError;
use crate::mcp::types::{CallToolResult, Tool};
use crate::sonic_pi::session::{Session, StopOutcome};

/// Tool handler
pub struct ToolHandler {
    session: Arc<Session>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                "initialize_sonic_pi",
                "Starts Sonic Pi if needed and connects to it. Only call this if Sonic Pi is not running; use reconnect_sonic_pi to reconnect",
                empty_schema(),
            ),
            tool_def(
                "reconnect_sonic_pi",
                "Reconnects to a running Sonic Pi without starting or stopping it",
                empty_schema(),
            ),
            tool_def("play_music", "Runs Sonic Pi code", play_music_schema()),
            tool_def("stop_music", "Stops all currently playing Sonic Pi music", empty_schema()),
            tool_def(
                "change_mix",
                "Sends live mix parameters to Sonic Pi and records them in the shared state",
                change_mix_schema(),
            ),
            tool_def(
                "read_shared_state",
                "Reads the current live mix parameters from the shared state",
                empty_schema(),
            ),
            tool_def(
                "debug_sonic_pi_connection",
                "Reports Sonic Pi connection parameters and state",
                empty_schema(),
            ),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        tracing::debug!("Calling tool {}", name);
        match name {
            "initialize_sonic_pi" => self.handle_initialize().await,
            "reconnect_sonic_pi" => self.handle_reconnect().await,
            "play_music" => self.handle_play_music(args).await,
            "stop_music" => self.handle_stop_music().await,
            "change_mix" => self.handle_change_mix(args).await,
            "read_shared_state" => self.handle_read_shared_state().await,
            "debug_sonic_pi_connection" => self.handle_debug().await,
            _ => CallToolResult::error(McpError::UnknownTool {
                name: name.to_string(),
            }
            .to_string()),
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_initialize(&self) -> CallToolResult {
        match self.session.initialize().await {
            Ok(params) => CallToolResult::text(format!(
                "Connected to Sonic Pi at {}:{}. Sonic Pi is ready for music!",
                self.session.client().host(),
                params.gui_port
            )),
            Err(e) => CallToolResult::error(format!("{}. Try restarting Sonic Pi.", e)),
        }
    }

    async fn handle_reconnect(&self) -> CallToolResult {
        match self.session.reconnect().await {
            Ok(params) => CallToolResult::text(format!(
                "Reconnected to Sonic Pi at {}:{}",
                self.session.client().host(),
                params.gui_port
            )),
            Err(e) => CallToolResult::error(format!(
                "{}. Use initialize_sonic_pi if Sonic Pi is not running.",
                e
            )),
        }
    }

    async fn handle_play_music(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            code: String,
        }

        let args: Args = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };

        match self.session.play(&args.code).await {
            Ok(()) => CallToolResult::text(
                "Music code sent. Check Sonic Pi if you don't hear anything.",
            ),
            Err(e) => CallToolResult::error(format!("{}. Try calling reconnect_sonic_pi.", e)),
        }
    }

    async fn handle_stop_music(&self) -> CallToolResult {
        match self.session.stop().await {
            Ok(StopOutcome::Stopped) => CallToolResult::text("All music stopped"),
            Ok(StopOutcome::NotRunning) => {
                CallToolResult::text("Sonic Pi not running (music already stopped)")
            }
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_change_mix(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            parameters: Value,
        }

        let args: Args = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };

        let parameters = match normalize_parameters(args.parameters) {
            Ok(p) => p,
            Err(message) => {
                return CallToolResult::error(
                    McpError::InvalidArguments { message }.to_string(),
                )
            }
        };

        match self.session.change_mix(&parameters).await {
            Ok(applied) => {
                let summary = applied
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                CallToolResult::text(format!("Updated and sent to Sonic Pi: {}", summary))
            }
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_read_shared_state(&self) -> CallToolResult {
        let state = match self.session.read_state().await {
            Ok(s) => s,
            Err(e) => return CallToolResult::error(e.to_string()),
        };

        match serde_json::to_string_pretty(&state) {
            Ok(text) => CallToolResult::text(text),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_debug(&self) -> CallToolResult {
        CallToolResult::text(self.session.diagnostics().await.to_string())
    }
}

// ==================== Helpers ====================

fn tool_def(name: &str, description: &str, schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: schema,
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, CallToolResult> {
    // Clients may omit arguments entirely for tools that take none
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        CallToolResult::error(
            McpError::InvalidArguments {
                message: e.to_string(),
            }
            .to_string(),
        )
    })
}

/// Accept the parameters either as an object or as a JSON-encoded object
fn normalize_parameters(value: Value) -> std::result::Result<Map<String, Value>, String> {
    let value = match value {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| format!("parameters is not valid JSON: {}", e))?,
        other => other,
    };

    match value {
        Value::Object(map) if map.is_empty() => Err("parameters must not be empty".to_string()),
        Value::Object(map) => Ok(map),
        _ => Err("parameters must be an object".to_string()),
    }
}

// ==================== Schemas ====================

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn play_music_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": {
                "type": "string",
                "description": "Sonic Pi Ruby code"
            }
        },
        "required": ["code"]
    })
}

fn change_mix_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "parameters": {
                "type": "object",
                "description": "Parameters to update, e.g. {\"reverb_mix\": 0.8, \"hpf_cutoff\": 50}",
                "additionalProperties": {"type": ["number", "boolean"]}
            }
        },
        "required": ["parameters"]
    })
}
