//! MCP prompt definitions
//!
//! A single prompt that teaches the agent how to drive Sonic Pi through the
//! tools in this server.

use crate::error::{McpError, MusicboxError, Result};
use crate::mcp::types::{Content, GetPromptResult, Prompt, PromptMessage, Role};

pub const SYSTEM_PROMPT_NAME: &str = "system_prompt";

const SYSTEM_PROMPT_DESCRIPTION: &str = "How to make music with Sonic Pi through this server";

/// Live-mix parameters the bundled Sonic Pi mix template reads via `get`
pub const LIVE_MIX_PARAMETERS: &[&str] = &[
    "reverb_on",
    "reverb_mix",
    "reverb_room",
    "reverb_damp",
    "delay_on",
    "delay_phase",
    "delay_decay",
    "delay_mix",
    "lpf_on",
    "lpf_cutoff",
    "hpf_on",
    "hpf_cutoff",
    "distortion_on",
    "distortion_amount",
    "distortion_mix",
    "bitcrusher_on",
    "bitcrusher_bits",
    "bitcrusher_rate",
    "flanger_on",
    "flanger_depth",
    "flanger_rate",
    "wobble_on",
    "wobble_rate",
    "wobble_cutoff_min",
    "wobble_cutoff_max",
    "compressor_on",
    "compressor_threshold",
    "compressor_ratio",
];

/// All prompts this server offers
pub fn list_prompts() -> Vec<Prompt> {
    vec![Prompt {
        name: SYSTEM_PROMPT_NAME.to_string(),
        description: Some(SYSTEM_PROMPT_DESCRIPTION.to_string()),
    }]
}

/// Render a prompt by name
pub fn get_prompt(name: &str) -> Result<GetPromptResult> {
    match name {
        SYSTEM_PROMPT_NAME => Ok(GetPromptResult {
            description: Some(SYSTEM_PROMPT_DESCRIPTION.to_string()),
            messages: vec![PromptMessage {
                role: Role::User,
                content: Content::text(system_prompt()),
            }],
        }),
        _ => Err(MusicboxError::Mcp(McpError::UnknownPrompt {
            name: name.to_string(),
        })),
    }
}

fn system_prompt() -> String {
    format!(
        r#"You are a Sonic Pi assistant that helps create music with code.

IMPORTANT WORKFLOW:
1. On FIRST connection: call initialize_sonic_pi to start Sonic Pi and connect
2. After a chat disconnect: call reconnect_sonic_pi to reconnect WITHOUT disrupting the music
3. Use play_music to run Sonic Pi code
4. Use stop_music to stop all sounds
5. Use change_mix to change live mix parameters
6. Use read_shared_state to see the current mix, debug_sonic_pi_connection when something fails

LIVE MIX PARAMETERS:
Call change_mix with a flat object of numbers or booleans, for example:
{{"parameters": {{"reverb_on": true, "reverb_mix": 0.8}}}}

Available parameters: {}

CHORD REFERENCE:
chord(:C, :major), chord(:C, :m), chord(:C, '7'), chord(:C, :maj7), etc.

COMMON PATTERNS:
- live_loop for repeating patterns
- use_bpm to set tempo
- sleep for timing
- play for notes, play_chord for chords
- sample for drum sounds
- get[:name] inside a live_loop to read a live mix parameter"#,
        LIVE_MIX_PARAMETERS.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_parameters() {
        let result = get_prompt(SYSTEM_PROMPT_NAME).unwrap();
        assert_eq!(result.messages.len(), 1);
        let Content::Text { text } = &result.messages[0].content;
        assert!(text.contains("compressor_ratio"));
        assert!(text.contains("{\"parameters\""));
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(matches!(
            get_prompt("nope"),
            Err(MusicboxError::Mcp(McpError::UnknownPrompt { .. }))
        ));
    }
}
