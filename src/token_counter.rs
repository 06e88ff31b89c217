//!
//! OpenAI chat-completions token counting.
//!
//! Implements the same accounting formula OpenAI's own cookbook uses for
//! `gpt-3.5`/`gpt-4`/`gpt-4o` family chat models, applied to the flattened
//! message+tool view of an outgoing Responses API request. This is what
//! `/v1/messages/count_tokens` reports, and it is also used as a sanity
//! cross-check against upstream-reported usage in integration tests.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashSet;
use std::sync::OnceLock;

use serde_json::Value;
use tiktoken_rs::CoreBPE;

/* --- types ----------------------------------------------------------------------------------- */

/// One flattened chat message, as the counting formula consumes it.
#[derive(Debug, Clone)]
pub struct CountableMessage {
    pub role: String,
    pub content: Option<String>,
    pub name: Option<String>,
}

/// One tool definition, as the counting formula consumes it.
#[derive(Debug, Clone)]
pub struct CountableTool {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

/* --- constants ------------------------------------------------------------------------------ */

/// Model used when the caller's model isn't on the known-chat-model
/// allowlist; counting recurses onto this model's accounting constants.
pub const CHAT_FALLBACK_MODEL: &str = "gpt-4o-mini-2024-07-18";

fn known_chat_models() -> &'static HashSet<&'static str> {
    static MODELS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    MODELS.get_or_init(|| {
        [
            "gpt-3.5-turbo-0125",
            "gpt-3.5-turbo-0613",
            "gpt-4-0613",
            "gpt-4-32k-0613",
            "gpt-4o",
            "gpt-4o-2024-08-06",
            "gpt-4o-mini",
            "gpt-4o-mini-2024-07-18",
        ]
        .into_iter()
        .collect()
    })
}

/// Every known chat model in this implementation uses the same per-tool
/// overhead; kept as a lookup (not a bare constant) to mirror the
/// per-model table the formula is specified against.
const TOOL_OVERHEAD: usize = 4;

/* --- start of code -------------------------------------------------------------------------- */

fn encoding_for(model: &str) -> CoreBPE {
    tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| tiktoken_rs::get_bpe_from_model(CHAT_FALLBACK_MODEL))
        .unwrap_or_else(|_| tiktoken_rs::cl100k_base().expect("cl100k_base encoding must load"))
}

fn token_len(encoding: &CoreBPE, text: &str) -> usize {
    encoding.encode_with_special_tokens(text).len()
}

/// Counts tokens for a sequence of chat messages using the tokens-per-message
/// / tokens-per-name accounting formula, recursing onto [`CHAT_FALLBACK_MODEL`]
/// for any model not on the known-chat-model allowlist.
pub fn count_message_tokens(messages: &[CountableMessage], model: &str) -> usize {
    if !known_chat_models().contains(model) {
        return count_message_tokens(messages, CHAT_FALLBACK_MODEL);
    }

    let encoding = encoding_for(model);
    let tokens_per_message = 3usize;
    let tokens_per_name = 1usize;

    let mut total = 0usize;
    for message in messages {
        total += tokens_per_message;
        total += token_len(&encoding, &message.role);
        if let Some(content) = &message.content {
            total += token_len(&encoding, content);
        }
        if let Some(name) = &message.name {
            total += token_len(&encoding, name);
            total += tokens_per_name;
        }
    }
    total + 3
}

/// Counts tokens for a sequence of tool definitions, adding the per-model
/// tool overhead plus the encoded length of the name/description/compact
/// JSON-encoded parameters schema for each one.
pub fn count_tool_tokens(tools: &[CountableTool], model: &str) -> usize {
    let resolved_model = if known_chat_models().contains(model) { model } else { CHAT_FALLBACK_MODEL };
    let encoding = encoding_for(resolved_model);

    tools
        .iter()
        .map(|tool| {
            let mut total = TOOL_OVERHEAD;
            total += token_len(&encoding, &tool.name);
            if let Some(description) = &tool.description {
                total += token_len(&encoding, description);
            }
            let compact = serde_json::to_string(&tool.parameters).unwrap_or_default();
            total += token_len(&encoding, &compact);
            total
        })
        .sum()
}

/// Flattens an outgoing OpenAI Responses request (`instructions` + `input`
/// items + `tools`) into countable messages/tools and sums
/// [`count_message_tokens`] and [`count_tool_tokens`].
pub fn count_openai_request_tokens(payload: &Value) -> usize {
    let model = payload.get("model").and_then(|v| v.as_str()).unwrap_or(CHAT_FALLBACK_MODEL);

    let mut messages = Vec::new();
    if let Some(instructions) = payload.get("instructions").and_then(|v| v.as_str()) {
        if !instructions.is_empty() {
            messages.push(CountableMessage {
                role: "system".to_string(),
                content: Some(instructions.to_string()),
                name: None,
            });
        }
    }

    if let Some(items) = payload.get("input").and_then(|v| v.as_array()) {
        for item in items {
            messages.push(flatten_input_item(item));
        }
    }

    let tools: Vec<CountableTool> = payload
        .get("tools")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(tool_from_value).collect())
        .unwrap_or_default();

    count_message_tokens(&messages, model) + count_tool_tokens(&tools, model)
}

fn flatten_input_item(item: &Value) -> CountableMessage {
    let item_type = item.get("type").and_then(|v| v.as_str()).unwrap_or("message");
    match item_type {
        "function_call" => CountableMessage {
            role: "assistant".to_string(),
            content: item.get("arguments").and_then(|v| v.as_str()).map(|s| s.to_string()),
            name: item.get("name").and_then(|v| v.as_str()).map(|s| s.to_string()),
        },
        "function_call_output" => CountableMessage {
            role: "tool".to_string(),
            content: item.get("output").and_then(|v| v.as_str()).map(|s| s.to_string()),
            name: None,
        },
        _ => {
            let role = item.get("role").and_then(|v| v.as_str()).unwrap_or("user").to_string();
            let text = item
                .get("content")
                .and_then(|v| v.as_array())
                .map(|spans| {
                    spans
                        .iter()
                        .filter_map(|span| span.get("text").and_then(|t| t.as_str()))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .filter(|s| !s.is_empty());
            CountableMessage { role, content: text, name: None }
        }
    }
}

fn tool_from_value(value: &Value) -> Option<CountableTool> {
    if value.get("type").and_then(|v| v.as_str()) != Some("function") {
        return None;
    }
    Some(CountableTool {
        name: value.get("name")?.as_str()?.to_string(),
        description: value.get("description").and_then(|v| v.as_str()).map(|s| s.to_string()),
        parameters: value.get("parameters").cloned().unwrap_or_else(|| serde_json::json!({})),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_a_single_user_message() {
        let messages = vec![CountableMessage {
            role: "user".to_string(),
            content: Some("hello".to_string()),
            name: None,
        }];
        let total = count_message_tokens(&messages, CHAT_FALLBACK_MODEL);
        assert!(total > 3, "expected overhead plus content tokens, got {total}");
    }

    #[test]
    fn unknown_model_recurses_to_fallback() {
        let messages = vec![CountableMessage { role: "user".to_string(), content: None, name: None }];
        assert_eq!(
            count_message_tokens(&messages, "not-a-real-model"),
            count_message_tokens(&messages, CHAT_FALLBACK_MODEL)
        );
    }

    #[test]
    fn request_with_instructions_and_tool_counts_more_than_bare_message() {
        let bare = json!({
            "model": "gpt-4o-mini-2024-07-18",
            "input": [{"type": "message", "role": "user", "content": [{"type":"input_text","text":"hi"}]}],
        });
        let with_extras = json!({
            "model": "gpt-4o-mini-2024-07-18",
            "instructions": "Be terse.",
            "input": [{"type": "message", "role": "user", "content": [{"type":"input_text","text":"hi"}]}],
            "tools": [{"type": "function", "name": "lookup", "description": "look things up", "parameters": {"type": "object", "properties": {}}}],
        });
        assert!(count_openai_request_tokens(&with_extras) > count_openai_request_tokens(&bare));
    }
}
