//!
//! OpenAI to Anthropic format converter for non-streaming responses.
//!
//! Converts a completed OpenAI Responses API payload into an Anthropic
//! Messages API response: output items become content blocks, citations are
//! recovered from `url_citation` annotations, web-search calls become a
//! `server_tool_use`/`web_search_tool_result` pair, and usage is normalized
//! into Anthropic's four-field shape. The stop-reason derivation and usage
//! normalization here are shared with the streaming translator so both
//! response shapes agree.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Value, json};

use crate::error::Result;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Converts completed OpenAI Responses API payloads into Anthropic Messages
/// API responses.
pub struct OpenAiToAnthropicConverter;

/* --- start of code -------------------------------------------------------------------------- */

impl OpenAiToAnthropicConverter {
    pub fn new() -> Self {
        Self
    }

    /// Maps a completed (non-streaming) OpenAI response into an Anthropic
    /// message JSON body.
    pub fn map_response(&self, response: &Value) -> Result<Value> {
        map_openai_response_to_anthropic(response)
    }
}

impl Default for OpenAiToAnthropicConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a completed OpenAI Responses API payload into an Anthropic message.
pub fn map_openai_response_to_anthropic(response: &Value) -> Result<Value> {
    let mut content = Vec::new();
    let mut saw_tool_call = false;

    let output_items = response.get("output").and_then(|v| v.as_array()).cloned().unwrap_or_default();

    for item in &output_items {
        let item_type = item.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match item_type {
            "message" => {
                content.extend(text_blocks_from_message_item(item));
            }
            "function_call" => {
                saw_tool_call = true;
                let id = item
                    .get("call_id")
                    .or_else(|| item.get("id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let name = item.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let input = item
                    .get("arguments")
                    .and_then(|v| v.as_str())
                    .and_then(|s| serde_json::from_str::<Value>(s).ok())
                    .unwrap_or_else(|| json!({}));
                content.push(json!({"type": "tool_use", "id": id, "name": name, "input": input}));
            }
            "web_search_call" => {
                let (use_block, result_block) = web_search_blocks_from_item(item);
                content.push(use_block);
                content.push(result_block);
            }
            _ => {}
        }
    }

    let mut stop_reason = derive_stop_reason(response);
    if stop_reason == "end_turn" && saw_tool_call {
        stop_reason = "tool_use".to_string();
    }

    let usage = normalize_openai_usage(response.get("usage").unwrap_or(&Value::Null));

    Ok(json!({
        "id": response.get("id").and_then(|v| v.as_str()).unwrap_or("msg_unknown"),
        "type": "message",
        "role": "assistant",
        "model": response.get("model"),
        "content": content,
        "stop_reason": stop_reason,
        "stop_sequence": Value::Null,
        "usage": usage,
    }))
}

fn text_blocks_from_message_item(item: &Value) -> Vec<Value> {
    let mut blocks = Vec::new();
    let Some(spans) = item.get("content").and_then(|v| v.as_array()) else {
        return blocks;
    };

    for span in spans {
        if span.get("type").and_then(|v| v.as_str()) != Some("output_text") {
            continue;
        }
        let text = span.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let citations = citations_from_annotations(span, &text);
        let mut block = serde_json::Map::new();
        block.insert("type".to_string(), json!("text"));
        block.insert("text".to_string(), json!(text));
        if !citations.is_empty() {
            block.insert("citations".to_string(), json!(citations));
        }
        blocks.push(Value::Object(block));
    }
    blocks
}

fn citations_from_annotations(span: &Value, text: &str) -> Vec<Value> {
    let Some(annotations) = span.get("annotations").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    annotations
        .iter()
        .filter(|a| a.get("type").and_then(|v| v.as_str()) == Some("url_citation"))
        .filter_map(|a| {
            let url = a.get("url").and_then(|v| v.as_str())?.to_string();
            let title = a.get("title").and_then(|v| v.as_str()).map(|s| s.to_string());
            let start = a.get("start_index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let end = a.get("end_index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let cited_text = slice_text(text, start, end);
            Some(json!({
                "type": "web_search_result_location",
                "url": url,
                "title": title,
                "cited_text": cited_text,
            }))
        })
        .collect()
}

fn slice_text(text: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = start.min(chars.len());
    let end = end.min(chars.len()).max(start);
    chars[start..end].iter().collect()
}

fn web_search_blocks_from_item(item: &Value) -> (Value, Value) {
    let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let action = item.get("action").cloned().unwrap_or_else(|| json!({}));
    let query = action
        .get("query")
        .and_then(|v| v.as_str())
        .or_else(|| action.get("queries").and_then(|v| v.as_array()).and_then(|a| a.first()).and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string();

    let sources = action.get("sources").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let results: Vec<Value> = sources
        .iter()
        .filter_map(|source| {
            let url = source.get("url").and_then(|v| v.as_str())?.to_string();
            Some(json!({
                "type": "web_search_result",
                "url": url,
                "title": source.get("title"),
                "page_age": source.get("page_age"),
            }))
        })
        .collect();

    let use_block = json!({"type": "server_tool_use", "id": id, "name": "web_search", "input": {"query": query}});
    let result_block = json!({"type": "web_search_tool_result", "tool_use_id": id, "content": results});
    (use_block, result_block)
}

/// Derives the Anthropic `stop_reason` from a completed OpenAI response.
///
/// `status == "incomplete"` with a `max_output_tokens` reason maps to
/// `max_tokens`; with a `content_filter` reason maps to `refusal`; anything
/// else defaults to `end_turn`. Tool-call escalation (`end_turn` ->
/// `tool_use`) is applied by the caller, since it depends on whether any
/// tool block was actually emitted.
pub fn derive_stop_reason(response: &Value) -> String {
    let status = response.get("status").and_then(|v| v.as_str()).unwrap_or("completed");
    if status == "incomplete" {
        let reason = response
            .get("incomplete_details")
            .and_then(|d| d.get("reason"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        return match reason {
            "max_output_tokens" => "max_tokens".to_string(),
            "content_filter" => "refusal".to_string(),
            _ => "end_turn".to_string(),
        };
    }
    "end_turn".to_string()
}

/// Normalizes an OpenAI-shaped usage object into Anthropic's four-field
/// usage: `{cache_creation_input_tokens, cache_read_input_tokens,
/// input_tokens, output_tokens}`, all integers, all always present.
///
/// Accepts either the Responses API's `input_tokens`/`output_tokens`/
/// `input_tokens_details.cached_tokens` naming or the chat-completions
/// `prompt_tokens`/`completion_tokens`/`prompt_tokens_details.cached_tokens`
/// naming.
pub fn normalize_openai_usage(usage: &Value) -> Value {
    let total_input = usage
        .get("input_tokens")
        .or_else(|| usage.get("prompt_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let output_tokens = usage
        .get("output_tokens")
        .or_else(|| usage.get("completion_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let cached = usage
        .get("input_tokens_details")
        .or_else(|| usage.get("prompt_tokens_details"))
        .and_then(|d| d.get("cached_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    let input_tokens = total_input.saturating_sub(cached);

    json!({
        "cache_creation_input_tokens": 0,
        "cache_read_input_tokens": cached,
        "input_tokens": input_tokens,
        "output_tokens": output_tokens,
    })
}
