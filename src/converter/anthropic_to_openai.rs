//!
//! Anthropic to OpenAI format converter for API request translation.
//!
//! Converts an incoming Anthropic Messages API request into an OpenAI
//! Responses API payload: resolves the model name, flattens `system` into
//! `instructions`, walks the message list building `input` items (preserving
//! the assistant role rather than remapping it to `developer`), and maps
//! tool definitions and `tool_choice`.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Value, json};

use crate::error::{ProxyError, Result};
use crate::model_resolver::{ModelMap, resolve_openai_model};
use crate::types::{
    AnthropicContentBlock, AnthropicMessage, AnthropicRole, AnthropicTool, AnthropicToolChoice,
    MessageContent, MessagesRequest, OpenAiContentSpan, OpenAiInputItem, OpenAiTool, SystemPrompt,
    ToolResultContent,
};

/* --- constants ------------------------------------------------------------------------------ */

/// `max_tokens` values below this are dropped rather than forwarded, since
/// the upstream treats very small budgets as effectively unusable.
const MIN_MAX_OUTPUT_TOKENS: u32 = 16;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Converts Anthropic Messages API requests into OpenAI Responses API
/// payloads.
///
/// Stateless aside from the model map/default model it is constructed with;
/// safe to share across requests.
pub struct AnthropicToOpenAiConverter<'a> {
    model_map: &'a ModelMap,
    default_model: &'a str,
}

/// One pending run of consecutive text blocks, flushed into a single
/// `message` input item once a non-text block is encountered.
#[derive(Default)]
struct PendingText {
    role: &'static str,
    parts: Vec<String>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl<'a> AnthropicToOpenAiConverter<'a> {
    pub fn new(model_map: &'a ModelMap, default_model: &'a str) -> Self {
        Self { model_map, default_model }
    }

    /// Converts a full request, returning the JSON payload to POST to the
    /// upstream Responses endpoint (without `stream`, which callers set
    /// based on which handler is serving the request).
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidRequest` if the system prompt contains a
    /// non-text content block, or any message content block has an
    /// unsupported shape.
    pub fn convert(&self, request: &MessagesRequest) -> Result<Value> {
        let openai_model = resolve_openai_model(self.model_map, &request.model, self.default_model);

        let mut payload = serde_json::Map::new();
        payload.insert("model".to_string(), json!(openai_model));

        if let Some(system) = &request.system {
            let instructions = system_to_instructions(system)?;
            payload.insert("instructions".to_string(), json!(instructions));
        }

        let input = self.map_messages(&request.messages)?;
        payload.insert("input".to_string(), serde_json::to_value(&input)?);

        if let Some(tools) = &request.tools {
            let (openai_tools, extra) = map_tools(tools);
            if !openai_tools.is_empty() {
                payload.insert("tools".to_string(), serde_json::to_value(&openai_tools)?);
            }
            for (key, value) in extra {
                payload.insert(key, value);
            }
        }

        if let Some(tool_choice) = &request.tool_choice {
            payload.insert("tool_choice".to_string(), map_tool_choice(tool_choice));
        }

        if let Some(max_tokens) = request.max_tokens {
            if max_tokens >= MIN_MAX_OUTPUT_TOKENS {
                payload.insert("max_output_tokens".to_string(), json!(max_tokens));
            }
        }

        Ok(Value::Object(payload))
    }

    fn map_messages(&self, messages: &[AnthropicMessage]) -> Result<Vec<OpenAiInputItem>> {
        let mut items = Vec::new();
        let mut pending = PendingText::default();

        for message in messages {
            let role = match message.role {
                AnthropicRole::User => "user",
                AnthropicRole::Assistant => "assistant",
            };

            let blocks = match &message.content {
                MessageContent::Text(text) => vec![AnthropicContentBlock::Text { text: text.clone(), citations: None }],
                MessageContent::Blocks(blocks) => blocks.clone(),
            };

            for block in blocks {
                match block {
                    AnthropicContentBlock::Text { text, .. } => {
                        if pending.role != role_static(role) {
                            flush_pending(&mut items, &mut pending);
                            pending.role = role_static(role);
                        }
                        pending.parts.push(text);
                    }
                    AnthropicContentBlock::ToolUse { id, name, input } => {
                        flush_pending(&mut items, &mut pending);
                        items.push(OpenAiInputItem::FunctionCall {
                            call_id: id,
                            name,
                            arguments: serde_json::to_string(&input)?,
                        });
                    }
                    AnthropicContentBlock::ToolResult { tool_use_id, content, .. } => {
                        flush_pending(&mut items, &mut pending);
                        items.push(OpenAiInputItem::FunctionCallOutput {
                            call_id: tool_use_id,
                            output: tool_result_to_output(content.as_ref())?,
                        });
                    }
                    AnthropicContentBlock::ServerToolUse { .. }
                    | AnthropicContentBlock::WebSearchToolResult { .. } => {
                        return Err(ProxyError::InvalidRequest(
                            "server_tool_use/web_search_tool_result blocks are not valid in request messages"
                                .to_string(),
                        ));
                    }
                }
            }
        }
        flush_pending(&mut items, &mut pending);

        Ok(items)
    }
}

fn role_static(role: &str) -> &'static str {
    match role {
        "user" => "user",
        "assistant" => "assistant",
        _ => "user",
    }
}

/// Rewritten to `output_text` for assistant spans by the OAuth transport
/// layer; every span leaves this mapper as `input_text`.
fn flush_pending(items: &mut Vec<OpenAiInputItem>, pending: &mut PendingText) {
    if pending.parts.is_empty() {
        return;
    }
    let text = pending.parts.join("\n");
    items.push(OpenAiInputItem::Message {
        role: pending.role.to_string(),
        content: vec![OpenAiContentSpan::InputText { text }],
    });
    pending.parts.clear();
}

/// Flattens `system` into a plain instructions string, per the spec: a
/// string passes through verbatim, a sequence of text blocks is newline
/// joined, and any non-text block is a client error.
fn system_to_instructions(system: &SystemPrompt) -> Result<String> {
    match system {
        SystemPrompt::Text(text) => Ok(text.clone()),
        SystemPrompt::Blocks(blocks) => {
            let mut parts = Vec::with_capacity(blocks.len());
            for block in blocks {
                match block {
                    AnthropicContentBlock::Text { text, .. } => parts.push(text.clone()),
                    _ => {
                        return Err(ProxyError::InvalidRequest(
                            "system prompt blocks must all be type 'text'".to_string(),
                        ));
                    }
                }
            }
            Ok(parts.join("\n"))
        }
    }
}

/// Renders a `tool_result` block's content into the plain string
/// `function_call_output.output` expects: the string form passes through,
/// a JSON object/array is JSON-encoded, and a sequence of text blocks is
/// newline-joined (non-text items in the sequence are skipped, matching the
/// original's tolerant rendering of mixed tool-result content).
fn tool_result_to_output(content: Option<&ToolResultContent>) -> Result<String> {
    match content {
        None => Ok(String::new()),
        Some(ToolResultContent::Text(text)) => Ok(text.clone()),
        Some(ToolResultContent::Json(value)) => Ok(serde_json::to_string(value)?),
        Some(ToolResultContent::Blocks(blocks)) => {
            use crate::types::ToolResultBlockItem;
            let parts: Vec<String> = blocks
                .iter()
                .filter_map(|item| match item {
                    ToolResultBlockItem::Text { text } => Some(text.clone()),
                    ToolResultBlockItem::Other => None,
                })
                .collect();
            Ok(parts.join("\n"))
        }
    }
}

/// Splits Anthropic tool definitions into OpenAI `function` tools plus any
/// extra top-level payload fields web-search tools require
/// (`include`/`max_tool_calls`).
fn map_tools(tools: &[AnthropicTool]) -> (Vec<OpenAiTool>, Vec<(String, Value)>) {
    let mut openai_tools = Vec::new();
    let mut has_web_search = false;
    let mut sole_web_search_max_uses: Option<u32> = None;

    for tool in tools {
        if is_web_search_tool(tool) {
            has_web_search = true;
            if tools.len() == 1 {
                sole_web_search_max_uses = tool.max_uses;
            }
            let filters = tool
                .allowed_domains
                .as_ref()
                .map(|domains| json!({ "allowed_domains": domains }));
            openai_tools.push(OpenAiTool::WebSearch { filters, user_location: tool.user_location.clone() });
            continue;
        }

        let parameters = normalize_schema(tool.input_schema.as_ref().or(tool.parameters.as_ref()));
        openai_tools.push(OpenAiTool::Function {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
            strict: tool.strict,
        });
    }

    let mut extra = Vec::new();
    if has_web_search {
        extra.push((
            "include".to_string(),
            json!(["web_search_call.action.sources"]),
        ));
    }
    if let Some(max_uses) = sole_web_search_max_uses {
        extra.push(("max_tool_calls".to_string(), json!(max_uses)));
    }

    (openai_tools, extra)
}

fn is_web_search_tool(tool: &AnthropicTool) -> bool {
    let type_is_web_search = tool
        .kind
        .as_deref()
        .map(|k| k.starts_with("web_search_"))
        .unwrap_or(false);
    type_is_web_search || (tool.name == "web_search" && tool.input_schema.is_none() && tool.parameters.is_none())
}

fn normalize_schema(schema: Option<&Value>) -> Value {
    match schema {
        Some(value) if value.is_object() && !value.as_object().unwrap().is_empty() => value.clone(),
        _ => json!({"type": "object", "properties": {}}),
    }
}

fn map_tool_choice(tool_choice: &AnthropicToolChoice) -> Value {
    match tool_choice {
        AnthropicToolChoice::Mode { kind } if kind == "auto" || kind == "none" => json!(kind),
        AnthropicToolChoice::Mode { .. } => json!("auto"),
        AnthropicToolChoice::Named { name, .. } if name == "web_search" => {
            json!({"type": "web_search"})
        }
        AnthropicToolChoice::Named { name, .. } => {
            json!({"type": "function", "name": name})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnthropicMessage, AnthropicRole};

    fn converter<'a>(map: &'a ModelMap, default: &'a str) -> AnthropicToOpenAiConverter<'a> {
        AnthropicToOpenAiConverter::new(map, default)
    }

    #[test]
    fn preserves_assistant_role_rather_than_remapping_to_developer() {
        let map = ModelMap::default();
        let request = MessagesRequest {
            model: "claude-3-opus".to_string(),
            messages: vec![AnthropicMessage {
                role: AnthropicRole::Assistant,
                content: MessageContent::Text("hi".to_string()),
            }],
            system: None,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            stream: None,
        };
        let payload = converter(&map, "gpt-5.2").convert(&request).unwrap();
        let role = payload["input"][0]["role"].as_str().unwrap();
        assert_eq!(role, "assistant");
    }

    #[test]
    fn max_tokens_below_threshold_is_dropped() {
        let map = ModelMap::default();
        let request = MessagesRequest {
            model: "claude-3-opus".to_string(),
            messages: vec![],
            system: None,
            tools: None,
            tool_choice: None,
            max_tokens: Some(8),
            stream: None,
        };
        let payload = converter(&map, "gpt-5.2").convert(&request).unwrap();
        assert!(payload.get("max_output_tokens").is_none());
    }

    #[test]
    fn max_tokens_at_threshold_is_forwarded() {
        let map = ModelMap::default();
        let request = MessagesRequest {
            model: "claude-3-opus".to_string(),
            messages: vec![],
            system: None,
            tools: None,
            tool_choice: None,
            max_tokens: Some(16),
            stream: None,
        };
        let payload = converter(&map, "gpt-5.2").convert(&request).unwrap();
        assert_eq!(payload["max_output_tokens"], json!(16));
    }

    #[test]
    fn empty_tool_schema_normalizes_to_object_with_no_properties() {
        let tool = AnthropicTool {
            name: "lookup".to_string(),
            description: None,
            input_schema: None,
            parameters: None,
            strict: None,
            kind: None,
            max_uses: None,
            allowed_domains: None,
            user_location: None,
        };
        let (tools, _) = map_tools(&[tool]);
        let rendered = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(rendered["parameters"], json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn sole_web_search_tool_max_uses_becomes_max_tool_calls() {
        let tool = AnthropicTool {
            name: "web_search".to_string(),
            description: None,
            input_schema: None,
            parameters: None,
            strict: None,
            kind: Some("web_search_20250305".to_string()),
            max_uses: Some(3),
            allowed_domains: None,
            user_location: None,
        };
        let (tools, extra) = map_tools(&[tool]);
        let rendered = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(rendered["type"], json!("web_search"));
        let max_tool_calls = extra.iter().find(|(k, _)| k == "max_tool_calls").unwrap();
        assert_eq!(max_tool_calls.1, json!(3));
    }
}
