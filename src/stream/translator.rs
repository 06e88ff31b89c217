//!
//! OpenAI Responses API stream frames -> Anthropic Messages API SSE events.
//!
//! `translate_openai_event` is the step function: given the current
//! [`StreamState`] and one parsed upstream frame, it returns zero or more
//! `(event_name, json_value)` pairs to emit, in order, mutating the state in
//! place. The caller (the server's per-connection translation task) is
//! responsible for framing each pair as an SSE event and writing it to the
//! downstream client.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Value, json};

use crate::converter::openai_to_anthropic::{derive_stop_reason, normalize_openai_usage};

use super::harmony;
use super::state::{AddressingKey, BlockKind, StreamState};

/* --- types ----------------------------------------------------------------------------------- */

/// One Anthropic SSE frame to emit: event name plus its JSON payload.
pub type Emission = (&'static str, Value);

/* --- start of code -------------------------------------------------------------------------- */

/// Translates one upstream frame into zero or more outbound Anthropic SSE
/// frames, advancing `state`.
pub fn translate_openai_event(state: &mut StreamState, frame: &Value) -> Vec<Emission> {
    let frame_type = frame.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let mut out = Vec::new();

    if frame_type == "ping" {
        return out;
    }

    if !state.message_start_emitted {
        state.message_start_emitted = true;
        if let Some(usage) = frame.pointer("/response/usage") {
            state.usage = normalize_openai_usage(usage);
        }
        out.push(("message_start", message_start_envelope(state)));
    }

    match frame_type {
        "response.created" => handle_response_created(state, frame),
        "response.content_part.added" => {}
        "response.content_part.done" => handle_content_part_done(state, frame, &mut out),
        "response.output_text.delta" => handle_output_text_delta(state, frame, &mut out),
        "response.output_text.done" => handle_output_text_done(state, frame, &mut out),
        "response.reasoning_text.delta" | "response.reasoning_text.done" => {
            tracing::debug!(target: "anthromux::stream", frame = %frame_type, "upstream reasoning text");
        }
        "response.reasoning_summary_part.added"
        | "response.reasoning_summary_part.done"
        | "response.reasoning_summary_text.delta"
        | "response.reasoning_summary_text.done" => {
            tracing::debug!(target: "anthromux::stream", frame = %frame_type, "upstream reasoning summary");
        }
        "response.output_item.added" | "response.output_item.delta" | "response.output_item.done" => {
            handle_output_item(state, frame_type, frame, &mut out)
        }
        "response.function_call_arguments.delta" => {
            handle_function_call_arguments_delta(state, frame, &mut out)
        }
        "response.function_call_arguments.done" => {
            handle_function_call_arguments_done(state, frame, &mut out)
        }
        "response.completed" => handle_response_completed(state, frame, &mut out),
        _ => {}
    }

    out
}

fn message_start_envelope(state: &StreamState) -> Value {
    json!({
        "type": "message_start",
        "message": {
            "id": state.message_id,
            "type": "message",
            "role": "assistant",
            "model": state.model,
            "content": [],
            "stop_reason": Value::Null,
            "stop_sequence": Value::Null,
            "usage": state.usage,
        }
    })
}

fn handle_response_created(state: &mut StreamState, frame: &Value) {
    if let Some(usage) = frame.pointer("/response/usage") {
        state.usage = normalize_openai_usage(usage);
    }
}

/* --- addressing ------------------------------------------------------------------------------ */

fn field_i64(value: &Value, field: &str) -> Option<i64> {
    value.get(field).and_then(|v| v.as_i64())
}

/// Pulls `output_index`/`content_index` off the frame itself or whichever
/// nested object (`item`, `part`, `delta`) is present, per `spec.md` §4.3's
/// "Block-indexing rule".
fn addressing_key(frame: &Value, kind: BlockKind) -> AddressingKey {
    let mut output_index = field_i64(frame, "output_index");
    let mut content_index = field_i64(frame, "content_index");

    for nested_field in ["item", "part", "delta", "content"] {
        if let Some(nested) = frame.get(nested_field) {
            output_index = output_index.or_else(|| field_i64(nested, "output_index"));
            content_index = content_index.or_else(|| field_i64(nested, "content_index"));
        }
    }

    AddressingKey { output_index, content_index, kind }
}

fn call_id_of(frame: &Value) -> Option<String> {
    frame
        .get("call_id")
        .or_else(|| frame.get("item_id"))
        .or_else(|| frame.get("item").and_then(|i| i.get("call_id")))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/* --- text / harmony ---------------------------------------------------------------------------- */

fn handle_output_text_delta(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    let delta = frame.get("delta").and_then(|v| v.as_str()).unwrap_or("");
    let key = addressing_key(frame, BlockKind::Text);
    let hashable = StreamState::harmony_key(&key);

    let already_harmony = state.harmony_keys.contains(&hashable);
    let index = state.index_for(&key);
    let already_started_as_text = state.is_started(index) && !already_harmony;

    if !already_started_as_text && !already_harmony {
        let buffer = state.harmony_buffers.entry(hashable.clone()).or_default();
        buffer.push_str(delta);
        if harmony::contains_harmony_tag(buffer) {
            state.harmony_keys.insert(hashable.clone());
        }
    } else if already_harmony {
        state.harmony_buffers.entry(hashable.clone()).or_default().push_str(delta);
    }

    if state.harmony_keys.contains(&hashable) {
        emit_harmony_tool_calls(state, &hashable, out);
        return;
    }

    if delta.is_empty() {
        return;
    }

    if !state.is_started(index) {
        state.scratch_mut(index).started = true;
        out.push((
            "content_block_start",
            json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}}),
        ));
    }
    out.push((
        "content_block_delta",
        json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": delta}}),
    ));
}

fn handle_output_text_done(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    let key = addressing_key(frame, BlockKind::Text);
    let hashable = StreamState::harmony_key(&key);
    if state.harmony_keys.contains(&hashable) {
        return;
    }
    let index = state.index_for(&key);
    stop_block_if_open(state, index, out);
}

fn handle_content_part_done(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    let part_type = frame.pointer("/part/type").and_then(|v| v.as_str()).unwrap_or("output_text");
    if part_type != "output_text" {
        return;
    }
    handle_output_text_done(state, frame, out);
}

fn stop_block_if_open(state: &mut StreamState, index: usize, out: &mut Vec<Emission>) {
    if state.is_started(index) && !state.is_completed(index) {
        state.mark_completed(index);
        out.push(("content_block_stop", json!({"type": "content_block_stop", "index": index})));
    }
}

fn emit_harmony_tool_calls(
    state: &mut StreamState,
    hashable: &super::state::AddressingKeyHashable,
    out: &mut Vec<Emission>,
) {
    if state.saw_function_call {
        return;
    }
    let buffer = state.harmony_buffers.get(hashable).cloned().unwrap_or_default();
    let calls = harmony::extract_tool_calls(&buffer);
    let already = state.harmony_extracted.get(hashable).copied().unwrap_or(0);

    for call in calls.into_iter().skip(already) {
        let index = state.allocate_fresh_index();
        let id = format!("harmony_tool_{index}");
        state.saw_tool_call = true;
        out.push((
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": index,
                "content_block": {"type": "tool_use", "id": id, "name": call.name, "input": call.arguments},
            }),
        ));
        out.push(("content_block_stop", json!({"type": "content_block_stop", "index": index})));
        state.mark_completed(index);
    }

    let new_total = state.harmony_extracted.get(hashable).copied().unwrap_or(0)
        + out.iter().filter(|(name, _)| *name == "content_block_start").count();
    state.harmony_extracted.insert(hashable.clone(), new_total);
}

/* --- tool calls -------------------------------------------------------------------------------- */

fn bind_tool_block(state: &mut StreamState, frame: &Value) -> usize {
    let key = addressing_key(frame, BlockKind::ToolUse);
    match call_id_of(frame) {
        Some(call_id) if !call_id.is_empty() => {
            if let Some(&index) = state.call_id_to_index.get(&call_id) {
                index
            } else {
                let index = state.index_for(&key);
                state.call_id_to_index.insert(call_id, index);
                index
            }
        }
        _ => state.index_for(&key),
    }
}

fn merge_meta_once(scratch_id: &mut Option<String>, scratch_name: &mut Option<String>, frame: &Value) {
    if scratch_id.is_none() {
        if let Some(id) = frame
            .get("call_id")
            .or_else(|| frame.get("item").and_then(|i| i.get("call_id")))
            .or_else(|| frame.get("item").and_then(|i| i.get("id")))
            .and_then(|v| v.as_str())
        {
            if !id.is_empty() {
                *scratch_id = Some(id.to_string());
            }
        }
    }
    if scratch_name.is_none() {
        if let Some(name) = frame
            .get("name")
            .or_else(|| frame.get("item").and_then(|i| i.get("name")))
            .and_then(|v| v.as_str())
        {
            if !name.is_empty() {
                *scratch_name = Some(name.to_string());
            }
        }
    }
}

/// Emits `content_block_start{tool_use}` if both `id` and `name` are known
/// and the block hasn't started yet; flushes any buffered argument bytes as
/// one delta immediately after. Returns `true` if it started the block.
fn maybe_start_tool_block(state: &mut StreamState, index: usize, out: &mut Vec<Emission>) -> bool {
    if state.is_started(index) {
        return false;
    }
    let (id, name) = {
        let scratch = state.blocks.entry(index).or_default();
        (scratch.tool_id.clone(), scratch.tool_name.clone())
    };
    let (Some(id), Some(name)) = (id, name) else { return false };
    start_tool_block(state, index, id, name, out);
    true
}

fn force_start_tool_block(state: &mut StreamState, index: usize, out: &mut Vec<Emission>) {
    if state.is_started(index) {
        return;
    }
    let (id, name) = {
        let scratch = state.blocks.entry(index).or_default();
        let id = scratch.tool_id.clone().unwrap_or_else(|| format!("tool_call_{index}"));
        let name = scratch.tool_name.clone().unwrap_or_else(|| "unknown_tool".to_string());
        (id, name)
    };
    start_tool_block(state, index, id, name, out);
}

fn start_tool_block(state: &mut StreamState, index: usize, id: String, name: String, out: &mut Vec<Emission>) {
    state.saw_tool_call = true;
    out.push((
        "content_block_start",
        json!({
            "type": "content_block_start",
            "index": index,
            "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}},
        }),
    ));
    let scratch = state.blocks.entry(index).or_default();
    scratch.started = true;
    let unflushed = scratch.arg_buffer[scratch.arg_flushed_len..].to_string();
    if !unflushed.is_empty() {
        scratch.arg_flushed_len = scratch.arg_buffer.len();
        out.push((
            "content_block_delta",
            json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": unflushed}}),
        ));
    }
}

fn append_arguments_delta(state: &mut StreamState, index: usize, delta: &str, out: &mut Vec<Emission>) {
    if delta.is_empty() {
        return;
    }
    let scratch = state.blocks.entry(index).or_default();
    scratch.arg_buffer.push_str(delta);
    if !scratch.started {
        return;
    }
    let unflushed = scratch.arg_buffer[scratch.arg_flushed_len..].to_string();
    scratch.arg_flushed_len = scratch.arg_buffer.len();
    out.push((
        "content_block_delta",
        json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": unflushed}}),
    ));
}

fn handle_output_item(state: &mut StreamState, frame_type: &str, frame: &Value, out: &mut Vec<Emission>) {
    let item_type = frame.pointer("/item/type").and_then(|v| v.as_str()).unwrap_or("");
    match item_type {
        "function_call" => handle_function_call_item(state, frame_type, frame, out),
        "web_search_call" => handle_web_search_item(state, frame, out),
        _ => {}
    }
}

fn handle_function_call_item(state: &mut StreamState, frame_type: &str, frame: &Value, out: &mut Vec<Emission>) {
    let index = bind_tool_block(state, frame);
    if state.is_completed(index) {
        return;
    }

    {
        let scratch = state.blocks.entry(index).or_default();
        let mut id = scratch.tool_id.take();
        let mut name = scratch.tool_name.take();
        merge_meta_once(&mut id, &mut name, frame);
        let scratch = state.blocks.entry(index).or_default();
        scratch.tool_id = id;
        scratch.tool_name = name;
    }
    maybe_start_tool_block(state, index, out);

    if frame_type == "response.output_item.done" {
        if let Some(arguments) = frame.pointer("/item/arguments").and_then(|v| v.as_str()) {
            let already_has_deltas = !state.blocks.entry(index).or_default().arg_buffer.is_empty();
            if !already_has_deltas {
                state.blocks.entry(index).or_default().arg_buffer.push_str(arguments);
            }
        }
        force_start_tool_block(state, index, out);
        stop_block_if_open(state, index, out);
    }
}

fn handle_web_search_item(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    let call_id = frame
        .pointer("/item/id")
        .or_else(|| frame.get("item_id"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if call_id.is_empty() || state.web_search_emitted.contains(&call_id) {
        return;
    }
    state.web_search_emitted.insert(call_id.clone());
    state.saw_tool_call = true;

    let item = frame.get("item").cloned().unwrap_or_else(|| json!({}));
    emit_web_search_pair(state, &call_id, &item, out);
}

fn emit_web_search_pair(state: &mut StreamState, call_id: &str, item: &Value, out: &mut Vec<Emission>) {
    let index = state.allocate_fresh_index();
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
            Some(json!({"type": "web_search_result", "url": url, "title": source.get("title"), "page_age": source.get("page_age")}))
        })
        .collect();

    out.push((
        "content_block_start",
        json!({"type": "content_block_start", "index": index, "content_block": {"type": "server_tool_use", "id": call_id, "name": "web_search", "input": {"query": query}}}),
    ));
    out.push(("content_block_stop", json!({"type": "content_block_stop", "index": index})));
    state.mark_completed(index);

    let result_index = state.allocate_fresh_index();
    out.push((
        "content_block_start",
        json!({"type": "content_block_start", "index": result_index, "content_block": {"type": "web_search_tool_result", "tool_use_id": call_id, "content": results}}),
    ));
    out.push(("content_block_stop", json!({"type": "content_block_stop", "index": result_index})));
    state.mark_completed(result_index);
}

fn handle_function_call_arguments_delta(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    let index = bind_tool_block(state, frame);
    if state.is_completed(index) {
        return;
    }
    {
        let scratch = state.blocks.entry(index).or_default();
        let mut id = scratch.tool_id.take();
        let mut name = scratch.tool_name.take();
        merge_meta_once(&mut id, &mut name, frame);
        let scratch = state.blocks.entry(index).or_default();
        scratch.tool_id = id;
        scratch.tool_name = name;
    }
    maybe_start_tool_block(state, index, out);
    let delta = frame.get("delta").and_then(|v| v.as_str()).unwrap_or("");
    append_arguments_delta(state, index, delta, out);
}

fn handle_function_call_arguments_done(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    let index = bind_tool_block(state, frame);
    if state.is_completed(index) {
        return;
    }
    {
        let scratch = state.blocks.entry(index).or_default();
        let mut id = scratch.tool_id.take();
        let mut name = scratch.tool_name.take();
        merge_meta_once(&mut id, &mut name, frame);
        let scratch = state.blocks.entry(index).or_default();
        scratch.tool_id = id;
        scratch.tool_name = name;
    }
    maybe_start_tool_block(state, index, out);

    if let Some(arguments) = frame.get("arguments").and_then(|v| v.as_str()) {
        let had_deltas = !state.blocks.entry(index).or_default().arg_buffer.is_empty();
        if !had_deltas {
            state.blocks.entry(index).or_default().arg_buffer.push_str(arguments);
        }
    }
    force_start_tool_block(state, index, out);
    if state.is_started(index) {
        let scratch = state.blocks.entry(index).or_default();
        let unflushed = scratch.arg_buffer[scratch.arg_flushed_len..].to_string();
        if !unflushed.is_empty() {
            scratch.arg_flushed_len = scratch.arg_buffer.len();
            out.push((
                "content_block_delta",
                json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": unflushed}}),
            ));
        }
    }
    stop_block_if_open(state, index, out);
}

/* --- completion -------------------------------------------------------------------------------- */

fn handle_response_completed(state: &mut StreamState, frame: &Value, out: &mut Vec<Emission>) {
    // A well-behaved upstream sends this once; guard anyway so a replayed
    // frame can never emit a second `message_stop` (invariant 5).
    if state.message_stop_emitted {
        return;
    }
    state.message_stop_emitted = true;

    let response = frame.get("response").cloned().unwrap_or(json!({}));

    if let Some(output) = response.get("output").and_then(|v| v.as_array()) {
        for item in output {
            match item.get("type").and_then(|v| v.as_str()) {
                Some("web_search_call") => {
                    let call_id = item.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    if !call_id.is_empty() && !state.web_search_emitted.contains(&call_id) {
                        state.web_search_emitted.insert(call_id.clone());
                        state.saw_tool_call = true;
                        emit_web_search_pair(state, &call_id, item, out);
                    }
                }
                Some("function_call") => state.saw_function_call = true,
                _ => {}
            }
        }
    }

    // Balance invariant: nothing may still be open when message_stop fires.
    let open_indices: Vec<usize> =
        state.blocks.iter().filter(|(_, s)| s.started && !s.completed).map(|(&i, _)| i).collect();
    for index in open_indices {
        stop_block_if_open(state, index, out);
    }

    let mut stop_reason = derive_stop_reason(&response);
    if stop_reason == "end_turn" && state.saw_tool_call {
        stop_reason = "tool_use".to_string();
    }

    let usage = normalize_openai_usage(response.get("usage").unwrap_or(&Value::Null));
    state.usage = usage.clone();

    out.push((
        "message_delta",
        json!({"type": "message_delta", "delta": {"stop_reason": stop_reason, "stop_sequence": Value::Null}, "usage": usage}),
    ));
    out.push(("message_stop", json!({"type": "message_stop", "usage": usage})));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(emissions: &[Emission]) -> Vec<&'static str> {
        emissions.iter().map(|(name, _)| *name).collect()
    }

    #[test]
    fn e1_simple_text_round_trip() {
        let mut state = StreamState::new("gpt-5.2", json!({"input_tokens": 10, "output_tokens": 0}));

        let created = translate_openai_event(
            &mut state,
            &json!({"type": "response.created", "response": {"usage": {"input_tokens": 10, "output_tokens": 0}}}),
        );
        assert_eq!(names(&created), vec!["message_start"]);

        let delta = translate_openai_event(
            &mut state,
            &json!({"type": "response.output_text.delta", "output_index": 0, "content_index": 0, "delta": "Hi"}),
        );
        assert_eq!(names(&delta), vec!["content_block_start", "content_block_delta"]);

        let done = translate_openai_event(
            &mut state,
            &json!({"type": "response.output_text.done", "output_index": 0, "content_index": 0}),
        );
        assert_eq!(names(&done), vec!["content_block_stop"]);

        let completed = translate_openai_event(
            &mut state,
            &json!({"type": "response.completed", "response": {"status": "completed", "output": [], "usage": {"input_tokens": 10, "output_tokens": 2}}}),
        );
        assert_eq!(names(&completed), vec!["message_delta", "message_stop"]);
        assert_eq!(completed[0].1["delta"]["stop_reason"], json!("end_turn"));
    }

    #[test]
    fn e2_tool_call_via_arguments_events() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);

        let e1 = translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.delta", "item_id": "c1", "delta": ""}),
        );
        assert_eq!(names(&e1), vec!["message_start"]);

        let e2 = translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.delta", "item_id": "c1", "delta": "{\"city\":"}),
        );
        assert!(names(&e2).is_empty(), "nothing started yet: name unknown");

        let e3 = translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.done", "item_id": "c1", "name": "get_weather", "arguments": "{\"city\":\"SF\"}"}),
        );
        assert_eq!(names(&e3), vec!["content_block_start", "content_block_delta", "content_block_stop"]);
        assert_eq!(e3[0].1["content_block"]["id"], json!("c1"));
        assert_eq!(e3[0].1["content_block"]["name"], json!("get_weather"));
        assert_eq!(e3[1].1["delta"]["partial_json"], json!("{\"city\":\"SF\"}"));

        let completed = translate_openai_event(
            &mut state,
            &json!({"type": "response.completed", "response": {"status": "completed", "output": [{"type": "function_call"}], "usage": {}}}),
        );
        assert_eq!(completed[0].1["delta"]["stop_reason"], json!("tool_use"));
    }

    #[test]
    fn e3_harmony_tool_call_suppresses_text() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        translate_openai_event(&mut state, &json!({"type": "response.created"}));

        let delta = translate_openai_event(
            &mut state,
            &json!({
                "type": "response.output_text.delta",
                "output_index": 0,
                "content_index": 0,
                "delta": "<|channel|>commentary<|message|>{\"name\":\"f\",\"arguments\":{\"a\":1}}<|end|>",
            }),
        );
        assert_eq!(names(&delta), vec!["content_block_start", "content_block_stop"]);
        assert_eq!(delta[0].1["content_block"]["type"], json!("tool_use"));
        assert_eq!(delta[0].1["content_block"]["name"], json!("f"));

        let completed = translate_openai_event(
            &mut state,
            &json!({"type": "response.completed", "response": {"status": "completed", "output": [], "usage": {}}}),
        );
        assert_eq!(completed[0].1["delta"]["stop_reason"], json!("tool_use"));
    }

    #[test]
    fn idempotent_completion_is_a_no_op() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.done", "item_id": "c1", "name": "f", "arguments": "{}"}),
        );
        let replay = translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.done", "item_id": "c1", "name": "f", "arguments": "{}"}),
        );
        assert!(replay.is_empty());
    }

    #[test]
    fn message_start_reflects_first_frames_usage_not_the_seeded_value() {
        let mut state = StreamState::new("gpt-5.2", json!({"input_tokens": 999, "output_tokens": 999}));

        let created = translate_openai_event(
            &mut state,
            &json!({"type": "response.created", "response": {"usage": {"input_tokens": 5, "output_tokens": 0}}}),
        );
        assert_eq!(names(&created), vec!["message_start"]);
        assert_eq!(created[0].1["message"]["usage"]["input_tokens"], json!(5));
    }

    #[test]
    fn replayed_response_completed_does_not_emit_a_second_message_stop() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        let frame = json!({"type": "response.completed", "response": {"status": "completed", "output": [], "usage": {}}});
        let first = translate_openai_event(&mut state, &frame);
        assert_eq!(names(&first), vec!["message_delta", "message_stop"]);
        let replay = translate_openai_event(&mut state, &frame);
        assert!(replay.is_empty());
    }

    #[test]
    fn distinct_call_ids_resolve_to_distinct_indices() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.delta", "item_id": "a", "delta": "{}"}),
        );
        translate_openai_event(
            &mut state,
            &json!({"type": "response.function_call_arguments.delta", "item_id": "b", "delta": "{}"}),
        );
        assert_ne!(state.call_id_to_index["a"], state.call_id_to_index["b"]);
    }
}
