//!
//! Harmony in-band tool-call parsing.
//!
//! Some models emit tool calls inside assistant text rather than as native
//! `function_call` items, delimited by `<|...|>`-tagged markers containing a
//! JSON object. This module detects the tag and extracts balanced, string-
//! aware JSON objects from the buffered text so they can be turned into
//! synthetic `tool_use` blocks.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/* --- types ----------------------------------------------------------------------------------- */

/// One successfully parsed Harmony-embedded tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonyToolCall {
    pub name: String,
    pub arguments: Value,
}

/* --- start of code -------------------------------------------------------------------------- */

fn harmony_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\|[^|]*\|>").expect("harmony tag regex must compile"))
}

/// Whether `text` contains at least one `<|...|>`-delimited Harmony tag.
pub fn contains_harmony_tag(text: &str) -> bool {
    harmony_tag_pattern().is_match(text)
}

/// Scans `buffer` for every balanced, string-aware JSON object and returns
/// the ones that parse as `{"name": string, "arguments": object}`. Non-object
/// or unbalanced fragments (including a trailing object still being
/// streamed in) are silently skipped, per Design Note "Harmony parsing".
pub fn extract_tool_calls(buffer: &str) -> Vec<HarmonyToolCall> {
    extract_json_objects(buffer)
        .into_iter()
        .filter_map(|raw| {
            let value: Value = serde_json::from_str(&raw).ok()?;
            let name = value.get("name")?.as_str()?.to_string();
            let arguments = value.get("arguments")?.clone();
            if !arguments.is_object() {
                return None;
            }
            Some(HarmonyToolCall { name, arguments })
        })
        .collect()
}

/// Depth-counted, string-aware scan for top-level `{...}` spans. Quotes and
/// backslash escapes inside strings never perturb the brace count, and a
/// span left unbalanced at the end of the buffer (still streaming in) is
/// dropped rather than returned.
fn extract_json_objects(buffer: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let chars: Vec<char> = buffer.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                let object: String = chars[i..=end].iter().collect();
                objects.push(object);
                i = end + 1;
                continue;
            }
            // Unbalanced: nothing further in this buffer can close it yet.
            break;
        }
        i += 1;
    }

    objects
}

/// Returns the index of the `}` that matches the `{` at `start`, respecting
/// double-quoted strings and `\`-escapes, or `None` if the buffer ends
/// before the span closes.
fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_harmony_tag() {
        assert!(contains_harmony_tag("<|channel|>commentary<|message|>{}"));
        assert!(!contains_harmony_tag("plain text, no tags here"));
    }

    #[test]
    fn extracts_single_tool_call() {
        let buffer = r#"<|channel|>commentary<|message|>{"name":"f","arguments":{"a":1}}<|end|>"#;
        let calls = extract_tool_calls(buffer);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "f");
        assert_eq!(calls[0].arguments, json!({"a": 1}));
    }

    #[test]
    fn string_contents_do_not_confuse_brace_counting() {
        let buffer = r#"{"name":"f","arguments":{"text":"a } b { c","n":2}}"#;
        let calls = extract_tool_calls(buffer);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["text"], json!("a } b { c"));
    }

    #[test]
    fn unbalanced_trailing_object_is_skipped() {
        let buffer = r#"{"name":"f","arguments":{"a":1}} {"name":"g", "argum"#;
        let calls = extract_tool_calls(buffer);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "f");
    }

    #[test]
    fn non_object_json_is_ignored() {
        let buffer = r#"[1,2,3] {"name":"f","arguments":{}}"#;
        let calls = extract_tool_calls(buffer);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "f");
    }
}
