//!
//! Anthropic-to-OpenAI model name resolution.
//!
//! Translates a model name from an incoming Anthropic request into the
//! OpenAI model name to send upstream, using an operator-supplied map of
//! Anthropic names (or prefixes) to OpenAI names. Resolution is exact-match
//! first, then longest-prefix-match, then a configured default.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;

use crate::config::ModelMapJson;

/* --- types ----------------------------------------------------------------------------------- */

/// An Anthropic-name -> OpenAI-name aliasing table, normalized and validated
/// once when the map is built so that ambiguous keys are a configuration
/// error, never a per-request surprise.
#[derive(Debug, Clone, Default)]
pub struct ModelMap {
    /// Normalized (trimmed, case-folded) key -> OpenAI model name.
    entries: HashMap<String, String>,
}

/// How a model name resolved against the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Prefix,
    Miss,
}

/// The result of resolving one Anthropic model name.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub match_type: MatchType,
    pub resolved: Option<String>,
}

/* --- start of code -------------------------------------------------------------------------- */

/// Normalizes a model name the way the map's keys are normalized: trimmed
/// and case-folded. Returns `None` for an empty or whitespace-only value.
pub fn normalize_model_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

impl ModelMap {
    /// Parses a `MODEL_MAP_JSON`-shaped string into a validated `ModelMap`.
    ///
    /// An empty string produces an empty map. The JSON may be a flat object
    /// of `{anthropic_name: openai_name}` pairs or the same shape nested
    /// under a `"models"` key; mixing both forms at the top level is
    /// rejected.
    ///
    /// # Errors
    ///
    /// Fails if the JSON doesn't parse, if any value is not a non-empty
    /// string, or if two distinct raw keys collide once normalized (trimmed
    /// and case-folded): collisions of this kind are the only way a
    /// longest-prefix match could ever be ambiguous for a given request, so
    /// rejecting them here makes ambiguity a parse-time error rather than a
    /// per-request one.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let parsed: ModelMapJson =
            serde_json::from_str(raw).map_err(|e| format!("failed to parse JSON: {e}"))?;
        let raw_map = match parsed {
            ModelMapJson::Nested { models } => models,
            ModelMapJson::Flat(map) => map,
        };

        let mut entries: HashMap<String, String> = HashMap::new();
        let mut raw_keys_by_normalized: HashMap<String, Vec<String>> = HashMap::new();

        for (raw_key, value) in raw_map {
            let Some(normalized) = normalize_model_key(&raw_key) else {
                continue;
            };
            if value.trim().is_empty() {
                return Err(format!("model map value for key '{raw_key}' must be a non-empty string"));
            }
            raw_keys_by_normalized
                .entry(normalized.clone())
                .or_default()
                .push(raw_key);
            entries.insert(normalized, value);
        }

        let colliding: Vec<String> = raw_keys_by_normalized
            .into_iter()
            .filter(|(_, raws)| raws.len() > 1)
            .flat_map(|(_, mut raws)| {
                raws.sort();
                raws
            })
            .collect();
        if !colliding.is_empty() {
            let mut sorted = colliding;
            sorted.sort();
            return Err(format!(
                "ambiguous model map keys collide after normalization: {}",
                sorted.join(", ")
            ));
        }

        Ok(Self { entries })
    }

    /// Resolves an Anthropic model name against the map: exact match first,
    /// then the single longest prefix match, else a miss.
    ///
    /// Because every key that survived [`Self::parse`] is unique once
    /// normalized, and two distinct keys of equal length can never both be a
    /// prefix of the same request string, a tie can never occur here: the
    /// ambiguity check has already happened at parse time.
    pub fn resolve(&self, anthropic_model: &str) -> Resolution {
        let Some(normalized_request) = normalize_model_key(anthropic_model) else {
            return Resolution { match_type: MatchType::Miss, resolved: None };
        };

        if let Some(value) = self.entries.get(&normalized_request) {
            return Resolution { match_type: MatchType::Exact, resolved: Some(value.clone()) };
        }

        let best = self
            .entries
            .iter()
            .filter(|(key, _)| normalized_request.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len());

        match best {
            Some((_, value)) => {
                Resolution { match_type: MatchType::Prefix, resolved: Some(value.clone()) }
            }
            None => Resolution { match_type: MatchType::Miss, resolved: None },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves `anthropic_model` against `model_map`, falling back to
/// `default_model` on a miss.
pub fn resolve_openai_model(model_map: &ModelMap, anthropic_model: &str, default_model: &str) -> String {
    match model_map.resolve(anthropic_model).resolved {
        Some(resolved) => resolved,
        None => default_model.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_case_insensitively() {
        let map = ModelMap::parse(r#"{"Claude-3-Opus": "gpt-4o"}"#).unwrap();
        let res = map.resolve("claude-3-opus");
        assert_eq!(res.match_type, MatchType::Exact);
        assert_eq!(res.resolved.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn longest_prefix_wins() {
        let map = ModelMap::parse(r#"{"claude-3": "gpt-4", "claude-3-opus": "gpt-4o"}"#).unwrap();
        let res = map.resolve("claude-3-opus-20240229");
        assert_eq!(res.match_type, MatchType::Prefix);
        assert_eq!(res.resolved.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn miss_falls_through() {
        let map = ModelMap::parse(r#"{"claude-3": "gpt-4"}"#).unwrap();
        let res = map.resolve("gpt-nonexistent");
        assert_eq!(res.match_type, MatchType::Miss);
        assert!(res.resolved.is_none());
    }

    #[test]
    fn colliding_normalized_keys_rejected_at_parse_time() {
        let err = ModelMap::parse(r#"{"Claude-3": "gpt-4", "claude-3": "gpt-4o"}"#).unwrap_err();
        assert!(err.contains("ambiguous"), "error was: {err}");
    }

    #[test]
    fn nested_models_key_supported() {
        let map = ModelMap::parse(r#"{"models": {"claude-3": "gpt-4"}}"#).unwrap();
        assert_eq!(map.resolve("claude-3").match_type, MatchType::Exact);
    }

    #[test]
    fn empty_string_produces_empty_map() {
        let map = ModelMap::parse("").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn resolve_openai_model_falls_back_to_default() {
        let map = ModelMap::parse("").unwrap();
        assert_eq!(resolve_openai_model(&map, "claude-3", "gpt-5.2"), "gpt-5.2");
    }
}
