//! Configuration loading and validation tests.
//!
//! Uses `temp-env` to scope environment variable mutation to each test, so
//! tests never leak state into one another when run concurrently.

use anthromux::config::{Config, ValidationSeverity};
use temp_env::with_vars;

#[test]
fn defaults_to_openai_mode_with_no_api_key_configured() {
    with_vars(
        vec![
            ("OPENAI_UPSTREAM_MODE", None::<&str>),
            ("OPENAI_API_KEY", None::<&str>),
            ("PORT", None::<&str>),
        ],
        || {
            let config = Config::from_env().expect("config should load with only defaults");
            assert_eq!(config.port, 3000);
            assert!(config.openai_api_key.is_none());
        },
    );
}

#[test]
fn openai_mode_without_api_key_fails_validation() {
    with_vars(
        vec![("OPENAI_UPSTREAM_MODE", Some("openai")), ("OPENAI_API_KEY", None::<&str>)],
        || {
            let config = Config::from_env().unwrap();
            let issues = config.validate();
            assert!(
                issues
                    .iter()
                    .any(|i| i.field == "OPENAI_API_KEY" && i.severity == ValidationSeverity::Error)
            );
        },
    );
}

#[test]
fn openai_mode_with_api_key_passes_validation() {
    with_vars(
        vec![("OPENAI_UPSTREAM_MODE", Some("openai")), ("OPENAI_API_KEY", Some("sk-test"))],
        || {
            let config = Config::from_env().unwrap();
            assert!(config.validate().is_empty());
        },
    );
}

#[test]
fn codex_mode_does_not_require_an_api_key() {
    with_vars(
        vec![("OPENAI_UPSTREAM_MODE", Some("codex")), ("OPENAI_API_KEY", None::<&str>)],
        || {
            let config = Config::from_env().unwrap();
            assert!(
                !config
                    .validate()
                    .iter()
                    .any(|i| i.field == "OPENAI_API_KEY")
            );
        },
    );
}

#[test]
fn unknown_upstream_mode_is_rejected_at_load_time() {
    with_vars(vec![("OPENAI_UPSTREAM_MODE", Some("bogus"))], || {
        assert!(Config::from_env().is_err());
    });
}

#[test]
fn ambiguous_model_map_keys_fail_at_load_time_not_per_request() {
    with_vars(
        vec![("MODEL_MAP_JSON", Some(r#"{"Claude-3": "gpt-4", "claude-3": "gpt-4o"}"#))],
        || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("MODEL_MAP_JSON"));
        },
    );
}

#[test]
fn remote_refresh_url_override_requires_https() {
    with_vars(
        vec![(
            "CODEX_REFRESH_TOKEN_URL_OVERRIDE",
            Some("http://auth.openai.com/oauth/token"),
        )],
        || {
            let config = Config::from_env().unwrap();
            let issues = config.validate();
            assert!(issues.iter().any(|i| i.field == "CODEX_REFRESH_TOKEN_URL_OVERRIDE"));
        },
    );
}
