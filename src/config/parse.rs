use super::types::{Config, Settings};
use super::{env_var_pattern, expand_env_vars, expand_tilde};
use crate::sink::log_analytics;
use crate::source::query::{ResourceDescriptor, ResourceParseError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CREDENTIALS_VAR: &str = "CREDENTIALS_FILE_CONTENT";
pub const RESOURCE_NAMES_VAR: &str = "RESOURCE_NAMES";
pub const WORKSPACE_ID_VAR: &str = "WORKSPACE_ID";
pub const SHARED_KEY_VAR: &str = "SHARED_KEY";
pub const LOG_ANALYTICS_URI_VAR: &str = "logAnalyticsUri";
pub const ACCESS_TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const CURSOR_PATH_VAR: &str = "IAMSHIP_CURSOR_PATH";

const LOG_ANALYTICS_URI_PATTERN: &str = r"^https://([\w\-]+)\.ods\.opinsights\.azure\.([a-zA-Z\.]+)$";
const LOG_TYPE_PATTERN: &str = r"^[A-Za-z0-9_]{1,100}$";
/// Largest page the Cloud Logging API serves
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid Log Analytics URI '{0}'")]
    InvalidLogAnalyticsUri(String),

    #[error("invalid resource: {0}")]
    InvalidResource(#[from] ResourceParseError),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no access token: set access_token in CREDENTIALS_FILE_CONTENT or GOOGLE_OAUTH_ACCESS_TOKEN")]
    MissingAccessToken,

    #[error("SHARED_KEY is not valid base64: {0}")]
    InvalidSharedKey(#[from] base64::DecodeError),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Build the runtime configuration from the process environment and the
/// optional settings file.
pub fn load_config(settings_path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_from(settings_path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`], reading variables through `env`.
pub fn load_config_from<F>(settings_path: Option<&Path>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match settings_path {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };

    let required = |name: &'static str| {
        env(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingVar(name))
    };

    let credentials = required(CREDENTIALS_VAR)?;
    let resource_names = required(RESOURCE_NAMES_VAR)?;
    let workspace_id = required(WORKSPACE_ID_VAR)?.trim().to_string();
    let shared_key = required(SHARED_KEY_VAR)?.trim().to_string();

    let resources = ResourceDescriptor::parse_list(&resource_names)?;
    if resources.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} lists no resources",
            RESOURCE_NAMES_VAR
        )));
    }

    let log_analytics_uri = env(LOG_ANALYTICS_URI_VAR)
        .map(|uri| uri.trim().to_string())
        .filter(|uri| !uri.is_empty())
        .unwrap_or_else(|| log_analytics::default_uri(&workspace_id));
    validate_log_analytics_uri(&log_analytics_uri)?;

    STANDARD.decode(&shared_key)?;

    let access_token = match credentials_access_token(&credentials)? {
        Some(token) => token,
        None => env(ACCESS_TOKEN_VAR)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingAccessToken)?,
    };

    apply_cursor_override(&mut settings, &env);

    Ok(Config {
        resources,
        workspace_id,
        shared_key,
        log_analytics_uri,
        access_token,
        settings,
    })
}

/// Settings alone, for commands that only touch the cursor store.
pub fn load_local_settings<F>(settings_path: Option<&Path>, env: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match settings_path {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    apply_cursor_override(&mut settings, &env);
    Ok(settings)
}

fn apply_cursor_override<F>(settings: &mut Settings, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env(CURSOR_PATH_VAR).filter(|p| !p.trim().is_empty()) {
        settings.cursor.path = PathBuf::from(path.trim());
    }
    settings.cursor.path = expand_tilde(&settings.cursor.path);
}

/// Reject anything that is not an `https://<id>.ods.opinsights.azure.<tld>` URI.
pub fn validate_log_analytics_uri(uri: &str) -> Result<(), ConfigError> {
    let pattern =
        Regex::new(LOG_ANALYTICS_URI_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    if pattern.is_match(uri) {
        Ok(())
    } else {
        Err(ConfigError::InvalidLogAnalyticsUri(uri.to_string()))
    }
}

/// The credentials blob must be a JSON object. Multi-line values (private
/// keys pasted into an environment variable) are accepted by escaping raw
/// newlines first.
fn credentials_access_token(blob: &str) -> Result<Option<String>, ConfigError> {
    let content = blob.trim().replace('\n', "\\n");
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| ConfigError::InvalidCredentials(e.to_string()))?;

    let serde_json::Value::Object(object) = value else {
        return Err(ConfigError::InvalidCredentials(
            "expected a JSON object".to_string(),
        ));
    };

    Ok(object
        .get("access_token")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .filter(|token| !token.is_empty()))
}

/// Load and validate the settings file, expanding `$env{VAR}` references.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let yaml_string = expand_env_vars(&yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    let settings: Settings = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    validate_settings(&settings)?;
    Ok(settings)
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables referenced in the settings file are not set: {}",
        unexpanded.join(", ")
    )))
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let mut errors = Vec::new();
    let pipeline = &settings.pipeline;

    if pipeline.resource_batch_size == 0 {
        errors.push("pipeline.resource_batch_size must be at least 1".to_string());
    }
    if pipeline.page_size == 0 || pipeline.page_size > MAX_PAGE_SIZE {
        errors.push(format!(
            "pipeline.page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        ));
    }
    if pipeline.queue_size == 0 {
        errors.push("pipeline.queue_size must be at least 1".to_string());
    }
    if !(pipeline.budget_ratio > 0.0 && pipeline.budget_ratio <= 1.0) {
        errors.push("pipeline.budget_ratio must be in (0, 1]".to_string());
    }
    if pipeline.max_run_duration.is_zero() {
        errors.push("pipeline.max_run_duration must be positive".to_string());
    }
    match pipeline.window_policy() {
        Ok(policy) => {
            let now = Utc::now();
            if now.checked_sub_signed(policy.execution_interval).is_none() {
                errors.push("pipeline.execution_interval reaches before the earliest representable time".to_string());
            }
            if now.checked_sub_signed(policy.max_lookback).is_none() {
                errors.push("pipeline.max_lookback reaches before the earliest representable time".to_string());
            }
        }
        Err(_) => {
            errors.push("pipeline.execution_interval or pipeline.max_lookback is out of range".to_string());
        }
    }

    let log_type = Regex::new(LOG_TYPE_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    if !log_type.is_match(&settings.sink.log_type) {
        errors.push(format!(
            "sink.log_type '{}' must be 1-100 letters, digits or underscores",
            settings.sink.log_type
        ));
    }
    if settings.sink.max_payload_bytes == 0 {
        errors.push("sink.max_payload_bytes must be positive".to_string());
    }

    let endpoint = &settings.source.endpoint;
    if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
        errors.push(format!("source.endpoint '{}' must be an http(s) URL", endpoint));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_with(overrides: &[(&str, &str)]) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = [
            (CREDENTIALS_VAR, r#"{"type": "service_account", "access_token": "ya29.token"}"#),
            (RESOURCE_NAMES_VAR, "project/p1,service_account/p2"),
            (WORKSPACE_ID_VAR, "0f1e2d3c"),
            (SHARED_KEY_VAR, "c2VjcmV0LWtleQ=="),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for (key, value) in overrides {
            env.insert(key.to_string(), value.to_string());
        }
        env
    }

    fn load(env: &HashMap<String, String>) -> Result<Config, ConfigError> {
        load_config_from(None, |key| env.get(key).cloned())
    }

    #[test]
    fn test_valid_environment() {
        let config = load(&env_with(&[])).unwrap();

        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.workspace_id, "0f1e2d3c");
        assert_eq!(config.log_analytics_uri, "https://0f1e2d3c.ods.opinsights.azure.com");
        assert_eq!(config.access_token, "ya29.token");
        assert_eq!(config.settings.pipeline.queue_size, 3000);
    }

    #[test]
    fn test_missing_required_var() {
        let mut env = env_with(&[]);
        env.remove(SHARED_KEY_VAR);
        assert!(matches!(load(&env), Err(ConfigError::MissingVar(SHARED_KEY_VAR))));

        let env = env_with(&[(WORKSPACE_ID_VAR, "   ")]);
        assert!(matches!(load(&env), Err(ConfigError::MissingVar(WORKSPACE_ID_VAR))));
    }

    #[test]
    fn test_custom_uri_accepted() {
        let env = env_with(&[(LOG_ANALYTICS_URI_VAR, "https://ws-1.ods.opinsights.azure.us")]);
        assert_eq!(
            load(&env).unwrap().log_analytics_uri,
            "https://ws-1.ods.opinsights.azure.us"
        );
    }

    #[test]
    fn test_invalid_uri_is_fatal() {
        for uri in [
            "http://ws-1.ods.opinsights.azure.com",
            "https://evil.example.com",
            "https://ws-1.ods.opinsights.azure.com/extra",
        ] {
            let env = env_with(&[(LOG_ANALYTICS_URI_VAR, uri)]);
            assert!(
                matches!(load(&env), Err(ConfigError::InvalidLogAnalyticsUri(_))),
                "accepted {}",
                uri
            );
        }
    }

    #[test]
    fn test_invalid_resource_list() {
        let env = env_with(&[(RESOURCE_NAMES_VAR, "project/p1,broken")]);
        assert!(matches!(load(&env), Err(ConfigError::InvalidResource(_))));

        let env = env_with(&[(RESOURCE_NAMES_VAR, ",,")]);
        assert!(matches!(load(&env), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_shared_key() {
        let env = env_with(&[(SHARED_KEY_VAR, "%%%")]);
        assert!(matches!(load(&env), Err(ConfigError::InvalidSharedKey(_))));
    }

    #[test]
    fn test_credentials_must_be_json_object() {
        let env = env_with(&[(CREDENTIALS_VAR, "not json")]);
        assert!(matches!(load(&env), Err(ConfigError::InvalidCredentials(_))));

        let env = env_with(&[(CREDENTIALS_VAR, "[1, 2]")]);
        assert!(matches!(load(&env), Err(ConfigError::InvalidCredentials(_))));
    }

    #[test]
    fn test_access_token_fallback() {
        let env = env_with(&[(CREDENTIALS_VAR, "{\"private_key\": \"-----BEGIN\nKEY-----\"}")]);
        assert!(matches!(load(&env), Err(ConfigError::MissingAccessToken)));

        let env = env_with(&[
            (CREDENTIALS_VAR, r#"{"type": "service_account"}"#),
            (ACCESS_TOKEN_VAR, "from-env"),
        ]);
        assert_eq!(load(&env).unwrap().access_token, "from-env");
    }

    #[test]
    fn test_cursor_path_override() {
        let env = env_with(&[(CURSOR_PATH_VAR, "/var/lib/iamship/cursor.duckdb")]);
        assert_eq!(
            load(&env).unwrap().settings.cursor.path,
            PathBuf::from("/var/lib/iamship/cursor.duckdb")
        );
    }

    #[test]
    fn test_validate_settings_collects_errors() {
        let mut settings = Settings::default();
        settings.pipeline.queue_size = 0;
        settings.pipeline.page_size = 5000;
        settings.pipeline.budget_ratio = 1.5;
        settings.sink.log_type = "GCP-IAM".to_string();

        let Err(ConfigError::ValidationList(errors)) = validate_settings(&settings) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_window_beyond_time_range_rejected() {
        let mut settings = Settings::default();
        settings.pipeline.execution_interval =
            std::time::Duration::from_secs(300_000 * 365 * 24 * 3600);
        settings.pipeline.max_lookback = std::time::Duration::from_secs(300_000 * 365 * 24 * 3600);

        let Err(ConfigError::ValidationList(errors)) = validate_settings(&settings) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("execution_interval"));
        assert!(errors[1].contains("max_lookback"));
    }

    #[test]
    fn test_default_settings_are_valid() {
        validate_settings(&Settings::default()).unwrap();
    }
}
