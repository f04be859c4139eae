//! Configuration resolution: source → fully defaulted [`ConfigDocument`].

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use crate::config::schema::{
    ConfigDocument, FormatterSpec, HandlerSpec, Level, LoggerSpec, ROOT_ALIAS, SCHEMA_VERSION,
};
use crate::config::validation::ValidationError;

/// Environment variable naming a fallback config file or inline document.
pub const LOG_CONFIG_ENV: &str = "LOG_CONFIG";

/// Template used by the injected `default` formatter.
pub const DEFAULT_LOG_FORMAT: &str = "{asctime} {levelname:3.3} {name}: {message}";

/// Error type for configuration resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Unparseable or wrong-shaped document.
    #[error("invalid configuration format: {0}")]
    Format(String),

    /// The source itself has an unsupported type.
    #[error("unsupported configuration source: {0}")]
    Type(String),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where a configuration comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Nothing given: use `LOG_CONFIG`, else built-in defaults.
    Absent,
    /// A file path, or an inline YAML/JSON document.
    Text(String),
    /// An in-memory mapping.
    Mapping(Value),
    /// An already typed document.
    Document(ConfigDocument),
}

impl From<&str> for ConfigSource {
    fn from(text: &str) -> Self {
        ConfigSource::Text(text.to_string())
    }
}

impl From<String> for ConfigSource {
    fn from(text: String) -> Self {
        ConfigSource::Text(text)
    }
}

impl From<Option<String>> for ConfigSource {
    fn from(text: Option<String>) -> Self {
        text.map_or(ConfigSource::Absent, ConfigSource::Text)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::Text(path.to_string_lossy().into_owned())
    }
}

impl From<Value> for ConfigSource {
    fn from(value: Value) -> Self {
        ConfigSource::Mapping(value)
    }
}

impl From<ConfigDocument> for ConfigSource {
    fn from(document: ConfigDocument) -> Self {
        ConfigSource::Document(document)
    }
}

/// Resolve a source into a document with every default injected.
pub fn resolve(source: impl Into<ConfigSource>) -> Result<ConfigDocument, ConfigError> {
    let document = match source.into() {
        ConfigSource::Absent => match std::env::var(LOG_CONFIG_ENV) {
            Ok(text) if !text.trim().is_empty() => load_text(&text)?,
            _ => {
                tracing::info!("Using default logging config");
                ConfigDocument::default()
            }
        },
        ConfigSource::Text(text) => load_text(&text)?,
        ConfigSource::Mapping(value) => from_mapping(value)?,
        ConfigSource::Document(document) => document,
    };
    Ok(apply_defaults(document))
}

/// Read a path if it exists, otherwise parse the text as an inline document.
fn load_text(text: &str) -> Result<ConfigDocument, ConfigError> {
    let path = Path::new(text);
    if path.is_file() {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: text.to_string(),
            source,
        })?;
        let value = if has_extension(path, "toml") {
            toml::from_str::<Value>(&content).map_err(|e| ConfigError::Format(e.to_string()))?
        } else {
            parse_yaml(&content)?
        };
        return from_parsed(value);
    }
    from_parsed(parse_yaml(text)?)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// YAML is a superset of JSON, so both parse here.
fn parse_yaml(text: &str) -> Result<Value, ConfigError> {
    serde_yaml::from_str::<Value>(text).map_err(|e| ConfigError::Format(e.to_string()))
}

/// Parsed text must be a mapping; anything else is a format error.
fn from_parsed(value: Value) -> Result<ConfigDocument, ConfigError> {
    if !value.is_object() {
        return Err(ConfigError::Format(format!(
            "expected a mapping at the top level, found {}",
            kind_of(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| ConfigError::Format(e.to_string()))
}

/// In-memory sources must already be mappings.
fn from_mapping(value: Value) -> Result<ConfigDocument, ConfigError> {
    if !value.is_object() {
        return Err(ConfigError::Type(format!(
            "expected a mapping, found {}",
            kind_of(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| ConfigError::Format(e.to_string()))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Inject defaults into a document. Applying this twice changes nothing.
pub fn apply_defaults(mut document: ConfigDocument) -> ConfigDocument {
    document.version.get_or_insert(SCHEMA_VERSION);

    // Loggers created before configuration stay enabled unless asked otherwise.
    document.disable_existing_loggers.get_or_insert(false);

    let default_log_format = document
        .default_log_format
        .take()
        .unwrap_or_else(|| DEFAULT_LOG_FORMAT.to_string());
    let default_log_level = document.default_log_level.take().unwrap_or(Level::DEBUG);

    // Console output is switched off by mapping `console` to null.
    document
        .handlers
        .entry("console".to_string())
        .or_insert_with(|| Some(default_handler()));

    let enabled = document.enabled_handlers();

    document
        .formatters
        .entry("default".to_string())
        .or_insert_with(|| default_formatter(default_log_format));

    if !document.has_root_logger() {
        document.loggers.insert(
            ROOT_ALIAS.to_string(),
            LoggerSpec {
                level: Some(default_log_level),
                handlers: Some(enabled),
                ..LoggerSpec::default()
            },
        );
    }

    document.show_warnings.get_or_insert(true);
    document
}

fn default_formatter(format: String) -> FormatterSpec {
    FormatterSpec {
        format: Some(format),
        style: Some("{".to_string()),
        class: Some("colored".to_string()),
        ..FormatterSpec::default()
    }
}

fn default_handler() -> HandlerSpec {
    let mut options = serde_json::Map::new();
    options.insert("stream".to_string(), json!("stdout"));
    HandlerSpec {
        class: Some("console".to_string()),
        level: Some(Level::DEBUG),
        formatter: Some("default".to_string()),
        options,
    }
}
