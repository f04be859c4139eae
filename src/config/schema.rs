//! Configuration schema definitions.
//!
//! A [`ConfigDocument`] is the logging configuration as it travels between
//! files, the resolver, the wire and the engine. Unknown keys are kept in
//! flattened `extra` maps so a document survives a JSON round trip intact.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Well-known TCP port of the configuration-update protocol.
pub const DEFAULT_LISTEN_PORT: u16 = 9030;

/// Only schema version understood by the engine.
pub const SCHEMA_VERSION: u32 = 1;

/// Logger name that addresses the root logger besides `""`.
pub const ROOT_ALIAS: &str = "root";

/// Severity of a record, ordered from least to most severe.
///
/// Named levels follow the usual numeric ladder (`DEBUG` = 10 up to
/// `CRITICAL` = 50). Any other number is accepted and rendered as
/// `Level <n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "LevelRepr", into = "LevelRepr")]
pub struct Level(u32);

impl Level {
    pub const NOTSET: Level = Level(0);
    pub const TRACE: Level = Level(5);
    pub const DEBUG: Level = Level(10);
    pub const INFO: Level = Level(20);
    pub const WARNING: Level = Level(30);
    pub const ERROR: Level = Level(40);
    pub const CRITICAL: Level = Level(50);

    /// Build a level from its numeric value.
    pub fn from_number(value: u32) -> Self {
        Self(value)
    }

    /// Numeric value of the level.
    pub fn as_number(&self) -> u32 {
        self.0
    }

    /// Canonical name, if this is one of the named levels.
    pub fn name(&self) -> Option<&'static str> {
        match self.0 {
            0 => Some("NOTSET"),
            5 => Some("TRACE"),
            10 => Some("DEBUG"),
            20 => Some("INFO"),
            30 => Some("WARNING"),
            40 => Some("ERROR"),
            50 => Some("CRITICAL"),
            _ => None,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::NOTSET
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Level {}", self.0),
        }
    }
}

/// Error for level names that are not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<u32>() {
            return Ok(Level(number));
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(Level::NOTSET),
            "TRACE" => Ok(Level::TRACE),
            "DEBUG" => Ok(Level::DEBUG),
            "INFO" => Ok(Level::INFO),
            "WARNING" | "WARN" => Ok(Level::WARNING),
            "ERROR" => Ok(Level::ERROR),
            "CRITICAL" | "FATAL" => Ok(Level::CRITICAL),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Wire representation of a level: a name or a bare number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Number(u32),
    Name(String),
}

impl TryFrom<LevelRepr> for Level {
    type Error = ParseLevelError;

    fn try_from(repr: LevelRepr) -> Result<Self, Self::Error> {
        match repr {
            LevelRepr::Number(n) => Ok(Level(n)),
            LevelRepr::Name(name) => name.parse(),
        }
    }
}

impl From<Level> for LevelRepr {
    fn from(level: Level) -> Self {
        match level.name() {
            Some(name) => LevelRepr::Name(name.to_string()),
            None => LevelRepr::Number(level.0),
        }
    }
}

/// Parse a boolean word, including the YAML 1.1 spellings.
pub fn parse_flag(word: &str) -> Option<bool> {
    match word.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" => Some(true),
        "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Word(String),
}

/// Optional boolean that also takes `yes`/`no`, `on`/`off` and `y`/`n`.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Option::<FlagRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlagRepr::Bool(value)) => Ok(Some(value)),
        Some(FlagRepr::Word(word)) => parse_flag(&word)
            .map(Some)
            .ok_or_else(|| de::Error::invalid_value(Unexpected::Str(&word), &"a boolean")),
    }
}

/// Formatter definition.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct FormatterSpec {
    /// Template, e.g. `{asctime} {levelname:8} {name}: {message}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Template style: `{` (default) or `%`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    /// Registered formatter class (`plain`, `colored`, `json`, ...).
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// strftime-style pattern for `asctime`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datefmt: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Handler definition.
///
/// Class-specific options such as `stream`, `filename` or `when` live in
/// `options` and are read by the handler constructor.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct HandlerSpec {
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// Name of a formatter declared in the same document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<String>,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl HandlerSpec {
    /// Read a string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Read an unsigned integer option.
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }
}

/// Logger definition.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct LoggerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// Handler names, in attachment order. Duplicates are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handlers: Option<Vec<String>>,

    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub propagate: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Crash reporting sink settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SentryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A complete logging configuration document.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default)]
    pub formatters: BTreeMap<String, FormatterSpec>,

    /// `None` entries remove or disable the named handler.
    #[serde(default)]
    pub handlers: BTreeMap<String, Option<HandlerSpec>>,

    /// Keyed by dotted logger name; `""` and `root` both mean the root logger.
    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerSpec>,

    /// Top-level root logger section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<LoggerSpec>,

    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub disable_existing_loggers: Option<bool>,

    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,

    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub show_warnings: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentry_config: Option<SentryConfig>,

    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub tracemalloc: Option<bool>,

    /// Port of a configuration listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_log_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_log_level: Option<Level>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigDocument {
    /// True when this document updates the live configuration in place.
    pub fn is_incremental(&self) -> bool {
        self.incremental.unwrap_or(false)
    }

    /// True when loggers not named here are muted on full replace.
    pub fn disables_existing_loggers(&self) -> bool {
        self.disable_existing_loggers.unwrap_or(false)
    }

    /// True if a logger entry addresses the root logger.
    pub fn has_root_logger(&self) -> bool {
        self.root.is_some() || self.loggers.contains_key("") || self.loggers.contains_key(ROOT_ALIAS)
    }

    /// Names of handlers that are declared and not disabled, in name order.
    pub fn enabled_handlers(&self) -> Vec<String> {
        self.handlers
            .iter()
            .filter(|(_, spec)| spec.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Remove the extension keys that only this crate understands.
    ///
    /// The returned document is what gets handed to the engine.
    pub fn split_extensions(mut self) -> (ConfigDocument, Extensions) {
        let extensions = Extensions {
            show_warnings: self.show_warnings.take().unwrap_or(true),
            sentry_config: self.sentry_config.take(),
            tracemalloc: self.tracemalloc.take().unwrap_or(false),
            listen: self.listen.take(),
        };
        self.default_log_format = None;
        self.default_log_level = None;
        (self, extensions)
    }
}

/// Extension settings stripped from a document before it reaches the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Extensions {
    /// Surface non-fatal configuration warnings.
    pub show_warnings: bool,
    pub sentry_config: Option<SentryConfig>,
    pub tracemalloc: bool,
    pub listen: Option<u16>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            show_warnings: true,
            sentry_config: None,
            tracemalloc: false,
            listen: None,
        }
    }
}

/// Settings of the configuration listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:9030").
    pub bind_address: String,

    /// Upper bound for reading one framed document, in milliseconds.
    pub read_timeout_ms: u64,

    /// Largest accepted payload; larger length prefixes are refused unread.
    pub max_payload_bytes: usize,

    /// Connections processed concurrently.
    pub max_connections: usize,

    /// Refuse destructive documents at the listener too.
    pub guard_destructive: bool,

    /// How long `stop` waits for the accept loop and open connections.
    pub stop_timeout_ms: u64,
}

impl ListenerConfig {
    /// Loopback listener on the given port.
    pub fn on_port(port: u16) -> Self {
        Self {
            bind_address: format!("127.0.0.1:{}", port),
            ..Self::default()
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("127.0.0.1:{}", DEFAULT_LISTEN_PORT),
            read_timeout_ms: 5_000,
            max_payload_bytes: 16 * 1024 * 1024,
            max_connections: 4,
            guard_destructive: false,
            stop_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_parses_names_aliases_and_numbers() {
        assert_eq!("debug".parse::<Level>().unwrap(), Level::DEBUG);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::WARNING);
        assert_eq!("fatal".parse::<Level>().unwrap(), Level::CRITICAL);
        assert_eq!("15".parse::<Level>().unwrap(), Level::from_number(15));
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn level_serializes_to_canonical_name() {
        let level: Level = serde_json::from_value(json!(20)).unwrap();
        assert_eq!(serde_json::to_value(level).unwrap(), json!("INFO"));
        assert_eq!(serde_json::to_value(Level::from_number(15)).unwrap(), json!(15));
        assert_eq!(Level::from_number(15).to_string(), "Level 15");
    }

    #[test]
    fn null_handler_is_kept_as_disabled() {
        let doc: ConfigDocument = serde_json::from_value(json!({
            "handlers": {"console": null, "file": {"class": "file", "filename": "app.log"}}
        }))
        .unwrap();
        assert_eq!(doc.handlers.get("console"), Some(&None));
        assert_eq!(doc.enabled_handlers(), vec!["file".to_string()]);
        let file = doc.handlers["file"].as_ref().unwrap();
        assert_eq!(file.option_str("filename"), Some("app.log"));
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let value = json!({
            "version": 1,
            "formatters": {"f": {"format": "{message}", "validate": true}},
            "handlers": {"h": {"class": "null", "level": "ERROR"}, "off": null},
            "loggers": {"app.db": {"level": 15, "handlers": ["h"], "propagate": false}},
            "filters": {"only_app": {"name": "app"}},
            "incremental": false
        });
        let doc: ConfigDocument = serde_json::from_value(value).unwrap();
        let encoded = serde_json::to_vec(&doc).unwrap();
        let decoded: ConfigDocument = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, doc);
        assert!(decoded.extra.contains_key("filters"));
    }

    #[test]
    fn split_extensions_strips_crate_keys() {
        let doc: ConfigDocument = serde_json::from_value(json!({
            "listen": 9999,
            "tracemalloc": true,
            "show_warnings": false,
            "sentry_config": {"dsn": "https://key@example.invalid/1"}
        }))
        .unwrap();
        let (engine_doc, ext) = doc.split_extensions();
        assert_eq!(ext.listen, Some(9999));
        assert!(ext.tracemalloc);
        assert!(!ext.show_warnings);
        assert!(ext.sentry_config.is_some());
        assert!(engine_doc.listen.is_none());
        assert!(engine_doc.sentry_config.is_none());
    }
}
