//! Class-name registry for formatters and handlers.
//!
//! # Responsibilities
//! - Map symbolic class names from config documents to constructors
//! - Ship the built-in classes
//! - Let embedders register their own classes before building the engine
//!
//! # Built-in classes
//! - formatters: `plain`, `colored`, `json`
//! - handlers: `console`, `file`, `rotating-file`, `null`

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::schema::{FormatterSpec, HandlerSpec};
use crate::engine::format::{Format, JsonFormatter, Style, TemplateFormatter};
use crate::engine::handlers::{parse_rotation, ConsoleSink, FileSink, NullSink, Sink, Stream};
use crate::engine::EngineError;

/// Builds a formatter from its declared name and spec.
pub type FormatterFactory =
    Arc<dyn Fn(&str, &FormatterSpec) -> Result<Arc<dyn Format>, EngineError> + Send + Sync>;

/// Builds a handler sink from its declared name and spec.
pub type HandlerFactory =
    Arc<dyn Fn(&str, &HandlerSpec) -> Result<Arc<dyn Sink>, EngineError> + Send + Sync>;

/// Formatter class used when a spec names none.
pub const DEFAULT_FORMATTER_CLASS: &str = "plain";

#[derive(Clone)]
pub struct ComponentRegistry {
    formatters: HashMap<String, FormatterFactory>,
    handlers: HashMap<String, HandlerFactory>,
}

impl ComponentRegistry {
    /// Registry without any classes.
    pub fn empty() -> Self {
        Self {
            formatters: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    /// Registry holding the built-in classes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_formatter("plain", |name, spec| template_formatter(name, spec, false));
        registry.register_formatter("colored", |name, spec| template_formatter(name, spec, true));
        registry.register_formatter("json", |_, _| Ok(Arc::new(JsonFormatter) as Arc<dyn Format>));

        registry.register_handler("console", console_handler);
        registry.register_handler("file", file_handler);
        registry.register_handler("rotating-file", rotating_file_handler);
        registry.register_handler("null", |_, _| Ok(Arc::new(NullSink) as Arc<dyn Sink>));
        registry
    }

    pub fn register_formatter<F>(&mut self, class: &str, factory: F)
    where
        F: Fn(&str, &FormatterSpec) -> Result<Arc<dyn Format>, EngineError> + Send + Sync + 'static,
    {
        self.formatters.insert(class.to_string(), Arc::new(factory));
    }

    pub fn register_handler<F>(&mut self, class: &str, factory: F)
    where
        F: Fn(&str, &HandlerSpec) -> Result<Arc<dyn Sink>, EngineError> + Send + Sync + 'static,
    {
        self.handlers.insert(class.to_string(), Arc::new(factory));
    }

    pub fn build_formatter(&self, name: &str, spec: &FormatterSpec) -> Result<Arc<dyn Format>, EngineError> {
        let class = spec.class.as_deref().unwrap_or(DEFAULT_FORMATTER_CLASS);
        let factory = self.formatters.get(class).ok_or_else(|| EngineError::UnknownClass {
            kind: "formatter",
            name: name.to_string(),
            class: class.to_string(),
        })?;
        factory(name, spec)
    }

    pub fn build_handler(&self, name: &str, spec: &HandlerSpec) -> Result<Arc<dyn Sink>, EngineError> {
        let class = spec.class.as_deref().ok_or_else(|| EngineError::InvalidOption {
            name: name.to_string(),
            reason: "handler has no 'class'".to_string(),
        })?;
        let factory = self.handlers.get(class).ok_or_else(|| EngineError::UnknownClass {
            kind: "handler",
            name: name.to_string(),
            class: class.to_string(),
        })?;
        factory(name, spec)
    }

    pub fn has_handler_class(&self, class: &str) -> bool {
        self.handlers.contains_key(class)
    }

    /// Registered handler class names, sorted.
    pub fn handler_classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formatters: Vec<&String> = self.formatters.keys().collect();
        formatters.sort();
        f.debug_struct("ComponentRegistry")
            .field("formatters", &formatters)
            .field("handlers", &self.handler_classes())
            .finish()
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidOption {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn template_formatter(name: &str, spec: &FormatterSpec, colored: bool) -> Result<Arc<dyn Format>, EngineError> {
    let style = Style::parse(spec.style.as_deref()).map_err(|reason| invalid(name, reason))?;
    let formatter = TemplateFormatter::new(spec.format.as_deref(), style, spec.datefmt.as_deref(), colored)
        .map_err(|reason| invalid(name, reason))?;
    Ok(Arc::new(formatter))
}

fn console_handler(name: &str, spec: &HandlerSpec) -> Result<Arc<dyn Sink>, EngineError> {
    let stream = match spec.option_str("stream") {
        None => Stream::Stderr,
        Some(value) => Stream::parse(value)
            .ok_or_else(|| invalid(name, format!("unknown stream {:?}", value)))?,
    };
    Ok(Arc::new(ConsoleSink::new(stream)))
}

/// Split `filename` into the appender's directory and file name.
fn file_target<'a>(name: &str, spec: &'a HandlerSpec) -> Result<(&'a Path, &'a str), EngineError> {
    let path = spec
        .option_str("filename")
        .map(Path::new)
        .ok_or_else(|| invalid(name, "missing 'filename'"))?;
    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| invalid(name, format!("'filename' {:?} names no file", path)))?;
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((directory, file_name))
}

fn appender_error(name: &str) -> impl FnOnce(tracing_appender::rolling::InitError) -> EngineError + '_ {
    move |source| EngineError::Appender {
        name: name.to_string(),
        source,
    }
}

fn file_handler(name: &str, spec: &HandlerSpec) -> Result<Arc<dyn Sink>, EngineError> {
    let (directory, file_name) = file_target(name, spec)?;
    let truncate = match spec.option_str("mode").unwrap_or("a") {
        "a" => false,
        "w" => true,
        other => return Err(invalid(name, format!("unsupported mode {:?}", other))),
    };
    if truncate {
        std::fs::create_dir_all(directory)
            .and_then(|_| std::fs::File::create(directory.join(file_name)))
            .map_err(|source| EngineError::Io {
                name: name.to_string(),
                source,
            })?;
    }
    let sink = FileSink::open(directory, file_name).map_err(appender_error(name))?;
    Ok(Arc::new(sink))
}

fn rotating_file_handler(name: &str, spec: &HandlerSpec) -> Result<Arc<dyn Sink>, EngineError> {
    if spec.options.contains_key("max_bytes") {
        return Err(invalid(name, "size-based rollover is not supported; rotate by 'when' instead"));
    }
    let (directory, file_name) = file_target(name, spec)?;
    let when = spec.option_str("when").unwrap_or("daily");
    let rotation = parse_rotation(when).ok_or_else(|| invalid(name, format!("unknown rotation {:?}", when)))?;
    let max_files = match spec.option_u64("backup_count").unwrap_or(0) {
        0 => None,
        count => Some(usize::try_from(count).map_err(|_| invalid(name, "backup_count too large"))?),
    };
    let sink = FileSink::rolling(directory, file_name, rotation, max_files).map_err(appender_error(name))?;
    Ok(Arc::new(sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler(value: serde_json::Value) -> HandlerSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn builtin_classes_are_registered() {
        let registry = ComponentRegistry::with_defaults();
        assert_eq!(registry.handler_classes(), vec!["console", "file", "null", "rotating-file"]);
    }

    #[test]
    fn unknown_class_is_rejected() {
        let registry = ComponentRegistry::with_defaults();
        let err = registry.build_handler("h", &handler(json!({"class": "syslog"}))).err().unwrap();
        assert!(matches!(err, EngineError::UnknownClass { kind: "handler", .. }));

        let err = registry.build_handler("h", &handler(json!({"level": "INFO"}))).err().unwrap();
        assert!(matches!(err, EngineError::InvalidOption { .. }));
    }

    #[test]
    fn file_handler_requires_filename() {
        let registry = ComponentRegistry::with_defaults();
        let err = registry.build_handler("f", &handler(json!({"class": "file"}))).err().unwrap();
        assert!(err.to_string().contains("filename"));
    }

    #[test]
    fn file_handler_truncates_in_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "stale\n").unwrap();

        let registry = ComponentRegistry::with_defaults();
        let spec = handler(json!({"class": "file", "filename": path.to_str().unwrap(), "mode": "w"}));
        let sink = registry.build_handler("f", &spec).unwrap();
        sink.write_line("fresh").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn rotating_file_options_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let registry = ComponentRegistry::with_defaults();

        let by_size = handler(json!({"class": "rotating-file", "filename": path.to_str().unwrap(), "max_bytes": 1024}));
        let err = registry.build_handler("r", &by_size).err().unwrap();
        assert!(err.to_string().contains("when"));

        let weekly = handler(json!({"class": "rotating-file", "filename": path.to_str().unwrap(), "when": "weekly"}));
        assert!(registry.build_handler("r", &weekly).is_err());

        let hourly = handler(json!({
            "class": "rotating-file",
            "filename": path.to_str().unwrap(),
            "when": "hourly",
            "backup_count": 5
        }));
        assert!(registry.build_handler("r", &hourly).is_ok());
    }

    #[test]
    fn console_rejects_unknown_stream() {
        let registry = ComponentRegistry::with_defaults();
        let spec = handler(json!({"class": "console", "stream": "printer"}));
        assert!(registry.build_handler("c", &spec).is_err());
    }

    #[test]
    fn formatter_defaults_to_plain() {
        let registry = ComponentRegistry::with_defaults();
        let spec: FormatterSpec = serde_json::from_value(json!({"format": "{levelname}|{message}"})).unwrap();
        let formatter = registry.build_formatter("f", &spec).unwrap();
        let record = crate::engine::Record::new("x", crate::config::schema::Level::INFO, "hi");
        assert_eq!(formatter.format(&record), "INFO|hi");
    }

    #[test]
    fn custom_classes_can_be_registered() {
        let mut registry = ComponentRegistry::empty();
        registry.register_handler("discard", |_, _| Ok(Arc::new(NullSink) as Arc<dyn Sink>));
        assert!(registry.build_handler("d", &handler(json!({"class": "discard"}))).is_ok());
        assert!(registry.build_handler("c", &handler(json!({"class": "console"}))).is_err());
    }
}
