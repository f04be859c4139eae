//! The shipped logging engine.
//!
//! # Responsibilities
//! - Hold the logger tree, handlers and formatters as one immutable snapshot
//! - Apply documents incrementally or as a full replace
//! - Dispatch records: logger level, disabled flag, handler level, propagation
//!
//! # Design Decisions
//! - Writers serialize on a mutex and publish with `ArcSwap`; readers never lock
//! - A failed apply leaves the published snapshot untouched
//! - Never logs through `tracing` itself, since the tracing bridge feeds it

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwap;

use crate::config::schema::{ConfigDocument, Level, LoggerSpec, ROOT_ALIAS, SCHEMA_VERSION};
use crate::engine::format::{Format, TemplateFormatter};
use crate::engine::handlers::Sink;
use crate::engine::registry::ComponentRegistry;
use crate::engine::{ApplyMode, ApplyReport, EngineError, LoggerState, LoggingEngine, Record};

/// An installed handler.
#[derive(Clone)]
struct Handler {
    level: Level,
    formatter: Arc<dyn Format>,
    sink: Arc<dyn Sink>,
}

impl Handler {
    fn handle(&self, record: &Record) -> bool {
        if record.level < self.level {
            return false;
        }
        let line = self.formatter.format(record);
        if let Err(e) = self.sink.write_line(&line) {
            eprintln!("logwire: handler failed to write record: {}", e);
            return false;
        }
        true
    }
}

/// Configuration of a single logger.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoggerNode {
    level: Level,
    handlers: Vec<String>,
    propagate: bool,
}

impl Default for LoggerNode {
    fn default() -> Self {
        Self {
            level: Level::NOTSET,
            handlers: Vec::new(),
            propagate: true,
        }
    }
}

/// Published engine state. Root lives under `""`.
#[derive(Clone)]
struct Topology {
    handlers: BTreeMap<String, Handler>,
    loggers: BTreeMap<String, LoggerNode>,
    disabled: BTreeSet<String>,
}

impl Topology {
    /// Unconfigured state: root at WARNING with no handlers.
    fn initial() -> Self {
        let mut loggers = BTreeMap::new();
        loggers.insert(
            String::new(),
            LoggerNode {
                level: Level::WARNING,
                ..LoggerNode::default()
            },
        );
        Self {
            handlers: BTreeMap::new(),
            loggers,
            disabled: BTreeSet::new(),
        }
    }

    fn effective_level(&self, name: &str) -> Level {
        for candidate in lineage(name) {
            if let Some(node) = self.loggers.get(candidate) {
                if node.level != Level::NOTSET {
                    return node.level;
                }
            }
        }
        Level::NOTSET
    }

    fn dispatch(&self, record: &Record) -> bool {
        let mut handled = false;
        for candidate in lineage(&record.logger) {
            let Some(node) = self.loggers.get(candidate) else { continue };
            for name in &node.handlers {
                if let Some(handler) = self.handlers.get(name) {
                    handled |= handler.handle(record);
                }
            }
            if !node.propagate {
                break;
            }
        }
        handled
    }

    fn flush(&self) {
        for handler in self.handlers.values() {
            let _ = handler.sink.flush();
        }
    }
}

/// `a.b.c` → `a.b.c`, `a.b`, `a`, `""`.
fn lineage(name: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(name);
    std::iter::from_fn(move || {
        let current = next?;
        next = if current.is_empty() {
            None
        } else {
            Some(current.rfind('.').map_or("", |i| &current[..i]))
        };
        Some(current)
    })
}

/// `root` and `""` both address the root logger.
fn canonical(name: &str) -> &str {
    if name == ROOT_ALIAS {
        ""
    } else {
        name
    }
}

fn is_descendant(name: &str, ancestor: &str) -> bool {
    !ancestor.is_empty()
        && name.len() > ancestor.len()
        && name.starts_with(ancestor)
        && name.as_bytes()[ancestor.len()] == b'.'
}

/// Root sections in precedence order: top-level `root`, `loggers[""]`, `loggers["root"]`.
fn root_sections(document: &ConfigDocument) -> Vec<&LoggerSpec> {
    document
        .root
        .iter()
        .chain(document.loggers.get(""))
        .chain(document.loggers.get(ROOT_ALIAS))
        .collect()
}

/// In-process logging engine.
pub struct LogEngine {
    registry: ComponentRegistry,
    current: ArcSwap<Topology>,
    write_lock: Mutex<()>,
    known: RwLock<BTreeSet<String>>,
}

impl LogEngine {
    /// Engine with the built-in classes.
    pub fn new() -> Self {
        Self::with_registry(ComponentRegistry::with_defaults())
    }

    pub fn with_registry(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            current: ArcSwap::from_pointee(Topology::initial()),
            write_lock: Mutex::new(()),
            known: RwLock::new(BTreeSet::new()),
        }
    }

    /// Convenience wrapper around [`LoggingEngine::emit`].
    pub fn log(&self, logger: &str, level: Level, message: impl Into<String>) -> bool {
        self.emit(Record::new(logger, level, message))
    }

    /// Names of the installed handlers.
    pub fn handler_names(&self) -> Vec<String> {
        self.current.load().handlers.keys().cloned().collect()
    }

    fn register(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        if let Ok(known) = self.known.read() {
            if known.contains(name) {
                return;
            }
        }
        if let Ok(mut known) = self.known.write() {
            known.insert(name.to_string());
        }
    }

    fn known_loggers(&self) -> BTreeSet<String> {
        self.known.read().map(|k| k.clone()).unwrap_or_default()
    }

    /// Reject dangling references and unknown classes before any handler opens its target.
    fn check_replacement(&self, document: &ConfigDocument) -> Result<(), EngineError> {
        for (name, spec) in &document.handlers {
            let Some(spec) = spec else { continue };
            if let Some(class) = spec.class.as_deref() {
                if !self.registry.has_handler_class(class) {
                    return Err(EngineError::UnknownClass {
                        kind: "handler",
                        name: name.clone(),
                        class: class.to_string(),
                    });
                }
            }
            if let Some(formatter) = &spec.formatter {
                if !document.formatters.contains_key(formatter) {
                    return Err(EngineError::UnknownFormatter {
                        handler: name.clone(),
                        formatter: formatter.clone(),
                    });
                }
            }
        }

        let loggers = document
            .loggers
            .iter()
            .map(|(name, spec)| (canonical(name), spec))
            .chain(document.root.iter().map(|spec| ("", spec)));
        for (logger, spec) in loggers {
            for handler in spec.handlers.iter().flatten() {
                if !matches!(document.handlers.get(handler), Some(Some(_))) {
                    return Err(EngineError::UnknownHandler {
                        logger: logger.to_string(),
                        handler: handler.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn build_replacement(&self, document: &ConfigDocument, previous: &Topology) -> Result<(Topology, Vec<String>), EngineError> {
        self.check_replacement(document)?;
        let mut warnings = Vec::new();

        let mut formatters: BTreeMap<&str, Arc<dyn Format>> = BTreeMap::new();
        for (name, spec) in &document.formatters {
            formatters.insert(name.as_str(), self.registry.build_formatter(name, spec)?);
        }

        let mut handlers = BTreeMap::new();
        for (name, spec) in &document.handlers {
            let Some(spec) = spec else { continue };
            let formatter: Arc<dyn Format> = match &spec.formatter {
                Some(formatter) => formatters
                    .get(formatter.as_str())
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownFormatter {
                        handler: name.clone(),
                        formatter: formatter.clone(),
                    })?,
                None => Arc::new(TemplateFormatter::bare()),
            };
            let sink = self.registry.build_handler(name, spec)?;
            handlers.insert(
                name.clone(),
                Handler {
                    level: spec.level.unwrap_or(Level::NOTSET),
                    formatter,
                    sink,
                },
            );
        }

        let build_node = |logger: &str, spec: &LoggerSpec, default_level: Level| -> Result<LoggerNode, EngineError> {
            let mut attached: Vec<String> = Vec::new();
            for handler in spec.handlers.iter().flatten() {
                if !handlers.contains_key(handler) {
                    return Err(EngineError::UnknownHandler {
                        logger: logger.to_string(),
                        handler: handler.clone(),
                    });
                }
                if !attached.contains(handler) {
                    attached.push(handler.clone());
                }
            }
            Ok(LoggerNode {
                level: spec.level.unwrap_or(default_level),
                handlers: attached,
                propagate: spec.propagate.unwrap_or(true),
            })
        };

        let mut loggers = BTreeMap::new();
        for (name, spec) in &document.loggers {
            if canonical(name).is_empty() {
                continue;
            }
            loggers.insert(name.clone(), build_node(name.as_str(), spec, Level::NOTSET)?);
        }

        let roots = root_sections(document);
        if roots.len() > 1 {
            warnings.push("several root logger sections given; using the first of root, loggers[\"\"], loggers[\"root\"]".to_string());
        }
        let root = match roots.first().copied() {
            Some(spec) => build_node("", spec, Level::WARNING)?,
            None => LoggerNode {
                level: Level::WARNING,
                ..LoggerNode::default()
            },
        };
        loggers.insert(String::new(), root);

        let mut disabled = BTreeSet::new();
        if document.disables_existing_loggers() {
            let mut existing = self.known_loggers();
            existing.extend(previous.loggers.keys().cloned());
            for name in existing {
                if name.is_empty() || loggers.contains_key(&name) {
                    continue;
                }
                let covered = loggers.keys().any(|configured| is_descendant(&name, configured));
                if !covered {
                    disabled.insert(name);
                }
            }
        }

        Ok((
            Topology {
                handlers,
                loggers,
                disabled,
            },
            warnings,
        ))
    }

    fn build_incremental(&self, document: &ConfigDocument, previous: &Topology) -> (Topology, Vec<String>) {
        let mut next = previous.clone();
        let mut warnings = Vec::new();

        for (name, spec) in &document.handlers {
            match spec {
                None => {
                    if next.handlers.remove(name).is_some() {
                        for node in next.loggers.values_mut() {
                            node.handlers.retain(|h| h != name);
                        }
                    }
                }
                Some(spec) => match next.handlers.get_mut(name) {
                    Some(handler) => {
                        if let Some(level) = spec.level {
                            handler.level = level;
                        }
                    }
                    None => warnings.push(format!("no handler named '{}' to update", name)),
                },
            }
        }

        let mut updates: Vec<(&str, &LoggerSpec)> = root_sections(document)
            .into_iter()
            .take(1)
            .map(|spec| ("", spec))
            .collect();
        updates.extend(
            document
                .loggers
                .iter()
                .filter(|(name, _)| !canonical(name).is_empty())
                .map(|(name, spec)| (name.as_str(), spec)),
        );

        for (name, spec) in updates {
            let node = next.loggers.entry(name.to_string()).or_default();
            if let Some(level) = spec.level {
                node.level = level;
            }
            if let Some(propagate) = spec.propagate {
                node.propagate = propagate;
            }
        }

        (next, warnings)
    }
}

impl Default for LogEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingEngine for LogEngine {
    fn apply(&self, document: &ConfigDocument) -> Result<ApplyReport, EngineError> {
        let version = document.version.unwrap_or(SCHEMA_VERSION);
        if version != SCHEMA_VERSION {
            return Err(EngineError::UnsupportedVersion(version));
        }

        let _writer = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = self.current.load_full();

        let mode = if document.is_incremental() {
            ApplyMode::Incremental
        } else {
            ApplyMode::Replace
        };
        let (next, warnings) = match mode {
            ApplyMode::Incremental => self.build_incremental(document, &previous),
            ApplyMode::Replace => self.build_replacement(document, &previous)?,
        };

        for name in document.loggers.keys() {
            self.register(canonical(name));
        }

        let report = ApplyReport {
            mode,
            handlers: next.handlers.len(),
            loggers: next.loggers.len(),
            disabled: next.disabled.len(),
            warnings,
        };
        self.current.store(Arc::new(next));
        previous.flush();
        Ok(report)
    }

    fn logger(&self, name: &str) -> LoggerState {
        let name = canonical(name);
        self.register(name);
        let topology = self.current.load();
        let node = topology.loggers.get(name).cloned().unwrap_or_default();
        LoggerState {
            name: name.to_string(),
            level: node.level,
            effective_level: topology.effective_level(name),
            handlers: node.handlers,
            propagate: node.propagate,
            disabled: topology.disabled.contains(name),
        }
    }

    fn emit(&self, record: Record) -> bool {
        self.register(&record.logger);
        let topology = self.current.load();
        if topology.disabled.contains(&record.logger) {
            return false;
        }
        if record.level < topology.effective_level(&record.logger) {
            return false;
        }
        topology.dispatch(&record)
    }
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topology = self.current.load();
        f.debug_struct("LogEngine")
            .field("handlers", &topology.handlers.keys().collect::<Vec<_>>())
            .field("loggers", &topology.loggers)
            .field("disabled", &topology.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::resolve;
    use serde_json::json;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Sink for Capture {
        fn write_line(&self, line: &str) -> std::io::Result<()> {
            self.0.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn engine_with_capture() -> (LogEngine, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let sink = capture.clone();
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_handler("capture", move |_, _| Ok(sink.clone() as Arc<dyn Sink>));
        (LogEngine::with_registry(registry), capture)
    }

    fn doc(value: serde_json::Value) -> ConfigDocument {
        serde_json::from_value(value).unwrap()
    }

    fn lines(capture: &Capture) -> Vec<String> {
        capture.0.lock().unwrap().clone()
    }

    #[test]
    fn lineage_walks_to_root() {
        assert_eq!(lineage("a.b.c").collect::<Vec<_>>(), vec!["a.b.c", "a.b", "a", ""]);
        assert_eq!(lineage("").collect::<Vec<_>>(), vec![""]);
    }

    #[test]
    fn descendant_requires_dot_boundary() {
        assert!(is_descendant("app.db", "app"));
        assert!(!is_descendant("application", "app"));
        assert!(!is_descendant("app", "app"));
        assert!(!is_descendant("app", ""));
    }

    #[test]
    fn unconfigured_engine_has_warning_root() {
        let engine = LogEngine::new();
        let root = engine.logger("root");
        assert_eq!(root.effective_level, Level::WARNING);
        assert!(root.handlers.is_empty());
    }

    #[test]
    fn levels_and_propagation() {
        let (engine, capture) = engine_with_capture();
        engine
            .apply(&doc(json!({
                "formatters": {"f": {"format": "{name}:{levelname}:{message}"}},
                "handlers": {"cap": {"class": "capture", "formatter": "f"}},
                "loggers": {
                    "": {"level": "INFO", "handlers": ["cap"]},
                    "noisy": {"level": "ERROR"},
                    "private": {"level": "DEBUG", "handlers": ["cap"], "propagate": false}
                }
            })))
            .unwrap();

        assert!(!engine.log("app", Level::DEBUG, "dropped"));
        assert!(engine.log("app.web", Level::INFO, "kept"));
        assert!(!engine.log("noisy.child", Level::WARNING, "dropped"));
        assert!(engine.log("private", Level::DEBUG, "once"));

        assert_eq!(
            lines(&capture),
            vec!["app.web:INFO:kept".to_string(), "private:DEBUG:once".to_string()]
        );
        assert_eq!(engine.logger("noisy.child").effective_level, Level::ERROR);
    }

    #[test]
    fn handler_level_filters_independently() {
        let (engine, capture) = engine_with_capture();
        engine
            .apply(&doc(json!({
                "handlers": {"cap": {"class": "capture", "level": "ERROR"}},
                "root": {"level": "DEBUG", "handlers": ["cap"]}
            })))
            .unwrap();

        engine.log("a", Level::INFO, "info");
        engine.log("a", Level::ERROR, "error");
        assert_eq!(lines(&capture), vec!["error".to_string()]);
    }

    #[test]
    fn duplicate_handler_names_attach_once() {
        let (engine, capture) = engine_with_capture();
        engine
            .apply(&doc(json!({
                "handlers": {"cap": {"class": "capture"}},
                "root": {"level": "DEBUG", "handlers": ["cap", "cap"]}
            })))
            .unwrap();
        engine.log("a", Level::INFO, "x");
        assert_eq!(lines(&capture).len(), 1);
    }

    #[test]
    fn failed_replace_keeps_previous_snapshot() {
        let (engine, _capture) = engine_with_capture();
        engine.apply(&resolve(json!({"default_log_level": "INFO"})).unwrap()).unwrap();

        let err = engine
            .apply(&doc(json!({
                "handlers": {"h": {"class": "capture"}},
                "root": {"level": "ERROR", "handlers": ["missing"]}
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownHandler { .. }));
        assert_eq!(engine.logger("").effective_level, Level::INFO);
        assert_eq!(engine.handler_names(), vec!["console".to_string()]);
    }

    #[test]
    fn failed_replace_does_not_touch_file_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let filename = path.to_str().unwrap();

        let engine = LogEngine::new();
        engine
            .apply(&doc(json!({
                "handlers": {"out": {"class": "file", "filename": filename}},
                "root": {"level": "INFO", "handlers": ["out"]}
            })))
            .unwrap();
        assert!(engine.log("app", Level::INFO, "kept"));

        let err = engine
            .apply(&doc(json!({
                "handlers": {"out": {"class": "file", "filename": filename, "mode": "w"}},
                "root": {"level": "INFO", "handlers": ["out", "ghost"]}
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownHandler { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");

        let err = engine
            .apply(&doc(json!({
                "handlers": {
                    "out": {"class": "file", "filename": filename, "mode": "w"},
                    "later": {"class": "syslog"}
                },
                "root": {"level": "INFO", "handlers": ["out"]}
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownClass { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn unparseable_datefmt_is_refused() {
        let (engine, _capture) = engine_with_capture();
        let err = engine
            .apply(&doc(json!({
                "formatters": {"f": {"format": "{asctime} {message}", "datefmt": "%Q"}},
                "handlers": {"cap": {"class": "capture", "formatter": "f"}},
                "root": {"level": "DEBUG", "handlers": ["cap"]}
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOption { .. }));
        assert!(engine.handler_names().is_empty());
    }

    #[test]
    fn rejects_other_versions() {
        let engine = LogEngine::new();
        let err = engine.apply(&doc(json!({"version": 2}))).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedVersion(2)));
    }

    #[test]
    fn replace_disables_existing_loggers_only_when_asked() {
        let (engine, _capture) = engine_with_capture();
        engine.logger("legacy");
        engine.logger("app.worker");

        let keep = doc(json!({"loggers": {"app": {"level": "INFO"}}}));
        let report = engine.apply(&keep).unwrap();
        assert_eq!(report.disabled, 0);
        assert!(!engine.logger("legacy").disabled);

        let wipe = doc(json!({
            "disable_existing_loggers": true,
            "loggers": {"app": {"level": "INFO"}}
        }));
        let report = engine.apply(&wipe).unwrap();
        assert_eq!(report.mode, ApplyMode::Replace);
        assert!(engine.logger("legacy").disabled);
        assert!(!engine.logger("app.worker").disabled);
        assert!(!engine.logger("app").disabled);

        engine.apply(&keep).unwrap();
        assert!(!engine.logger("legacy").disabled);
    }

    #[test]
    fn incremental_updates_levels_without_removing() {
        let (engine, _capture) = engine_with_capture();
        engine
            .apply(&doc(json!({
                "handlers": {"cap": {"class": "capture", "level": "DEBUG"}, "other": {"class": "null"}},
                "loggers": {
                    "": {"level": "INFO", "handlers": ["cap", "other"]},
                    "db": {"level": "WARNING", "handlers": ["cap"]}
                }
            })))
            .unwrap();

        let report = engine
            .apply(&doc(json!({
                "incremental": true,
                "handlers": {"cap": {"level": "ERROR"}, "ghost": {"level": "INFO"}},
                "loggers": {"root": {"level": "CRITICAL", "handlers": []}}
            })))
            .unwrap();

        assert_eq!(report.mode, ApplyMode::Incremental);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(engine.handler_names(), vec!["cap".to_string(), "other".to_string()]);
        let root = engine.logger("");
        assert_eq!(root.level, Level::CRITICAL);
        assert_eq!(root.handlers, vec!["cap".to_string(), "other".to_string()]);
        assert_eq!(engine.logger("db").level, Level::WARNING);
        assert_eq!(engine.logger("db").handlers, vec!["cap".to_string()]);
    }

    #[test]
    fn incremental_null_handler_detaches_it() {
        let (engine, capture) = engine_with_capture();
        engine
            .apply(&doc(json!({
                "handlers": {"cap": {"class": "capture"}},
                "root": {"level": "DEBUG", "handlers": ["cap"]}
            })))
            .unwrap();
        engine
            .apply(&doc(json!({"incremental": true, "handlers": {"cap": null}})))
            .unwrap();

        assert!(engine.handler_names().is_empty());
        assert!(engine.logger("").handlers.is_empty());
        assert!(!engine.log("a", Level::ERROR, "nowhere"));
        assert!(lines(&capture).is_empty());
    }
}
