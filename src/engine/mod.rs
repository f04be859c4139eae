//! Logging engine subsystem.
//!
//! # Data Flow
//! ```text
//! tracing event / direct emit
//!     → layer.rs (event → Record)
//!     → log_engine.rs (logger lookup, level check, propagation)
//!     → handler level check
//!     → format.rs (Record → line)
//!     → handlers.rs (stdout, stderr, file, rotating file, ...)
//!
//! On apply(document):
//!     registry.rs builds formatters and handlers by class name
//!     → log_engine.rs builds the next topology
//!     → atomic swap of the published snapshot
//! ```
//!
//! # Design Decisions
//! - Callers only see the `LoggingEngine` trait (apply, logger, emit)
//! - Snapshots are immutable; readers never observe a half-applied document
//! - Class names resolve through an explicit registry, never by reflection

pub mod format;
pub mod handlers;
pub mod layer;
pub mod log_engine;
pub mod registry;

use chrono::{DateTime, Local};

use crate::config::schema::{ConfigDocument, Level};

pub use log_engine::LogEngine;
pub use layer::{init_tracing, EngineLayer};
pub use registry::ComponentRegistry;

/// Capability the rest of the crate needs from a logging engine.
pub trait LoggingEngine: Send + Sync {
    /// Install or merge a configuration document.
    fn apply(&self, document: &ConfigDocument) -> Result<ApplyReport, EngineError>;

    /// Current state of a logger. Looking a logger up registers it.
    fn logger(&self, name: &str) -> LoggerState;

    /// Dispatch a record. Returns true if at least one handler took it.
    fn emit(&self, record: Record) -> bool;
}

/// A single log record.
#[derive(Debug, Clone)]
pub struct Record {
    /// Dotted logger name; empty for the root logger.
    pub logger: String,
    pub level: Level,
    pub message: String,
    pub created: DateTime<Local>,
}

impl Record {
    pub fn new(logger: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            level,
            message: message.into(),
            created: Local::now(),
        }
    }

    /// Name shown for the logger (`root` for the root logger).
    pub fn display_name(&self) -> &str {
        if self.logger.is_empty() {
            "root"
        } else {
            &self.logger
        }
    }
}

/// Observable state of one logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerState {
    pub name: String,
    /// Level set on this logger; `NOTSET` means inherited.
    pub level: Level,
    /// Level after walking up to the nearest configured ancestor.
    pub effective_level: Level,
    pub handlers: Vec<String>,
    pub propagate: bool,
    pub disabled: bool,
}

impl LoggerState {
    /// Would a record at `level` pass this logger's own checks?
    pub fn is_enabled_for(&self, level: Level) -> bool {
        !self.disabled && level >= self.effective_level
    }
}

/// How a document was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Incremental,
    Replace,
}

impl ApplyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyMode::Incremental => "incremental",
            ApplyMode::Replace => "replace",
        }
    }
}

/// Summary of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub mode: ApplyMode,
    /// Handlers installed after the apply.
    pub handlers: usize,
    /// Loggers carrying explicit configuration after the apply.
    pub loggers: usize,
    /// Loggers muted by `disable_existing_loggers`.
    pub disabled: usize,
    /// Non-fatal problems, such as levels for handlers that do not exist.
    pub warnings: Vec<String>,
}

impl ApplyReport {
    /// Log the warnings at WARN, or at DEBUG when the document asked for quiet.
    pub fn log_warnings(&self, show_warnings: bool) {
        for warning in &self.warnings {
            if show_warnings {
                tracing::warn!("{}", warning);
            } else {
                tracing::debug!("{}", warning);
            }
        }
    }
}

/// Errors raised while applying a document.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u32),

    #[error("{kind} '{name}' has unknown class '{class}'")]
    UnknownClass {
        kind: &'static str,
        name: String,
        class: String,
    },

    #[error("handler '{handler}' references unknown formatter '{formatter}'")]
    UnknownFormatter { handler: String, formatter: String },

    #[error("logger '{logger}' references unknown handler '{handler}'")]
    UnknownHandler { logger: String, handler: String },

    #[error("invalid option for '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("handler '{name}' could not open its target: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handler '{name}' could not create its file appender: {source}")]
    Appender {
        name: String,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
}
