//! Process logging setup.
//!
//! # Responsibilities
//! - Resolve the configuration source with defaults
//! - Strip and act on the extension keys (warnings, crash reporting, listen)
//! - Apply the remaining document to the engine
//! - Hand back a [`LoggingSetup`] that can start the config listener

use std::sync::Arc;

use crate::config::loader::{resolve, ConfigError, ConfigSource};
use crate::config::schema::{Extensions, ListenerConfig};
use crate::engine::{ApplyReport, EngineError, LoggingEngine};
use crate::net::listener::{ConfigListener, ListenerError, ListenerHandle, VerifyFn};
use crate::observability::crash::{
    install_panic_hook, CrashConfigError, CrashReporterFactory, ValidatedSentryConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("logging configuration could not be applied: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Crash(#[from] CrashConfigError),
}

/// Optional integrations available to setup.
#[derive(Clone, Default)]
pub struct SetupHooks {
    /// Builds a crash reporter when the document has `sentry_config`.
    pub crash_reporter: Option<CrashReporterFactory>,
}

impl std::fmt::Debug for SetupHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupHooks")
            .field("crash_reporter", &self.crash_reporter.is_some())
            .finish()
    }
}

/// Result of a successful setup.
pub struct LoggingSetup {
    engine: Arc<dyn LoggingEngine>,
    extensions: Extensions,
    report: ApplyReport,
}

impl LoggingSetup {
    /// Port requested by the document's `listen` key.
    pub fn listen_port(&self) -> Option<u16> {
        self.extensions.listen
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn report(&self) -> &ApplyReport {
        &self.report
    }

    pub fn engine(&self) -> &Arc<dyn LoggingEngine> {
        &self.engine
    }

    /// Start a listener on the `listen` port, if the document asked for one.
    pub async fn listen(&self, verify: Option<VerifyFn>) -> Result<Option<ListenerHandle>, ListenerError> {
        let Some(port) = self.extensions.listen else {
            return Ok(None);
        };
        let handle =
            ConfigListener::start(Arc::clone(&self.engine), ListenerConfig::on_port(port), verify).await?;
        Ok(Some(handle))
    }
}

/// Configure logging from `source` with no optional integrations.
pub fn setup_logging(
    engine: Arc<dyn LoggingEngine>,
    source: impl Into<ConfigSource>,
) -> Result<LoggingSetup, SetupError> {
    setup_logging_with(engine, source, &SetupHooks::default())
}

/// Configure logging from `source`.
pub fn setup_logging_with(
    engine: Arc<dyn LoggingEngine>,
    source: impl Into<ConfigSource>,
    hooks: &SetupHooks,
) -> Result<LoggingSetup, SetupError> {
    let document = resolve(source)?;
    let (document, extensions) = document.split_extensions();

    // Validate before touching the engine so a bad dsn leaves logging as it was.
    let crash = extensions
        .sentry_config
        .as_ref()
        .map(ValidatedSentryConfig::from_config)
        .transpose()?;

    let report = engine.apply(&document)?;
    report.log_warnings(extensions.show_warnings);

    if let Some(crash) = crash {
        match &hooks.crash_reporter {
            Some(factory) => {
                let reporter = factory(&crash).map_err(CrashConfigError::Factory)?;
                install_panic_hook(reporter, crash.environment.clone());
                tracing::info!(environment = ?crash.environment, "Crash reporting enabled");
            }
            None => {
                tracing::warn!("sentry_config is set but no crash reporter is registered; ignoring it");
            }
        }
    }

    if extensions.tracemalloc {
        // No allocator hook is installed.
        tracing::warn!("Allocation tracing was requested but is not available in this build");
    }

    tracing::debug!(
        mode = report.mode.as_str(),
        handlers = report.handlers,
        loggers = report.loggers,
        "Logging configured"
    );

    Ok(LoggingSetup {
        engine,
        extensions,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Level;
    use crate::engine::LogEngine;
    use crate::observability::crash::{CrashReport, CrashReporter};
    use serde_json::json;

    #[test]
    fn listen_key_is_exposed_and_not_applied() {
        let engine: Arc<dyn LoggingEngine> = Arc::new(LogEngine::new());
        let setup = setup_logging(
            engine,
            json!({"listen": 9999, "handlers": {"console": null}, "default_log_level": "INFO"}),
        )
        .unwrap();

        assert_eq!(setup.listen_port(), Some(9999));
        assert_eq!(setup.engine().logger("").level, Level::INFO);
    }

    #[test]
    fn tracemalloc_is_a_notice_not_a_failure() {
        let engine: Arc<dyn LoggingEngine> = Arc::new(LogEngine::new());
        let setup = setup_logging(
            engine,
            json!({"tracemalloc": "yes", "handlers": {"console": null}, "default_log_level": "ERROR"}),
        )
        .unwrap();

        assert_eq!(setup.engine().logger("").level, Level::ERROR);
        assert!(setup.report().warnings.is_empty());
    }

    #[test]
    fn sentry_config_without_dsn_fails_before_apply() {
        let engine = Arc::new(LogEngine::new());
        let err = setup_logging(
            engine.clone(),
            json!({"sentry_config": {"environment": "test"}, "default_log_level": "ERROR"}),
        )
        .err()
        .unwrap();

        assert!(matches!(err, SetupError::Crash(CrashConfigError::MissingDsn)));
        assert_ne!(engine.logger("").level, Level::ERROR);
    }

    struct Discard;

    impl CrashReporter for Discard {
        fn report(&self, _report: &CrashReport) {}
    }

    #[test]
    fn factory_receives_validated_config() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_factory = Arc::clone(&seen);
        let factory: CrashReporterFactory = Arc::new(move |config: &ValidatedSentryConfig| {
            *seen_in_factory.lock().unwrap() = Some(config.dsn.clone());
            Ok(Arc::new(Discard) as Arc<dyn CrashReporter>)
        });
        let hooks = SetupHooks {
            crash_reporter: Some(factory),
        };

        let engine: Arc<dyn LoggingEngine> = Arc::new(LogEngine::new());
        setup_logging_with(
            engine,
            json!({"handlers": {"console": null}, "sentry_config": {"dsn": "https://key@example.invalid/1"}}),
            &hooks,
        )
        .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("https://key@example.invalid/1")
        );
        let _ = std::panic::take_hook();
    }

    #[tokio::test]
    async fn listen_without_port_starts_nothing() {
        let engine: Arc<dyn LoggingEngine> = Arc::new(LogEngine::new());
        let setup = setup_logging(engine, json!({"handlers": {"console": null}})).unwrap();
        assert!(setup.listen(None).await.unwrap().is_none());
    }
}
